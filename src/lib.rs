//! Unit-reservation availability engine.
//!
//! [`engine::Engine`] admits or rejects new bookings and stay extensions so that
//! no unit is double-booked and no guest holds two units at once, writing
//! admitted bookings through a [`repository::BookingRepository`].

pub mod compactor;
pub mod config;
pub mod engine;
pub mod host;
pub mod limits;
pub mod locks;
pub mod model;
pub mod observability;
pub mod repository;
pub mod wal;
