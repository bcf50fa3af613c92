use std::path::PathBuf;

/// Which booking store the host wires into the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Wal,
    Memory,
}

/// Process settings, read from `STAYD_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub data_dir: PathBuf,
    pub store: StoreKind,
    pub compact_threshold: u64,
    pub metrics_port: Option<u16>,
    pub max_in_flight: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            store: StoreKind::Wal,
            compact_threshold: 1000,
            metrics_port: None,
            max_in_flight: 256,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source. Unparseable values keep their default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let store = match lookup("STAYD_STORE").as_deref().map(str::trim) {
            Some("memory") => StoreKind::Memory,
            Some("wal") | None => StoreKind::Wal,
            Some(other) => {
                tracing::warn!("unknown STAYD_STORE {other:?}, using wal");
                StoreKind::Wal
            }
        };
        Self {
            data_dir: lookup("STAYD_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            store,
            compact_threshold: lookup("STAYD_COMPACT_THRESHOLD")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.compact_threshold),
            metrics_port: lookup("STAYD_METRICS_PORT").and_then(|s| s.parse().ok()),
            max_in_flight: lookup("STAYD_MAX_IN_FLIGHT")
                .and_then(|s| s.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.max_in_flight),
        }
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("bookings.wal")
    }
}
