/// Max byte length of a guest name.
pub const MAX_GUEST_NAME_LEN: usize = 256;

/// Max byte length of a unit identifier.
pub const MAX_UNIT_ID_LEN: usize = 256;

/// Longest stay accepted, in nights.
pub const MAX_NIGHTS: i64 = 365;

/// Check-in dates must fall inside these calendar years (inclusive).
pub const MIN_CHECK_IN_YEAR: i32 = 2000;
pub const MAX_CHECK_IN_YEAR: i32 = 2199;

/// Widest window accepted by an availability query, in days.
pub const MAX_QUERY_WINDOW_DAYS: i64 = 731;

/// Longest request line the host accepts, in bytes.
pub const MAX_REQUEST_LINE_LEN: usize = 64 * 1024;
