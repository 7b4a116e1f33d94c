//! Hard ceilings on client-supplied sizes. Everything lives in memory, so each
//! collection a client can grow has an upper bound here.

/// Max distinct buckets on one calendar (a bit over ten years of days).
pub const MAX_BUCKETS_PER_STORE: usize = 4_000;
pub const MAX_BUCKET_KEY_LEN: usize = 64;

pub const MAX_PROFILES: usize = 100_000;
pub const MAX_HANDLE_LEN: usize = 31;
pub const MAX_IMAGE_URI_LEN: usize = 2_048;

pub const MAX_AVAILABILITIES: usize = 100_000;
pub const MAX_AVAILABILITY_NAME_LEN: usize = 64;

pub const MAX_SESSION_TYPES: usize = 100_000;
pub const MAX_TITLE_LEN: usize = 256;
pub const MAX_DESCRIPTION_LEN: usize = 4_096;
pub const MAX_OPEN_BOOKING_DAYS: u32 = 366;

pub const MAX_BOOKINGS: usize = 1_000_000;
pub const MAX_WHITELISTED_CURRENCIES: usize = 1_024;
pub const MAX_OWNER_LEN: usize = 128;

/// Longest accepted protocol line, in bytes.
pub const MAX_LINE_LEN: usize = 16 * 1024;
/// Max concurrent LISTEN subscriptions per connection.
pub const MAX_LISTENS_PER_CONNECTION: usize = 64;
