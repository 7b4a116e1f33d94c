use crate::model::{BucketKey, Owner, ProfileId, Secs, SlotRange};
use crate::profile::ProfileError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    SlotConflict {
        bucket: BucketKey,
        range: SlotRange,
    },
    InvalidRange {
        start: u32,
        count: u32,
        width: u32,
    },
    Profile(ProfileError),
    NotProfileOwner {
        profile_id: ProfileId,
        caller: Owner,
    },
    Unauthorized(Owner),
    AvailabilityNotFound(u64),
    AvailabilityProfileMismatch {
        availability_id: u64,
        profile_id: ProfileId,
    },
    SessionTypeNotFound(u64),
    SessionTypeLocked(u64),
    CurrencyNotWhitelisted(Owner),
    InsufficientPayment {
        required: u128,
        paid: u128,
    },
    InvalidTimestamp(Secs),
    OutsideBookingWindow(Secs),
    OutsideAvailability {
        bucket: BucketKey,
        range: SlotRange,
    },
    InvalidArgument(&'static str),
    LimitExceeded(&'static str),
}

impl EngineError {
    /// Stable short code used on the wire.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::SlotConflict { .. } => "slot_conflict",
            EngineError::InvalidRange { .. } => "invalid_range",
            EngineError::Profile(e) => e.code(),
            EngineError::NotProfileOwner { .. } => "not_profile_owner",
            EngineError::Unauthorized(_) => "unauthorized",
            EngineError::AvailabilityNotFound(_) => "availability_not_found",
            EngineError::AvailabilityProfileMismatch { .. } => "availability_profile_mismatch",
            EngineError::SessionTypeNotFound(_) => "session_type_not_found",
            EngineError::SessionTypeLocked(_) => "session_type_locked",
            EngineError::CurrencyNotWhitelisted(_) => "currency_not_whitelisted",
            EngineError::InsufficientPayment { .. } => "insufficient_payment",
            EngineError::InvalidTimestamp(_) => "invalid_timestamp",
            EngineError::OutsideBookingWindow(_) => "outside_booking_window",
            EngineError::OutsideAvailability { .. } => "outside_availability",
            EngineError::InvalidArgument(_) => "invalid_argument",
            EngineError::LimitExceeded(_) => "limit_exceeded",
        }
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::SlotConflict { bucket, range } => {
                write!(f, "slots {range} on {bucket} are already taken")
            }
            EngineError::InvalidRange { start, count, width } => {
                write!(f, "invalid slot range start={start} count={count} for width {width}")
            }
            EngineError::Profile(e) => write!(f, "{e}"),
            EngineError::NotProfileOwner { profile_id, caller } => {
                write!(f, "{caller} does not own profile {profile_id}")
            }
            EngineError::Unauthorized(caller) => write!(f, "{caller} is not the admin"),
            EngineError::AvailabilityNotFound(id) => write!(f, "availability not found: {id}"),
            EngineError::AvailabilityProfileMismatch {
                availability_id,
                profile_id,
            } => write!(
                f,
                "availability {availability_id} does not belong to profile {profile_id}"
            ),
            EngineError::SessionTypeNotFound(id) => write!(f, "session type not found: {id}"),
            EngineError::SessionTypeLocked(id) => write!(f, "session type {id} is locked"),
            EngineError::CurrencyNotWhitelisted(token) => {
                write!(f, "currency not whitelisted: {token}")
            }
            EngineError::InsufficientPayment { required, paid } => {
                write!(f, "insufficient payment: required {required}, paid {paid}")
            }
            EngineError::InvalidTimestamp(t) => write!(f, "invalid timestamp: {t}"),
            EngineError::OutsideBookingWindow(t) => {
                write!(f, "start time {t} is outside the booking window")
            }
            EngineError::OutsideAvailability { bucket, range } => {
                write!(f, "slots {range} on {bucket} are outside the host's availability")
            }
            EngineError::InvalidArgument(msg) => write!(f, "invalid argument: {msg}"),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<ProfileError> for EngineError {
    fn from(e: ProfileError) -> Self {
        EngineError::Profile(e)
    }
}
