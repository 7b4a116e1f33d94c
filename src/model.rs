use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use num_bigint::BigUint;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use ulid::Ulid;

/// Width of every slot mask, in bits.
pub const MASK_BITS: u32 = 256;

/// Length of one bookable slot on a day calendar.
pub const SLOT_SECONDS: u32 = 360;

/// Slots in one UTC day (6-minute slots).
pub const SLOTS_PER_DAY: u32 = 86_400 / SLOT_SECONDS;

/// Token address meaning "pay in the native currency".
pub const NATIVE_TOKEN: &str = "0x0000000000000000000000000000000000000000";

/// Unix seconds, UTC.
pub type Secs = i64;

pub type ProfileId = u64;

/// Fixed 256-bit slot set. Bit `i` lives in word `i / 64`, little-endian.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct SlotMask([u64; 4]);

impl SlotMask {
    pub const EMPTY: SlotMask = SlotMask([0; 4]);

    #[cfg(test)]
    pub(crate) const fn from_words(words: [u64; 4]) -> Self {
        Self(words)
    }

    #[cfg(test)]
    pub(crate) fn words(&self) -> [u64; 4] {
        self.0
    }

    /// Mask with exactly the bits of `range` set. Bits past `MASK_BITS` are dropped,
    /// so validate the range first.
    pub fn of_range(range: SlotRange) -> Self {
        let mut words = [0u64; 4];
        let (start, end) = (range.start, range.end().min(MASK_BITS));
        for (w, word) in words.iter_mut().enumerate() {
            let lo = w as u32 * 64;
            let s = start.max(lo);
            let e = end.min(lo + 64);
            if s >= e {
                continue;
            }
            let bits = e - s;
            let run = if bits == 64 { u64::MAX } else { (1u64 << bits) - 1 };
            *word |= run << (s - lo);
        }
        Self(words)
    }

    pub fn is_set(&self, slot: u32) -> bool {
        slot < MASK_BITS && (self.0[(slot / 64) as usize] >> (slot % 64)) & 1 == 1
    }

    pub fn is_empty(&self) -> bool {
        self.0.iter().all(|w| *w == 0)
    }

    pub fn count_ones(&self) -> u32 {
        self.0.iter().map(|w| w.count_ones()).sum()
    }

    pub fn intersects(&self, other: &SlotMask) -> bool {
        self.0.iter().zip(other.0.iter()).any(|(a, b)| a & b != 0)
    }

    /// True if every bit of `other` is also set in `self`.
    pub fn contains(&self, other: &SlotMask) -> bool {
        self.0.iter().zip(other.0.iter()).all(|(a, b)| b & !a == 0)
    }

    pub fn insert(&mut self, other: &SlotMask) {
        for (a, b) in self.0.iter_mut().zip(other.0.iter()) {
            *a |= b;
        }
    }

    /// Bits set in `self` but not in `other`.
    pub fn difference(&self, other: &SlotMask) -> SlotMask {
        let mut out = *self;
        for (a, b) in out.0.iter_mut().zip(other.0.iter()) {
            *a &= !b;
        }
        out
    }

    /// Index of the highest set bit.
    pub fn highest_slot(&self) -> Option<u32> {
        self.0
            .iter()
            .enumerate()
            .rev()
            .find(|(_, w)| **w != 0)
            .map(|(i, w)| i as u32 * 64 + 63 - w.leading_zeros())
    }

    fn to_biguint(self) -> BigUint {
        let digits: Vec<u32> = self
            .0
            .iter()
            .flat_map(|w| [*w as u32, (*w >> 32) as u32])
            .collect();
        BigUint::from_slice(&digits)
    }
}

impl From<u64> for SlotMask {
    fn from(v: u64) -> Self {
        Self([v, 0, 0, 0])
    }
}

/// Decimal, matching how 256-bit masks are written in calldata.
impl fmt::Display for SlotMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_biguint())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseMaskError {
    Invalid(String),
    TooWide,
}

impl fmt::Display for ParseMaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseMaskError::Invalid(s) => write!(f, "invalid slot mask: {s:?}"),
            ParseMaskError::TooWide => write!(f, "slot mask wider than {MASK_BITS} bits"),
        }
    }
}

impl std::error::Error for ParseMaskError {}

/// Accepts decimal or `0x`-prefixed hex.
impl FromStr for SlotMask {
    type Err = ParseMaskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (digits, radix) = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            Some(hex) => (hex, 16),
            None => (s, 10),
        };
        if digits.is_empty() || !digits.chars().all(|c| c.is_digit(radix)) {
            return Err(ParseMaskError::Invalid(s.to_string()));
        }
        let n = BigUint::parse_bytes(digits.as_bytes(), radix)
            .ok_or_else(|| ParseMaskError::Invalid(s.to_string()))?;
        if n.bits() > MASK_BITS as u64 {
            return Err(ParseMaskError::TooWide);
        }
        let mut words = [0u64; 4];
        for (i, d) in n.to_u64_digits().into_iter().enumerate() {
            words[i] = d;
        }
        Ok(Self(words))
    }
}

impl Serialize for SlotMask {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for SlotMask {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Number(u64),
            Text(String),
        }
        match Repr::deserialize(deserializer)? {
            Repr::Number(n) => Ok(SlotMask::from(n)),
            Repr::Text(s) => s.parse().map_err(serde::de::Error::custom),
        }
    }
}

/// Half-open slot range `[start, start + count)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotRange {
    pub start: u32,
    pub count: u32,
}

impl SlotRange {
    pub fn new(start: u32, count: u32) -> Self {
        Self { start, count }
    }

    pub fn end(&self) -> u32 {
        self.start.saturating_add(self.count)
    }
}

impl fmt::Display for SlotRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end())
    }
}

/// Names one bucket of slots, usually a UTC day as `YYYY-MM-DD`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BucketKey(String);

impl BucketKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn for_date(date: NaiveDate) -> Self {
        Self(date.format("%Y-%m-%d").to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The calendar day this key names, if it is a date key.
    pub fn date(&self) -> Option<NaiveDate> {
        NaiveDate::parse_from_str(&self.0, "%Y-%m-%d").ok()
    }
}

impl From<&str> for BucketKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for BucketKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An account address. Compared case-insensitively, stored lowercase.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Owner(String);

impl Owner {
    pub fn new(addr: impl AsRef<str>) -> Self {
        Self(addr.as_ref().to_ascii_lowercase())
    }

    pub fn native() -> Self {
        Self(NATIVE_TOKEN.to_string())
    }

    pub fn is_native(&self) -> bool {
        self.0 == NATIVE_TOKEN
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl<'de> Deserialize<'de> for Owner {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(Owner::new(String::deserialize(deserializer)?))
    }
}

impl fmt::Display for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ── Booking records ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: ProfileId,
    pub owner: Owner,
    pub handle: String,
    pub image_uri: String,
}

/// Weekly opening hours. `days[0]` is Sunday; a set bit opens that slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Availability {
    pub id: u64,
    pub profile_id: ProfileId,
    pub name: String,
    pub days: [SlotMask; 7],
}

/// Client-supplied fields of a new session type.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SessionTypeSpec {
    pub recipient: Owner,
    pub duration_in_slot: u32,
    pub availability_id: u64,
    pub open_booking_delta_days: u32,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "Owner::native")]
    pub token: Owner,
    #[serde(default)]
    pub amount: u128,
    #[serde(default)]
    pub locked: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionType {
    pub id: u64,
    pub profile_id: ProfileId,
    pub recipient: Owner,
    pub duration_in_slot: u32,
    pub availability_id: u64,
    pub open_booking_delta_days: u32,
    pub title: String,
    pub description: String,
    pub token: Owner,
    pub amount: u128,
    pub locked: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: Ulid,
    pub session_type_id: u64,
    pub profile_id: ProfileId,
    pub booker: Owner,
    pub bucket: BucketKey,
    pub range: SlotRange,
    pub start_time: Secs,
    /// What the booker paid, which may exceed the session price.
    pub paid: u128,
}

/// Change notifications, published per host profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    SlotsLocked {
        profile_id: ProfileId,
        bucket: BucketKey,
        range: SlotRange,
    },
    SessionBooked {
        booking: Booking,
    },
}

impl Event {
    pub fn profile_id(&self) -> ProfileId {
        match self {
            Event::SlotsLocked { profile_id, .. } => *profile_id,
            Event::SessionBooked { booking } => booking.profile_id,
        }
    }
}
