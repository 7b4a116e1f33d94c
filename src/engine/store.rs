use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::limits::MAX_BUCKETS_PER_STORE;
use crate::model::*;

use super::availability::is_slots_available;
use super::conflict::{check_no_conflict, validate_bucket_key, validate_range};
use super::EngineError;

/// Booked-slot masks keyed by bucket.
///
/// A lock holds the bucket's dashmap entry for the whole check-and-set, so two
/// overlapping locks on one bucket serialize and at most one of them wins.
/// Locks on different buckets never touch each other's masks.
pub struct SlotStore {
    buckets: DashMap<BucketKey, SlotMask>,
    /// Buckets claimed so far; reserved inside the vacant entry so the limit is exact.
    claimed: AtomicUsize,
    width: u32,
}

impl Default for SlotStore {
    fn default() -> Self {
        Self::new(MASK_BITS)
    }
}

impl SlotStore {
    /// `width` is the number of usable slots per bucket, capped at `MASK_BITS`.
    pub fn new(width: u32) -> Self {
        Self {
            buckets: DashMap::new(),
            claimed: AtomicUsize::new(0),
            width: width.min(MASK_BITS),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    #[cfg(test)]
    pub(crate) fn contains_bucket(&self, bucket: &BucketKey) -> bool {
        self.buckets.contains_key(bucket)
    }

    /// Current mask of `bucket`; an unseen bucket reads as all-available and is not created.
    pub fn current_mask(&self, bucket: &BucketKey) -> SlotMask {
        self.buckets
            .get(bucket)
            .map(|e| *e.value())
            .unwrap_or(SlotMask::EMPTY)
    }

    pub fn is_available(&self, bucket: &BucketKey, start: u32, count: u32) -> Result<bool, EngineError> {
        validate_range(start, count, self.width)?;
        is_slots_available(&self.current_mask(bucket), start, count)
    }

    /// Mark `[start, start + count)` of `bucket` as booked, or fail with
    /// `SlotConflict` and leave the mask unchanged.
    pub fn lock_slots(&self, bucket: &BucketKey, start: u32, count: u32) -> Result<(), EngineError> {
        validate_bucket_key(bucket)?;
        let range = validate_range(start, count, self.width)?;

        let mut mask = match self.buckets.entry(bucket.clone()) {
            Entry::Occupied(entry) => entry.into_ref(),
            Entry::Vacant(entry) => {
                self.claimed
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                        (n < MAX_BUCKETS_PER_STORE).then_some(n + 1)
                    })
                    .map_err(|_| EngineError::LimitExceeded("too many buckets"))?;
                entry.insert(SlotMask::EMPTY)
            }
        };
        check_no_conflict(&mask, bucket, range)?;
        mask.insert(&SlotMask::of_range(range));
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn buckets(&self) -> Vec<(BucketKey, SlotMask)> {
        let mut out: Vec<_> = self
            .buckets
            .iter()
            .map(|e| (e.key().clone(), *e.value()))
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }
}
