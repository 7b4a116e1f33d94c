mod availability;
mod conflict;
mod error;
mod mutations;
mod queries;
mod store;

pub use availability::{free_runs, is_slots_available, open_slots};
pub use error::EngineError;
pub use store::SlotStore;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize};

use dashmap::{DashMap, DashSet};
use ulid::Ulid;

use crate::model::*;
use crate::notify::NotifyHub;
use crate::profile::ProfileRegistry;

/// The booking service: availability templates, session types, one slot
/// calendar per host profile, and the bookings made against them.
pub struct Engine {
    pub profiles: Arc<ProfileRegistry>,
    pub notify: Arc<NotifyHub>,
    admin: Owner,
    pub(super) availabilities: DashMap<u64, Availability>,
    pub(super) session_types: DashMap<u64, SessionType>,
    /// Host profile → day calendar of booked slots.
    pub(super) calendars: DashMap<ProfileId, Arc<SlotStore>>,
    pub(super) bookings: DashMap<Ulid, Booking>,
    /// Bookings made or in flight; reserved before the calendar lock.
    pub(super) booking_count: AtomicUsize,
    pub(super) whitelisted: DashSet<Owner>,
    pub(super) next_availability_id: AtomicU64,
    pub(super) next_session_type_id: AtomicU64,
}

impl Engine {
    pub fn new(admin: Owner, profiles: Arc<ProfileRegistry>, notify: Arc<NotifyHub>) -> Self {
        Self {
            profiles,
            notify,
            admin,
            availabilities: DashMap::new(),
            session_types: DashMap::new(),
            calendars: DashMap::new(),
            bookings: DashMap::new(),
            booking_count: AtomicUsize::new(0),
            whitelisted: DashSet::new(),
            next_availability_id: AtomicU64::new(1),
            next_session_type_id: AtomicU64::new(1),
        }
    }

    pub fn booking_count(&self) -> usize {
        self.booking_count.load(std::sync::atomic::Ordering::SeqCst)
    }

    pub fn admin(&self) -> &Owner {
        &self.admin
    }

    /// The calendar of a host profile, if anything was ever locked on it.
    pub fn calendar(&self, profile_id: ProfileId) -> Option<Arc<SlotStore>> {
        self.calendars.get(&profile_id).map(|e| e.value().clone())
    }

    /// Get or lazily create a profile's calendar.
    pub(super) fn calendar_or_create(&self, profile_id: ProfileId) -> Arc<SlotStore> {
        if let Some(cal) = self.calendars.get(&profile_id) {
            return cal.value().clone();
        }
        self.calendars
            .entry(profile_id)
            .or_insert_with(|| Arc::new(SlotStore::new(SLOTS_PER_DAY)))
            .value()
            .clone()
    }

    /// Fails unless `caller` owns `profile_id`.
    pub(super) fn require_owner(&self, caller: &Owner, profile_id: ProfileId) -> Result<(), EngineError> {
        let owner = self.profiles.owner_of(profile_id)?;
        if &owner != caller {
            return Err(EngineError::NotProfileOwner {
                profile_id,
                caller: caller.clone(),
            });
        }
        Ok(())
    }
}

/// Count a lock attempt by outcome.
pub(super) fn record_lock(result: &Result<(), EngineError>) {
    let outcome = match result {
        Ok(()) => "locked",
        Err(EngineError::SlotConflict { .. }) => "conflict",
        Err(_) => "rejected",
    };
    metrics::counter!(crate::observability::SLOT_LOCKS_TOTAL, "outcome" => outcome).increment(1);
}
