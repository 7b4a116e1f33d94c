use chrono::{Datelike, NaiveDate};
use ulid::Ulid;

use crate::model::*;

use super::availability::{free_runs, open_slots};
use super::{Engine, EngineError};

impl Engine {
    pub fn get_availability(&self, id: u64) -> Result<Availability, EngineError> {
        self.availabilities
            .get(&id)
            .map(|e| e.value().clone())
            .ok_or(EngineError::AvailabilityNotFound(id))
    }

    pub fn get_session_type(&self, id: u64) -> Result<SessionType, EngineError> {
        self.session_types
            .get(&id)
            .map(|e| e.value().clone())
            .ok_or(EngineError::SessionTypeNotFound(id))
    }

    pub fn get_booking(&self, id: &Ulid) -> Option<Booking> {
        self.bookings.get(id).map(|e| e.value().clone())
    }

    /// Bookings hosted by a profile, earliest first.
    pub fn bookings_for_profile(&self, profile_id: ProfileId) -> Vec<Booking> {
        let mut out: Vec<Booking> = self
            .bookings
            .iter()
            .filter(|e| e.value().profile_id == profile_id)
            .map(|e| e.value().clone())
            .collect();
        out.sort_by_key(|b| (b.start_time, b.id));
        out
    }

    pub fn is_whitelisted(&self, token: &Owner) -> bool {
        token.is_native() || self.whitelisted.contains(token)
    }

    /// Booked slots of one bucket on a profile's calendar.
    pub fn calendar_mask(&self, profile_id: ProfileId, bucket: &BucketKey) -> Result<SlotMask, EngineError> {
        self.profiles.get_profile_by_id(profile_id)?;
        Ok(self
            .calendar(profile_id)
            .map(|cal| cal.current_mask(bucket))
            .unwrap_or(SlotMask::EMPTY))
    }

    /// Free runs on `date` long enough to hold one session of this type.
    pub fn free_slots(&self, session_type_id: u64, date: NaiveDate) -> Result<Vec<SlotRange>, EngineError> {
        let session_type = self.get_session_type(session_type_id)?;
        let availability = self.get_availability(session_type.availability_id)?;
        let template = availability.days[date.weekday().num_days_from_sunday() as usize];
        let booked = self.calendar_mask(session_type.profile_id, &BucketKey::for_date(date))?;
        Ok(free_runs(
            &open_slots(&template, &booked),
            SLOTS_PER_DAY,
            session_type.duration_in_slot,
        ))
    }
}
