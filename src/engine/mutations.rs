use std::sync::atomic::Ordering;

use chrono::{DateTime, Datelike, Timelike, Utc};
use tracing::{debug, info};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::conflict::{now_secs, validate_range};
use super::{Engine, EngineError, record_lock};

const SECS_PER_DAY: Secs = 86_400;

impl Engine {
    pub fn create_profile(
        &self,
        caller: &Owner,
        handle: &str,
        image_uri: &str,
    ) -> Result<Profile, EngineError> {
        let profile = self.profiles.create_profile(caller.clone(), handle, image_uri)?;
        info!("profile {} created: {}", profile.id, profile.handle);
        Ok(profile)
    }

    pub fn create_availability(
        &self,
        caller: &Owner,
        profile_id: ProfileId,
        name: &str,
        days: [SlotMask; 7],
    ) -> Result<Availability, EngineError> {
        self.require_owner(caller, profile_id)?;
        if name.is_empty() {
            return Err(EngineError::InvalidArgument("empty availability name"));
        }
        if name.len() > MAX_AVAILABILITY_NAME_LEN {
            return Err(EngineError::LimitExceeded("availability name too long"));
        }
        for day in &days {
            if let Some(slot) = day.highest_slot()
                && slot >= SLOTS_PER_DAY
            {
                return Err(EngineError::InvalidRange {
                    start: slot,
                    count: 1,
                    width: SLOTS_PER_DAY,
                });
            }
        }
        if self.availabilities.len() >= MAX_AVAILABILITIES {
            return Err(EngineError::LimitExceeded("too many availabilities"));
        }

        let id = self.next_availability_id.fetch_add(1, Ordering::SeqCst);
        let availability = Availability {
            id,
            profile_id,
            name: name.to_string(),
            days,
        };
        self.availabilities.insert(id, availability.clone());
        info!("availability {id} ({name}) created for profile {profile_id}");
        Ok(availability)
    }

    pub fn create_session_type(
        &self,
        caller: &Owner,
        profile_id: ProfileId,
        spec: SessionTypeSpec,
    ) -> Result<SessionType, EngineError> {
        self.require_owner(caller, profile_id)?;

        let availability = self.get_availability(spec.availability_id)?;
        if availability.profile_id != profile_id {
            return Err(EngineError::AvailabilityProfileMismatch {
                availability_id: spec.availability_id,
                profile_id,
            });
        }
        if spec.duration_in_slot == 0 || spec.duration_in_slot > SLOTS_PER_DAY {
            return Err(EngineError::InvalidArgument("duration_in_slot out of range"));
        }
        if spec.open_booking_delta_days == 0 || spec.open_booking_delta_days > MAX_OPEN_BOOKING_DAYS {
            return Err(EngineError::InvalidArgument("open_booking_delta_days out of range"));
        }
        if spec.title.is_empty() {
            return Err(EngineError::InvalidArgument("empty title"));
        }
        if spec.title.len() > MAX_TITLE_LEN {
            return Err(EngineError::LimitExceeded("title too long"));
        }
        if spec.description.len() > MAX_DESCRIPTION_LEN {
            return Err(EngineError::LimitExceeded("description too long"));
        }
        if spec.recipient.as_str().is_empty() || spec.recipient.as_str().len() > MAX_OWNER_LEN {
            return Err(EngineError::InvalidArgument("bad recipient"));
        }
        if !self.is_whitelisted(&spec.token) {
            return Err(EngineError::CurrencyNotWhitelisted(spec.token));
        }
        if self.session_types.len() >= MAX_SESSION_TYPES {
            return Err(EngineError::LimitExceeded("too many session types"));
        }

        let id = self.next_session_type_id.fetch_add(1, Ordering::SeqCst);
        let session_type = SessionType {
            id,
            profile_id,
            recipient: spec.recipient,
            duration_in_slot: spec.duration_in_slot,
            availability_id: spec.availability_id,
            open_booking_delta_days: spec.open_booking_delta_days,
            title: spec.title,
            description: spec.description,
            token: spec.token,
            amount: spec.amount,
            locked: spec.locked,
        };
        self.session_types.insert(id, session_type.clone());
        info!("session type {id} created for profile {profile_id}");
        Ok(session_type)
    }

    /// Admin only. The native token is always accepted and cannot be toggled.
    pub fn whitelist_currency(&self, caller: &Owner, token: Owner, enabled: bool) -> Result<(), EngineError> {
        if caller != self.admin() {
            return Err(EngineError::Unauthorized(caller.clone()));
        }
        if token.is_native() {
            return Err(EngineError::InvalidArgument("native currency is always accepted"));
        }
        if enabled {
            if self.whitelisted.len() >= MAX_WHITELISTED_CURRENCIES {
                return Err(EngineError::LimitExceeded("too many currencies"));
            }
            self.whitelisted.insert(token.clone());
        } else {
            self.whitelisted.remove(&token);
        }
        info!("currency {token} whitelisted={enabled}");
        Ok(())
    }

    /// Owner-only raw lock on a profile's calendar.
    pub fn lock_calendar_slots(
        &self,
        caller: &Owner,
        profile_id: ProfileId,
        bucket: &BucketKey,
        start: u32,
        count: u32,
    ) -> Result<(), EngineError> {
        self.require_owner(caller, profile_id)?;
        let calendar = self.calendar_or_create(profile_id);
        let result = calendar.lock_slots(bucket, start, count);
        record_lock(&result);
        result?;

        debug!("profile {profile_id}: locked {} on {bucket}", SlotRange::new(start, count));
        self.notify.send(&Event::SlotsLocked {
            profile_id,
            bucket: bucket.clone(),
            range: SlotRange::new(start, count),
        });
        Ok(())
    }

    /// Book a session starting at `start_time` (unix seconds, UTC).
    pub fn book(
        &self,
        caller: &Owner,
        session_type_id: u64,
        start_time: Secs,
        paid: u128,
    ) -> Result<Booking, EngineError> {
        self.book_at(caller, session_type_id, start_time, paid, now_secs())
    }

    pub(crate) fn book_at(
        &self,
        caller: &Owner,
        session_type_id: u64,
        start_time: Secs,
        paid: u128,
        now: Secs,
    ) -> Result<Booking, EngineError> {
        let session_type = self.get_session_type(session_type_id)?;
        if session_type.locked {
            return Err(EngineError::SessionTypeLocked(session_type_id));
        }
        if paid < session_type.amount {
            return Err(EngineError::InsufficientPayment {
                required: session_type.amount,
                paid,
            });
        }

        let window_end = now.saturating_add(session_type.open_booking_delta_days as Secs * SECS_PER_DAY);
        if start_time < now || start_time >= window_end {
            return Err(EngineError::OutsideBookingWindow(start_time));
        }

        let at = DateTime::<Utc>::from_timestamp(start_time, 0)
            .ok_or(EngineError::InvalidTimestamp(start_time))?;
        let date = at.date_naive();
        let seconds_into_day = at.num_seconds_from_midnight();
        let range = validate_range(
            seconds_into_day / SLOT_SECONDS,
            session_type.duration_in_slot,
            SLOTS_PER_DAY,
        )?;
        let bucket = BucketKey::for_date(date);

        let availability = self.get_availability(session_type.availability_id)?;
        let template = availability.days[date.weekday().num_days_from_sunday() as usize];
        if !template.contains(&SlotMask::of_range(range)) {
            return Err(EngineError::OutsideAvailability { bucket, range });
        }
        self.booking_count
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                (n < MAX_BOOKINGS).then_some(n + 1)
            })
            .map_err(|_| EngineError::LimitExceeded("too many bookings"))?;

        let calendar = self.calendar_or_create(session_type.profile_id);
        let result = calendar.lock_slots(&bucket, range.start, range.count);
        record_lock(&result);
        if let Err(e) = result {
            self.booking_count.fetch_sub(1, Ordering::SeqCst);
            return Err(e);
        }

        let booking = Booking {
            id: Ulid::new(),
            session_type_id,
            profile_id: session_type.profile_id,
            booker: caller.clone(),
            bucket,
            range,
            start_time: start_time - (seconds_into_day % SLOT_SECONDS) as Secs,
            paid,
        };
        self.bookings.insert(booking.id, booking.clone());
        metrics::counter!(crate::observability::BOOKINGS_TOTAL).increment(1);
        info!(
            "booking {} on profile {}: {} {} ({} total)",
            booking.id,
            booking.profile_id,
            booking.bucket,
            booking.range,
            self.booking_count()
        );
        self.notify.send(&Event::SessionBooked {
            booking: booking.clone(),
        });
        Ok(booking)
    }
}
