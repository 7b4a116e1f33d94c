use crate::model::*;

use super::EngineError;

pub(crate) fn now_secs() -> Secs {
    chrono::Utc::now().timestamp()
}

/// `count` must be positive and the range must end at or before `width`.
pub(crate) fn validate_range(start: u32, count: u32, width: u32) -> Result<SlotRange, EngineError> {
    let fits = start
        .checked_add(count)
        .is_some_and(|end| end <= width);
    if count == 0 || !fits {
        return Err(EngineError::InvalidRange { start, count, width });
    }
    Ok(SlotRange::new(start, count))
}

pub(crate) fn validate_bucket_key(bucket: &BucketKey) -> Result<(), EngineError> {
    use crate::limits::MAX_BUCKET_KEY_LEN;
    if bucket.as_str().is_empty() {
        return Err(EngineError::InvalidArgument("empty bucket key"));
    }
    if bucket.as_str().len() > MAX_BUCKET_KEY_LEN {
        return Err(EngineError::LimitExceeded("bucket key too long"));
    }
    Ok(())
}

pub(crate) fn check_no_conflict(
    booked: &SlotMask,
    bucket: &BucketKey,
    range: SlotRange,
) -> Result<(), EngineError> {
    if booked.intersects(&SlotMask::of_range(range)) {
        return Err(EngineError::SlotConflict {
            bucket: bucket.clone(),
            range,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_count_is_invalid() {
        let err = validate_range(3, 0, MASK_BITS).unwrap_err();
        assert_eq!(err, EngineError::InvalidRange { start: 3, count: 0, width: MASK_BITS });
    }

    #[test]
    fn range_past_width_is_invalid() {
        assert!(validate_range(238, 2, 240).is_ok());
        assert!(validate_range(239, 2, 240).is_err());
        assert!(validate_range(240, 1, 240).is_err());
    }

    #[test]
    fn overflowing_range_is_invalid_not_wrapped() {
        assert!(matches!(
            validate_range(u32::MAX, 2, MASK_BITS),
            Err(EngineError::InvalidRange { .. })
        ));
    }

    #[test]
    fn conflict_reports_bucket_and_range() {
        let bucket = BucketKey::from("2022-01-01");
        let booked = SlotMask::from(0b111);
        let err = check_no_conflict(&booked, &bucket, SlotRange::new(1, 2)).unwrap_err();
        assert_eq!(
            err,
            EngineError::SlotConflict { bucket: bucket.clone(), range: SlotRange::new(1, 2) }
        );
        assert!(check_no_conflict(&booked, &bucket, SlotRange::new(3, 5)).is_ok());
    }

    #[test]
    fn bucket_key_limits() {
        assert!(validate_bucket_key(&BucketKey::from("")).is_err());
        let long = BucketKey::new("x".repeat(crate::limits::MAX_BUCKET_KEY_LEN + 1));
        assert!(matches!(validate_bucket_key(&long), Err(EngineError::LimitExceeded(_))));
        assert!(validate_bucket_key(&BucketKey::from("2022-01-01")).is_ok());
    }
}
