use crate::model::*;

use super::conflict::validate_range;
use super::EngineError;

/// True iff no bit of `[start, start + count)` is set in `mask`.
///
/// Pure: the answer depends only on the arguments. A zero `count` or a range
/// reaching past `MASK_BITS` is rejected rather than truncated.
pub fn is_slots_available(mask: &SlotMask, start: u32, count: u32) -> Result<bool, EngineError> {
    let range = validate_range(start, count, MASK_BITS)?;
    Ok(!mask.intersects(&SlotMask::of_range(range)))
}

/// Slots that are open in `template` and not yet booked.
pub fn open_slots(template: &SlotMask, booked: &SlotMask) -> SlotMask {
    template.difference(booked)
}

/// Maximal runs of set bits below `width`, keeping only runs of at least `min_len`.
pub fn free_runs(open: &SlotMask, width: u32, min_len: u32) -> Vec<SlotRange> {
    let width = width.min(MASK_BITS);
    let mut runs = Vec::new();
    let mut run_start: Option<u32> = None;

    for slot in 0..width {
        match (open.is_set(slot), run_start) {
            (true, None) => run_start = Some(slot),
            (false, Some(s)) => {
                push_run(&mut runs, s, slot, min_len);
                run_start = None;
            }
            _ => {}
        }
    }
    if let Some(s) = run_start {
        push_run(&mut runs, s, width, min_len);
    }
    runs
}

fn push_run(runs: &mut Vec<SlotRange>, start: u32, end: u32, min_len: u32) {
    let len = end - start;
    if len >= min_len.max(1) {
        runs.push(SlotRange::new(start, len));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_slot_checks() {
        let mask = SlotMask::from(0b101);
        assert!(!is_slots_available(&mask, 0, 1).unwrap());
        assert!(is_slots_available(&mask, 1, 1).unwrap());
    }

    #[test]
    fn range_check_hits_any_set_bit() {
        let mask = SlotMask::from(0b101);
        assert!(!is_slots_available(&mask, 2, 2).unwrap());
        assert!(is_slots_available(&mask, 3, 10).unwrap());
    }

    #[test]
    fn query_matches_bitwise_definition() {
        let masks = [
            SlotMask::EMPTY,
            SlotMask::from(0b101),
            SlotMask::from(u64::MAX),
            SlotMask::from_words([0, 1, 0, 1 << 63]),
        ];
        for mask in &masks {
            for start in [0u32, 1, 2, 63, 64, 65, 127, 200, 255] {
                for count in [1u32, 2, 3, 64, 65] {
                    let Ok(range) = validate_range(start, count, MASK_BITS) else {
                        assert!(is_slots_available(mask, start, count).is_err());
                        continue;
                    };
                    let expected = !mask.intersects(&SlotMask::of_range(range));
                    assert_eq!(is_slots_available(mask, start, count).unwrap(), expected);
                    // repeat queries give the same answer
                    assert_eq!(is_slots_available(mask, start, count).unwrap(), expected);
                }
            }
        }
    }

    #[test]
    fn query_rejects_invalid_ranges() {
        let mask = SlotMask::EMPTY;
        assert!(matches!(
            is_slots_available(&mask, 0, 0),
            Err(EngineError::InvalidRange { .. })
        ));
        assert!(matches!(
            is_slots_available(&mask, 255, 2),
            Err(EngineError::InvalidRange { .. })
        ));
        assert!(is_slots_available(&mask, 255, 1).unwrap());
    }

    #[test]
    fn open_slots_removes_booked() {
        let template = SlotMask::of_range(SlotRange::new(70, 126));
        let booked = SlotMask::of_range(SlotRange::new(100, 10));
        let open = open_slots(&template, &booked);
        assert_eq!(open.count_ones(), 116);
        assert!(!open.is_set(105));
        assert!(open.is_set(99));
    }

    #[test]
    fn free_runs_splits_around_bookings() {
        let template = SlotMask::of_range(SlotRange::new(70, 126));
        let booked = SlotMask::of_range(SlotRange::new(100, 10));
        let runs = free_runs(&open_slots(&template, &booked), SLOTS_PER_DAY, 1);
        assert_eq!(runs, vec![SlotRange::new(70, 30), SlotRange::new(110, 86)]);
    }

    #[test]
    fn free_runs_filters_short_gaps() {
        let open = SlotMask::from(0b1110_0110_1111);
        assert_eq!(
            free_runs(&open, 64, 3),
            vec![SlotRange::new(0, 4), SlotRange::new(9, 3)]
        );
    }

    #[test]
    fn free_runs_clipped_to_width() {
        let open = SlotMask::of_range(SlotRange::new(230, 26));
        assert_eq!(free_runs(&open, SLOTS_PER_DAY, 1), vec![SlotRange::new(230, 10)]);
        assert!(free_runs(&SlotMask::EMPTY, SLOTS_PER_DAY, 1).is_empty());
    }
}
