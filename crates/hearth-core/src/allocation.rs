//! # Allocation Rules
//!
//! Pure half of the Reservation Allocator: request validation and overlap
//! detection. hearth-db wraps these in per-room locks and a transaction.
//!
//! ## Half-Open Intervals
//! ```text
//!   existing   [10 Jan ─────────── 12 Jan)
//!   request                        [12 Jan ───── 14 Jan)   ✅ back-to-back
//!   request              [11 Jan ───────── 13 Jan)         ❌ overlap
//!
//!   overlap ⇔ existing.start < requested.end AND existing.end > requested.start
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use ts_rs::TS;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::types::RoomBooking;
use crate::MAX_ROOMS_PER_BOOKING;

/// One `(room, [start, end))` line of an allocation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct RoomInterval {
    pub room_id: String,
    #[ts(as = "String")]
    pub start: DateTime<Utc>,
    #[ts(as = "String")]
    pub end: DateTime<Utc>,
}

impl RoomInterval {
    pub fn new(room_id: impl Into<String>, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        RoomInterval {
            room_id: room_id.into(),
            start,
            end,
        }
    }

    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        overlaps(start, end, self.start, self.end)
    }

    /// The error reported when this line cannot be allocated.
    pub fn conflict(&self) -> CoreError {
        CoreError::Conflict {
            room_id: self.room_id.clone(),
            start: self.start,
            end: self.end,
        }
    }
}

/// Half-open overlap test.
#[inline]
pub fn overlaps(
    existing_start: DateTime<Utc>,
    existing_end: DateTime<Utc>,
    requested_start: DateTime<Utc>,
    requested_end: DateTime<Utc>,
) -> bool {
    existing_start < requested_end && existing_end > requested_start
}

/// Validates an allocation request before anything is read or written.
///
/// ## Rules
/// - At least one line, at most [`MAX_ROOMS_PER_BOOKING`]
/// - Every line has `start < end`
/// - The same room may not appear twice with overlapping intervals
pub fn validate_request(intervals: &[RoomInterval]) -> CoreResult<()> {
    if intervals.is_empty() {
        return Err(ValidationError::Required {
            field: "rooms".to_string(),
        }
        .into());
    }
    if intervals.len() > MAX_ROOMS_PER_BOOKING {
        return Err(ValidationError::OutOfRange {
            field: "rooms".to_string(),
            min: 1,
            max: MAX_ROOMS_PER_BOOKING as i64,
        }
        .into());
    }

    for interval in intervals {
        if interval.room_id.trim().is_empty() {
            return Err(ValidationError::Required {
                field: "room_id".to_string(),
            }
            .into());
        }
        if interval.start >= interval.end {
            return Err(ValidationError::InvalidInterval {
                field: format!("room {}", interval.room_id),
                start: interval.start,
                end: interval.end,
            }
            .into());
        }
    }

    for (i, a) in intervals.iter().enumerate() {
        for b in &intervals[i + 1..] {
            if a.room_id == b.room_id && a.overlaps(b.start, b.end) {
                return Err(ValidationError::Duplicate {
                    field: "room_id".to_string(),
                    value: a.room_id.clone(),
                }
                .into());
            }
        }
    }

    Ok(())
}

/// Finds the first existing allocation that blocks `requested`.
///
/// Only active allocations in a live status count. Rows belonging to
/// `exclude_booking` are ignored (used when re-activating a booking).
pub fn find_conflict<'a>(
    requested: &RoomInterval,
    existing: &'a [RoomBooking],
    exclude_booking: Option<&str>,
) -> Option<&'a RoomBooking> {
    existing.iter().find(|rb| {
        rb.room_id == requested.room_id
            && rb.blocks_room()
            && exclude_booking != Some(rb.booking_id.as_str())
            && requested.overlaps(rb.start_at, rb.end_at)
    })
}

/// Checks every requested line against `existing`; the first conflict wins.
///
/// All lines are checked before the caller writes anything, so a conflict on
/// any room rejects the whole request.
pub fn check_all(
    requested: &[RoomInterval],
    existing: &[RoomBooking],
    exclude_booking: Option<&str>,
) -> CoreResult<()> {
    for interval in requested {
        if find_conflict(interval, existing, exclude_booking).is_some() {
            return Err(interval.conflict());
        }
    }
    Ok(())
}

/// Room ids of a request, sorted and deduplicated (lock acquisition order).
pub fn lock_order(intervals: &[RoomInterval]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut rooms: Vec<String> = intervals
        .iter()
        .filter(|i| seen.insert(i.room_id.as_str()))
        .map(|i| i.room_id.clone())
        .collect();
    rooms.sort();
    rooms
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RoomBookingStatus;
    use chrono::TimeZone;

    fn day(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, d, 0, 0, 0).unwrap()
    }

    fn existing(room: &str, booking: &str, start: u32, end: u32) -> RoomBooking {
        RoomBooking {
            id: format!("rb-{room}-{start}"),
            booking_id: booking.to_string(),
            room_id: room.to_string(),
            start_at: day(start),
            end_at: day(end),
            is_active: true,
            status: RoomBookingStatus::Pending,
            created_at: day(1),
        }
    }

    #[test]
    fn test_overlapping_request_conflicts() {
        let held = vec![existing("101", "b1", 10, 12)];
        let request = RoomInterval::new("101", day(11), day(13));
        let err = check_all(&[request], &held, None).unwrap_err();
        match err {
            CoreError::Conflict { room_id, start, end } => {
                assert_eq!(room_id, "101");
                assert_eq!(start, day(11));
                assert_eq!(end, day(13));
            }
            other => panic!("expected conflict, got {other:?}"),
        }
    }

    #[test]
    fn test_back_to_back_is_allowed() {
        let held = vec![existing("101", "b1", 10, 12)];
        assert!(check_all(&[RoomInterval::new("101", day(12), day(14))], &held, None).is_ok());
        assert!(check_all(&[RoomInterval::new("101", day(8), day(10))], &held, None).is_ok());
    }

    #[test]
    fn test_inactive_and_finished_rows_do_not_block() {
        let mut cancelled = existing("101", "b1", 10, 12);
        cancelled.is_active = false;
        cancelled.status = RoomBookingStatus::Cancelled;
        let mut checked_out = existing("101", "b2", 10, 12);
        checked_out.status = RoomBookingStatus::CheckedOut;

        let request = RoomInterval::new("101", day(10), day(12));
        assert!(check_all(&[request], &[cancelled, checked_out], None).is_ok());
    }

    #[test]
    fn test_own_rows_excluded_on_reactivation() {
        let held = vec![existing("101", "b1", 10, 12)];
        let request = RoomInterval::new("101", day(10), day(12));
        assert!(check_all(&[request.clone()], &held, Some("b1")).is_ok());
        assert!(check_all(&[request], &held, Some("b2")).is_err());
    }

    #[test]
    fn test_any_conflicting_room_rejects_request() {
        let held = vec![existing("102", "b1", 10, 12)];
        let request = vec![
            RoomInterval::new("101", day(10), day(12)),
            RoomInterval::new("102", day(11), day(12)),
        ];
        let err = check_all(&request, &held, None).unwrap_err();
        assert!(matches!(err, CoreError::Conflict { ref room_id, .. } if room_id == "102"));
    }

    #[test]
    fn test_validate_request() {
        assert!(validate_request(&[]).is_err());
        assert!(validate_request(&[RoomInterval::new("101", day(12), day(12))]).is_err());
        assert!(validate_request(&[RoomInterval::new("101", day(13), day(12))]).is_err());
        assert!(validate_request(&[
            RoomInterval::new("101", day(10), day(12)),
            RoomInterval::new("101", day(11), day(14)),
        ])
        .is_err());
        assert!(validate_request(&[
            RoomInterval::new("101", day(10), day(12)),
            RoomInterval::new("101", day(12), day(14)),
            RoomInterval::new("102", day(10), day(12)),
        ])
        .is_ok());
    }

    #[test]
    fn test_lock_order_sorted_and_unique() {
        let request = vec![
            RoomInterval::new("b", day(10), day(12)),
            RoomInterval::new("a", day(10), day(12)),
            RoomInterval::new("b", day(14), day(15)),
        ];
        assert_eq!(lock_order(&request), vec!["a".to_string(), "b".to_string()]);
    }
}
