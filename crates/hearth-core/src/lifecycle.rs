//! # Stay Lifecycle
//!
//! Check-in / check-out preconditions and the booking status reduction.
//!
//! ## Booking Status Derivation
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Over the booking's RoomBookings R:                                     │
//! │                                                                         │
//! │  allOut                              ──► checked_out                    │
//! │  allIn  ∧ ¬anyOut                    ──► checked_in                     │
//! │  anyIn  ∧ ¬allIn ∧ ¬anyOut           ──► partial_checked_in             │
//! │  allIn  ∧ anyOut ∧ ¬allOut           ──► partial_checked_out            │
//! │  anyIn  ∧ anyOut                     ──► partial_checked_in_out         │
//! │  otherwise                           ──► unchanged                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The preconditions guarantee every reachable event sequence lands in one
//! of the buckets above (a room cannot check out before it checks in).

use chrono::{DateTime, Utc};

use crate::error::{CoreError, CoreResult};
use crate::types::{BookingStatus, RoomBooking};

/// Check-in/out marks of one RoomBooking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StayMarks {
    pub checked_in: bool,
    pub checked_out: bool,
}

/// Recomputes a booking's status from its rooms' check-in/out marks.
///
/// Deterministic and idempotent. `checked_out` never regresses and
/// cancelled / no-show bookings are left alone.
pub fn derive_booking_status(current: BookingStatus, stays: &[StayMarks]) -> BookingStatus {
    if stays.is_empty()
        || matches!(
            current,
            BookingStatus::CheckedOut | BookingStatus::Cancelled | BookingStatus::NoShow
        )
    {
        return current;
    }

    let all_in = stays.iter().all(|s| s.checked_in);
    let any_in = stays.iter().any(|s| s.checked_in);
    let all_out = stays.iter().all(|s| s.checked_out);
    let any_out = stays.iter().any(|s| s.checked_out);

    if all_out {
        BookingStatus::CheckedOut
    } else if all_in && !any_out {
        BookingStatus::CheckedIn
    } else if any_in && !all_in && !any_out {
        BookingStatus::PartialCheckedIn
    } else if all_in && any_out {
        BookingStatus::PartialCheckedOut
    } else if any_in && any_out {
        BookingStatus::PartialCheckedInOut
    } else {
        current
    }
}

/// Preconditions for checking a room in at `at`.
pub fn ensure_can_check_in(
    booking_status: BookingStatus,
    room_booking: &RoomBooking,
    already_checked_in: bool,
    at: DateTime<Utc>,
) -> CoreResult<()> {
    let id = room_booking.id.as_str();
    if already_checked_in {
        return Err(CoreError::precondition("RoomBooking", id, "already checked in"));
    }
    if !room_booking.is_active {
        return Err(CoreError::precondition("RoomBooking", id, "allocation is not active"));
    }
    if !booking_status.accepts_check_in() {
        return Err(CoreError::precondition(
            "RoomBooking",
            id,
            format!("booking is {booking_status}"),
        ));
    }
    if !room_booking.contains(at) {
        return Err(CoreError::precondition(
            "RoomBooking",
            id,
            format!(
                "check-in time {at} is outside [{}, {})",
                room_booking.start_at, room_booking.end_at
            ),
        ));
    }
    Ok(())
}

/// Preconditions for checking a room out at `at`.
///
/// `checked_in_at` is the time of the room's CheckIn, if any.
pub fn ensure_can_check_out(
    room_booking: &RoomBooking,
    checked_in_at: Option<DateTime<Utc>>,
    already_checked_out: bool,
    at: DateTime<Utc>,
) -> CoreResult<()> {
    let id = room_booking.id.as_str();
    let Some(checked_in_at) = checked_in_at else {
        return Err(CoreError::precondition("RoomBooking", id, "not checked in"));
    };
    if already_checked_out {
        return Err(CoreError::precondition("RoomBooking", id, "already checked out"));
    }
    if !room_booking.contains(at) {
        return Err(CoreError::precondition(
            "RoomBooking",
            id,
            format!(
                "check-out time {at} is outside [{}, {})",
                room_booking.start_at, room_booking.end_at
            ),
        ));
    }
    if at < checked_in_at {
        return Err(CoreError::precondition(
            "RoomBooking",
            id,
            "check-out precedes check-in",
        ));
    }
    Ok(())
}

/// A stay in progress: checked in, not yet out. Services and room-service
/// orders may only be charged to such a room.
pub fn ensure_in_house(room_booking_id: &str, marks: StayMarks) -> CoreResult<()> {
    if marks.checked_in && !marks.checked_out {
        Ok(())
    } else {
        Err(CoreError::NotCheckedIn {
            room_booking_id: room_booking_id.to_string(),
        })
    }
}

/// Bookings can only be cancelled or marked no-show before anyone arrives.
pub fn ensure_not_started(booking_id: &str, status: BookingStatus) -> CoreResult<()> {
    match status {
        BookingStatus::Pending | BookingStatus::Confirmed => Ok(()),
        other => Err(CoreError::precondition(
            "Booking",
            booking_id,
            format!("booking is {other}"),
        )),
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
