//! # Stay Repository (Stay Lifecycle Tracker)
//!
//! Check-in, check-out and service usage per RoomBooking, with the parent
//! booking's status re-derived after every event.
//!
//! ## Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      RoomBooking Lifecycle                              │
//! │                                                                         │
//! │  pending/confirmed ──check_in──► checked_in ──check_out──► checked_out │
//! │                                      │                                  │
//! │                                      └── record_service_usage (n×)      │
//! │                                                                         │
//! │  After each event, inside the same transaction:                        │
//! │    marks = [(checked_in?, checked_out?) for every room of the booking] │
//! │    booking.status = derive_booking_status(booking.status, marks)       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Events for one booking are serialized on the booking lock; the
//! `UNIQUE(room_booking_id)` constraints on `check_ins` / `check_outs` back
//! the "at most one of each" rule.

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use crate::lock::{booking_key, LockRegistry};
use crate::repository::booking::{
    decode_guests, encode_guests, fetch_room_booking, require_booking, set_booking_status,
};
use hearth_core::lifecycle::{
    derive_booking_status, ensure_can_check_in, ensure_can_check_out, ensure_in_house, StayMarks,
};
use hearth_core::types::generate_id;
use hearth_core::validation::{validate_actor, validate_guests};
use hearth_core::{
    BookingStatus, CheckIn, CheckOut, CoreError, RoomBooking, RoomBookingStatus, Service,
    ServiceUsage,
};

// =============================================================================
// Row Mapping
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct CheckInRow {
    id: String,
    room_booking_id: String,
    guests: String,
    checked_in_by: String,
    checked_in_at: DateTime<Utc>,
}

impl CheckInRow {
    fn into_check_in(self) -> DbResult<CheckIn> {
        let guests = decode_guests("CheckIn", &self.id, &self.guests)?;
        Ok(CheckIn {
            id: self.id,
            room_booking_id: self.room_booking_id,
            guests,
            checked_in_by: self.checked_in_by,
            checked_in_at: self.checked_in_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct MarksRow {
    checked_in: bool,
    checked_out: bool,
}

impl From<MarksRow> for StayMarks {
    fn from(row: MarksRow) -> Self {
        StayMarks {
            checked_in: row.checked_in,
            checked_out: row.checked_out,
        }
    }
}

// =============================================================================
// Shared Queries
// =============================================================================

const MARKS_SELECT: &str = r#"
    SELECT
        EXISTS (SELECT 1 FROM check_ins ci WHERE ci.room_booking_id = rb.id) AS checked_in,
        EXISTS (SELECT 1 FROM check_outs co WHERE co.room_booking_id = rb.id) AS checked_out
    FROM room_bookings rb
"#;

pub(crate) async fn fetch_check_in(
    conn: &mut SqliteConnection,
    room_booking_id: &str,
) -> DbResult<Option<CheckIn>> {
    let row: Option<CheckInRow> = sqlx::query_as(
        r#"
        SELECT id, room_booking_id, guests, checked_in_by, checked_in_at
        FROM check_ins
        WHERE room_booking_id = ?1
        "#,
    )
    .bind(room_booking_id)
    .fetch_optional(&mut *conn)
    .await?;

    row.map(CheckInRow::into_check_in).transpose()
}

pub(crate) async fn fetch_check_out(
    conn: &mut SqliteConnection,
    room_booking_id: &str,
) -> DbResult<Option<CheckOut>> {
    let row: Option<CheckOut> = sqlx::query_as(
        r#"
        SELECT id, room_booking_id, checked_out_by, checked_out_at
        FROM check_outs
        WHERE room_booking_id = ?1
        "#,
    )
    .bind(room_booking_id)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(row)
}

/// Check-in/out marks of one RoomBooking.
pub(crate) async fn room_booking_marks(
    conn: &mut SqliteConnection,
    room_booking_id: &str,
) -> DbResult<StayMarks> {
    let sql = format!("{MARKS_SELECT} WHERE rb.id = ?1");
    let row: Option<MarksRow> = sqlx::query_as(&sql)
        .bind(room_booking_id)
        .fetch_optional(&mut *conn)
        .await?;

    row.map(StayMarks::from)
        .ok_or_else(|| DbError::not_found("RoomBooking", room_booking_id))
}

/// Check-in/out marks of every RoomBooking of a booking.
pub(crate) async fn booking_marks(
    conn: &mut SqliteConnection,
    booking_id: &str,
) -> DbResult<Vec<StayMarks>> {
    let sql = format!("{MARKS_SELECT} WHERE rb.booking_id = ?1");
    let rows: Vec<MarksRow> = sqlx::query_as(&sql)
        .bind(booking_id)
        .fetch_all(&mut *conn)
        .await?;
    Ok(rows.into_iter().map(StayMarks::from).collect())
}

/// Re-derives and stores a booking's status from its rooms' marks.
///
/// Idempotent: running it again without new events changes nothing.
pub(crate) async fn refresh_booking_status(
    conn: &mut SqliteConnection,
    booking_id: &str,
) -> DbResult<BookingStatus> {
    let booking = require_booking(&mut *conn, booking_id).await?;
    let marks = booking_marks(&mut *conn, booking_id).await?;
    let derived = derive_booking_status(booking.status, &marks);

    if derived != booking.status {
        set_booking_status(&mut *conn, booking_id, derived).await?;
        debug!(booking_id = %booking_id, from = %booking.status, to = %derived, "Booking status derived");
    }
    Ok(derived)
}

pub(crate) async fn fetch_usages(
    conn: &mut SqliteConnection,
    room_booking_id: &str,
) -> DbResult<Vec<ServiceUsage>> {
    let usages: Vec<ServiceUsage> = sqlx::query_as(
        r#"
        SELECT id, room_booking_id, service_id, name_snapshot, price_cents, recorded_by, used_at
        FROM service_usages
        WHERE room_booking_id = ?1
        ORDER BY used_at
        "#,
    )
    .bind(room_booking_id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(usages)
}

async fn set_room_booking_status(
    conn: &mut SqliteConnection,
    room_booking_id: &str,
    status: RoomBookingStatus,
) -> DbResult<()> {
    sqlx::query("UPDATE room_bookings SET status = ?2 WHERE id = ?1")
        .bind(room_booking_id)
        .bind(status)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

async fn require_room_booking(conn: &mut SqliteConnection, id: &str) -> DbResult<RoomBooking> {
    fetch_room_booking(conn, id)
        .await?
        .ok_or_else(|| DbError::not_found("RoomBooking", id))
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for stay events.
#[derive(Debug, Clone)]
pub struct StayRepository {
    pool: SqlitePool,
    locks: Arc<LockRegistry>,
}

impl StayRepository {
    /// Creates a new StayRepository.
    pub fn new(pool: SqlitePool, locks: Arc<LockRegistry>) -> Self {
        StayRepository { pool, locks }
    }

    /// Booking a RoomBooking belongs to. Fixed for the row's lifetime, so
    /// it is read before the booking lock is taken.
    async fn booking_of(&self, room_booking_id: &str) -> DbResult<String> {
        let mut conn = self.pool.acquire().await?;
        Ok(require_room_booking(&mut *conn, room_booking_id)
            .await?
            .booking_id)
    }

    /// Checks a room in.
    ///
    /// ## Preconditions
    /// - no earlier check-in for the room booking
    /// - allocation active, `at` within `[start, end)`
    /// - booking not cancelled, no-show or fully checked in/out
    pub async fn check_in(
        &self,
        room_booking_id: &str,
        guests: &[String],
        actor_id: &str,
        at: DateTime<Utc>,
    ) -> DbResult<CheckIn> {
        validate_guests(guests)?;
        validate_actor(actor_id)?;

        let booking_id = self.booking_of(room_booking_id).await?;
        let _locks = self.locks.acquire([booking_key(&booking_id)]).await;
        let mut tx = self.pool.begin().await?;

        let rb = require_room_booking(&mut *tx, room_booking_id).await?;
        let booking = require_booking(&mut *tx, &booking_id).await?;
        let already = fetch_check_in(&mut *tx, room_booking_id).await?.is_some();
        ensure_can_check_in(booking.status, &rb, already, at)?;

        let check_in = CheckIn {
            id: generate_id(),
            room_booking_id: room_booking_id.to_string(),
            guests: guests.iter().map(|g| g.trim().to_string()).collect(),
            checked_in_by: actor_id.to_string(),
            checked_in_at: at,
        };

        sqlx::query(
            r#"
            INSERT INTO check_ins (id, room_booking_id, guests, checked_in_by, checked_in_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(&check_in.id)
        .bind(&check_in.room_booking_id)
        .bind(encode_guests(&check_in.guests)?)
        .bind(&check_in.checked_in_by)
        .bind(check_in.checked_in_at)
        .execute(&mut *tx)
        .await?;

        set_room_booking_status(&mut *tx, room_booking_id, RoomBookingStatus::CheckedIn).await?;
        let status = refresh_booking_status(&mut *tx, &booking_id).await?;

        tx.commit().await?;
        info!(
            room_booking_id = %room_booking_id,
            booking_id = %booking_id,
            booking_status = %status,
            "Room checked in"
        );
        Ok(check_in)
    }

    /// Checks a room out.
    ///
    /// ## Preconditions
    /// - room checked in, not yet checked out
    /// - `at` within `[start, end)` and not before the check-in
    pub async fn check_out(
        &self,
        room_booking_id: &str,
        actor_id: &str,
        at: DateTime<Utc>,
    ) -> DbResult<CheckOut> {
        validate_actor(actor_id)?;

        let booking_id = self.booking_of(room_booking_id).await?;
        let _locks = self.locks.acquire([booking_key(&booking_id)]).await;
        let mut tx = self.pool.begin().await?;

        let rb = require_room_booking(&mut *tx, room_booking_id).await?;
        let checked_in_at = fetch_check_in(&mut *tx, room_booking_id)
            .await?
            .map(|ci| ci.checked_in_at);
        let already = fetch_check_out(&mut *tx, room_booking_id).await?.is_some();
        ensure_can_check_out(&rb, checked_in_at, already, at)?;

        let check_out = CheckOut {
            id: generate_id(),
            room_booking_id: room_booking_id.to_string(),
            checked_out_by: actor_id.to_string(),
            checked_out_at: at,
        };

        sqlx::query(
            r#"
            INSERT INTO check_outs (id, room_booking_id, checked_out_by, checked_out_at)
            VALUES (?1, ?2, ?3, ?4)
            "#,
        )
        .bind(&check_out.id)
        .bind(&check_out.room_booking_id)
        .bind(&check_out.checked_out_by)
        .bind(check_out.checked_out_at)
        .execute(&mut *tx)
        .await?;

        set_room_booking_status(&mut *tx, room_booking_id, RoomBookingStatus::CheckedOut).await?;
        let status = refresh_booking_status(&mut *tx, &booking_id).await?;

        tx.commit().await?;
        info!(
            room_booking_id = %room_booking_id,
            booking_id = %booking_id,
            booking_status = %status,
            "Room checked out"
        );
        Ok(check_out)
    }

    /// Charges a catalogue service to an in-house room.
    ///
    /// Name and price are snapshotted from the catalogue.
    ///
    /// ## Errors
    /// - `NotCheckedIn` unless the room is checked in and not checked out
    /// - `NotFound` for a service outside the booking's tenant
    pub async fn record_service_usage(
        &self,
        room_booking_id: &str,
        service_id: &str,
        actor_id: &str,
        at: DateTime<Utc>,
    ) -> DbResult<ServiceUsage> {
        validate_actor(actor_id)?;

        let booking_id = self.booking_of(room_booking_id).await?;
        let _locks = self.locks.acquire([booking_key(&booking_id)]).await;
        let mut tx = self.pool.begin().await?;

        let marks = room_booking_marks(&mut *tx, room_booking_id).await?;
        ensure_in_house(room_booking_id, marks)?;

        let booking = require_booking(&mut *tx, &booking_id).await?;
        let service: Service = sqlx::query_as(
            r#"
            SELECT id, tenant_id, name, category, price_cents, created_at
            FROM services
            WHERE id = ?1 AND tenant_id = ?2
            "#,
        )
        .bind(service_id)
        .bind(&booking.tenant_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| CoreError::not_found("Service", service_id))?;

        let usage = ServiceUsage {
            id: generate_id(),
            room_booking_id: room_booking_id.to_string(),
            service_id: service.id,
            name_snapshot: service.name,
            price_cents: service.price_cents,
            recorded_by: actor_id.to_string(),
            used_at: at,
        };

        sqlx::query(
            r#"
            INSERT INTO service_usages (
                id, room_booking_id, service_id, name_snapshot,
                price_cents, recorded_by, used_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&usage.id)
        .bind(&usage.room_booking_id)
        .bind(&usage.service_id)
        .bind(&usage.name_snapshot)
        .bind(usage.price_cents)
        .bind(&usage.recorded_by)
        .bind(usage.used_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        info!(
            room_booking_id = %room_booking_id,
            service = %usage.name_snapshot,
            price_cents = usage.price_cents,
            "Service usage recorded"
        );
        Ok(usage)
    }

    /// Gets the check-in of a room booking, if any.
    pub async fn get_check_in(&self, room_booking_id: &str) -> DbResult<Option<CheckIn>> {
        let mut conn = self.pool.acquire().await?;
        fetch_check_in(&mut *conn, room_booking_id).await
    }

    /// Gets the check-out of a room booking, if any.
    pub async fn get_check_out(&self, room_booking_id: &str) -> DbResult<Option<CheckOut>> {
        let mut conn = self.pool.acquire().await?;
        fetch_check_out(&mut *conn, room_booking_id).await
    }

    /// Services charged to a room booking.
    pub async fn usages(&self, room_booking_id: &str) -> DbResult<Vec<ServiceUsage>> {
        let mut conn = self.pool.acquire().await?;
        fetch_usages(&mut *conn, room_booking_id).await
    }

    /// Re-derives a booking's status from its stay events.
    pub async fn refresh_booking_status(&self, booking_id: &str) -> DbResult<BookingStatus> {
        let _locks = self.locks.acquire([booking_key(booking_id)]).await;
        let mut tx = self.pool.begin().await?;
        let status = refresh_booking_status(&mut *tx, booking_id).await?;
        tx.commit().await?;
        Ok(status)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::test_support::{at, guests, line, seed_room, setup};
    use crate::Database;
    use hearth_core::{Booking, Money};

    /// Booking over `rooms` rooms, each [10 Jan 12:00, 12 Jan 12:00).
    async fn booking_with_rooms(rooms: usize) -> (Database, String, Booking, Vec<RoomBooking>) {
        let (db, tenant) = setup().await;
        let mut lines = Vec::new();
        for i in 0..rooms {
            let room = seed_room(&db, &tenant, &format!("10{i}"), 5_000_00).await;
            lines.push(line(&room, 10, 12));
        }
        let booking = db
            .bookings()
            .allocate(&tenant, &guests(&["g1"]), &lines, "desk")
            .await
            .unwrap();
        let rbs = db.bookings().room_bookings(&booking.id).await.unwrap();
        (db, tenant, booking, rbs)
    }

    async fn status(db: &Database, booking_id: &str) -> BookingStatus {
        db.bookings().get_by_id(booking_id).await.unwrap().unwrap().status
    }

    #[tokio::test]
    async fn test_two_rooms_in_and_out() {
        let (db, _, booking, rbs) = booking_with_rooms(2).await;
        let stays = db.stays();

        stays.check_in(&rbs[0].id, &guests(&["g1"]), "desk", at(2024, 1, 10, 14, 0)).await.unwrap();
        assert_eq!(status(&db, &booking.id).await, BookingStatus::PartialCheckedIn);

        stays.check_in(&rbs[1].id, &guests(&["g2"]), "desk", at(2024, 1, 10, 15, 0)).await.unwrap();
        assert_eq!(status(&db, &booking.id).await, BookingStatus::CheckedIn);

        stays.check_out(&rbs[0].id, "desk", at(2024, 1, 12, 10, 0)).await.unwrap();
        assert_eq!(status(&db, &booking.id).await, BookingStatus::PartialCheckedOut);

        stays.check_out(&rbs[1].id, "desk", at(2024, 1, 12, 11, 0)).await.unwrap();
        assert_eq!(status(&db, &booking.id).await, BookingStatus::CheckedOut);

        let rb = db.bookings().get_room_booking(&rbs[1].id).await.unwrap().unwrap();
        assert_eq!(rb.status, RoomBookingStatus::CheckedOut);
        assert!(!rb.blocks_room());
    }

    #[tokio::test]
    async fn test_partial_checked_in_out() {
        let (db, _, booking, rbs) = booking_with_rooms(3).await;
        let stays = db.stays();

        stays.check_in(&rbs[0].id, &guests(&["g1"]), "desk", at(2024, 1, 10, 14, 0)).await.unwrap();
        stays.check_in(&rbs[1].id, &guests(&["g2"]), "desk", at(2024, 1, 10, 14, 0)).await.unwrap();
        stays.check_out(&rbs[0].id, "desk", at(2024, 1, 11, 9, 0)).await.unwrap();
        assert_eq!(status(&db, &booking.id).await, BookingStatus::PartialCheckedInOut);

        // Third room may still arrive
        stays.check_in(&rbs[2].id, &guests(&["g3"]), "desk", at(2024, 1, 11, 10, 0)).await.unwrap();
        assert_eq!(status(&db, &booking.id).await, BookingStatus::PartialCheckedOut);
    }

    #[tokio::test]
    async fn test_check_in_preconditions() {
        let (db, _, _, rbs) = booking_with_rooms(1).await;
        let stays = db.stays();

        // Outside the interval (end is exclusive)
        let err = stays
            .check_in(&rbs[0].id, &guests(&["g1"]), "desk", at(2024, 1, 12, 12, 0))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "PRECONDITION_FAILED");

        stays.check_in(&rbs[0].id, &guests(&["g1"]), "desk", at(2024, 1, 10, 12, 0)).await.unwrap();

        let err = stays
            .check_in(&rbs[0].id, &guests(&["g1"]), "desk", at(2024, 1, 10, 13, 0))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "PRECONDITION_FAILED");

        let err = stays
            .check_in("missing", &guests(&["g1"]), "desk", at(2024, 1, 10, 13, 0))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_check_in_on_cancelled_booking() {
        let (db, _, booking, rbs) = booking_with_rooms(1).await;
        db.bookings().cancel(&booking.id).await.unwrap();

        let err = db
            .stays()
            .check_in(&rbs[0].id, &guests(&["g1"]), "desk", at(2024, 1, 10, 14, 0))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "PRECONDITION_FAILED");
        assert!(db.stays().get_check_in(&rbs[0].id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_cancel_after_check_in_rejected() {
        let (db, _, booking, rbs) = booking_with_rooms(2).await;
        db.stays()
            .check_in(&rbs[0].id, &guests(&["g1"]), "desk", at(2024, 1, 10, 14, 0))
            .await
            .unwrap();

        let err = db.bookings().cancel(&booking.id).await.unwrap_err();
        assert_eq!(err.code(), "PRECONDITION_FAILED");
        assert_eq!(status(&db, &booking.id).await, BookingStatus::PartialCheckedIn);
    }

    #[tokio::test]
    async fn test_check_out_preconditions() {
        let (db, _, _, rbs) = booking_with_rooms(1).await;
        let stays = db.stays();

        let err = stays.check_out(&rbs[0].id, "desk", at(2024, 1, 11, 10, 0)).await.unwrap_err();
        assert_eq!(err.code(), "PRECONDITION_FAILED");

        stays.check_in(&rbs[0].id, &guests(&["g1"]), "desk", at(2024, 1, 10, 18, 0)).await.unwrap();

        let err = stays.check_out(&rbs[0].id, "desk", at(2024, 1, 10, 17, 0)).await.unwrap_err();
        assert_eq!(err.code(), "PRECONDITION_FAILED");

        let out = stays.check_out(&rbs[0].id, "desk", at(2024, 1, 11, 10, 0)).await.unwrap();
        assert_eq!(out.checked_out_by, "desk");

        let err = stays.check_out(&rbs[0].id, "desk", at(2024, 1, 11, 11, 0)).await.unwrap_err();
        assert_eq!(err.code(), "PRECONDITION_FAILED");

        let stored = stays.get_check_out(&rbs[0].id).await.unwrap().unwrap();
        assert_eq!(stored.checked_out_at, at(2024, 1, 11, 10, 0));
    }

    #[tokio::test]
    async fn test_service_usage_requires_in_house_room() {
        let (db, tenant, _, rbs) = booking_with_rooms(1).await;
        let spa = db
            .services()
            .create(&tenant, "Spa", "wellness", Money::from_cents(1_500_00))
            .await
            .unwrap();
        let stays = db.stays();

        let err = stays
            .record_service_usage(&rbs[0].id, &spa.id, "desk", at(2024, 1, 10, 9, 0))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DbError::Domain(CoreError::NotCheckedIn { ref room_booking_id }) if *room_booking_id == rbs[0].id
        ));

        stays.check_in(&rbs[0].id, &guests(&["g1"]), "desk", at(2024, 1, 10, 14, 0)).await.unwrap();
        let usage = stays
            .record_service_usage(&rbs[0].id, &spa.id, "desk", at(2024, 1, 11, 9, 0))
            .await
            .unwrap();
        assert_eq!(usage.name_snapshot, "Spa");
        assert_eq!(usage.price(), Money::from_cents(1_500_00));

        stays.check_out(&rbs[0].id, "desk", at(2024, 1, 12, 10, 0)).await.unwrap();
        let err = stays
            .record_service_usage(&rbs[0].id, &spa.id, "desk", at(2024, 1, 12, 11, 0))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "NOT_CHECKED_IN");

        assert_eq!(stays.usages(&rbs[0].id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_refresh_is_idempotent() {
        let (db, _, booking, rbs) = booking_with_rooms(2).await;
        db.stays()
            .check_in(&rbs[0].id, &guests(&["g1"]), "desk", at(2024, 1, 10, 14, 0))
            .await
            .unwrap();

        let first = db.stays().refresh_booking_status(&booking.id).await.unwrap();
        let second = db.stays().refresh_booking_status(&booking.id).await.unwrap();
        assert_eq!(first, BookingStatus::PartialCheckedIn);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_check_in_keeps_guest_list() {
        let (db, _, _, rbs) = booking_with_rooms(1).await;
        db.stays()
            .check_in(&rbs[0].id, &guests(&["g1", " g2 "]), "desk", at(2024, 1, 10, 14, 0))
            .await
            .unwrap();

        let ci = db.stays().get_check_in(&rbs[0].id).await.unwrap().unwrap();
        assert_eq!(ci.guests, vec!["g1", "g2"]);
        assert_eq!(ci.checked_in_by, "desk");
    }
}
