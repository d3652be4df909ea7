//! # Booking Repository (Reservation Allocator)
//!
//! Creates bookings with one RoomBooking per requested room and interval,
//! and moves whole bookings through confirm / cancel / re-activate /
//! no-show.
//!
//! ## Allocation
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    allocate(tenant, guests, lines)                      │
//! │                                                                         │
//! │  validate_request(lines)               empty / start >= end / dup room │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  locks.acquire(room:A, room:B, ..)     sorted, one call                │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  BEGIN                                                                 │
//! │   ├── UPDATE rooms .. WHERE id = ? AND tenant_id = ?   (each room)     │
//! │   │     0 rows → NotFound (unknown room or another tenant's)           │
//! │   │     takes SQLite's write lock before the overlap read              │
//! │   ├── SELECT live room_bookings of those rooms                         │
//! │   ├── check_all(lines, existing)       first overlap → Conflict        │
//! │   ├── INSERT booking (pending)                                         │
//! │   └── INSERT room_booking per line (pending, active)                   │
//! │  COMMIT                                                                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Overlap is half-open: `existing.start < requested.end AND
//! existing.end > requested.start`, so back-to-back stays never collide.

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use crate::lock::{booking_key, room_key, LockRegistry};
use hearth_core::allocation::{check_all, lock_order, validate_request, RoomInterval};
use hearth_core::lifecycle::ensure_not_started;
use hearth_core::types::generate_id;
use hearth_core::validation::{validate_actor, validate_guests};
use hearth_core::{
    Booking, BookingStatus, CoreError, RoomBooking, RoomBookingStatus, RoomStatus,
    ValidationError,
};

/// SQL filter for allocations that block their room.
pub(crate) const LIVE_FILTER: &str =
    "is_active = 1 AND status IN ('pending', 'confirmed', 'checked_in')";

pub(crate) const ROOM_BOOKING_COLUMNS: &str =
    "id, booking_id, room_id, start_at, end_at, is_active, status, created_at";

// =============================================================================
// Row Mapping
// =============================================================================

/// Raw `bookings` row. Guests are stored as a JSON array.
#[derive(Debug, sqlx::FromRow)]
struct BookingRow {
    id: String,
    tenant_id: String,
    guests: String,
    status: BookingStatus,
    created_by: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl BookingRow {
    fn into_booking(self) -> DbResult<Booking> {
        let guests = decode_guests("Booking", &self.id, &self.guests)?;
        Ok(Booking {
            id: self.id,
            tenant_id: self.tenant_id,
            guests,
            status: self.status,
            created_by: self.created_by,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

pub(crate) fn encode_guests(guests: &[String]) -> DbResult<String> {
    serde_json::to_string(guests).map_err(|e| DbError::Internal(e.to_string()))
}

pub(crate) fn decode_guests(entity: &str, id: &str, raw: &str) -> DbResult<Vec<String>> {
    serde_json::from_str(raw).map_err(|e| DbError::Corrupt {
        entity: entity.to_string(),
        id: id.to_string(),
        reason: format!("guest list: {e}"),
    })
}

// =============================================================================
// Shared Queries
// =============================================================================
//
// Take a bare connection so they work on the pool and inside transactions.

pub(crate) async fn fetch_booking(
    conn: &mut SqliteConnection,
    id: &str,
) -> DbResult<Option<Booking>> {
    let row: Option<BookingRow> = sqlx::query_as(
        r#"
        SELECT id, tenant_id, guests, status, created_by, created_at, updated_at
        FROM bookings
        WHERE id = ?1
        "#,
    )
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;

    row.map(BookingRow::into_booking).transpose()
}

pub(crate) async fn require_booking(conn: &mut SqliteConnection, id: &str) -> DbResult<Booking> {
    fetch_booking(conn, id)
        .await?
        .ok_or_else(|| DbError::not_found("Booking", id))
}

pub(crate) async fn fetch_room_booking(
    conn: &mut SqliteConnection,
    id: &str,
) -> DbResult<Option<RoomBooking>> {
    let sql = format!("SELECT {ROOM_BOOKING_COLUMNS} FROM room_bookings WHERE id = ?1");
    let rb: Option<RoomBooking> = sqlx::query_as(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(rb)
}

pub(crate) async fn fetch_room_bookings(
    conn: &mut SqliteConnection,
    booking_id: &str,
) -> DbResult<Vec<RoomBooking>> {
    let sql = format!(
        "SELECT {ROOM_BOOKING_COLUMNS} FROM room_bookings WHERE booking_id = ?1 ORDER BY start_at, room_id"
    );
    let rbs: Vec<RoomBooking> = sqlx::query_as(&sql)
        .bind(booking_id)
        .fetch_all(&mut *conn)
        .await?;
    Ok(rbs)
}

/// Live allocations of the given rooms.
pub(crate) async fn live_room_bookings(
    conn: &mut SqliteConnection,
    room_ids: &[String],
) -> DbResult<Vec<RoomBooking>> {
    let sql = format!(
        "SELECT {ROOM_BOOKING_COLUMNS} FROM room_bookings WHERE room_id = ?1 AND {LIVE_FILTER}"
    );
    let mut live = Vec::new();
    for room_id in room_ids {
        let rows: Vec<RoomBooking> = sqlx::query_as(&sql)
            .bind(room_id)
            .fetch_all(&mut *conn)
            .await?;
        live.extend(rows);
    }
    Ok(live)
}

pub(crate) async fn set_booking_status(
    conn: &mut SqliteConnection,
    booking_id: &str,
    status: BookingStatus,
) -> DbResult<()> {
    let result = sqlx::query("UPDATE bookings SET status = ?2, updated_at = ?3 WHERE id = ?1")
        .bind(booking_id)
        .bind(status)
        .bind(Utc::now())
        .execute(&mut *conn)
        .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::not_found("Booking", booking_id));
    }
    Ok(())
}

/// Touches each room row, checking it belongs to the tenant and is not
/// under maintenance.
///
/// Being the first write of the transaction, it also takes SQLite's write
/// lock, so another process cannot interleave between the overlap read and
/// the insert.
async fn claim_rooms(
    conn: &mut SqliteConnection,
    tenant_id: &str,
    room_ids: &[String],
) -> DbResult<()> {
    let now = Utc::now();
    for room_id in room_ids {
        let status: Option<RoomStatus> = sqlx::query_scalar(
            "UPDATE rooms SET updated_at = ?3 WHERE id = ?1 AND tenant_id = ?2 RETURNING status",
        )
        .bind(room_id)
        .bind(tenant_id)
        .bind(now)
        .fetch_optional(&mut *conn)
        .await?;

        match status {
            None => return Err(CoreError::not_found("Room", room_id.as_str()).into()),
            Some(RoomStatus::Maintenance) => {
                return Err(CoreError::precondition(
                    "Room",
                    room_id.as_str(),
                    "room is under maintenance",
                )
                .into());
            }
            Some(_) => {}
        }
    }
    Ok(())
}

fn distinct_rooms(rbs: &[RoomBooking]) -> Vec<String> {
    let intervals: Vec<RoomInterval> = rbs.iter().map(interval_of).collect();
    lock_order(&intervals)
}

fn interval_of(rb: &RoomBooking) -> RoomInterval {
    RoomInterval::new(rb.room_id.clone(), rb.start_at, rb.end_at)
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for bookings and their room allocations.
#[derive(Debug, Clone)]
pub struct BookingRepository {
    pool: SqlitePool,
    locks: Arc<LockRegistry>,
}

impl BookingRepository {
    /// Creates a new BookingRepository.
    pub fn new(pool: SqlitePool, locks: Arc<LockRegistry>) -> Self {
        BookingRepository { pool, locks }
    }

    /// Allocates rooms for a new booking.
    ///
    /// All-or-nothing: any conflicting line rejects the whole request and
    /// nothing is written.
    ///
    /// ## Errors
    /// - `Validation` for bad guests, actor or lines
    /// - `NotFound` for a room outside the tenant
    /// - `Conflict { room_id, start, end }` naming the requested line
    pub async fn allocate(
        &self,
        tenant_id: &str,
        guests: &[String],
        rooms: &[RoomInterval],
        actor_id: &str,
    ) -> DbResult<Booking> {
        validate_guests(guests)?;
        validate_actor(actor_id)?;
        validate_request(rooms)?;

        let room_ids = lock_order(rooms);
        debug!(tenant_id = %tenant_id, rooms = ?room_ids, "Allocating booking");

        let _locks = self.locks.acquire(room_ids.iter().map(|id| room_key(id))).await;
        let mut tx = self.pool.begin().await?;

        claim_rooms(&mut *tx, tenant_id, &room_ids).await?;
        let existing = live_room_bookings(&mut *tx, &room_ids).await?;
        check_all(rooms, &existing, None)?;

        let now = Utc::now();
        let booking = Booking {
            id: generate_id(),
            tenant_id: tenant_id.to_string(),
            guests: guests.iter().map(|g| g.trim().to_string()).collect(),
            status: BookingStatus::Pending,
            created_by: actor_id.to_string(),
            created_at: now,
            updated_at: now,
        };

        sqlx::query(
            r#"
            INSERT INTO bookings (id, tenant_id, guests, status, created_by, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
            "#,
        )
        .bind(&booking.id)
        .bind(&booking.tenant_id)
        .bind(encode_guests(&booking.guests)?)
        .bind(booking.status)
        .bind(&booking.created_by)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        for line in rooms {
            sqlx::query(
                r#"
                INSERT INTO room_bookings (
                    id, booking_id, room_id, start_at, end_at,
                    is_active, status, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6, ?7)
                "#,
            )
            .bind(generate_id())
            .bind(&booking.id)
            .bind(&line.room_id)
            .bind(line.start)
            .bind(line.end)
            .bind(RoomBookingStatus::Pending)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        info!(
            booking_id = %booking.id,
            tenant_id = %tenant_id,
            rooms = rooms.len(),
            "Booking allocated"
        );
        Ok(booking)
    }

    /// Gets a booking by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Booking>> {
        let mut conn = self.pool.acquire().await?;
        fetch_booking(&mut *conn, id).await
    }

    /// Gets a single room allocation by ID.
    pub async fn get_room_booking(&self, id: &str) -> DbResult<Option<RoomBooking>> {
        let mut conn = self.pool.acquire().await?;
        fetch_room_booking(&mut *conn, id).await
    }

    /// All room allocations of a booking, in stay order.
    pub async fn room_bookings(&self, booking_id: &str) -> DbResult<Vec<RoomBooking>> {
        let mut conn = self.pool.acquire().await?;
        fetch_room_bookings(&mut *conn, booking_id).await
    }

    /// Live allocations of `room_id` overlapping `[start, end)`.
    pub async fn conflicts(
        &self,
        room_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> DbResult<Vec<RoomBooking>> {
        if start >= end {
            return Err(ValidationError::InvalidInterval {
                field: format!("room {room_id}"),
                start,
                end,
            }
            .into());
        }

        let requested = RoomInterval::new(room_id, start, end);
        let mut conn = self.pool.acquire().await?;
        let live = live_room_bookings(&mut *conn, &[room_id.to_string()]).await?;

        Ok(live
            .into_iter()
            .filter(|rb| requested.overlaps(rb.start_at, rb.end_at))
            .collect())
    }

    /// Confirms a pending booking and its allocations.
    pub async fn confirm(&self, booking_id: &str) -> DbResult<()> {
        let _locks = self.locks.acquire([booking_key(booking_id)]).await;
        let mut tx = self.pool.begin().await?;

        let booking = require_booking(&mut *tx, booking_id).await?;
        if booking.status != BookingStatus::Pending {
            return Err(CoreError::precondition(
                "Booking",
                booking_id,
                format!("only pending bookings can be confirmed (booking is {})", booking.status),
            )
            .into());
        }

        set_booking_status(&mut *tx, booking_id, BookingStatus::Confirmed).await?;
        sqlx::query(
            "UPDATE room_bookings SET status = 'confirmed' WHERE booking_id = ?1 AND status = 'pending'",
        )
        .bind(booking_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        info!(booking_id = %booking_id, "Booking confirmed");
        Ok(())
    }

    /// Cancels a booking before anyone has checked in.
    ///
    /// Every allocation becomes cancelled and inactive, freeing its room.
    pub async fn cancel(&self, booking_id: &str) -> DbResult<()> {
        self.close_unstarted(booking_id, BookingStatus::Cancelled, RoomBookingStatus::Cancelled)
            .await?;
        info!(booking_id = %booking_id, "Booking cancelled");
        Ok(())
    }

    /// Marks a booking whose guests never arrived. Frees its rooms.
    pub async fn mark_no_show(&self, booking_id: &str) -> DbResult<()> {
        self.close_unstarted(booking_id, BookingStatus::NoShow, RoomBookingStatus::NoShow)
            .await?;
        info!(booking_id = %booking_id, "Booking marked no-show");
        Ok(())
    }

    async fn close_unstarted(
        &self,
        booking_id: &str,
        status: BookingStatus,
        room_status: RoomBookingStatus,
    ) -> DbResult<()> {
        let _locks = self.locks.acquire([booking_key(booking_id)]).await;
        let mut tx = self.pool.begin().await?;

        let booking = require_booking(&mut *tx, booking_id).await?;
        ensure_not_started(booking_id, booking.status)?;

        set_booking_status(&mut *tx, booking_id, status).await?;
        sqlx::query("UPDATE room_bookings SET is_active = 0, status = ?2 WHERE booking_id = ?1")
            .bind(booking_id)
            .bind(room_status)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Re-activates a cancelled booking (cancelled → confirmed).
    ///
    /// Each allocation is re-checked against live allocations of other
    /// bookings. On conflict nothing changes and the booking stays cancelled.
    pub async fn reactivate(&self, booking_id: &str) -> DbResult<()> {
        // The room set of a booking is fixed at allocation time, so it can be
        // read before the locks are taken.
        let room_ids = {
            let mut conn = self.pool.acquire().await?;
            let rbs = fetch_room_bookings(&mut *conn, booking_id).await?;
            distinct_rooms(&rbs)
        };

        let keys = std::iter::once(booking_key(booking_id))
            .chain(room_ids.iter().map(|id| room_key(id)));
        let _locks = self.locks.acquire(keys).await;
        let mut tx = self.pool.begin().await?;

        let booking = require_booking(&mut *tx, booking_id).await?;
        if booking.status != BookingStatus::Cancelled {
            return Err(CoreError::precondition(
                "Booking",
                booking_id,
                format!("only cancelled bookings can be re-activated (booking is {})", booking.status),
            )
            .into());
        }

        claim_rooms(&mut *tx, &booking.tenant_id, &room_ids).await?;
        let rbs = fetch_room_bookings(&mut *tx, booking_id).await?;
        let intervals: Vec<RoomInterval> = rbs.iter().map(interval_of).collect();
        let existing = live_room_bookings(&mut *tx, &room_ids).await?;
        check_all(&intervals, &existing, Some(booking_id))?;

        sqlx::query("UPDATE room_bookings SET is_active = 1, status = 'confirmed' WHERE booking_id = ?1")
            .bind(booking_id)
            .execute(&mut *tx)
            .await?;
        set_booking_status(&mut *tx, booking_id, BookingStatus::Confirmed).await?;

        tx.commit().await?;
        info!(booking_id = %booking_id, rooms = room_ids.len(), "Booking re-activated");
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::test_support::{at, guests, line, seed_room, setup, setup_shared};

    async fn count(db: &crate::Database, table: &str) -> i64 {
        sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(db.pool())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_allocate_creates_pending_booking() {
        let (db, tenant) = setup().await;
        let a = seed_room(&db, &tenant, "101", 5_000_00).await;
        let b = seed_room(&db, &tenant, "102", 5_000_00).await;

        let booking = db
            .bookings()
            .allocate(&tenant, &guests(&["g1", "g2"]), &[line(&a, 10, 12), line(&b, 10, 11)], "desk")
            .await
            .unwrap();
        assert_eq!(booking.status, BookingStatus::Pending);

        let stored = db.bookings().get_by_id(&booking.id).await.unwrap().unwrap();
        assert_eq!(stored.guests, vec!["g1", "g2"]);

        let rbs = db.bookings().room_bookings(&booking.id).await.unwrap();
        assert_eq!(rbs.len(), 2);
        assert!(rbs.iter().all(|rb| rb.is_active && rb.status == RoomBookingStatus::Pending));
    }

    #[tokio::test]
    async fn test_overlap_rejected_with_requested_interval() {
        let (db, tenant) = setup().await;
        let room = seed_room(&db, &tenant, "101", 5_000_00).await;
        db.bookings()
            .allocate(&tenant, &guests(&["g1"]), &[line(&room, 10, 12)], "desk")
            .await
            .unwrap();

        let err = db
            .bookings()
            .allocate(&tenant, &guests(&["g2"]), &[line(&room, 11, 13)], "desk")
            .await
            .unwrap_err();

        match err {
            DbError::Domain(CoreError::Conflict { room_id, start, end }) => {
                assert_eq!(room_id, room.id);
                assert_eq!(start, at(2024, 1, 11, 12, 0));
                assert_eq!(end, at(2024, 1, 13, 12, 0));
            }
            other => panic!("expected conflict, got {other:?}"),
        }
        assert_eq!(count(&db, "bookings").await, 1);
    }

    #[tokio::test]
    async fn test_back_to_back_allowed() {
        let (db, tenant) = setup().await;
        let room = seed_room(&db, &tenant, "101", 5_000_00).await;
        db.bookings()
            .allocate(&tenant, &guests(&["g1"]), &[line(&room, 10, 12)], "desk")
            .await
            .unwrap();
        db.bookings()
            .allocate(&tenant, &guests(&["g2"]), &[line(&room, 12, 14)], "desk")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_one_conflicting_room_rejects_all() {
        let (db, tenant) = setup().await;
        let free = seed_room(&db, &tenant, "101", 5_000_00).await;
        let taken = seed_room(&db, &tenant, "102", 5_000_00).await;
        db.bookings()
            .allocate(&tenant, &guests(&["g1"]), &[line(&taken, 10, 12)], "desk")
            .await
            .unwrap();

        let err = db
            .bookings()
            .allocate(
                &tenant,
                &guests(&["g2"]),
                &[line(&free, 10, 12), line(&taken, 11, 12)],
                "desk",
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), "CONFLICT");

        assert_eq!(count(&db, "room_bookings").await, 1);
        assert!(db
            .bookings()
            .conflicts(&free.id, at(2024, 1, 1, 0, 0), at(2024, 2, 1, 0, 0))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_request_validation() {
        let (db, tenant) = setup().await;
        let room = seed_room(&db, &tenant, "101", 5_000_00).await;

        let err = db
            .bookings()
            .allocate(&tenant, &guests(&["g1"]), &[], "desk")
            .await
            .unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");

        let backwards = RoomInterval::new(room.id.clone(), at(2024, 1, 12, 0, 0), at(2024, 1, 10, 0, 0));
        let err = db
            .bookings()
            .allocate(&tenant, &guests(&["g1"]), &[backwards], "desk")
            .await
            .unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");

        let err = db
            .bookings()
            .allocate(&tenant, &[], &[line(&room, 10, 12)], "desk")
            .await
            .unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");

        let err = db
            .bookings()
            .allocate(
                &tenant,
                &guests(&["g1"]),
                &[line(&room, 10, 12), line(&room, 11, 13)],
                "desk",
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_room_of_other_tenant_not_found() {
        let (db, tenant) = setup().await;
        let other = db
            .tenants()
            .create("Other", &hearth_core::TenantTaxConfig::default())
            .await
            .unwrap();
        let room = seed_room(&db, &other, "101", 5_000_00).await;

        let err = db
            .bookings()
            .allocate(&tenant, &guests(&["g1"]), &[line(&room, 10, 12)], "desk")
            .await
            .unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");
        assert_eq!(count(&db, "bookings").await, 0);
    }

    #[tokio::test]
    async fn test_maintenance_room_refused() {
        let (db, tenant) = setup().await;
        let room = seed_room(&db, &tenant, "101", 5_000_00).await;
        db.rooms().set_status(&room.id, RoomStatus::Maintenance).await.unwrap();

        let err = db
            .bookings()
            .allocate(&tenant, &guests(&["g1"]), &[line(&room, 10, 12)], "desk")
            .await
            .unwrap_err();
        assert_eq!(err.code(), "PRECONDITION_FAILED");
        assert_eq!(count(&db, "bookings").await, 0);

        // A cancelled booking cannot come back onto a room taken out of service
        db.rooms().set_status(&room.id, RoomStatus::Available).await.unwrap();
        let booking = db
            .bookings()
            .allocate(&tenant, &guests(&["g1"]), &[line(&room, 10, 12)], "desk")
            .await
            .unwrap();
        db.bookings().cancel(&booking.id).await.unwrap();
        db.rooms().set_status(&room.id, RoomStatus::Maintenance).await.unwrap();

        let err = db.bookings().reactivate(&booking.id).await.unwrap_err();
        assert_eq!(err.code(), "PRECONDITION_FAILED");
        let stored = db.bookings().get_by_id(&booking.id).await.unwrap().unwrap();
        assert_eq!(stored.status, BookingStatus::Cancelled);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_allocations_of_one_room() {
        // Separate connections, so the race reaches SQLite for real
        let (db, tenant, _dir) = setup_shared().await;
        let room = seed_room(&db, &tenant, "101", 5_000_00).await;

        let mut handles = Vec::new();
        for i in 0..16 {
            let db = db.clone();
            let tenant = tenant.clone();
            let interval = line(&room, 10 + (i % 2), 12);
            handles.push(tokio::spawn(async move {
                db.bookings()
                    .allocate(&tenant, &[format!("guest-{i}")], &[interval], "desk")
                    .await
            }));
        }

        let mut won = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => won += 1,
                Err(err) => assert_eq!(err.code(), "CONFLICT"),
            }
        }
        assert_eq!(won, 1);
        assert_eq!(count(&db, "room_bookings").await, 1);
    }

    #[tokio::test]
    async fn test_confirm() {
        let (db, tenant) = setup().await;
        let room = seed_room(&db, &tenant, "101", 5_000_00).await;
        let booking = db
            .bookings()
            .allocate(&tenant, &guests(&["g1"]), &[line(&room, 10, 12)], "desk")
            .await
            .unwrap();

        db.bookings().confirm(&booking.id).await.unwrap();
        let stored = db.bookings().get_by_id(&booking.id).await.unwrap().unwrap();
        assert_eq!(stored.status, BookingStatus::Confirmed);
        let rbs = db.bookings().room_bookings(&booking.id).await.unwrap();
        assert_eq!(rbs[0].status, RoomBookingStatus::Confirmed);

        let err = db.bookings().confirm(&booking.id).await.unwrap_err();
        assert_eq!(err.code(), "PRECONDITION_FAILED");
    }

    #[tokio::test]
    async fn test_cancel_frees_rooms() {
        let (db, tenant) = setup().await;
        let room = seed_room(&db, &tenant, "101", 5_000_00).await;
        let booking = db
            .bookings()
            .allocate(&tenant, &guests(&["g1"]), &[line(&room, 10, 12)], "desk")
            .await
            .unwrap();

        db.bookings().cancel(&booking.id).await.unwrap();

        let stored = db.bookings().get_by_id(&booking.id).await.unwrap().unwrap();
        assert_eq!(stored.status, BookingStatus::Cancelled);
        let rbs = db.bookings().room_bookings(&booking.id).await.unwrap();
        assert!(!rbs[0].is_active);
        assert_eq!(rbs[0].status, RoomBookingStatus::Cancelled);

        db.bookings()
            .allocate(&tenant, &guests(&["g2"]), &[line(&room, 10, 12)], "desk")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_reactivate_conflict_keeps_booking_cancelled() {
        let (db, tenant) = setup().await;
        let room = seed_room(&db, &tenant, "101", 5_000_00).await;
        let first = db
            .bookings()
            .allocate(&tenant, &guests(&["g1"]), &[line(&room, 10, 12)], "desk")
            .await
            .unwrap();
        db.bookings().cancel(&first.id).await.unwrap();

        db.bookings()
            .allocate(&tenant, &guests(&["g2"]), &[line(&room, 11, 13)], "desk")
            .await
            .unwrap();

        let err = db.bookings().reactivate(&first.id).await.unwrap_err();
        assert_eq!(err.code(), "CONFLICT");

        let stored = db.bookings().get_by_id(&first.id).await.unwrap().unwrap();
        assert_eq!(stored.status, BookingStatus::Cancelled);
        let rbs = db.bookings().room_bookings(&first.id).await.unwrap();
        assert!(!rbs[0].is_active);
    }

    #[tokio::test]
    async fn test_reactivate_when_rooms_free() {
        let (db, tenant) = setup().await;
        let room = seed_room(&db, &tenant, "101", 5_000_00).await;
        let booking = db
            .bookings()
            .allocate(&tenant, &guests(&["g1"]), &[line(&room, 10, 12)], "desk")
            .await
            .unwrap();
        db.bookings().cancel(&booking.id).await.unwrap();

        db.bookings().reactivate(&booking.id).await.unwrap();

        let stored = db.bookings().get_by_id(&booking.id).await.unwrap().unwrap();
        assert_eq!(stored.status, BookingStatus::Confirmed);
        let rbs = db.bookings().room_bookings(&booking.id).await.unwrap();
        assert!(rbs[0].blocks_room());
        assert_eq!(rbs[0].status, RoomBookingStatus::Confirmed);

        // Only cancelled bookings re-activate
        let err = db.bookings().reactivate(&booking.id).await.unwrap_err();
        assert_eq!(err.code(), "PRECONDITION_FAILED");
    }

    #[tokio::test]
    async fn test_no_show_frees_rooms() {
        let (db, tenant) = setup().await;
        let room = seed_room(&db, &tenant, "101", 5_000_00).await;
        let booking = db
            .bookings()
            .allocate(&tenant, &guests(&["g1"]), &[line(&room, 10, 12)], "desk")
            .await
            .unwrap();

        db.bookings().mark_no_show(&booking.id).await.unwrap();
        let stored = db.bookings().get_by_id(&booking.id).await.unwrap().unwrap();
        assert_eq!(stored.status, BookingStatus::NoShow);

        let free = db
            .rooms()
            .availability(&tenant, at(2024, 1, 10, 12, 0), at(2024, 1, 12, 12, 0))
            .await
            .unwrap();
        assert_eq!(free.len(), 1);

        let err = db.bookings().cancel(&booking.id).await.unwrap_err();
        assert_eq!(err.code(), "PRECONDITION_FAILED");
    }

    #[tokio::test]
    async fn test_conflicts_query() {
        let (db, tenant) = setup().await;
        let room = seed_room(&db, &tenant, "101", 5_000_00).await;
        let booking = db
            .bookings()
            .allocate(&tenant, &guests(&["g1"]), &[line(&room, 10, 12)], "desk")
            .await
            .unwrap();

        let hits = db
            .bookings()
            .conflicts(&room.id, at(2024, 1, 11, 0, 0), at(2024, 1, 15, 0, 0))
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].booking_id, booking.id);

        let err = db
            .bookings()
            .conflicts(&room.id, at(2024, 1, 15, 0, 0), at(2024, 1, 11, 0, 0))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
    }
}
