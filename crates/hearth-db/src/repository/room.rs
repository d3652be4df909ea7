//! # Room Repository
//!
//! Room CRUD, housekeeping status and availability.
//!
//! Occupancy is never stored on the room: a room is taken for an interval
//! when a live RoomBooking overlaps it. `status` only tracks housekeeping.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use crate::lock::{room_key, LockRegistry};
use crate::repository::booking::{live_room_bookings, LIVE_FILTER};
use hearth_core::allocation::overlaps;
use hearth_core::types::generate_id;
use hearth_core::validation::{validate_name, validate_price, validate_room_number};
use hearth_core::{CoreError, Money, Room, RoomStatus, ValidationError};

const ROOM_COLUMNS: &str =
    "id, tenant_id, room_number, room_type, price_cents, status, created_at, updated_at";

/// Repository for room database operations.
#[derive(Debug, Clone)]
pub struct RoomRepository {
    pool: SqlitePool,
    locks: Arc<LockRegistry>,
}

impl RoomRepository {
    /// Creates a new RoomRepository.
    pub fn new(pool: SqlitePool, locks: Arc<LockRegistry>) -> Self {
        RoomRepository { pool, locks }
    }

    /// Creates a room.
    ///
    /// ## Errors
    /// - `Validation` for a bad number, type or negative price
    /// - `UniqueViolation` when the number is taken within the tenant
    pub async fn create(
        &self,
        tenant_id: &str,
        room_number: &str,
        room_type: &str,
        price: Money,
    ) -> DbResult<Room> {
        validate_room_number(room_number)?;
        validate_name("room_type", room_type)?;
        validate_price("price", price)?;

        let now = Utc::now();
        let room = Room {
            id: generate_id(),
            tenant_id: tenant_id.to_string(),
            room_number: room_number.trim().to_string(),
            room_type: room_type.trim().to_string(),
            price_cents: price.cents(),
            status: RoomStatus::Available,
            created_at: now,
            updated_at: now,
        };

        debug!(id = %room.id, room_number = %room.room_number, "Creating room");

        sqlx::query(
            r#"
            INSERT INTO rooms (
                id, tenant_id, room_number, room_type,
                price_cents, status, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&room.id)
        .bind(&room.tenant_id)
        .bind(&room.room_number)
        .bind(&room.room_type)
        .bind(room.price_cents)
        .bind(room.status)
        .bind(room.created_at)
        .bind(room.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match DbError::from(e) {
            DbError::UniqueViolation { field, .. } if field.contains("room_number") => {
                DbError::duplicate("room_number", room.room_number.clone())
            }
            other => other,
        })?;

        info!(id = %room.id, tenant_id = %tenant_id, room_number = %room.room_number, "Room created");
        Ok(room)
    }

    /// Gets a room by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Room>> {
        let sql = format!("SELECT {ROOM_COLUMNS} FROM rooms WHERE id = ?1");
        let room: Option<Room> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(room)
    }

    /// Lists a tenant's rooms ordered by room number.
    pub async fn list(&self, tenant_id: &str) -> DbResult<Vec<Room>> {
        let sql = format!("SELECT {ROOM_COLUMNS} FROM rooms WHERE tenant_id = ?1 ORDER BY room_number");
        let rooms: Vec<Room> = sqlx::query_as(&sql)
            .bind(tenant_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rooms)
    }

    /// Sets the housekeeping status of a room.
    pub async fn set_status(&self, id: &str, status: RoomStatus) -> DbResult<()> {
        let result = sqlx::query("UPDATE rooms SET status = ?2, updated_at = ?3 WHERE id = ?1")
            .bind(id)
            .bind(status)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Room", id));
        }

        debug!(id = %id, ?status, "Room status updated");
        Ok(())
    }

    /// Deletes one of the tenant's rooms.
    ///
    /// Another tenant's room is `NotFound`. Refused while any live
    /// RoomBooking holds the room. A room with past stays is kept by the
    /// foreign keys (`ForeignKeyViolation`).
    pub async fn delete(&self, tenant_id: &str, id: &str) -> DbResult<()> {
        let _locks = self.locks.acquire([room_key(id)]).await;
        let mut tx = self.pool.begin().await?;

        let owned: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM rooms WHERE id = ?1 AND tenant_id = ?2")
                .bind(id)
                .bind(tenant_id)
                .fetch_one(&mut *tx)
                .await?;
        if owned == 0 {
            return Err(DbError::not_found("Room", id));
        }

        let sql = format!("SELECT COUNT(*) FROM room_bookings WHERE room_id = ?1 AND {LIVE_FILTER}");
        let live: i64 = sqlx::query_scalar(&sql)
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;

        if live > 0 {
            return Err(CoreError::precondition(
                "Room",
                id,
                format!("{live} active allocation(s) hold this room"),
            )
            .into());
        }

        let result = sqlx::query("DELETE FROM rooms WHERE id = ?1 AND tenant_id = ?2")
            .bind(id)
            .bind(tenant_id)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Room", id));
        }

        tx.commit().await?;
        info!(tenant_id = %tenant_id, id = %id, "Room deleted");
        Ok(())
    }

    /// Rooms of a tenant that can be allocated for `[start, end)`.
    ///
    /// Excludes rooms under maintenance and rooms with a live overlapping
    /// allocation. Advisory only: [`BookingRepository::allocate`] re-checks
    /// under lock.
    ///
    /// [`BookingRepository::allocate`]: crate::repository::BookingRepository::allocate
    pub async fn availability(
        &self,
        tenant_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> DbResult<Vec<Room>> {
        if start >= end {
            return Err(ValidationError::InvalidInterval {
                field: "availability".to_string(),
                start,
                end,
            }
            .into());
        }

        let rooms = self.list(tenant_id).await?;
        let room_ids: Vec<String> = rooms.iter().map(|r| r.id.clone()).collect();

        let mut conn = self.pool.acquire().await?;
        let taken = live_room_bookings(&mut *conn, &room_ids).await?;

        Ok(rooms
            .into_iter()
            .filter(|room| room.status != RoomStatus::Maintenance)
            .filter(|room| {
                !taken
                    .iter()
                    .any(|rb| rb.room_id == room.id && overlaps(rb.start_at, rb.end_at, start, end))
            })
            .collect())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
