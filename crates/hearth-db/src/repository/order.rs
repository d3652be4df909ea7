//! # Order Repository
//!
//! The slice of the restaurant order subsystem that billing depends on:
//! creating orders, moving them through kitchen statuses and releasing
//! dine-in tables.
//!
//! ## Order Status
//! ```text
//! in_progress ─► on_hold ─► kot ─► served ──(bill)──► billed ──(paid)──► settled
//!      │                                                  │
//!      └────────────────► cancelled          (bill cancelled) ─► served
//! ```
//!
//! `billed` and `settled` are only reached through bills and payments.
//! Tables are released when the order reaches billed, settled or cancelled;
//! the released table ids go back to the caller.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::{SqliteConnection, SqlitePool};
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use crate::lock::{booking_key, order_key, LockRegistry};
use crate::repository::booking::{fetch_room_booking, require_booking};
use crate::repository::stay::room_booking_marks;
use hearth_core::lifecycle::ensure_in_house;
use hearth_core::types::generate_id;
use hearth_core::validation::{validate_actor, validate_name, validate_price, validate_quantity};
use hearth_core::{CoreError, Money, Order, OrderItem, OrderStatus, OrderType, ValidationError};

pub(crate) const ORDER_COLUMNS: &str = r#"
    id, tenant_id, order_type, booking_id, room_booking_id,
    total_cents, discount_cents, status, bill_id,
    created_by, created_at, updated_at
"#;

// =============================================================================
// Input Types
// =============================================================================

/// A line on a new order. Name and price are snapshotted from the menu.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOrderItem {
    pub food_item_id: String,
    pub name: String,
    pub unit_price: Money,
    pub quantity: i64,
}

/// Everything needed to open an order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOrder {
    pub tenant_id: String,
    pub order_type: OrderType,
    /// Required for hotel (room-service) orders, forbidden otherwise.
    pub booking_id: Option<String>,
    pub room_booking_id: Option<String>,
    /// Dine-in tables held by the order.
    pub tables: Vec<String>,
    pub items: Vec<NewOrderItem>,
    pub discount: Money,
    pub actor_id: String,
}

impl NewOrder {
    fn validate(&self) -> Result<(), ValidationError> {
        validate_actor(&self.actor_id)?;
        validate_price("discount", self.discount)?;

        if self.items.is_empty() {
            return Err(ValidationError::Required {
                field: "items".to_string(),
            });
        }
        for item in &self.items {
            validate_name("item name", &item.name)?;
            validate_price("unit_price", item.unit_price)?;
            validate_quantity(item.quantity)?;
        }

        for table in &self.tables {
            validate_name("table", table)?;
        }
        if self.order_type == OrderType::DineIn && self.tables.is_empty() {
            return Err(ValidationError::Required {
                field: "tables".to_string(),
            });
        }

        match self.order_type {
            OrderType::Hotel => {
                if self.booking_id.is_none() {
                    return Err(ValidationError::Required {
                        field: "booking_id".to_string(),
                    });
                }
                if self.room_booking_id.is_none() {
                    return Err(ValidationError::Required {
                        field: "room_booking_id".to_string(),
                    });
                }
            }
            _ => {
                if self.booking_id.is_some() || self.room_booking_id.is_some() {
                    return Err(ValidationError::InvalidFormat {
                        field: "booking_id".to_string(),
                        reason: "only hotel orders are charged to a booking".to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    fn total(&self) -> Money {
        self.items
            .iter()
            .map(|item| item.unit_price.multiply_quantity(item.quantity))
            .sum()
    }
}

// =============================================================================
// Shared Queries
// =============================================================================

pub(crate) async fn fetch_order(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Order>> {
    let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = ?1");
    let order: Option<Order> = sqlx::query_as(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(order)
}

pub(crate) async fn require_order(conn: &mut SqliteConnection, id: &str) -> DbResult<Order> {
    fetch_order(conn, id)
        .await?
        .ok_or_else(|| DbError::not_found("Order", id))
}

/// Orders of a booking, oldest first.
pub(crate) async fn booking_orders(
    conn: &mut SqliteConnection,
    booking_id: &str,
) -> DbResult<Vec<Order>> {
    let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE booking_id = ?1 ORDER BY created_at");
    let orders: Vec<Order> = sqlx::query_as(&sql)
        .bind(booking_id)
        .fetch_all(&mut *conn)
        .await?;
    Ok(orders)
}

/// Orders currently carried by a bill.
pub(crate) async fn bill_orders(conn: &mut SqliteConnection, bill_id: &str) -> DbResult<Vec<Order>> {
    let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE bill_id = ?1 ORDER BY created_at");
    let orders: Vec<Order> = sqlx::query_as(&sql)
        .bind(bill_id)
        .fetch_all(&mut *conn)
        .await?;
    Ok(orders)
}

/// Moves an order from its current status to `to`.
///
/// The update is conditional on the status the caller read, so a
/// concurrent change surfaces as a precondition failure instead of being
/// overwritten. Releases the order's tables when `to` frees them and
/// returns their ids.
pub(crate) async fn transition(
    conn: &mut SqliteConnection,
    order: &Order,
    to: OrderStatus,
    bill_id: Option<&str>,
) -> DbResult<Vec<String>> {
    let now = Utc::now();
    let result = sqlx::query(
        r#"
        UPDATE orders SET status = ?3, bill_id = ?4, updated_at = ?5
        WHERE id = ?1 AND status = ?2
        "#,
    )
    .bind(&order.id)
    .bind(order.status)
    .bind(to)
    .bind(bill_id)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(CoreError::precondition(
            "Order",
            order.id.as_str(),
            format!("status changed concurrently (expected {})", order.status.as_str()),
        )
        .into());
    }

    if !to.releases_tables() {
        return Ok(Vec::new());
    }

    let tables: Vec<String> = sqlx::query_scalar(
        "SELECT table_id FROM order_tables WHERE order_id = ?1 AND released_at IS NULL ORDER BY table_id",
    )
    .bind(&order.id)
    .fetch_all(&mut *conn)
    .await?;

    sqlx::query("UPDATE order_tables SET released_at = ?2 WHERE order_id = ?1 AND released_at IS NULL")
        .bind(&order.id)
        .bind(now)
        .execute(&mut *conn)
        .await?;

    debug!(order_id = %order.id, to = to.as_str(), released = ?tables, "Order transitioned");
    Ok(tables)
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for orders, order items and held tables.
#[derive(Debug, Clone)]
pub struct OrderRepository {
    pool: SqlitePool,
    locks: Arc<LockRegistry>,
}

impl OrderRepository {
    /// Creates a new OrderRepository.
    pub fn new(pool: SqlitePool, locks: Arc<LockRegistry>) -> Self {
        OrderRepository { pool, locks }
    }

    /// Opens an order.
    ///
    /// ## Rules
    /// - Dine-in orders hold at least one table
    /// - Hotel orders are charged to a RoomBooking of the given booking that
    ///   is checked in and not checked out (`NotCheckedIn` otherwise)
    /// - Total = Σ unit price × quantity; the discount is kept separately
    pub async fn create(&self, new: &NewOrder) -> DbResult<Order> {
        new.validate()?;

        let _locks = self
            .locks
            .acquire(new.booking_id.as_deref().map(booking_key))
            .await;
        let mut tx = self.pool.begin().await?;

        if let (Some(booking_id), Some(room_booking_id)) =
            (new.booking_id.as_deref(), new.room_booking_id.as_deref())
        {
            let booking = require_booking(&mut *tx, booking_id).await?;
            if booking.tenant_id != new.tenant_id {
                return Err(CoreError::not_found("Booking", booking_id).into());
            }
            let rb = fetch_room_booking(&mut *tx, room_booking_id)
                .await?
                .filter(|rb| rb.booking_id == booking_id)
                .ok_or_else(|| CoreError::not_found("RoomBooking", room_booking_id))?;
            let marks = room_booking_marks(&mut *tx, &rb.id).await?;
            ensure_in_house(&rb.id, marks)?;
        }

        let now = Utc::now();
        let order = Order {
            id: generate_id(),
            tenant_id: new.tenant_id.clone(),
            order_type: new.order_type,
            booking_id: new.booking_id.clone(),
            room_booking_id: new.room_booking_id.clone(),
            total_cents: new.total().cents(),
            discount_cents: new.discount.cents(),
            status: OrderStatus::InProgress,
            bill_id: None,
            created_by: new.actor_id.clone(),
            created_at: now,
            updated_at: now,
        };

        debug!(id = %order.id, order_type = ?order.order_type, "Creating order");

        sqlx::query(
            r#"
            INSERT INTO orders (
                id, tenant_id, order_type, booking_id, room_booking_id,
                total_cents, discount_cents, status, bill_id,
                created_by, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, NULL, ?9, ?10, ?10)
            "#,
        )
        .bind(&order.id)
        .bind(&order.tenant_id)
        .bind(order.order_type)
        .bind(&order.booking_id)
        .bind(&order.room_booking_id)
        .bind(order.total_cents)
        .bind(order.discount_cents)
        .bind(order.status)
        .bind(&order.created_by)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        for item in &new.items {
            sqlx::query(
                r#"
                INSERT INTO order_items (
                    id, order_id, food_item_id, name_snapshot,
                    unit_price_cents, quantity, line_total_cents
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                "#,
            )
            .bind(generate_id())
            .bind(&order.id)
            .bind(&item.food_item_id)
            .bind(item.name.trim())
            .bind(item.unit_price.cents())
            .bind(item.quantity)
            .bind(item.unit_price.multiply_quantity(item.quantity).cents())
            .execute(&mut *tx)
            .await?;
        }

        for table in &new.tables {
            sqlx::query("INSERT INTO order_tables (order_id, table_id, released_at) VALUES (?1, ?2, NULL)")
                .bind(&order.id)
                .bind(table.trim())
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        info!(
            order_id = %order.id,
            total_cents = order.total_cents,
            items = new.items.len(),
            "Order created"
        );
        Ok(order)
    }

    /// Gets an order by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Order>> {
        let mut conn = self.pool.acquire().await?;
        fetch_order(&mut *conn, id).await
    }

    /// Gets the lines of an order.
    pub async fn items(&self, order_id: &str) -> DbResult<Vec<OrderItem>> {
        let items: Vec<OrderItem> = sqlx::query_as(
            r#"
            SELECT id, order_id, food_item_id, name_snapshot,
                   unit_price_cents, quantity, line_total_cents
            FROM order_items
            WHERE order_id = ?1
            ORDER BY rowid
            "#,
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(items)
    }

    /// Tables the order still holds.
    pub async fn held_tables(&self, order_id: &str) -> DbResult<Vec<String>> {
        let tables: Vec<String> = sqlx::query_scalar(
            "SELECT table_id FROM order_tables WHERE order_id = ?1 AND released_at IS NULL ORDER BY table_id",
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(tables)
    }

    /// Orders charged to a booking.
    pub async fn for_booking(&self, booking_id: &str) -> DbResult<Vec<Order>> {
        let mut conn = self.pool.acquire().await?;
        booking_orders(&mut *conn, booking_id).await
    }

    /// Moves an order through its kitchen statuses or cancels it.
    ///
    /// Returns the tables released by the change (cancellation).
    pub async fn set_status(&self, order_id: &str, status: OrderStatus) -> DbResult<Vec<String>> {
        if matches!(status, OrderStatus::Billed | OrderStatus::Settled) {
            return Err(CoreError::precondition(
                "Order",
                order_id,
                format!("{} is set by billing", status.as_str()),
            )
            .into());
        }

        let _locks = self.locks.acquire([order_key(order_id)]).await;
        let mut tx = self.pool.begin().await?;

        let order = require_order(&mut *tx, order_id).await?;
        if order.status.releases_tables() {
            return Err(CoreError::precondition(
                "Order",
                order_id,
                format!("order is {}", order.status.as_str()),
            )
            .into());
        }

        let released = transition(&mut *tx, &order, status, None).await?;
        tx.commit().await?;

        info!(order_id = %order_id, status = status.as_str(), "Order status updated");
        Ok(released)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::test_support::{at, dish, guests, line, seed_room, setup};

    fn dine_in(tenant: &str, tables: &[&str]) -> NewOrder {
        NewOrder {
            tenant_id: tenant.to_string(),
            order_type: OrderType::DineIn,
            booking_id: None,
            room_booking_id: None,
            tables: tables.iter().map(|t| t.to_string()).collect(),
            items: vec![dish("Dal", 250_00, 2), dish("Naan", 40_00, 3)],
            discount: Money::zero(),
            actor_id: "waiter".to_string(),
        }
    }

    #[tokio::test]
    async fn test_create_dine_in() {
        let (db, tenant) = setup().await;
        let order = db.orders().create(&dine_in(&tenant, &["T1", "T2"])).await.unwrap();

        assert_eq!(order.total_cents, 620_00);
        assert_eq!(order.status, OrderStatus::InProgress);

        let items = db.orders().items(&order.id).await.unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].line_total_cents, 500_00);
        assert_eq!(db.orders().held_tables(&order.id).await.unwrap(), vec!["T1", "T2"]);
    }

    #[tokio::test]
    async fn test_dine_in_requires_table() {
        let (db, tenant) = setup().await;
        let err = db.orders().create(&dine_in(&tenant, &[])).await.unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_take_away_cannot_reference_booking() {
        let (db, tenant) = setup().await;
        let mut order = dine_in(&tenant, &[]);
        order.order_type = OrderType::TakeAway;
        order.booking_id = Some("b-1".to_string());

        let err = db.orders().create(&order).await.unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");

        order.booking_id = None;
        db.orders().create(&order).await.unwrap();
    }

    #[tokio::test]
    async fn test_hotel_order_requires_in_house_room() {
        let (db, tenant) = setup().await;
        let room = seed_room(&db, &tenant, "101", 5_000_00).await;
        let booking = db
            .bookings()
            .allocate(&tenant, &guests(&["g1"]), &[line(&room, 10, 12)], "desk")
            .await
            .unwrap();
        let rb = db.bookings().room_bookings(&booking.id).await.unwrap().remove(0);

        let order = NewOrder {
            order_type: OrderType::Hotel,
            booking_id: Some(booking.id.clone()),
            room_booking_id: Some(rb.id.clone()),
            ..dine_in(&tenant, &[])
        };

        let err = db.orders().create(&order).await.unwrap_err();
        assert_eq!(err.code(), "NOT_CHECKED_IN");

        db.stays()
            .check_in(&rb.id, &guests(&["g1"]), "desk", at(2024, 1, 10, 14, 0))
            .await
            .unwrap();
        let created = db.orders().create(&order).await.unwrap();
        assert_eq!(created.booking_id.as_deref(), Some(booking.id.as_str()));

        let wrong = NewOrder {
            room_booking_id: Some("someone-else".to_string()),
            ..order.clone()
        };
        let err = db.orders().create(&wrong).await.unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");

        assert_eq!(db.orders().for_booking(&booking.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_cancel_releases_tables() {
        let (db, tenant) = setup().await;
        let order = db.orders().create(&dine_in(&tenant, &["T2", "T1"])).await.unwrap();

        let released = db.orders().set_status(&order.id, OrderStatus::Kot).await.unwrap();
        assert!(released.is_empty());

        let released = db
            .orders()
            .set_status(&order.id, OrderStatus::Cancelled)
            .await
            .unwrap();
        assert_eq!(released, vec!["T1", "T2"]);
        assert!(db.orders().held_tables(&order.id).await.unwrap().is_empty());

        let err = db
            .orders()
            .set_status(&order.id, OrderStatus::Served)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "PRECONDITION_FAILED");
    }

    #[tokio::test]
    async fn test_billed_is_reserved_for_billing() {
        let (db, tenant) = setup().await;
        let order = db.orders().create(&dine_in(&tenant, &["T1"])).await.unwrap();
        let err = db
            .orders()
            .set_status(&order.id, OrderStatus::Billed)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "PRECONDITION_FAILED");
    }
}
