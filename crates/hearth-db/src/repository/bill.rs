//! # Bill Repository (Billing Aggregator)
//!
//! Turns an order (restaurant bill) or a finished booking (hotel bill) into
//! an immutable, numbered, GST-taxed bill.
//!
//! ## Bill Creation
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    create(tenant, source, discounts)                    │
//! │                                                                         │
//! │  Order source (RES)                   Booking source (HOT)             │
//! │  ──────────────────                   ─────────────────────            │
//! │  lock order (+ its booking)           lock booking (+ its orders)      │
//! │  order billed/settled → AlreadyBilled live bill → AlreadyBilled        │
//! │  order cancelled → Precondition       room in-house → Precondition     │
//! │  order = payable                      room  = Σ price × nights         │
//! │                                       service = Σ usage snapshots      │
//! │                                       order = Σ unbilled orders        │
//! │       │                                     │                           │
//! │       └──────────────┬──────────────────────┘                           │
//! │                      ▼                                                  │
//! │  tenant tax config → per category: discount, tier, SGST/CGST, net      │
//! │  bill_sequences[tenant, type] += 1  → bill_number, RES|HOT/n/id        │
//! │  INSERT bill                                                           │
//! │  side effects: included orders → billed (tables released)             │
//! │  COMMIT                                                                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Bills point at their source by id only. Numbers come from a counter that
//! never goes backwards, so a cancelled bill's number is never reused.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::{SqliteConnection, SqlitePool};
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use crate::lock::{bill_key, booking_key, order_key, LockRegistry};
use crate::repository::booking::{fetch_room_bookings, require_booking};
use crate::repository::order::{
    bill_orders, booking_orders, fetch_order, require_order, transition,
};
use crate::repository::payment::settle_bill_orders;
use crate::repository::stay::{fetch_check_in, fetch_check_out, fetch_usages};
use crate::repository::tenant::fetch_tax_config;
use hearth_core::billing::{
    billable_nights, gst_invoice_number, hotel_totals, restaurant_totals, BillTotals, Discounts,
    HotelCharges,
};
use hearth_core::ledger::derive_payment_status;
use hearth_core::types::generate_id;
use hearth_core::validation::{validate_actor, validate_gstin};
use hearth_core::{
    Bill, BillStatus, BillType, BookingStatus, CoreError, Money, Order, OrderStatus,
};

pub(crate) const BILL_COLUMNS: &str = r#"
    id, tenant_id, bill_type, bill_number, gst_invoice_number, customer_gst,
    order_id, booking_id,
    total_cents, discount_cents, discounted_amount_cents,
    room_sgst_cents, room_cgst_cents,
    order_sgst_cents, order_cgst_cents,
    service_sgst_cents, service_cgst_cents,
    sgst_cents, cgst_cents, net_cents,
    status, created_by, created_at, modified_by, modified_at
"#;

/// What a bill is raised for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum BillSource {
    /// Restaurant bill for one order.
    Order(String),
    /// Hotel bill for a booking's stays, services and unbilled orders.
    Booking(String),
}

/// A new bill and the dine-in tables its side effects released.
#[derive(Debug, Clone)]
pub struct CreatedBill {
    pub bill: Bill,
    pub released_tables: Vec<String>,
}

// =============================================================================
// Shared Queries
// =============================================================================

pub(crate) async fn fetch_bill(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Bill>> {
    let sql = format!("SELECT {BILL_COLUMNS} FROM bills WHERE id = ?1");
    let bill: Option<Bill> = sqlx::query_as(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(bill)
}

pub(crate) async fn require_bill(conn: &mut SqliteConnection, id: &str) -> DbResult<Bill> {
    fetch_bill(conn, id)
        .await?
        .ok_or_else(|| DbError::not_found("Bill", id))
}

/// Next number in the tenant's sequence for `bill_type`, starting at 1.
async fn next_bill_number(
    conn: &mut SqliteConnection,
    tenant_id: &str,
    bill_type: BillType,
) -> DbResult<i64> {
    let number: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO bill_sequences (tenant_id, bill_type, last_value)
        VALUES (?1, ?2, 1)
        ON CONFLICT (tenant_id, bill_type) DO UPDATE SET last_value = last_value + 1
        RETURNING last_value
        "#,
    )
    .bind(tenant_id)
    .bind(bill_type)
    .fetch_one(&mut *conn)
    .await?;
    Ok(number)
}

async fn has_live_bill(conn: &mut SqliteConnection, column: &str, source_id: &str) -> DbResult<bool> {
    let sql = format!("SELECT COUNT(*) FROM bills WHERE {column} = ?1 AND status != 'cancelled'");
    let live: i64 = sqlx::query_scalar(&sql)
        .bind(source_id)
        .fetch_one(&mut *conn)
        .await?;
    Ok(live > 0)
}

async fn room_price(conn: &mut SqliteConnection, room_id: &str) -> DbResult<Money> {
    let cents: Option<i64> = sqlx::query_scalar("SELECT price_cents FROM rooms WHERE id = ?1")
        .bind(room_id)
        .fetch_optional(&mut *conn)
        .await?;
    cents
        .map(Money::from_cents)
        .ok_or_else(|| DbError::not_found("Room", room_id))
}

async fn insert_bill(
    conn: &mut SqliteConnection,
    tenant_id: &str,
    bill_type: BillType,
    source: &BillSource,
    totals: &BillTotals,
    customer_gst: Option<&str>,
    actor_id: &str,
) -> DbResult<Bill> {
    let id = generate_id();
    let bill_number = next_bill_number(conn, tenant_id, bill_type).await?;
    let (order_id, booking_id) = match source {
        BillSource::Order(id) => (Some(id.clone()), None),
        BillSource::Booking(id) => (None, Some(id.clone())),
    };

    let bill = Bill {
        gst_invoice_number: gst_invoice_number(bill_type, bill_number, &id),
        customer_gst: customer_gst.map(str::to_string),
        id,
        tenant_id: tenant_id.to_string(),
        bill_type,
        bill_number,
        order_id,
        booking_id,
        total_cents: totals.total.cents(),
        discount_cents: totals.discount.cents(),
        discounted_amount_cents: totals.discounted_amount.cents(),
        room_sgst_cents: totals.room.sgst.cents(),
        room_cgst_cents: totals.room.cgst.cents(),
        order_sgst_cents: totals.order.sgst.cents(),
        order_cgst_cents: totals.order.cgst.cents(),
        service_sgst_cents: totals.service.sgst.cents(),
        service_cgst_cents: totals.service.cgst.cents(),
        sgst_cents: totals.sgst.cents(),
        cgst_cents: totals.cgst.cents(),
        net_cents: totals.net.cents(),
        status: derive_payment_status(Money::zero(), totals.net),
        created_by: actor_id.to_string(),
        created_at: Utc::now(),
        modified_by: None,
        modified_at: None,
    };

    sqlx::query(
        r#"
        INSERT INTO bills (
            id, tenant_id, bill_type, bill_number, gst_invoice_number, customer_gst,
            order_id, booking_id,
            total_cents, discount_cents, discounted_amount_cents,
            room_sgst_cents, room_cgst_cents,
            order_sgst_cents, order_cgst_cents,
            service_sgst_cents, service_cgst_cents,
            sgst_cents, cgst_cents, net_cents,
            status, created_by, created_at
        ) VALUES (
            ?1, ?2, ?3, ?4, ?5, ?6,
            ?7, ?8,
            ?9, ?10, ?11,
            ?12, ?13,
            ?14, ?15,
            ?16, ?17,
            ?18, ?19, ?20,
            ?21, ?22, ?23
        )
        "#,
    )
    .bind(&bill.id)
    .bind(&bill.tenant_id)
    .bind(bill.bill_type)
    .bind(bill.bill_number)
    .bind(&bill.gst_invoice_number)
    .bind(&bill.customer_gst)
    .bind(&bill.order_id)
    .bind(&bill.booking_id)
    .bind(bill.total_cents)
    .bind(bill.discount_cents)
    .bind(bill.discounted_amount_cents)
    .bind(bill.room_sgst_cents)
    .bind(bill.room_cgst_cents)
    .bind(bill.order_sgst_cents)
    .bind(bill.order_cgst_cents)
    .bind(bill.service_sgst_cents)
    .bind(bill.service_cgst_cents)
    .bind(bill.sgst_cents)
    .bind(bill.cgst_cents)
    .bind(bill.net_cents)
    .bind(bill.status)
    .bind(&bill.created_by)
    .bind(bill.created_at)
    .execute(&mut *conn)
    .await?;

    Ok(bill)
}

// =============================================================================
// Side Effects
// =============================================================================

/// Puts the included orders on the bill: each becomes `billed` and
/// releases its tables. Returns the released table ids.
pub(crate) async fn apply_bill_side_effects(
    conn: &mut SqliteConnection,
    bill_id: &str,
    orders: &[Order],
) -> DbResult<Vec<String>> {
    let mut released = Vec::new();
    for order in orders {
        released.extend(transition(&mut *conn, order, OrderStatus::Billed, Some(bill_id)).await?);
    }
    Ok(released)
}

/// Takes a cancelled bill's orders off it; they return to `served` and can
/// be billed again.
async fn revert_bill_side_effects(conn: &mut SqliteConnection, bill_id: &str) -> DbResult<usize> {
    let orders = bill_orders(&mut *conn, bill_id).await?;
    for order in &orders {
        transition(&mut *conn, order, OrderStatus::Served, None).await?;
    }
    Ok(orders.len())
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for bills.
#[derive(Debug, Clone)]
pub struct BillRepository {
    pool: SqlitePool,
    locks: Arc<LockRegistry>,
}

impl BillRepository {
    /// Creates a new BillRepository.
    pub fn new(pool: SqlitePool, locks: Arc<LockRegistry>) -> Self {
        BillRepository { pool, locks }
    }

    /// Creates a bill for an order or a booking.
    pub async fn create(
        &self,
        tenant_id: &str,
        source: &BillSource,
        discounts: &Discounts,
        customer_gst: Option<&str>,
        actor_id: &str,
    ) -> DbResult<CreatedBill> {
        match source {
            BillSource::Order(id) => {
                self.create_for_order(tenant_id, id, discounts, customer_gst, actor_id)
                    .await
            }
            BillSource::Booking(id) => {
                self.create_for_booking(tenant_id, id, discounts, customer_gst, actor_id)
                    .await
            }
        }
    }

    /// Creates a restaurant (RES) bill for one order.
    ///
    /// ## Errors
    /// - `AlreadyBilled` when the order is billed/settled or has a live bill
    /// - `Precondition` for a cancelled order
    /// - `Validation` for negative discounts or a malformed GSTIN
    pub async fn create_for_order(
        &self,
        tenant_id: &str,
        order_id: &str,
        discounts: &Discounts,
        customer_gst: Option<&str>,
        actor_id: &str,
    ) -> DbResult<CreatedBill> {
        validate_actor(actor_id)?;
        discounts.validate()?;
        if let Some(gstin) = customer_gst {
            validate_gstin(gstin)?;
        }

        // A room-service order billed on its own also excludes it from the
        // booking's hotel bill, so both locks are needed.
        let booking_id = {
            let mut conn = self.pool.acquire().await?;
            require_order(&mut *conn, order_id).await?.booking_id
        };
        let keys = std::iter::once(order_key(order_id)).chain(booking_id.as_deref().map(booking_key));
        let _locks = self.locks.acquire(keys).await;
        let mut tx = self.pool.begin().await?;

        let order = fetch_order(&mut *tx, order_id)
            .await?
            .filter(|o| o.tenant_id == tenant_id)
            .ok_or_else(|| CoreError::not_found("Order", order_id))?;

        if matches!(order.status, OrderStatus::Billed | OrderStatus::Settled)
            || has_live_bill(&mut *tx, "order_id", order_id).await?
        {
            return Err(CoreError::AlreadyBilled {
                source_kind: "Order".to_string(),
                source_id: order_id.to_string(),
            }
            .into());
        }
        if order.status == OrderStatus::Cancelled {
            return Err(CoreError::precondition("Order", order_id, "order is cancelled").into());
        }

        let config = fetch_tax_config(&mut *tx, tenant_id).await?;
        let totals = restaurant_totals(order.payable(), discounts, &config)?;

        let source = BillSource::Order(order_id.to_string());
        let bill = insert_bill(
            &mut *tx,
            tenant_id,
            BillType::Restaurant,
            &source,
            &totals,
            customer_gst,
            actor_id,
        )
        .await?;
        let released_tables = apply_bill_side_effects(&mut *tx, &bill.id, &[order]).await?;
        if bill.status == BillStatus::Paid {
            settle_bill_orders(&mut *tx, &bill.id).await?;
        }

        tx.commit().await?;
        info!(
            bill_id = %bill.id,
            invoice = %bill.gst_invoice_number,
            net_cents = bill.net_cents,
            released_tables = released_tables.len(),
            "Restaurant bill created"
        );
        Ok(CreatedBill {
            bill,
            released_tables,
        })
    }

    /// Creates a hotel (HOT) bill for a booking.
    ///
    /// Rooms are charged for completed stays only; every room that checked
    /// in must also have checked out. The booking status is not changed.
    ///
    /// ## Errors
    /// - `AlreadyBilled` when the booking has a live bill
    /// - `Precondition` for an in-house room, no completed stay, or a
    ///   cancelled / no-show booking
    pub async fn create_for_booking(
        &self,
        tenant_id: &str,
        booking_id: &str,
        discounts: &Discounts,
        customer_gst: Option<&str>,
        actor_id: &str,
    ) -> DbResult<CreatedBill> {
        validate_actor(actor_id)?;
        discounts.validate()?;
        if let Some(gstin) = customer_gst {
            validate_gstin(gstin)?;
        }

        let order_ids: Vec<String> = {
            let mut conn = self.pool.acquire().await?;
            booking_orders(&mut *conn, booking_id)
                .await?
                .into_iter()
                .map(|o| o.id)
                .collect()
        };
        let keys = std::iter::once(booking_key(booking_id))
            .chain(order_ids.iter().map(|id| order_key(id)));
        let _locks = self.locks.acquire(keys).await;
        let mut tx = self.pool.begin().await?;

        let booking = require_booking(&mut *tx, booking_id).await?;
        if booking.tenant_id != tenant_id {
            return Err(CoreError::not_found("Booking", booking_id).into());
        }
        if matches!(booking.status, BookingStatus::Cancelled | BookingStatus::NoShow) {
            return Err(CoreError::precondition(
                "Booking",
                booking_id,
                format!("booking is {}", booking.status),
            )
            .into());
        }
        if has_live_bill(&mut *tx, "booking_id", booking_id).await? {
            return Err(CoreError::AlreadyBilled {
                source_kind: "Booking".to_string(),
                source_id: booking_id.to_string(),
            }
            .into());
        }

        let config = fetch_tax_config(&mut *tx, tenant_id).await?;
        let mut charges = HotelCharges::default();
        let mut completed = 0usize;

        for rb in fetch_room_bookings(&mut *tx, booking_id).await? {
            let check_in = fetch_check_in(&mut *tx, &rb.id).await?;
            let check_out = fetch_check_out(&mut *tx, &rb.id).await?;
            match (check_in, check_out) {
                (Some(ci), Some(co)) => {
                    let nights =
                        billable_nights(ci.checked_in_at, co.checked_out_at, config.day_calculation);
                    let price = room_price(&mut *tx, &rb.room_id).await?;
                    charges.room += price * nights;
                    completed += 1;
                    debug!(room_booking_id = %rb.id, nights, price = %price, "Room charge");
                }
                (Some(_), None) => {
                    return Err(CoreError::precondition(
                        "Booking",
                        booking_id,
                        format!("room booking {} is checked in but not checked out", rb.id),
                    )
                    .into());
                }
                _ => {}
            }
            charges.service += fetch_usages(&mut *tx, &rb.id)
                .await?
                .iter()
                .map(|u| u.price())
                .sum::<Money>();
        }

        if completed == 0 {
            return Err(CoreError::precondition("Booking", booking_id, "no room has checked out").into());
        }

        let orders: Vec<Order> = booking_orders(&mut *tx, booking_id)
            .await?
            .into_iter()
            .filter(|o| o.status.is_billable())
            .collect();
        charges.order = orders.iter().map(Order::payable).sum();

        let totals = hotel_totals(charges, discounts, &config)?;

        let source = BillSource::Booking(booking_id.to_string());
        let bill = insert_bill(
            &mut *tx,
            tenant_id,
            BillType::Hotel,
            &source,
            &totals,
            customer_gst,
            actor_id,
        )
        .await?;
        let released_tables = apply_bill_side_effects(&mut *tx, &bill.id, &orders).await?;
        if bill.status == BillStatus::Paid {
            settle_bill_orders(&mut *tx, &bill.id).await?;
        }

        tx.commit().await?;
        info!(
            bill_id = %bill.id,
            invoice = %bill.gst_invoice_number,
            rooms = completed,
            orders = orders.len(),
            net_cents = bill.net_cents,
            "Hotel bill created"
        );
        Ok(CreatedBill {
            bill,
            released_tables,
        })
    }

    /// Gets a bill by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Bill>> {
        let mut conn = self.pool.acquire().await?;
        fetch_bill(&mut *conn, id).await
    }

    /// Bills raised for an order, including cancelled ones.
    pub async fn for_order(&self, order_id: &str) -> DbResult<Vec<Bill>> {
        self.by_source("order_id", order_id).await
    }

    /// Bills raised for a booking, including cancelled ones.
    pub async fn for_booking(&self, booking_id: &str) -> DbResult<Vec<Bill>> {
        self.by_source("booking_id", booking_id).await
    }

    async fn by_source(&self, column: &str, source_id: &str) -> DbResult<Vec<Bill>> {
        let sql = format!("SELECT {BILL_COLUMNS} FROM bills WHERE {column} = ?1 ORDER BY bill_number");
        let bills: Vec<Bill> = sqlx::query_as(&sql)
            .bind(source_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(bills)
    }

    /// Cancels an unpaid bill.
    ///
    /// Its orders go back to `served` so the source can be billed again.
    /// The bill keeps its number.
    pub async fn cancel(&self, bill_id: &str, actor_id: &str) -> DbResult<()> {
        validate_actor(actor_id)?;

        let source_key = {
            let mut conn = self.pool.acquire().await?;
            let bill = require_bill(&mut *conn, bill_id).await?;
            match (bill.order_id, bill.booking_id) {
                (Some(order_id), _) => Some(order_key(&order_id)),
                (_, Some(booking_id)) => Some(booking_key(&booking_id)),
                _ => None,
            }
        };
        let keys = std::iter::once(bill_key(bill_id)).chain(source_key);
        let _locks = self.locks.acquire(keys).await;
        let mut tx = self.pool.begin().await?;

        let bill = require_bill(&mut *tx, bill_id).await?;
        if bill.status != BillStatus::Unpaid {
            return Err(CoreError::precondition(
                "Bill",
                bill_id,
                format!("only unpaid bills can be cancelled (bill is {})", bill.status),
            )
            .into());
        }

        sqlx::query(
            "UPDATE bills SET status = ?2, modified_by = ?3, modified_at = ?4 WHERE id = ?1",
        )
        .bind(bill_id)
        .bind(BillStatus::Cancelled)
        .bind(actor_id)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;
        let reverted = revert_bill_side_effects(&mut *tx, bill_id).await?;

        tx.commit().await?;
        info!(
            bill_id = %bill_id,
            invoice = %bill.gst_invoice_number,
            cancelled_by = %actor_id,
            orders_reverted = reverted,
            "Bill cancelled"
        );
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
