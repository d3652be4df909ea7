//! # Payment Repository (Payment Ledger)
//!
//! Append-only payments against bills, and the bill status they imply.
//!
//! ## Recording a Payment
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  record(bill, amount)                                                   │
//! │       │                                                                 │
//! │       ├── lock bill                                                    │
//! │       ├── BEGIN                                                        │
//! │       ├── paid = Σ payments                                            │
//! │       ├── status paid/cancelled     → BillClosed                       │
//! │       ├── amount <= 0               → Validation                       │
//! │       ├── amount > net - paid       → Overpayment                      │
//! │       ├── INSERT payment                                               │
//! │       ├── status = derive(paid + amount, net)                          │
//! │       ├── paid? → billed orders become settled                         │
//! │       └── COMMIT                                                       │
//! │                                                                         │
//! │  Σ payments never exceeds the bill's net amount.                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::DbResult;
use crate::lock::{bill_key, LockRegistry};
use crate::repository::bill::require_bill;
use crate::repository::order::{bill_orders, transition};
use hearth_core::ledger::{accept_payment, derive_payment_status, PaymentSummary};
use hearth_core::types::generate_id;
use hearth_core::validation::validate_actor;
use hearth_core::{BillPayment, BillStatus, Money, OrderStatus, PaymentMethod, ValidationError};

const PAYMENT_COLUMNS: &str =
    "id, bill_id, method, amount_cents, payment_details, received_by, created_at";

// =============================================================================
// Shared Queries
// =============================================================================

async fn paid_so_far(conn: &mut SqliteConnection, bill_id: &str) -> DbResult<Money> {
    let cents: i64 =
        sqlx::query_scalar("SELECT COALESCE(SUM(amount_cents), 0) FROM bill_payments WHERE bill_id = ?1")
            .bind(bill_id)
            .fetch_one(&mut *conn)
            .await?;
    Ok(Money::from_cents(cents))
}

/// `actor_id` of `None` keeps the previous `modified_by`.
async fn set_bill_status(
    conn: &mut SqliteConnection,
    bill_id: &str,
    status: BillStatus,
    actor_id: Option<&str>,
) -> DbResult<()> {
    sqlx::query(
        r#"
        UPDATE bills
        SET status = ?2, modified_by = COALESCE(?3, modified_by), modified_at = ?4
        WHERE id = ?1
        "#,
    )
    .bind(bill_id)
    .bind(status)
    .bind(actor_id)
    .bind(Utc::now())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Payment details must be a JSON object; stored as its text form.
fn encode_details(details: Option<&serde_json::Value>) -> DbResult<Option<String>> {
    match details {
        None => Ok(None),
        Some(value @ serde_json::Value::Object(_)) => Ok(Some(value.to_string())),
        Some(_) => Err(ValidationError::InvalidFormat {
            field: "payment_details".to_string(),
            reason: "must be a JSON object".to_string(),
        }
        .into()),
    }
}

/// Settles every order still `billed` on a paid bill. Returns how many
/// orders moved.
pub(crate) async fn settle_bill_orders(conn: &mut SqliteConnection, bill_id: &str) -> DbResult<usize> {
    let mut settled = 0;
    for order in bill_orders(&mut *conn, bill_id).await? {
        if order.status == OrderStatus::Billed {
            transition(&mut *conn, &order, OrderStatus::Settled, Some(bill_id)).await?;
            settled += 1;
        }
    }
    if settled > 0 {
        debug!(bill_id = %bill_id, settled, "Orders settled");
    }
    Ok(settled)
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for bill payments.
#[derive(Debug, Clone)]
pub struct PaymentRepository {
    pool: SqlitePool,
    locks: Arc<LockRegistry>,
}

impl PaymentRepository {
    /// Creates a new PaymentRepository.
    pub fn new(pool: SqlitePool, locks: Arc<LockRegistry>) -> Self {
        PaymentRepository { pool, locks }
    }

    /// Records a payment and updates the bill's status.
    ///
    /// ## Errors
    /// - `BillClosed` when the bill is paid or cancelled
    /// - `Validation` for a zero or negative amount
    /// - `Overpayment` when the amount exceeds what is still owed
    /// - `Validation` when `details` is not a JSON object
    pub async fn record(
        &self,
        bill_id: &str,
        amount: Money,
        method: PaymentMethod,
        details: Option<&serde_json::Value>,
        actor_id: &str,
    ) -> DbResult<BillPayment> {
        validate_actor(actor_id)?;
        let payment_details = encode_details(details)?;

        let _locks = self.locks.acquire([bill_key(bill_id)]).await;
        let mut tx = self.pool.begin().await?;

        let bill = require_bill(&mut *tx, bill_id).await?;
        let paid = paid_so_far(&mut *tx, bill_id).await?;
        let remaining = accept_payment(bill_id, bill.status, bill.net(), paid, amount)?;

        let payment = BillPayment {
            id: generate_id(),
            bill_id: bill_id.to_string(),
            method,
            amount_cents: amount.cents(),
            payment_details,
            received_by: actor_id.to_string(),
            created_at: Utc::now(),
        };

        sqlx::query(
            r#"
            INSERT INTO bill_payments (
                id, bill_id, method, amount_cents, payment_details, received_by, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&payment.id)
        .bind(&payment.bill_id)
        .bind(payment.method)
        .bind(payment.amount_cents)
        .bind(&payment.payment_details)
        .bind(&payment.received_by)
        .bind(payment.created_at)
        .execute(&mut *tx)
        .await?;

        let status = derive_payment_status(paid + amount, bill.net());
        set_bill_status(&mut *tx, bill_id, status, Some(actor_id)).await?;
        if status == BillStatus::Paid {
            settle_bill_orders(&mut *tx, bill_id).await?;
        }

        tx.commit().await?;
        info!(
            bill_id = %bill_id,
            payment_id = %payment.id,
            amount = %amount,
            remaining = %remaining,
            status = %status,
            "Payment recorded"
        );
        Ok(payment)
    }

    /// Payments on a bill, oldest first.
    pub async fn payments(&self, bill_id: &str) -> DbResult<Vec<BillPayment>> {
        let sql = format!(
            "SELECT {PAYMENT_COLUMNS} FROM bill_payments WHERE bill_id = ?1 ORDER BY created_at, id"
        );
        let payments: Vec<BillPayment> = sqlx::query_as(&sql)
            .bind(bill_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(payments)
    }

    pub async fn total_paid(&self, bill_id: &str) -> DbResult<Money> {
        let mut conn = self.pool.acquire().await?;
        paid_so_far(&mut *conn, bill_id).await
    }

    /// Net, paid, remaining and status of a bill.
    pub async fn summary(&self, bill_id: &str) -> DbResult<PaymentSummary> {
        let mut conn = self.pool.acquire().await?;
        let bill = require_bill(&mut *conn, bill_id).await?;
        let paid = paid_so_far(&mut *conn, bill_id).await?;
        Ok(PaymentSummary::new(bill.net(), paid, bill.status))
    }

    /// Re-derives a bill's status from its payments and stores it.
    ///
    /// Idempotent. Cancelled bills are left alone.
    pub async fn refresh_status(&self, bill_id: &str) -> DbResult<BillStatus> {
        let _locks = self.locks.acquire([bill_key(bill_id)]).await;
        let mut tx = self.pool.begin().await?;

        let bill = require_bill(&mut *tx, bill_id).await?;
        if bill.status == BillStatus::Cancelled {
            return Ok(bill.status);
        }

        let paid = paid_so_far(&mut *tx, bill_id).await?;
        let status = derive_payment_status(paid, bill.net());
        if status != bill.status {
            set_bill_status(&mut *tx, bill_id, status, None).await?;
            if status == BillStatus::Paid {
                settle_bill_orders(&mut *tx, bill_id).await?;
            }
            info!(bill_id = %bill_id, from = %bill.status, to = %status, "Bill status refreshed");
        }

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
    use crate::error::DbError;
    use crate::repository::order::NewOrder;
    use crate::repository::test_support::{completed_stay, dish, setup, setup_shared};
    use crate::Database;
    use hearth_core::billing::Discounts;
    use hearth_core::{Bill, CoreError, OrderType};

    fn rupees(r: i64) -> Money {
        Money::from_cents(r * 100)
    }

    /// ₹5,000 one-night stay, billed at ₹5,600.
    async fn hotel_bill(db: &Database, tenant: &str) -> Bill {
        let (booking, _) = completed_stay(db, tenant, "101", rupees(5000).cents()).await;
        db.bills()
            .create_for_booking(tenant, &booking.id, &Discounts::none(), None, "cashier")
            .await
            .unwrap()
            .bill
    }

    #[tokio::test]
    async fn test_full_payment() {
        let (db, tenant) = setup().await;
        let bill = hotel_bill(&db, &tenant).await;

        let payment = db
            .payments()
            .record(&bill.id, rupees(5600), PaymentMethod::Card, None, "cashier")
            .await
            .unwrap();
        assert_eq!(payment.amount(), rupees(5600));

        let stored = db.bills().get_by_id(&bill.id).await.unwrap().unwrap();
        assert_eq!(stored.status, BillStatus::Paid);

        let err = db
            .payments()
            .record(&bill.id, Money::from_cents(1), PaymentMethod::Cash, None, "cashier")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DbError::Domain(CoreError::BillClosed {
                status: BillStatus::Paid,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_partial_then_overpayment() {
        let (db, tenant) = setup().await;
        let bill = hotel_bill(&db, &tenant).await;

        db.payments()
            .record(&bill.id, rupees(2000), PaymentMethod::Upi, None, "cashier")
            .await
            .unwrap();
        let stored = db.bills().get_by_id(&bill.id).await.unwrap().unwrap();
        assert_eq!(stored.status, BillStatus::Partial);

        let err = db
            .payments()
            .record(&bill.id, rupees(4000), PaymentMethod::Cash, None, "cashier")
            .await
            .unwrap_err();
        match err {
            DbError::Domain(CoreError::Overpayment { remaining, amount, .. }) => {
                assert_eq!(remaining, rupees(3600));
                assert_eq!(amount, rupees(4000));
            }
            other => panic!("expected overpayment, got {other:?}"),
        }

        // Rejected payment leaves no trace
        assert_eq!(db.payments().payments(&bill.id).await.unwrap().len(), 1);
        assert_eq!(db.payments().total_paid(&bill.id).await.unwrap(), rupees(2000));
        let stored = db.bills().get_by_id(&bill.id).await.unwrap().unwrap();
        assert_eq!(stored.status, BillStatus::Partial);

        // The exact remainder closes it
        db.payments()
            .record(&bill.id, rupees(3600), PaymentMethod::Cash, None, "cashier")
            .await
            .unwrap();
        let summary = db.payments().summary(&bill.id).await.unwrap();
        assert_eq!(summary.paid, rupees(5600));
        assert_eq!(summary.remaining, Money::zero());
        assert_eq!(summary.status, BillStatus::Paid);
    }

    #[tokio::test]
    async fn test_payment_details_and_audit() {
        let (db, tenant) = setup().await;
        let bill = hotel_bill(&db, &tenant).await;
        assert!(bill.modified_by.is_none());

        let details = serde_json::json!({ "upi_ref": "412345678901", "vpa": "guest@okbank" });
        let payment = db
            .payments()
            .record(&bill.id, rupees(1000), PaymentMethod::Upi, Some(&details), "cashier")
            .await
            .unwrap();
        assert_eq!(payment.details(), Some(details.clone()));

        let stored = db.payments().payments(&bill.id).await.unwrap();
        assert_eq!(stored[0].details(), Some(details));
        assert_eq!(stored[0].method, PaymentMethod::Upi);

        let bill = db.bills().get_by_id(&bill.id).await.unwrap().unwrap();
        assert_eq!(bill.modified_by.as_deref(), Some("cashier"));
        assert!(bill.modified_at.is_some());

        // Only JSON objects are accepted
        let err = db
            .payments()
            .record(
                &bill.id,
                rupees(100),
                PaymentMethod::Card,
                Some(&serde_json::json!(["4242"])),
                "night-cashier",
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
        assert_eq!(db.payments().payments(&bill.id).await.unwrap().len(), 1);
        let bill = db.bills().get_by_id(&bill.id).await.unwrap().unwrap();
        assert_eq!(bill.modified_by.as_deref(), Some("cashier"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_payments_never_exceed_net() {
        let (db, tenant, _dir) = setup_shared().await;
        let bill = hotel_bill(&db, &tenant).await;

        let mut handles = Vec::new();
        for _ in 0..10 {
            let db = db.clone();
            let bill_id = bill.id.clone();
            handles.push(tokio::spawn(async move {
                db.payments()
                    .record(&bill_id, rupees(1000), PaymentMethod::Cash, None, "cashier")
                    .await
            }));
        }

        let mut accepted = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => accepted += 1,
                Err(err) => assert_eq!(err.code(), "OVERPAYMENT"),
            }
        }
        assert_eq!(accepted, 5);
        assert_eq!(db.payments().payments(&bill.id).await.unwrap().len(), 5);

        let summary = db.payments().summary(&bill.id).await.unwrap();
        assert_eq!(summary.paid, rupees(5000));
        assert_eq!(summary.remaining, rupees(600));
        assert_eq!(summary.status, BillStatus::Partial);
    }

    #[tokio::test]
    async fn test_non_positive_amount_rejected() {
        let (db, tenant) = setup().await;
        let bill = hotel_bill(&db, &tenant).await;

        for amount in [Money::zero(), Money::from_cents(-500)] {
            let err = db
                .payments()
                .record(&bill.id, amount, PaymentMethod::Cash, None, "cashier")
                .await
                .unwrap_err();
            assert_eq!(err.code(), "VALIDATION_ERROR");
        }
        assert!(db.payments().payments(&bill.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_bill_accepts_no_payment() {
        let (db, tenant) = setup().await;
        let bill = hotel_bill(&db, &tenant).await;
        db.bills().cancel(&bill.id, "manager").await.unwrap();

        let err = db
            .payments()
            .record(&bill.id, rupees(100), PaymentMethod::Cash, None, "cashier")
            .await
            .unwrap_err();
        assert_eq!(err.code(), "BILL_CLOSED");

        let summary = db.payments().summary(&bill.id).await.unwrap();
        assert_eq!(summary.status, BillStatus::Cancelled);
        assert_eq!(db.payments().refresh_status(&bill.id).await.unwrap(), BillStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_unknown_bill() {
        let (db, _) = setup().await;
        let err = db
            .payments()
            .record("missing", rupees(100), PaymentMethod::Cash, None, "cashier")
            .await
            .unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_full_payment_settles_order() {
        let (db, tenant) = setup().await;
        let order = db
            .orders()
            .create(&NewOrder {
                tenant_id: tenant.clone(),
                order_type: OrderType::TakeAway,
                booking_id: None,
                room_booking_id: None,
                tables: Vec::new(),
                items: vec![dish("Biryani", 400_00, 1)],
                discount: Money::zero(),
                actor_id: "counter".to_string(),
            })
            .await
            .unwrap();
        let bill = db
            .bills()
            .create_for_order(&tenant, &order.id, &Discounts::none(), None, "cashier")
            .await
            .unwrap()
            .bill;
        assert_eq!(bill.net(), rupees(420));

        db.payments()
            .record(&bill.id, rupees(200), PaymentMethod::Cash, None, "cashier")
            .await
            .unwrap();
        let stored = db.orders().get_by_id(&order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Billed);

        db.payments()
            .record(&bill.id, rupees(220), PaymentMethod::Cash, None, "cashier")
            .await
            .unwrap();
        let stored = db.orders().get_by_id(&order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Settled);
        assert_eq!(stored.bill_id.as_deref(), Some(bill.id.as_str()));
    }

    #[tokio::test]
    async fn test_refresh_status_is_idempotent() {
        let (db, tenant) = setup().await;
        let bill = hotel_bill(&db, &tenant).await;
        db.payments()
            .record(&bill.id, rupees(1000), PaymentMethod::Card, None, "cashier")
            .await
            .unwrap();

        // Drift the stored status, then repair it
        sqlx::query("UPDATE bills SET status = 'unpaid' WHERE id = ?1")
            .bind(&bill.id)
            .execute(db.pool())
            .await
            .unwrap();
        assert_eq!(db.payments().refresh_status(&bill.id).await.unwrap(), BillStatus::Partial);
        assert_eq!(db.payments().refresh_status(&bill.id).await.unwrap(), BillStatus::Partial);

        let stored = db.bills().get_by_id(&bill.id).await.unwrap().unwrap();
        assert_eq!(stored.status, BillStatus::Partial);
    }

    #[tokio::test]
    async fn test_settle_step_only_moves_billed_orders() {
        let (db, tenant) = setup().await;
        let order = db
            .orders()
            .create(&NewOrder {
                tenant_id: tenant.clone(),
                order_type: OrderType::Delivery,
                booking_id: None,
                room_booking_id: None,
                tables: Vec::new(),
                items: vec![dish("Kebab", 300_00, 1)],
                discount: Money::zero(),
                actor_id: "counter".to_string(),
            })
            .await
            .unwrap();
        let bill = db
            .bills()
            .create_for_order(&tenant, &order.id, &Discounts::none(), None, "cashier")
            .await
            .unwrap()
            .bill;

        let mut conn = db.pool().acquire().await.unwrap();
        assert_eq!(settle_bill_orders(&mut *conn, &bill.id).await.unwrap(), 1);
        assert_eq!(settle_bill_orders(&mut *conn, &bill.id).await.unwrap(), 0);
        drop(conn);

        let stored = db.orders().get_by_id(&order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Settled);
    }
}
