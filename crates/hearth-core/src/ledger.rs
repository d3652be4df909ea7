//! # Payment Ledger (pure part)
//!
//! Payment acceptance rules and bill status derivation.
//!
//! ## Status Derivation
//! ```text
//!   Σ payments ≥ net      ──► paid
//!   Σ payments = 0        ──► unpaid
//!   otherwise             ──► partial
//! ```
//!
//! Overpayment is rejected, never clamped, so `Σ payments ≤ net` holds for
//! every bill at all times.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::Money;
use crate::types::BillStatus;

/// Bill status as a pure function of money received versus money owed.
///
/// A zero-value bill is paid on creation.
pub fn derive_payment_status(paid: Money, net: Money) -> BillStatus {
    if paid >= net {
        BillStatus::Paid
    } else if paid.is_zero() {
        BillStatus::Unpaid
    } else {
        BillStatus::Partial
    }
}

/// Validates a payment of `amount` against a bill.
///
/// Returns the balance that will remain once the payment is recorded.
pub fn accept_payment(
    bill_id: &str,
    status: BillStatus,
    net: Money,
    paid: Money,
    amount: Money,
) -> CoreResult<Money> {
    if !status.accepts_payment() {
        return Err(CoreError::BillClosed {
            bill_id: bill_id.to_string(),
            status,
        });
    }
    if !amount.is_positive() {
        return Err(ValidationError::MustBePositive {
            field: "amount".to_string(),
        }
        .into());
    }

    let remaining = net - paid;
    if amount > remaining {
        return Err(CoreError::Overpayment {
            bill_id: bill_id.to_string(),
            amount,
            remaining,
        });
    }
    Ok(remaining - amount)
}

/// Balance summary for a bill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PaymentSummary {
    pub net: Money,
    pub paid: Money,
    pub remaining: Money,
    pub status: BillStatus,
}

impl PaymentSummary {
    /// Summarizes a bill. A cancelled bill keeps its status.
    pub fn new(net: Money, paid: Money, current: BillStatus) -> Self {
        let status = if current == BillStatus::Cancelled {
            current
        } else {
            derive_payment_status(paid, net)
        };
        PaymentSummary {
            net,
            paid,
            remaining: net - paid,
            status,
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
