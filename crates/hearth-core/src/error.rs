//! # Error Types
//!
//! Domain-specific error types for hearth-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  hearth-core errors (this file)                                        │
//! │  ├── CoreError        - Business rule violations                       │
//! │  └── ValidationError  - Malformed input, rejected before any write     │
//! │                                                                         │
//! │  hearth-db errors (separate crate)                                     │
//! │  └── DbError          - Storage failures + DbError::Domain(CoreError)  │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → DbError → request layer           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! None of these errors is retried by the core. Every one of them is caused
//! by caller input or a legitimate business-state conflict.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::money::Money;
use crate::types::BillStatus;

// =============================================================================
// Core Error
// =============================================================================

/// Core business logic errors.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Referenced entity does not exist (or belongs to another tenant).
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Requested room interval overlaps a live allocation.
    ///
    /// ## User Workflow
    /// ```text
    /// Allocate room 101 [10 Jan, 12 Jan)
    ///      │
    ///      ▼
    /// Existing live RoomBooking on 101 [11 Jan, 13 Jan)
    ///      │
    ///      ▼
    /// Conflict { room_id: "101", start: 10 Jan, end: 12 Jan }
    ///      │
    ///      ▼
    /// Desk picks another room or other dates
    /// ```
    #[error("Room {room_id} is already allocated between {start} and {end}")]
    Conflict {
        room_id: String,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    /// Illegal lifecycle transition (double check-out, check-in on a
    /// cancelled booking, cancelling an occupied booking, ...).
    #[error("{entity} {id}: {reason}")]
    Precondition {
        entity: String,
        id: String,
        reason: String,
    },

    /// Service usage recorded against a stay that is not in progress.
    #[error("Room booking {room_booking_id} is not checked in")]
    NotCheckedIn { room_booking_id: String },

    /// Payment larger than what is still owed on the bill.
    #[error("Payment of {amount} exceeds remaining balance {remaining} on bill {bill_id}")]
    Overpayment {
        bill_id: String,
        amount: Money,
        remaining: Money,
    },

    /// Bill is paid or cancelled and accepts no further payments.
    #[error("Bill {bill_id} is {status} and accepts no payments")]
    BillClosed { bill_id: String, status: BillStatus },

    /// The order or booking already has a live bill.
    #[error("{source_kind} {source_id} is already billed")]
    AlreadyBilled {
        source_kind: String,
        source_id: String,
    },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl CoreError {
    /// Creates a NotFound error for a given entity type and ID.
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        CoreError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Creates a Precondition error.
    pub fn precondition(
        entity: impl Into<String>,
        id: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        CoreError::Precondition {
            entity: entity.into(),
            id: id.into(),
            reason: reason.into(),
        }
    }

    /// Stable machine-readable code for the request layer.
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::NotFound { .. } => "NOT_FOUND",
            CoreError::Conflict { .. } => "CONFLICT",
            CoreError::Precondition { .. } => "PRECONDITION_FAILED",
            CoreError::NotCheckedIn { .. } => "NOT_CHECKED_IN",
            CoreError::Overpayment { .. } => "OVERPAYMENT",
            CoreError::BillClosed { .. } => "BILL_CLOSED",
            CoreError::AlreadyBilled { .. } => "ALREADY_BILLED",
            CoreError::Validation(_) => "VALIDATION_ERROR",
        }
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// Raised before any state is touched.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be strictly positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Value must not be negative.
    #[error("{field} must not be negative")]
    Negative { field: String },

    /// Interval with `start >= end`.
    #[error("{field}: start {start} must be before end {end}")]
    InvalidInterval {
        field: String,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    /// Invalid format (e.g., invalid UUID, unknown enum value).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Duplicate value within one request.
    #[error("{field} '{value}' appears more than once")]
    Duplicate { field: String, value: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overpayment_message() {
        let err = CoreError::Overpayment {
            bill_id: "b-1".to_string(),
            amount: Money::from_cents(400_000),
            remaining: Money::from_cents(360_000),
        };
        assert_eq!(
            err.to_string(),
            "Payment of ₹4000.00 exceeds remaining balance ₹3600.00 on bill b-1"
        );
        assert_eq!(err.code(), "OVERPAYMENT");
    }

    #[test]
    fn test_bill_closed_message() {
        let err = CoreError::BillClosed {
            bill_id: "b-1".to_string(),
            status: BillStatus::Paid,
        };
        assert_eq!(err.to_string(), "Bill b-1 is paid and accepts no payments");
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let validation_err = ValidationError::Required {
            field: "room_number".to_string(),
        };
        let core_err: CoreError = validation_err.into();
        assert!(matches!(core_err, CoreError::Validation(_)));
        assert_eq!(core_err.code(), "VALIDATION_ERROR");
    }
}
