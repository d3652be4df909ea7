//! # hearth-core: Pure Business Logic for Hearth
//!
//! Room allocation, stay lifecycle, tax, billing and payment rules for a
//! multi-tenant hotel + restaurant operator, as pure functions with zero I/O.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Hearth Architecture                             │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │             Request layer (front desk, POS, HTTP)               │   │
//! │  │   Allocate ──► CheckIn/CheckOut ──► CreateBill ──► Payment      │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ hearth-core (THIS CRATE) ★                      │   │
//! │  │                                                                 │   │
//! │  │   ┌──────────┐ ┌──────────┐ ┌──────────┐ ┌────────┐ ┌───────┐  │   │
//! │  │   │allocation│ │lifecycle │ │   tax    │ │billing │ │ledger │  │   │
//! │  │   │ overlaps │ │ derive   │ │ tiers    │ │ totals │ │status │  │   │
//! │  │   └──────────┘ └──────────┘ └──────────┘ └────────┘ └───────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                   hearth-db (Database Layer)                    │   │
//! │  │        SQLite repositories, transactions, room/bill locks       │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (Room, Booking, RoomBooking, Order, Bill, ...)
//! - [`money`] - Money type with integer arithmetic (no floating point!)
//! - [`tax`] - Tenant tax configuration and the SGST/CGST engine
//! - [`allocation`] - Half-open interval overlap and conflict detection
//! - [`lifecycle`] - Check-in/check-out preconditions and booking status
//! - [`billing`] - Per-category charges, bill totals, invoice numbers
//! - [`ledger`] - Payment acceptance and bill status derivation
//! - [`error`] - Domain error types
//! - [`validation`] - Input validation
//!
//! ## Example Usage
//!
//! ```rust
//! use hearth_core::money::Money;
//! use hearth_core::tax::{compute_tax, TaxCategory, TenantTaxConfig};
//!
//! let config = TenantTaxConfig::default();
//!
//! // ₹5,000.00 room night, below the ₹7,500.00 threshold: 6% + 6%
//! let tax = compute_tax(Money::from_cents(500_000), &config, TaxCategory::Room);
//! assert_eq!(tax.sgst.cents(), 30_000);
//! assert_eq!(tax.cgst.cents(), 30_000);
//! assert_eq!(tax.net().cents(), 560_000);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod allocation;
pub mod billing;
pub mod error;
pub mod ledger;
pub mod lifecycle;
pub mod money;
pub mod tax;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ValidationError};
pub use money::Money;
pub use tax::{RatePair, TaxBreakdown, TaxCategory, TenantTaxConfig, TieredRate};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Tenant used by the seed binary and single-property deployments.
pub const DEFAULT_TENANT_ID: &str = "00000000-0000-0000-0000-000000000001";

/// Maximum rooms a single allocation request may reserve.
///
/// ## Business Reason
/// Group bookings larger than this go through the sales team, not the desk.
pub const MAX_ROOMS_PER_BOOKING: usize = 50;

/// Maximum quantity of a single food item on an order.
pub const MAX_ITEM_QUANTITY: i64 = 999;

/// Hour of day (local to the stored timestamps) after which a check-out
/// counts an extra night under the hotel-standard calculation.
pub const STANDARD_CHECKOUT_HOUR: u32 = 12;
