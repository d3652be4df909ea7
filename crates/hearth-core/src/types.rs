//! # Domain Types
//!
//! Core domain types used throughout Hearth.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  Tenant ──owns──► Room            Booking ──owns──► RoomBooking         │
//! │                    ▲                                 │   │   │          │
//! │                    └──── back-reference ─────────────┘   │   │          │
//! │                                                 CheckIn ◄┘   │          │
//! │                                                 CheckOut ◄───┤          │
//! │                                             ServiceUsage ◄───┘          │
//! │                                                                         │
//! │  Order (dine-in / hotel / take-away / delivery / online)                │
//! │                                                                         │
//! │  Bill ──weak──► Order | Booking        BillPayment ──► Bill             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Identity
//! Every entity has a UUID v4 `id`. Rooms also carry a business identifier
//! (`room_number`, unique per tenant) and bills a per-tenant sequence number.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use ts_rs::TS;
use uuid::Uuid;

use crate::money::Money;

/// Generates a new entity ID.
pub fn generate_id() -> String {
    Uuid::new_v4().to_string()
}

// =============================================================================
// Tax Rate
// =============================================================================

/// Tax rate represented in basis points (bps).
///
/// ## Why Basis Points?
/// 1 basis point = 0.01%. GST slabs such as 2.5% become `250` and stay
/// exact in integer math.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TaxRate(u32);

impl TaxRate {
    /// Creates a tax rate from basis points.
    #[inline]
    pub const fn from_bps(bps: u32) -> Self {
        TaxRate(bps)
    }

    /// Returns the rate in basis points.
    #[inline]
    pub const fn bps(&self) -> u32 {
        self.0
    }

    /// Returns the rate as a percentage (for display only).
    #[inline]
    pub fn percentage(&self) -> f64 {
        self.0 as f64 / 100.0
    }

    #[inline]
    pub const fn zero() -> Self {
        TaxRate(0)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl Default for TaxRate {
    fn default() -> Self {
        TaxRate::zero()
    }
}

// =============================================================================
// Day Calculation
// =============================================================================

/// How a tenant turns a stay into billable nights.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum DayCalculation {
    /// Calendar nights, plus one when the guest leaves after noon.
    #[default]
    HotelStandard,
    /// Every started 24 hours is a night.
    TwentyFourHour,
}

// =============================================================================
// Room
// =============================================================================

/// Housekeeping status of a room. Occupancy is derived from RoomBookings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum RoomStatus {
    #[default]
    Available,
    Maintenance,
    Cleaning,
}

/// A physical room that can be allocated to stays.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Room {
    pub id: String,
    pub tenant_id: String,
    /// Business identifier, unique per tenant ("101", "PH-2").
    pub room_number: String,
    /// Free-form type label ("deluxe", "suite").
    pub room_type: String,
    /// Nightly price in minor units.
    pub price_cents: i64,
    pub status: RoomStatus,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Room {
    #[inline]
    pub fn price(&self) -> Money {
        Money::from_cents(self.price_cents)
    }
}

// =============================================================================
// Booking
// =============================================================================

/// Aggregate status of a booking.
///
/// The checked-in/out family is derived from the booking's RoomBookings by
/// [`crate::lifecycle::derive_booking_status`]; clients never set it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    #[default]
    Pending,
    Confirmed,
    PartialCheckedIn,
    CheckedIn,
    PartialCheckedInOut,
    PartialCheckedOut,
    CheckedOut,
    Cancelled,
    NoShow,
}

impl BookingStatus {
    /// Statuses from which a room of the booking may still check in.
    pub fn accepts_check_in(&self) -> bool {
        matches!(
            self,
            BookingStatus::Pending
                | BookingStatus::Confirmed
                | BookingStatus::PartialCheckedIn
                | BookingStatus::PartialCheckedInOut
                | BookingStatus::PartialCheckedOut
        )
    }

    /// True once any room of the booking has checked in.
    pub fn has_started(&self) -> bool {
        matches!(
            self,
            BookingStatus::PartialCheckedIn
                | BookingStatus::CheckedIn
                | BookingStatus::PartialCheckedInOut
                | BookingStatus::PartialCheckedOut
                | BookingStatus::CheckedOut
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::PartialCheckedIn => "partial_checked_in",
            BookingStatus::CheckedIn => "checked_in",
            BookingStatus::PartialCheckedInOut => "partial_checked_in_out",
            BookingStatus::PartialCheckedOut => "partial_checked_out",
            BookingStatus::CheckedOut => "checked_out",
            BookingStatus::Cancelled => "cancelled",
            BookingStatus::NoShow => "no_show",
        }
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A guest stay header owning one RoomBooking per allocated room.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Booking {
    pub id: String,
    pub tenant_id: String,
    /// Opaque guest references (guest ids from the identity service).
    pub guests: Vec<String>,
    pub status: BookingStatus,
    pub created_by: String,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Room Booking
// =============================================================================

/// Status of a single room allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum RoomBookingStatus {
    #[default]
    Pending,
    Confirmed,
    CheckedIn,
    CheckedOut,
    Cancelled,
    NoShow,
}

impl RoomBookingStatus {
    /// Live allocations block the room for their interval.
    pub fn is_live(&self) -> bool {
        matches!(
            self,
            RoomBookingStatus::Pending | RoomBookingStatus::Confirmed | RoomBookingStatus::CheckedIn
        )
    }
}

/// One room reserved for the half-open interval `[start_at, end_at)`.
///
/// This is the unit overlap detection operates on.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct RoomBooking {
    pub id: String,
    pub booking_id: String,
    pub room_id: String,
    #[ts(as = "String")]
    pub start_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub end_at: DateTime<Utc>,
    pub is_active: bool,
    pub status: RoomBookingStatus,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl RoomBooking {
    /// True when `at` falls inside `[start_at, end_at)`.
    #[inline]
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start_at <= at && at < self.end_at
    }

    /// Active and in a live status.
    #[inline]
    pub fn blocks_room(&self) -> bool {
        self.is_active && self.status.is_live()
    }
}

// =============================================================================
// Check-in / Check-out
// =============================================================================

/// Append-only check-in event. At most one per RoomBooking.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CheckIn {
    pub id: String,
    pub room_booking_id: String,
    /// Guests that actually arrived in this room.
    pub guests: Vec<String>,
    pub checked_in_by: String,
    #[ts(as = "String")]
    pub checked_in_at: DateTime<Utc>,
}

/// Append-only check-out event. At most one per RoomBooking, after its CheckIn.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct CheckOut {
    pub id: String,
    pub room_booking_id: String,
    pub checked_out_by: String,
    #[ts(as = "String")]
    pub checked_out_at: DateTime<Utc>,
}

// =============================================================================
// Services
// =============================================================================

/// A billable in-room service from the tenant's catalogue (laundry, spa, ...).
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Service {
    pub id: String,
    pub tenant_id: String,
    pub name: String,
    pub category: String,
    pub price_cents: i64,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

/// A consumed service. Snapshot of name and price at consumption time.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct ServiceUsage {
    pub id: String,
    pub room_booking_id: String,
    pub service_id: String,
    pub name_snapshot: String,
    pub price_cents: i64,
    pub recorded_by: String,
    #[ts(as = "String")]
    pub used_at: DateTime<Utc>,
}

impl ServiceUsage {
    #[inline]
    pub fn price(&self) -> Money {
        Money::from_cents(self.price_cents)
    }
}

// =============================================================================
// Orders
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    DineIn,
    /// Room service, charged to a booking.
    Hotel,
    TakeAway,
    Delivery,
    Online,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[default]
    InProgress,
    OnHold,
    /// Kitchen order ticket printed.
    Kot,
    Served,
    Billed,
    Settled,
    Cancelled,
}

impl OrderStatus {
    /// Entering one of these statuses frees the order's dine-in tables.
    pub fn releases_tables(&self) -> bool {
        matches!(
            self,
            OrderStatus::Billed | OrderStatus::Settled | OrderStatus::Cancelled
        )
    }

    /// Orders that can still be put on a bill.
    pub fn is_billable(&self) -> bool {
        !self.releases_tables()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::InProgress => "in_progress",
            OrderStatus::OnHold => "on_hold",
            OrderStatus::Kot => "kot",
            OrderStatus::Served => "served",
            OrderStatus::Billed => "billed",
            OrderStatus::Settled => "settled",
            OrderStatus::Cancelled => "cancelled",
        }
    }
}

/// A food order.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Order {
    pub id: String,
    pub tenant_id: String,
    pub order_type: OrderType,
    /// Set for hotel orders.
    pub booking_id: Option<String>,
    /// Set for hotel orders: the room the food went to.
    pub room_booking_id: Option<String>,
    /// Sum of line totals.
    pub total_cents: i64,
    /// Order-level discount granted at the counter.
    pub discount_cents: i64,
    pub status: OrderStatus,
    /// Bill the order was put on, while billed or settled.
    pub bill_id: Option<String>,
    pub created_by: String,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// What the order contributes to a bill before bill-level discounts.
    pub fn payable(&self) -> Money {
        let total = Money::from_cents(self.total_cents);
        total - Money::from_cents(self.discount_cents).min(total)
    }
}

/// A line on an order. Snapshot of the menu item at order time.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct OrderItem {
    pub id: String,
    pub order_id: String,
    pub food_item_id: String,
    pub name_snapshot: String,
    pub unit_price_cents: i64,
    pub quantity: i64,
    pub line_total_cents: i64,
}

// =============================================================================
// Bills
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum BillType {
    Restaurant,
    Hotel,
}

impl BillType {
    /// Prefix used in GST invoice numbers.
    pub fn code(&self) -> &'static str {
        match self {
            BillType::Restaurant => "RES",
            BillType::Hotel => "HOT",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum BillStatus {
    #[default]
    Unpaid,
    Partial,
    Paid,
    Cancelled,
}

impl BillStatus {
    pub fn accepts_payment(&self) -> bool {
        matches!(self, BillStatus::Unpaid | BillStatus::Partial)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BillStatus::Unpaid => "unpaid",
            BillStatus::Partial => "partial",
            BillStatus::Paid => "paid",
            BillStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for BillStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An invoice snapshot. Only `status` changes after creation.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Bill {
    pub id: String,
    pub tenant_id: String,
    pub bill_type: BillType,
    /// Per-tenant, per-type sequence number.
    pub bill_number: i64,
    /// `"{RES|HOT}/{bill_number}/{id}"`
    pub gst_invoice_number: String,
    /// Buyer's GSTIN, for B2B invoices.
    pub customer_gst: Option<String>,
    pub order_id: Option<String>,
    pub booking_id: Option<String>,
    /// Pre-discount sum across categories.
    pub total_cents: i64,
    /// Discount actually applied (each capped at its category's charge).
    pub discount_cents: i64,
    /// `total - discount`, the taxable base.
    pub discounted_amount_cents: i64,
    pub room_sgst_cents: i64,
    pub room_cgst_cents: i64,
    pub order_sgst_cents: i64,
    pub order_cgst_cents: i64,
    pub service_sgst_cents: i64,
    pub service_cgst_cents: i64,
    pub sgst_cents: i64,
    pub cgst_cents: i64,
    /// Final payable amount.
    pub net_cents: i64,
    pub status: BillStatus,
    pub created_by: String,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    /// Who last changed `status` (payment or cancellation).
    pub modified_by: Option<String>,
    #[ts(as = "Option<String>")]
    pub modified_at: Option<DateTime<Utc>>,
}

impl Bill {
    #[inline]
    pub fn net(&self) -> Money {
        Money::from_cents(self.net_cents)
    }
}

// =============================================================================
// Payments
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    Card,
    Upi,
    NetBanking,
    Other,
}

/// One payment against a bill. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct BillPayment {
    pub id: String,
    pub bill_id: String,
    pub method: PaymentMethod,
    pub amount_cents: i64,
    /// Method-specific JSON object (UPI reference, card last four, ...).
    pub payment_details: Option<String>,
    pub received_by: String,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl BillPayment {
    #[inline]
    pub fn amount(&self) -> Money {
        Money::from_cents(self.amount_cents)
    }

    /// Parsed `payment_details`, if present and well-formed.
    pub fn details(&self) -> Option<serde_json::Value> {
        self.payment_details
            .as_deref()
            .and_then(|raw| serde_json::from_str(raw).ok())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_status_serialization_is_snake_case() {
        assert_eq!(
            serde_json::to_string(&BookingStatus::PartialCheckedInOut).unwrap(),
            "\"partial_checked_in_out\""
        );
        assert_eq!(
            serde_json::to_string(&PaymentMethod::NetBanking).unwrap(),
            "\"net_banking\""
        );
        assert_eq!(BookingStatus::PartialCheckedOut.to_string(), "partial_checked_out");
    }

    #[test]
    fn test_live_statuses() {
        assert!(RoomBookingStatus::Pending.is_live());
        assert!(RoomBookingStatus::Confirmed.is_live());
        assert!(RoomBookingStatus::CheckedIn.is_live());
        assert!(!RoomBookingStatus::CheckedOut.is_live());
        assert!(!RoomBookingStatus::Cancelled.is_live());
        assert!(!RoomBookingStatus::NoShow.is_live());
    }

    #[test]
    fn test_room_booking_contains_is_half_open() {
        let start = Utc.with_ymd_and_hms(2024, 1, 10, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 1, 12, 0, 0, 0).unwrap();
        let rb = RoomBooking {
            id: generate_id(),
            booking_id: generate_id(),
            room_id: generate_id(),
            start_at: start,
            end_at: end,
            is_active: true,
            status: RoomBookingStatus::Pending,
            created_at: start,
        };
        assert!(rb.contains(start));
        assert!(!rb.contains(end));
        assert!(rb.blocks_room());
    }

    #[test]
    fn test_order_payable_caps_discount() {
        let now = Utc::now();
        let mut order = Order {
            id: generate_id(),
            tenant_id: generate_id(),
            order_type: OrderType::TakeAway,
            booking_id: None,
            room_booking_id: None,
            total_cents: 50_000,
            discount_cents: 5_000,
            status: OrderStatus::Served,
            bill_id: None,
            created_by: "staff".to_string(),
            created_at: now,
            updated_at: now,
        };
        assert_eq!(order.payable().cents(), 45_000);

        order.discount_cents = 90_000;
        assert!(order.payable().is_zero());
    }

    #[test]
    fn test_order_status_releases_tables() {
        assert!(OrderStatus::Billed.releases_tables());
        assert!(OrderStatus::Settled.releases_tables());
        assert!(OrderStatus::Cancelled.releases_tables());
        assert!(!OrderStatus::Served.releases_tables());
        assert!(OrderStatus::Kot.is_billable());
    }

    #[test]
    fn test_bill_type_codes() {
        assert_eq!(BillType::Restaurant.code(), "RES");
        assert_eq!(BillType::Hotel.code(), "HOT");
    }
}
