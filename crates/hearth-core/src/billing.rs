//! # Billing Aggregator (pure part)
//!
//! Turns raw per-category charges into a bill's totals.
//!
//! ## Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Bill Computation                                │
//! │                                                                         │
//! │  raw room charge ─┐                                                     │
//! │  raw services   ──┼─► per category:                                     │
//! │  raw orders     ──┘     chargeable = raw − min(discount, raw)           │
//! │                         (sgst, cgst) = compute_tax(chargeable, ...)     │
//! │                         net = chargeable + sgst + cgst                  │
//! │                                  │                                      │
//! │                                  ▼                                      │
//! │                    BillTotals = Σ over contributing categories          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Discounts are applied per category before tax, never on taxed amounts.

use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreResult, ValidationError};
use crate::money::Money;
use crate::tax::{compute_tax, TaxBreakdown, TaxCategory, TenantTaxConfig};
use crate::types::{BillType, DayCalculation};
use crate::STANDARD_CHECKOUT_HOUR;

// =============================================================================
// Discounts
// =============================================================================

/// Discount requested per category when creating a bill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Discounts {
    pub room: Money,
    pub order: Money,
    pub service: Money,
}

impl Discounts {
    pub fn none() -> Self {
        Discounts::default()
    }

    pub fn for_category(&self, category: TaxCategory) -> Money {
        match category {
            TaxCategory::Room => self.room,
            TaxCategory::Order => self.order,
            TaxCategory::Service => self.service,
        }
    }

    pub fn validate(&self) -> CoreResult<()> {
        for (field, amount) in [
            ("room_discount", self.room),
            ("order_discount", self.order),
            ("service_discount", self.service),
        ] {
            if amount.is_negative() {
                return Err(ValidationError::Negative {
                    field: field.to_string(),
                }
                .into());
            }
        }
        Ok(())
    }
}

// =============================================================================
// Category Charge
// =============================================================================

/// One taxed category on a bill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CategoryCharge {
    pub category: TaxCategory,
    pub raw: Money,
    /// Discount actually applied (capped at `raw`).
    pub discount: Money,
    pub tax: TaxBreakdown,
}

impl CategoryCharge {
    #[inline]
    pub fn net(&self) -> Money {
        self.tax.net()
    }
}

/// Discounts and taxes one category.
///
/// Rejects negative raw amounts and negative discounts.
pub fn charge_category(
    category: TaxCategory,
    raw: Money,
    discount: Money,
    config: &TenantTaxConfig,
) -> CoreResult<CategoryCharge> {
    if raw.is_negative() {
        return Err(ValidationError::Negative {
            field: format!("{category:?} charge").to_lowercase(),
        }
        .into());
    }
    if discount.is_negative() {
        return Err(ValidationError::Negative {
            field: format!("{category:?} discount").to_lowercase(),
        }
        .into());
    }

    let applied = discount.min(raw);
    let chargeable = raw - applied;
    Ok(CategoryCharge {
        category,
        raw,
        discount: applied,
        tax: compute_tax(chargeable, config, category),
    })
}

// =============================================================================
// Bill Totals
// =============================================================================

/// Everything a bill row stores about money.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct BillTotals {
    pub total: Money,
    pub discount: Money,
    pub discounted_amount: Money,
    pub room: TaxBreakdown,
    pub order: TaxBreakdown,
    pub service: TaxBreakdown,
    pub sgst: Money,
    pub cgst: Money,
    pub net: Money,
}

/// Sums the contributing categories into bill totals.
pub fn summarize(charges: &[CategoryCharge]) -> BillTotals {
    let mut totals = BillTotals::default();
    for charge in charges {
        totals.total += charge.raw;
        totals.discount += charge.discount;
        totals.discounted_amount += charge.tax.chargeable;
        totals.sgst += charge.tax.sgst;
        totals.cgst += charge.tax.cgst;
        totals.net += charge.net();

        let slot = match charge.category {
            TaxCategory::Room => &mut totals.room,
            TaxCategory::Order => &mut totals.order,
            TaxCategory::Service => &mut totals.service,
        };
        slot.chargeable += charge.tax.chargeable;
        slot.sgst += charge.tax.sgst;
        slot.cgst += charge.tax.cgst;
    }
    totals
}

/// Raw amounts per category for a hotel bill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HotelCharges {
    pub room: Money,
    pub service: Money,
    pub order: Money,
}

/// Computes a hotel bill: rooms, services and room-service orders.
pub fn hotel_totals(
    raw: HotelCharges,
    discounts: &Discounts,
    config: &TenantTaxConfig,
) -> CoreResult<BillTotals> {
    discounts.validate()?;
    let charges = [
        charge_category(TaxCategory::Room, raw.room, discounts.room, config)?,
        charge_category(TaxCategory::Service, raw.service, discounts.service, config)?,
        charge_category(TaxCategory::Order, raw.order, discounts.order, config)?,
    ];
    Ok(summarize(&charges))
}

/// Computes a restaurant bill: the order category only.
pub fn restaurant_totals(
    order_amount: Money,
    discounts: &Discounts,
    config: &TenantTaxConfig,
) -> CoreResult<BillTotals> {
    discounts.validate()?;
    let charge = charge_category(TaxCategory::Order, order_amount, discounts.order, config)?;
    Ok(summarize(&[charge]))
}

/// GST invoice number, e.g. `HOT/42/6f1c...`.
pub fn gst_invoice_number(bill_type: BillType, sequence: i64, bill_id: &str) -> String {
    format!("{}/{}/{}", bill_type.code(), sequence, bill_id)
}

// =============================================================================
// Billable Nights
// =============================================================================

/// Nights billed for a stay from `checked_in_at` to `checked_out_at`.
///
/// ## Hotel standard
/// Calendar nights between the two dates, plus one when the guest leaves
/// after noon. A same-day stay is one night.
///
/// ## 24-hour
/// Every started 24-hour block is a night.
///
/// Never less than 1.
pub fn billable_nights(
    checked_in_at: DateTime<Utc>,
    checked_out_at: DateTime<Utc>,
    method: DayCalculation,
) -> i64 {
    let nights = match method {
        DayCalculation::HotelStandard => {
            let calendar = (checked_out_at.date_naive() - checked_in_at.date_naive()).num_days();
            let out = checked_out_at.time();
            let late = out.hour() > STANDARD_CHECKOUT_HOUR
                || (out.hour() == STANDARD_CHECKOUT_HOUR
                    && (out.minute() > 0 || out.second() > 0 || out.nanosecond() > 0));
            if late {
                calendar + 1
            } else {
                calendar
            }
        }
        DayCalculation::TwentyFourHour => {
            let secs = (checked_out_at - checked_in_at).num_seconds();
            (secs + 86_399) / 86_400
        }
    };
    nights.max(1)
}

// =============================================================================
// Unit Tests
// =============================================================================
