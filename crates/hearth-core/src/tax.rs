//! # Tax Engine
//!
//! Maps (chargeable amount, tenant tax configuration, category) to the two
//! GST components, SGST and CGST.
//!
//! ## Tier Selection
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Rate Selection                                 │
//! │                                                                         │
//! │  Order (food)     ──► restaurant pair (flat)                            │
//! │                                                                         │
//! │  Room / Service   ──► threshold configured AND chargeable > threshold?  │
//! │                          │ yes                      │ no                │
//! │                          ▼                          ▼                   │
//! │                     upper pair                 lower pair               │
//! │                                                                         │
//! │  sgst = round_half_up(chargeable × sgst%)                               │
//! │  cgst = round_half_up(chargeable × cgst%)                               │
//! │  net  = chargeable + sgst + cgst                                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The configuration is always passed in explicitly. Nothing here looks up
//! a "current tenant".

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreResult, ValidationError};
use crate::money::Money;
use crate::types::{DayCalculation, TaxRate};

/// Rates above 100% are rejected as configuration errors.
const MAX_RATE_BPS: u32 = 10_000;

// =============================================================================
// Configuration
// =============================================================================

/// An SGST/CGST rate pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct RatePair {
    pub sgst: TaxRate,
    pub cgst: TaxRate,
}

impl RatePair {
    pub const fn from_bps(sgst: u32, cgst: u32) -> Self {
        RatePair {
            sgst: TaxRate::from_bps(sgst),
            cgst: TaxRate::from_bps(cgst),
        }
    }
}

/// Two rate pairs split by an optional threshold.
///
/// Without a threshold the lower pair always applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TieredRate {
    pub lower: RatePair,
    pub upper: RatePair,
    pub threshold: Option<Money>,
}

impl TieredRate {
    /// Picks the pair for a chargeable amount.
    pub fn select(&self, chargeable: Money) -> RatePair {
        match self.threshold {
            Some(threshold) if chargeable > threshold => self.upper,
            _ => self.lower,
        }
    }
}

/// Per-tenant tax configuration.
///
/// Defaults mirror a standard Indian hospitality setup:
/// rooms 6% + 6% up to ₹7,500 and 9% + 9% above, food 2.5% + 2.5%,
/// services 9% + 9% flat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TenantTaxConfig {
    pub restaurant: RatePair,
    pub hotel: TieredRate,
    pub service: TieredRate,
    /// Night counting used when billing room stays.
    pub day_calculation: DayCalculation,
}

impl Default for TenantTaxConfig {
    fn default() -> Self {
        TenantTaxConfig {
            restaurant: RatePair::from_bps(250, 250),
            hotel: TieredRate {
                lower: RatePair::from_bps(600, 600),
                upper: RatePair::from_bps(900, 900),
                threshold: Some(Money::from_cents(750_000)),
            },
            service: TieredRate {
                lower: RatePair::from_bps(900, 900),
                upper: RatePair::from_bps(900, 900),
                threshold: None,
            },
            day_calculation: DayCalculation::HotelStandard,
        }
    }
}

impl TenantTaxConfig {
    /// Rates must be within 0..=100%, thresholds non-negative.
    pub fn validate(&self) -> CoreResult<()> {
        let pairs = [
            ("restaurant", self.restaurant),
            ("hotel.lower", self.hotel.lower),
            ("hotel.upper", self.hotel.upper),
            ("service.lower", self.service.lower),
            ("service.upper", self.service.upper),
        ];
        for (field, pair) in pairs {
            for rate in [pair.sgst, pair.cgst] {
                if rate.bps() > MAX_RATE_BPS {
                    return Err(ValidationError::OutOfRange {
                        field: format!("{field} rate (bps)"),
                        min: 0,
                        max: MAX_RATE_BPS as i64,
                    }
                    .into());
                }
            }
        }
        for (field, threshold) in [
            ("hotel.threshold", self.hotel.threshold),
            ("service.threshold", self.service.threshold),
        ] {
            if threshold.is_some_and(|t| t.is_negative()) {
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
// Computation
// =============================================================================

/// Charge category. Each has its own rate schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum TaxCategory {
    Room,
    Order,
    Service,
}

/// Result of taxing one category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TaxBreakdown {
    pub chargeable: Money,
    pub sgst: Money,
    pub cgst: Money,
}

impl TaxBreakdown {
    /// `chargeable + sgst + cgst`, exactly.
    #[inline]
    pub fn net(&self) -> Money {
        self.chargeable + self.sgst + self.cgst
    }
}

/// Returns the rate pair that applies to `chargeable` in `category`.
pub fn rates_for(chargeable: Money, config: &TenantTaxConfig, category: TaxCategory) -> RatePair {
    match category {
        TaxCategory::Order => config.restaurant,
        TaxCategory::Room => config.hotel.select(chargeable),
        TaxCategory::Service => config.service.select(chargeable),
    }
}

/// Taxes an already-discounted amount.
///
/// Pure: identical inputs always give identical output.
pub fn compute_tax(chargeable: Money, config: &TenantTaxConfig, category: TaxCategory) -> TaxBreakdown {
    let pair = rates_for(chargeable, config, category);
    TaxBreakdown {
        chargeable,
        sgst: chargeable.calculate_tax(pair.sgst),
        cgst: chargeable.calculate_tax(pair.cgst),
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn rupees(r: i64) -> Money {
        Money::from_major_minor(r, 0)
    }

    #[test]
    fn test_room_below_threshold_uses_lower_rate() {
        let config = TenantTaxConfig::default();
        let tax = compute_tax(rupees(5000), &config, TaxCategory::Room);
        assert_eq!(tax.sgst, rupees(300));
        assert_eq!(tax.cgst, rupees(300));
        assert_eq!(tax.net(), rupees(5600));
    }

    #[test]
    fn test_room_above_threshold_uses_upper_rate() {
        let config = TenantTaxConfig::default();
        let tax = compute_tax(rupees(9000), &config, TaxCategory::Room);
        assert_eq!(tax.sgst, rupees(810));
        assert_eq!(tax.cgst, rupees(810));
    }

    #[test]
    fn test_threshold_is_exclusive() {
        let config = TenantTaxConfig::default();
        let tax = compute_tax(rupees(7500), &config, TaxCategory::Room);
        assert_eq!(tax.sgst, rupees(450));
    }

    #[test]
    fn test_service_without_threshold_always_lower() {
        let mut config = TenantTaxConfig::default();
        config.service.lower = RatePair::from_bps(500, 500);
        config.service.upper = RatePair::from_bps(1400, 1400);
        let tax = compute_tax(rupees(1_000_000), &config, TaxCategory::Service);
        assert_eq!(tax.sgst, rupees(50_000));
    }

    #[test]
    fn test_order_rate_is_flat_and_rounds_half_up() {
        let config = TenantTaxConfig::default();
        // ₹10.10 × 2.5% = ₹0.2525 → ₹0.25
        let tax = compute_tax(Money::from_cents(1010), &config, TaxCategory::Order);
        assert_eq!(tax.sgst.cents(), 25);
        // ₹0.30 × 2.5% = ₹0.0075 → ₹0.01
        let tax = compute_tax(Money::from_cents(30), &config, TaxCategory::Order);
        assert_eq!(tax.cgst.cents(), 1);
    }

    #[test]
    fn test_net_is_exact_sum() {
        let config = TenantTaxConfig::default();
        for cents in [1, 99, 12_345, 750_001, 9_999_999] {
            for category in [TaxCategory::Room, TaxCategory::Order, TaxCategory::Service] {
                let tax = compute_tax(Money::from_cents(cents), &config, category);
                assert_eq!(tax.net().cents(), cents + tax.sgst.cents() + tax.cgst.cents());
                assert_eq!(tax, compute_tax(Money::from_cents(cents), &config, category));
            }
        }
    }

    #[test]
    fn test_config_validation() {
        let mut config = TenantTaxConfig::default();
        assert!(config.validate().is_ok());

        config.hotel.upper = RatePair::from_bps(10_001, 900);
        assert!(config.validate().is_err());

        config.hotel.upper = RatePair::from_bps(900, 900);
        config.hotel.threshold = Some(Money::from_cents(-1));
        assert!(config.validate().is_err());
    }
}
