//! # Tenant Repository
//!
//! Tenants own rooms, services, orders and bills, and carry the GST
//! configuration the billing aggregator reads at bill creation time.
//!
//! ## Stored Rates
//! ```text
//! restaurant_{sgst,cgst}_bps                      flat
//! hotel_{lower,upper}_{sgst,cgst}_bps + threshold tiered on chargeable
//! service_{lower,upper}_{sgst,cgst}_bps + threshold
//! day_calculation                                 hotel_standard | twenty_four_hour
//! ```

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use hearth_core::types::{generate_id, DayCalculation};
use hearth_core::validation::validate_name;
use hearth_core::{Money, RatePair, TenantTaxConfig, TieredRate};

/// Raw `tenants` row.
#[derive(Debug, sqlx::FromRow)]
struct TenantTaxRow {
    id: String,
    restaurant_sgst_bps: i64,
    restaurant_cgst_bps: i64,
    hotel_lower_sgst_bps: i64,
    hotel_lower_cgst_bps: i64,
    hotel_upper_sgst_bps: i64,
    hotel_upper_cgst_bps: i64,
    hotel_threshold_cents: Option<i64>,
    service_lower_sgst_bps: i64,
    service_lower_cgst_bps: i64,
    service_upper_sgst_bps: i64,
    service_upper_cgst_bps: i64,
    service_threshold_cents: Option<i64>,
    day_calculation: DayCalculation,
}

impl TenantTaxRow {
    fn into_config(self) -> DbResult<TenantTaxConfig> {
        let id = self.id.as_str();
        let pair = |sgst: i64, cgst: i64| -> DbResult<RatePair> {
            Ok(RatePair::from_bps(bps(id, sgst)?, bps(id, cgst)?))
        };

        Ok(TenantTaxConfig {
            restaurant: pair(self.restaurant_sgst_bps, self.restaurant_cgst_bps)?,
            hotel: TieredRate {
                lower: pair(self.hotel_lower_sgst_bps, self.hotel_lower_cgst_bps)?,
                upper: pair(self.hotel_upper_sgst_bps, self.hotel_upper_cgst_bps)?,
                threshold: self.hotel_threshold_cents.map(Money::from_cents),
            },
            service: TieredRate {
                lower: pair(self.service_lower_sgst_bps, self.service_lower_cgst_bps)?,
                upper: pair(self.service_upper_sgst_bps, self.service_upper_cgst_bps)?,
                threshold: self.service_threshold_cents.map(Money::from_cents),
            },
            day_calculation: self.day_calculation,
        })
    }
}

fn bps(tenant_id: &str, value: i64) -> DbResult<u32> {
    u32::try_from(value).map_err(|_| DbError::Corrupt {
        entity: "Tenant".to_string(),
        id: tenant_id.to_string(),
        reason: format!("tax rate {value} bps is out of range"),
    })
}

const TAX_COLUMNS: &str = r#"
    id,
    restaurant_sgst_bps, restaurant_cgst_bps,
    hotel_lower_sgst_bps, hotel_lower_cgst_bps,
    hotel_upper_sgst_bps, hotel_upper_cgst_bps,
    hotel_threshold_cents,
    service_lower_sgst_bps, service_lower_cgst_bps,
    service_upper_sgst_bps, service_upper_cgst_bps,
    service_threshold_cents,
    day_calculation
"#;

/// Loads a tenant's tax configuration on an existing connection.
///
/// Used inside billing transactions so the rates and the bill row are read
/// and written atomically.
pub(crate) async fn fetch_tax_config(
    conn: &mut SqliteConnection,
    tenant_id: &str,
) -> DbResult<TenantTaxConfig> {
    let sql = format!("SELECT {TAX_COLUMNS} FROM tenants WHERE id = ?1");
    let row: Option<TenantTaxRow> = sqlx::query_as(&sql)
        .bind(tenant_id)
        .fetch_optional(&mut *conn)
        .await?;

    row.ok_or_else(|| DbError::not_found("Tenant", tenant_id))?
        .into_config()
}

/// Repository for tenants and their tax configuration.
#[derive(Debug, Clone)]
pub struct TenantRepository {
    pool: SqlitePool,
}

impl TenantRepository {
    /// Creates a new TenantRepository.
    pub fn new(pool: SqlitePool) -> Self {
        TenantRepository { pool }
    }

    /// Creates a tenant with a generated ID.
    pub async fn create(&self, name: &str, config: &TenantTaxConfig) -> DbResult<String> {
        let id = generate_id();
        self.insert(&id, name, config).await?;
        Ok(id)
    }

    /// Inserts a tenant with a caller-chosen ID (seed data, single-property
    /// installs using [`hearth_core::DEFAULT_TENANT_ID`]).
    pub async fn insert(&self, id: &str, name: &str, config: &TenantTaxConfig) -> DbResult<()> {
        validate_name("name", name)?;
        config.validate()?;

        debug!(id = %id, name = %name, "Inserting tenant");

        let now = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO tenants (
                id, name,
                restaurant_sgst_bps, restaurant_cgst_bps,
                hotel_lower_sgst_bps, hotel_lower_cgst_bps,
                hotel_upper_sgst_bps, hotel_upper_cgst_bps,
                hotel_threshold_cents,
                service_lower_sgst_bps, service_lower_cgst_bps,
                service_upper_sgst_bps, service_upper_cgst_bps,
                service_threshold_cents,
                day_calculation, created_at, updated_at
            ) VALUES (
                ?1, ?2,
                ?3, ?4,
                ?5, ?6,
                ?7, ?8,
                ?9,
                ?10, ?11,
                ?12, ?13,
                ?14,
                ?15, ?16, ?16
            )
            "#,
        )
        .bind(id)
        .bind(name.trim())
        .bind(config.restaurant.sgst.bps())
        .bind(config.restaurant.cgst.bps())
        .bind(config.hotel.lower.sgst.bps())
        .bind(config.hotel.lower.cgst.bps())
        .bind(config.hotel.upper.sgst.bps())
        .bind(config.hotel.upper.cgst.bps())
        .bind(config.hotel.threshold.map(|m| m.cents()))
        .bind(config.service.lower.sgst.bps())
        .bind(config.service.lower.cgst.bps())
        .bind(config.service.upper.sgst.bps())
        .bind(config.service.upper.cgst.bps())
        .bind(config.service.threshold.map(|m| m.cents()))
        .bind(config.day_calculation)
        .bind(now)
        .execute(&self.pool)
        .await?;

        info!(id = %id, "Tenant created");
        Ok(())
    }

    /// Returns true if the tenant exists.
    pub async fn exists(&self, id: &str) -> DbResult<bool> {
        let found: Option<String> = sqlx::query_scalar("SELECT id FROM tenants WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(found.is_some())
    }

    /// Gets a tenant's tax configuration.
    pub async fn tax_config(&self, tenant_id: &str) -> DbResult<TenantTaxConfig> {
        let mut conn = self.pool.acquire().await?;
        fetch_tax_config(&mut conn, tenant_id).await
    }

    /// Replaces a tenant's tax configuration.
    ///
    /// Existing bills keep the amounts they were created with.
    pub async fn update_tax_config(&self, tenant_id: &str, config: &TenantTaxConfig) -> DbResult<()> {
        config.validate()?;

        let result = sqlx::query(
            r#"
            UPDATE tenants SET
                restaurant_sgst_bps = ?2, restaurant_cgst_bps = ?3,
                hotel_lower_sgst_bps = ?4, hotel_lower_cgst_bps = ?5,
                hotel_upper_sgst_bps = ?6, hotel_upper_cgst_bps = ?7,
                hotel_threshold_cents = ?8,
                service_lower_sgst_bps = ?9, service_lower_cgst_bps = ?10,
                service_upper_sgst_bps = ?11, service_upper_cgst_bps = ?12,
                service_threshold_cents = ?13,
                day_calculation = ?14,
                updated_at = ?15
            WHERE id = ?1
            "#,
        )
        .bind(tenant_id)
        .bind(config.restaurant.sgst.bps())
        .bind(config.restaurant.cgst.bps())
        .bind(config.hotel.lower.sgst.bps())
        .bind(config.hotel.lower.cgst.bps())
        .bind(config.hotel.upper.sgst.bps())
        .bind(config.hotel.upper.cgst.bps())
        .bind(config.hotel.threshold.map(|m| m.cents()))
        .bind(config.service.lower.sgst.bps())
        .bind(config.service.lower.cgst.bps())
        .bind(config.service.upper.sgst.bps())
        .bind(config.service.upper.cgst.bps())
        .bind(config.service.threshold.map(|m| m.cents()))
        .bind(config.day_calculation)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Tenant", tenant_id));
        }

        info!(tenant_id = %tenant_id, "Tenant tax configuration updated");
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
