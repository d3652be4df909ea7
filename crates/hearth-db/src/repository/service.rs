//! # Service Repository
//!
//! Catalogue of chargeable services (laundry, spa, airport pickup).
//! Usage rows copy the name and price at recording time, so catalogue
//! edits never change an open stay's charges.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::error::DbResult;
use hearth_core::types::generate_id;
use hearth_core::validation::{validate_name, validate_price};
use hearth_core::{Money, Service};

const SERVICE_COLUMNS: &str = "id, tenant_id, name, category, price_cents, created_at";

/// Repository for the service catalogue.
#[derive(Debug, Clone)]
pub struct ServiceRepository {
    pool: SqlitePool,
}

impl ServiceRepository {
    /// Creates a new ServiceRepository.
    pub fn new(pool: SqlitePool) -> Self {
        ServiceRepository { pool }
    }

    /// Adds a service to a tenant's catalogue.
    pub async fn create(
        &self,
        tenant_id: &str,
        name: &str,
        category: &str,
        price: Money,
    ) -> DbResult<Service> {
        validate_name("name", name)?;
        validate_name("category", category)?;
        validate_price("price", price)?;

        let service = Service {
            id: generate_id(),
            tenant_id: tenant_id.to_string(),
            name: name.trim().to_string(),
            category: category.trim().to_string(),
            price_cents: price.cents(),
            created_at: Utc::now(),
        };

        debug!(id = %service.id, name = %service.name, "Creating service");

        sqlx::query(
            r#"
            INSERT INTO services (id, tenant_id, name, category, price_cents, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&service.id)
        .bind(&service.tenant_id)
        .bind(&service.name)
        .bind(&service.category)
        .bind(service.price_cents)
        .bind(service.created_at)
        .execute(&self.pool)
        .await?;

        info!(id = %service.id, tenant_id = %tenant_id, "Service created");
        Ok(service)
    }

    /// Gets a service by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Service>> {
        let sql = format!("SELECT {SERVICE_COLUMNS} FROM services WHERE id = ?1");
        let service: Option<Service> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(service)
    }

    /// Lists a tenant's services by category, then name.
    pub async fn list(&self, tenant_id: &str) -> DbResult<Vec<Service>> {
        let sql = format!(
            "SELECT {SERVICE_COLUMNS} FROM services WHERE tenant_id = ?1 ORDER BY category, name"
        );
        let services: Vec<Service> = sqlx::query_as(&sql)
            .bind(tenant_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(services)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::test_support::setup;

    #[tokio::test]
    async fn test_create_and_list() {
        let (db, tenant) = setup().await;
        let spa = db
            .services()
            .create(&tenant, "Spa", "wellness", Money::from_cents(2_000_00))
            .await
            .unwrap();
        db.services()
            .create(&tenant, "Laundry", "housekeeping", Money::from_cents(300_00))
            .await
            .unwrap();

        let fetched = db.services().get_by_id(&spa.id).await.unwrap().unwrap();
        assert_eq!(fetched.price_cents, 2_000_00);

        let names: Vec<String> = db
            .services()
            .list(&tenant)
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(names, vec!["Laundry", "Spa"]);
    }

    #[tokio::test]
    async fn test_blank_name_rejected() {
        let (db, tenant) = setup().await;
        let err = db
            .services()
            .create(&tenant, "  ", "wellness", Money::zero())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
    }
}
