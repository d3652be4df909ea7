//! # Database Pool Management
//!
//! Connection pool creation and the [`Database`] handle that hands out
//! repositories.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Database Handle                                    │
//! │                                                                         │
//! │  Database::new(DbConfig)                                               │
//! │       │                                                                 │
//! │       ├──► SqlitePool (WAL, foreign keys, max_connections)             │
//! │       ├──► LockRegistry (shared by every repository clone)             │
//! │       └──► migrations                                                  │
//! │                                                                         │
//! │  db.bookings().allocate(..)   db.stays().check_in(..)                  │
//! │  db.bills().create_for_booking(..)   db.payments().record(..)          │
//! │                                                                         │
//! │  Repositories are cheap clones of (pool, locks).                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use crate::lock::LockRegistry;
use crate::migrations;
use crate::repository::{
    BillRepository, BookingRepository, OrderRepository, PaymentRepository, RoomRepository,
    ServiceRepository, StayRepository, TenantRepository,
};

// =============================================================================
// Configuration
// =============================================================================

/// Database configuration.
///
/// ## Example
/// ```rust,ignore
/// let config = DbConfig::new("/var/lib/hearth/hearth.db")
///     .max_connections(5)
///     .min_connections(1);
/// ```
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Path to the SQLite database file.
    pub database_path: PathBuf,

    /// Maximum number of connections in the pool.
    pub max_connections: u32,

    /// Minimum number of connections to keep alive.
    pub min_connections: u32,

    /// Connection acquire timeout.
    pub connect_timeout: Duration,

    /// Idle timeout before closing a connection.
    pub idle_timeout: Duration,

    /// How long a writer waits on another process's SQLite write lock
    /// before failing with `database is locked`.
    pub busy_timeout: Duration,

    /// Whether to run migrations on connect.
    pub run_migrations: bool,
}

impl DbConfig {
    /// Creates a new database configuration with the given path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        DbConfig {
            database_path: path.into(),
            max_connections: 5,
            min_connections: 1,
            connect_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
            busy_timeout: Duration::from_secs(5),
            run_migrations: true,
        }
    }

    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    pub fn min_connections(mut self, min: u32) -> Self {
        self.min_connections = min;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    pub fn run_migrations(mut self, run: bool) -> Self {
        self.run_migrations = run;
        self
    }

    /// Creates an in-memory database configuration (for testing).
    ///
    /// Every repository call inside a transaction must go through that
    /// transaction: the pool has exactly one connection.
    pub fn in_memory() -> Self {
        DbConfig {
            database_path: PathBuf::from(":memory:"),
            max_connections: 1, // In-memory requires single connection
            min_connections: 1,
            connect_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(60),
            busy_timeout: Duration::from_secs(5),
            run_migrations: true,
        }
    }
}

// =============================================================================
// Database
// =============================================================================

/// Main database handle providing repository access.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
    locks: Arc<LockRegistry>,
}

impl Database {
    /// Creates a new database connection pool.
    ///
    /// ## What This Does
    /// 1. Creates the database file if it doesn't exist
    /// 2. Configures SQLite: WAL, NORMAL synchronous, foreign keys on,
    ///    busy timeout for writers in other processes
    /// 3. Creates the connection pool
    /// 4. Runs migrations (if enabled)
    pub async fn new(config: DbConfig) -> DbResult<Self> {
        info!(
            path = %config.database_path.display(),
            "Initializing database connection"
        );

        let connect_url = format!("sqlite://{}?mode=rwc", config.database_path.display());

        let connect_options = SqliteConnectOptions::from_str(&connect_url)
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            // SQLite has them disabled by default for backwards compatibility
            .foreign_keys(true)
            // Other processes sharing the file serialize on SQLite's write lock
            .busy_timeout(config.busy_timeout)
            .create_if_missing(true);

        debug!("Connection options configured");

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.connect_timeout)
            .idle_timeout(Some(config.idle_timeout))
            .connect_with(connect_options)
            .await
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?;

        info!(
            max_connections = config.max_connections,
            "Database pool created"
        );

        let db = Database {
            pool,
            locks: Arc::new(LockRegistry::new()),
        };

        if config.run_migrations {
            db.run_migrations().await?;
        }

        Ok(db)
    }

    /// Runs database migrations.
    pub async fn run_migrations(&self) -> DbResult<()> {
        info!("Running database migrations");
        migrations::run_migrations(&self.pool).await?;
        info!("Migrations complete");
        Ok(())
    }

    /// Returns a reference to the connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Tenant tax configuration provider.
    pub fn tenants(&self) -> TenantRepository {
        TenantRepository::new(self.pool.clone())
    }

    pub fn rooms(&self) -> RoomRepository {
        RoomRepository::new(self.pool.clone(), self.locks.clone())
    }

    /// Service catalogue.
    pub fn services(&self) -> ServiceRepository {
        ServiceRepository::new(self.pool.clone())
    }

    /// Reservation allocator.
    pub fn bookings(&self) -> BookingRepository {
        BookingRepository::new(self.pool.clone(), self.locks.clone())
    }

    /// Stay lifecycle tracker (check-in, check-out, service usage).
    pub fn stays(&self) -> StayRepository {
        StayRepository::new(self.pool.clone(), self.locks.clone())
    }

    pub fn orders(&self) -> OrderRepository {
        OrderRepository::new(self.pool.clone(), self.locks.clone())
    }

    /// Billing aggregator.
    pub fn bills(&self) -> BillRepository {
        BillRepository::new(self.pool.clone(), self.locks.clone())
    }

    /// Payment ledger.
    pub fn payments(&self) -> PaymentRepository {
        PaymentRepository::new(self.pool.clone(), self.locks.clone())
    }

    /// Closes the database connection pool.
    pub async fn close(&self) {
        info!("Closing database connection pool");
        self.pool.close().await;
    }

    /// Checks if the database is healthy (can execute queries).
    pub async fn health_check(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
