//! # hearth-db: Persistence Layer for Hearth
//!
//! SQLite storage, per-resource locking and the transactional operations
//! that drive a property's rooms, stays, bills and payments.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Hearth Data Flow                               │
//! │                                                                         │
//! │  Request layer (desk app, API handler, seed binary)                    │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                   hearth-db (THIS CRATE)                        │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌────────────────┐    ┌──────────────┐  │   │
//! │  │   │   Database    │    │  Repositories  │    │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │    │                │    │  (embedded)  │  │   │
//! │  │   │               │    │ BookingRepo    │    │              │  │   │
//! │  │   │ SqlitePool    │◄───│ StayRepo       │    │ 001_init.sql │  │   │
//! │  │   │ LockRegistry  │    │ BillRepo       │    │              │  │   │
//! │  │   │               │    │ PaymentRepo .. │    │              │  │   │
//! │  │   └───────────────┘    └────────────────┘    └──────────────┘  │   │
//! │  │            │                    │                               │   │
//! │  │            │                    ▼                               │   │
//! │  │            │           hearth-core (rules, no I/O)              │   │
//! │  └────────────┼────────────────────────────────────────────────────┘   │
//! │               ▼                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     SQLite Database                             │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool and the [`Database`] handle
//! - [`lock`] - Per-resource async locks (rooms, bookings, orders, bills)
//! - [`migrations`] - Embedded database migrations
//! - [`config`] - TOML + environment configuration
//! - [`error`] - Database error types
//! - [`repository`] - Repository implementations
//!
//! ## Usage
//!
//! ```rust,ignore
//! use hearth_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("hearth.db")).await?;
//!
//! let booking = db.bookings().allocate(tenant_id, &guests, &rooms, "desk-1").await?;
//! let stay = db.stays().check_in(&room_booking_id, &guests, "desk-1", now).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod error;
pub mod lock;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::{ConfigError, HearthConfig};
pub use error::{DbError, DbResult};
pub use lock::LockRegistry;
pub use pool::{Database, DbConfig};

// Repository re-exports for convenience
pub use repository::bill::{BillRepository, BillSource, CreatedBill};
pub use repository::booking::BookingRepository;
pub use repository::order::{NewOrder, NewOrderItem, OrderRepository};
pub use repository::payment::PaymentRepository;
pub use repository::room::RoomRepository;
pub use repository::service::ServiceRepository;
pub use repository::stay::StayRepository;
pub use repository::tenant::TenantRepository;
