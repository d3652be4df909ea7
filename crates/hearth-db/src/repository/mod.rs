//! # Repository Module
//!
//! Database repository implementations for Hearth.
//!
//! ## Write Path
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Every Mutating Operation                             │
//! │                                                                         │
//! │  1. Validate input (hearth-core validators)       nothing touched yet  │
//! │  2. locks.acquire({room:.., booking:.., ..})      one call, sorted     │
//! │  3. pool.begin()                                                       │
//! │  4. Re-read state inside the transaction                               │
//! │  5. Check rules (hearth-core: allocation, lifecycle, ledger)           │
//! │  6. Write rows + derived status + side effects                         │
//! │  7. commit()  (dropping the tx instead rolls everything back)          │
//! │  8. Release locks (LockSet dropped)                                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every query between `begin()` and `commit()` runs on the transaction,
//! never on the pool.
//!
//! ## Available Repositories
//!
//! - [`TenantRepository`] - Tax configuration per tenant
//! - [`RoomRepository`] - Room CRUD and availability
//! - [`ServiceRepository`] - Chargeable service catalogue
//! - [`BookingRepository`] - Reservation allocator and booking status
//! - [`StayRepository`] - Check-in, check-out, service usage
//! - [`OrderRepository`] - Restaurant and room-service orders
//! - [`BillRepository`] - Billing aggregator
//! - [`PaymentRepository`] - Payment ledger

pub mod bill;
pub mod booking;
pub mod order;
pub mod payment;
pub mod room;
pub mod service;
pub mod stay;
pub mod tenant;

pub use bill::BillRepository;
pub use booking::BookingRepository;
pub use order::OrderRepository;
pub use payment::PaymentRepository;
pub use room::RoomRepository;
pub use service::ServiceRepository;
pub use stay::StayRepository;
pub use tenant::TenantRepository;

#[cfg(test)]
pub(crate) mod test_support;
