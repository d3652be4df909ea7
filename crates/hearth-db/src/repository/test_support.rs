//! Shared fixtures for repository tests.

use chrono::{DateTime, TimeZone, Utc};
use tempfile::TempDir;

use crate::pool::{Database, DbConfig};
use crate::repository::order::NewOrderItem;
use hearth_core::allocation::RoomInterval;
use hearth_core::{Booking, Money, Room, RoomBooking, TenantTaxConfig};

pub(crate) async fn test_db() -> Database {
    Database::new(DbConfig::in_memory()).await.unwrap()
}

/// Fresh database with one tenant on the default GST configuration.
pub(crate) async fn setup() -> (Database, String) {
    let db = test_db().await;
    let tenant_id = db
        .tenants()
        .create("Test Property", &TenantTaxConfig::default())
        .await
        .unwrap();
    (db, tenant_id)
}

/// File-backed database with a real connection pool, for tests where
/// several connections race on the same rows. Keep the `TempDir` alive
/// for the duration of the test.
pub(crate) async fn setup_shared() -> (Database, String, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let config = DbConfig::new(dir.path().join("hearth.db")).max_connections(8);
    let db = Database::new(config).await.unwrap();
    let tenant_id = db
        .tenants()
        .create("Test Property", &TenantTaxConfig::default())
        .await
        .unwrap();
    (db, tenant_id, dir)
}

pub(crate) async fn seed_room(db: &Database, tenant_id: &str, number: &str, price: i64) -> Room {
    db.rooms()
        .create(tenant_id, number, "deluxe", Money::from_cents(price))
        .await
        .unwrap()
}

/// UTC timestamp shorthand.
pub(crate) fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
}

pub(crate) fn guests(names: &[&str]) -> Vec<String> {
    names.iter().map(|n| n.to_string()).collect()
}

/// Room line from noon on `from` to noon on `to`, January 2024.
pub(crate) fn line(room: &Room, from: u32, to: u32) -> RoomInterval {
    RoomInterval::new(room.id.clone(), at(2024, 1, from, 12, 0), at(2024, 1, to, 12, 0))
}

pub(crate) fn dish(name: &str, price: i64, qty: i64) -> NewOrderItem {
    NewOrderItem {
        food_item_id: format!("food-{name}"),
        name: name.to_string(),
        unit_price: Money::from_cents(price),
        quantity: qty,
    }
}

/// Booking of one room, checked in 10 Jan 14:00 and out 11 Jan 10:00
/// (one hotel-standard night).
pub(crate) async fn completed_stay(
    db: &Database,
    tenant_id: &str,
    number: &str,
    price: i64,
) -> (Booking, RoomBooking) {
    let (booking, rb) = in_house_stay(db, tenant_id, number, price).await;
    db.stays()
        .check_out(&rb.id, "desk", at(2024, 1, 11, 10, 0))
        .await
        .unwrap();
    (booking, rb)
}

/// Booking of one room for [10 Jan 12:00, 12 Jan 12:00), checked in
/// 10 Jan 14:00.
pub(crate) async fn in_house_stay(
    db: &Database,
    tenant_id: &str,
    number: &str,
    price: i64,
) -> (Booking, RoomBooking) {
    let room = seed_room(db, tenant_id, number, price).await;
    let booking = db
        .bookings()
        .allocate(tenant_id, &guests(&["g1"]), &[line(&room, 10, 12)], "desk")
        .await
        .unwrap();
    let rb = db
        .bookings()
        .room_bookings(&booking.id)
        .await
        .unwrap()
        .remove(0);
    db.stays()
        .check_in(&rb.id, &guests(&["g1"]), "desk", at(2024, 1, 10, 14, 0))
        .await
        .unwrap();
    (booking, rb)
}
