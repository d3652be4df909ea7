//! # Seed Data Generator
//!
//! Populates a database with a demo property: the default tenant, a block
//! of rooms across three floors and a small service catalogue.
//!
//! ## Usage
//! ```bash
//! # Seed using hearth.toml / HEARTH_* settings
//! cargo run -p hearth-db --bin seed
//!
//! # Specify database path and room count
//! cargo run -p hearth-db --bin seed -- --db ./data/hearth.db --rooms 30
//! ```
//!
//! ## Generated Rooms
//! Room numbers are `{floor}{index:02}` (101, 102, ... 301). Room type and
//! nightly price cycle through [`ROOM_TYPES`], so every seeded property has
//! rooms on both sides of the hotel GST threshold.

use chrono::{Duration, Utc};
use std::env;
use std::path::PathBuf;

use hearth_core::{Money, TenantTaxConfig};
use hearth_db::{Database, HearthConfig};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// (room type, nightly price in paise)
const ROOM_TYPES: &[(&str, i64)] = &[
    ("standard", 3_500_00),
    ("deluxe", 5_000_00),
    ("premium", 7_500_00),
    ("suite", 12_000_00),
];

/// (name, category, price in paise)
const SERVICES: &[(&str, &str, i64)] = &[
    ("Laundry (per kg)", "housekeeping", 150_00),
    ("Ironing", "housekeeping", 80_00),
    ("Airport Pickup", "transport", 1_200_00),
    ("City Tour", "transport", 2_500_00),
    ("Spa Massage", "wellness", 1_500_00),
    ("Gym Day Pass", "wellness", 300_00),
    ("Extra Bed", "room", 800_00),
    ("Late Checkout", "room", 1_000_00),
];

const FLOORS: usize = 3;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    let mut room_count: usize = 24;
    let mut db_path: Option<PathBuf> = None;
    let mut config_path: Option<PathBuf> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--rooms" | "-r" => {
                if i + 1 < args.len() {
                    room_count = args[i + 1].parse().unwrap_or(24);
                    i += 1;
                }
            }
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    config_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Hearth Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -r, --rooms <N>      Number of rooms to create (default: 24)");
                println!("  -d, --db <PATH>      Database file path (overrides config)");
                println!("  -c, --config <PATH>  hearth.toml location");
                println!("  -h, --help           Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    let mut config = HearthConfig::load(config_path)?;
    if let Some(path) = db_path {
        config.database.path = Some(path);
    }

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&config.logging.filter))
        .init();

    println!("🌱 Hearth Seed Data Generator");
    println!("=============================");
    println!("Database: {}", config.database_path().display());
    println!("Tenant:   {}", config.tenant.default_id);
    println!("Rooms:    {}", room_count);
    println!();

    let db = Database::new(config.db_config()).await?;
    println!("✓ Connected to database");

    let tenant_id = config.tenant.default_id.as_str();
    if db.tenants().exists(tenant_id).await? {
        println!("⚠ Tenant {} already exists", tenant_id);
        println!("  Skipping seed to avoid duplicates.");
        println!("  Delete the database file to regenerate.");
        return Ok(());
    }

    db.tenants()
        .insert(tenant_id, "Hearth Demo Property", &TenantTaxConfig::default())
        .await?;
    println!("✓ Tenant created with default GST configuration");

    let start = std::time::Instant::now();
    let per_floor = room_count.div_ceil(FLOORS).max(1);
    let mut rooms = 0;

    for index in 0..room_count {
        let floor = index / per_floor + 1;
        let number = format!("{}{:02}", floor, index % per_floor + 1);
        let (room_type, price) = ROOM_TYPES[index % ROOM_TYPES.len()];

        match db
            .rooms()
            .create(tenant_id, &number, room_type, Money::from_cents(price))
            .await
        {
            Ok(_) => rooms += 1,
            Err(e) => warn!(room = %number, error = %e, "Failed to create room"),
        }
    }
    println!("✓ Created {} rooms", rooms);

    let mut services = 0;
    for (name, category, price) in SERVICES {
        match db
            .services()
            .create(tenant_id, name, category, Money::from_cents(*price))
            .await
        {
            Ok(_) => services += 1,
            Err(e) => warn!(service = %name, error = %e, "Failed to create service"),
        }
    }
    println!("✓ Created {} services", services);

    let now = Utc::now();
    let available = db
        .rooms()
        .availability(tenant_id, now, now + Duration::days(1))
        .await?;
    info!(available = available.len(), elapsed = ?start.elapsed(), "Seed complete");

    println!();
    println!("  Rooms available tonight: {}", available.len());
    println!("✓ Seed complete in {:?}", start.elapsed());

    db.close().await;
    Ok(())
}
