//! # Validation Module
//!
//! Input validation for Hearth entities. Runs before any state is touched.
//!
//! ## Usage
//! ```rust
//! use hearth_core::validation::{validate_room_number, validate_quantity};
//!
//! assert!(validate_room_number("101").is_ok());
//! assert!(validate_quantity(0).is_err());
//! ```

use crate::error::ValidationError;
use crate::money::Money;
use crate::MAX_ITEM_QUANTITY;

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// String Validators
// =============================================================================

fn validate_text(field: &str, value: &str, max: usize) -> ValidationResult<()> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }
    if value.chars().count() > max {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max,
        });
    }
    Ok(())
}

/// Validates a room number.
///
/// ## Rules
/// - Must not be empty, at most 20 characters
/// - Letters, digits, hyphens only ("101", "PH-2")
pub fn validate_room_number(room_number: &str) -> ValidationResult<()> {
    validate_text("room_number", room_number, 20)?;
    if !room_number
        .trim()
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-')
    {
        return Err(ValidationError::InvalidFormat {
            field: "room_number".to_string(),
            reason: "must contain only letters, numbers, and hyphens".to_string(),
        });
    }
    Ok(())
}

/// Validates a display name (room type, service, menu item).
pub fn validate_name(field: &str, name: &str) -> ValidationResult<()> {
    validate_text(field, name, 200)
}

/// Validates the acting staff identity.
pub fn validate_actor(actor_id: &str) -> ValidationResult<()> {
    validate_text("actor_id", actor_id, 64)
}

/// Validates a guest list: at least one guest, no blank entries.
pub fn validate_guests(guests: &[String]) -> ValidationResult<()> {
    if guests.is_empty() {
        return Err(ValidationError::Required {
            field: "guests".to_string(),
        });
    }
    for guest in guests {
        validate_text("guest", guest, 64)?;
    }
    Ok(())
}

/// Validates a GSTIN (Indian GST identification number).
///
/// ## Format
/// ```text
/// 27  AAPFU0939F  1  Z  V
/// │   │           │  │  └─ check character
/// │   │           │  └──── always 'Z'
/// │   │           └─────── entity number (1-9, A-Z)
/// │   └─────────────────── PAN of the holder
/// └─────────────────────── state code
/// ```
pub fn validate_gstin(gstin: &str) -> ValidationResult<()> {
    let invalid = |reason: &str| ValidationError::InvalidFormat {
        field: "customer_gst".to_string(),
        reason: reason.to_string(),
    };

    let bytes = gstin.as_bytes();
    if bytes.len() != 15 {
        return Err(invalid("must be exactly 15 characters"));
    }
    if !bytes.iter().all(|b| b.is_ascii_digit() || b.is_ascii_uppercase()) {
        return Err(invalid("must contain only digits and uppercase letters"));
    }

    let digits = |range: std::ops::Range<usize>| bytes[range].iter().all(u8::is_ascii_digit);
    let letters = |range: std::ops::Range<usize>| bytes[range].iter().all(u8::is_ascii_uppercase);
    let well_formed = digits(0..2)
        && letters(2..7)
        && digits(7..11)
        && letters(11..12)
        && bytes[12] != b'0'
        && bytes[13] == b'Z';
    if !well_formed {
        return Err(invalid("does not match the GSTIN layout"));
    }
    Ok(())
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Prices may be zero (complimentary) but not negative.
pub fn validate_price(field: &str, price: Money) -> ValidationResult<()> {
    if price.is_negative() {
        return Err(ValidationError::Negative {
            field: field.to_string(),
        });
    }
    Ok(())
}

/// Validates an order line quantity.
pub fn validate_quantity(qty: i64) -> ValidationResult<()> {
    if qty <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }
    if qty > MAX_ITEM_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: MAX_ITEM_QUANTITY,
        });
    }
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
