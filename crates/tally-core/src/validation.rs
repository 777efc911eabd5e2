//! # Validation Module
//!
//! Boundary validation for back-office inputs.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: HTTP layer (outside this workspace)                          │
//! │  └── Deserialization, authentication                                   │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: Service facade (apps/backoffice)                             │
//! │  └── THIS MODULE: runs before any transaction is opened                │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                            │
//! │  ├── CHECK (quantity >= 0) on stocks                                   │
//! │  ├── UNIQUE sale codes                                                 │
//! │  └── Append-only triggers on stock history                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use tally_core::validation::{validate_quantity, validate_sale_code};
//!
//! assert!(validate_quantity(5).is_ok());
//! assert!(validate_quantity(0).is_err());
//! assert!(validate_sale_code("ORD-1700000000000").is_ok());
//! ```

use crate::error::ValidationError;
use crate::quota::NewTopup;
use crate::types::{DateRange, NewFinanceEntry, NewSale};
use crate::{MAX_ITEM_QUANTITY, MAX_NOTE_LENGTH, MAX_ORDER_LINES};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// String Validators
// =============================================================================

/// Validates a sale code as typed by a manager.
///
/// ## Rules
/// - Must not be blank
/// - At most 64 characters
pub fn validate_sale_code(code: &str) -> ValidationResult<()> {
    let code = code.trim();

    if code.is_empty() {
        return Err(ValidationError::required("code"));
    }

    if code.len() > 64 {
        return Err(ValidationError::TooLong {
            field: "code".to_string(),
            max: 64,
        });
    }

    Ok(())
}

/// Validates an identifier field (stock id, product id).
pub fn validate_id(field: &str, id: &str) -> ValidationResult<()> {
    if id.trim().is_empty() {
        return Err(ValidationError::required(field));
    }
    Ok(())
}

/// Validates an optional free-text note.
pub fn validate_note(note: Option<&str>) -> ValidationResult<()> {
    match note {
        Some(n) if n.chars().count() > MAX_NOTE_LENGTH => Err(ValidationError::TooLong {
            field: "note".to_string(),
            max: MAX_NOTE_LENGTH,
        }),
        _ => Ok(()),
    }
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a line quantity.
///
/// ## Rules
/// - Must be positive
/// - At most [`MAX_ITEM_QUANTITY`]
pub fn validate_quantity(qty: i64) -> ValidationResult<()> {
    validate_quantity_field("quantity", qty)
}

fn validate_quantity_field(field: &str, qty: i64) -> ValidationResult<()> {
    if qty <= 0 {
        return Err(ValidationError::MustBePositive {
            field: field.to_string(),
        });
    }

    if qty > MAX_ITEM_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: 1,
            max: MAX_ITEM_QUANTITY,
        });
    }

    Ok(())
}

/// Validates an administrative quota value.
pub fn validate_used_quota(used: i64) -> ValidationResult<()> {
    if used < 0 {
        return Err(ValidationError::MustNotBeNegative {
            field: "used_quota".to_string(),
        });
    }
    Ok(())
}

// =============================================================================
// Composite Validators
// =============================================================================

/// Validates a sale before it is created.
///
/// ## Rules
/// - At least one line, at most [`MAX_ORDER_LINES`]
/// - Every line has a name, a non-negative price and a valid quantity
/// - Amount is non-negative
pub fn validate_new_sale(sale: &NewSale) -> ValidationResult<()> {
    if sale.items.is_empty() {
        return Err(ValidationError::Empty {
            field: "items".to_string(),
        });
    }

    if sale.items.len() > MAX_ORDER_LINES {
        return Err(ValidationError::OutOfRange {
            field: "items".to_string(),
            min: 1,
            max: MAX_ORDER_LINES as i64,
        });
    }

    if sale.amount.is_negative() {
        return Err(ValidationError::MustNotBeNegative {
            field: "amount".to_string(),
        });
    }

    for (i, item) in sale.items.iter().enumerate() {
        if item.name.trim().is_empty() {
            return Err(ValidationError::required(format!("items[{}].name", i)));
        }
        if item.unit_price.is_negative() {
            return Err(ValidationError::MustNotBeNegative {
                field: format!("items[{}].unit_price", i),
            });
        }
        validate_quantity_field(&format!("items[{}].quantity", i), item.quantity)?;
    }

    Ok(())
}

/// Validates a top-up purchase: positive amount and a named manager.
pub fn validate_topup(topup: &NewTopup) -> ValidationResult<()> {
    if topup.amount <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "amount".to_string(),
        });
    }

    if topup.manager.trim().is_empty() {
        return Err(ValidationError::required("manager"));
    }

    validate_note(topup.note.as_deref())
}

/// Validates a manually recorded finance entry.
pub fn validate_finance_entry(entry: &NewFinanceEntry) -> ValidationResult<()> {
    if entry.title.trim().is_empty() {
        return Err(ValidationError::required("title"));
    }
    if entry.category.trim().is_empty() {
        return Err(ValidationError::required("category"));
    }
    if entry.amount.is_negative() {
        return Err(ValidationError::MustNotBeNegative {
            field: "amount".to_string(),
        });
    }
    validate_note(entry.note.as_deref())
}

/// Validates that a date range is not inverted.
pub fn validate_date_range(range: &DateRange) -> ValidationResult<()> {
    if let (Some(from), Some(to)) = (range.from, range.to) {
        if from > to {
            return Err(ValidationError::InvalidFormat {
                field: "range".to_string(),
                reason: format!("from {} is after to {}", from, to),
            });
        }
    }
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::money::Money;
    use crate::types::{CustomerSnapshot, NewSaleItem, PaymentMethod};
    use chrono::NaiveDate;

    fn line(qty: i64) -> NewSaleItem {
        NewSaleItem {
            product_id: Some("p-1".to_string()),
            name: "Pomade".to_string(),
            category: None,
            unit_price: Money::from_minor(35_000),
            quantity: qty,
        }
    }

    fn sale(items: Vec<NewSaleItem>) -> NewSale {
        NewSale {
            payment_method: PaymentMethod::Cash,
            amount: Money::from_minor(35_000),
            stylist: None,
            stylist_id: None,
            customer: CustomerSnapshot::default(),
            operator_name: None,
            items,
        }
    }

    #[test]
    fn test_validate_sale_code() {
        assert!(validate_sale_code("ORD-1").is_ok());
        assert!(validate_sale_code("   ").is_err());
        assert!(validate_sale_code(&"X".repeat(65)).is_err());
    }

    #[test]
    fn test_validate_quantity() {
        assert!(validate_quantity(1).is_ok());
        assert!(validate_quantity(MAX_ITEM_QUANTITY).is_ok());
        assert!(validate_quantity(0).is_err());
        assert!(validate_quantity(-1).is_err());
        assert!(validate_quantity(MAX_ITEM_QUANTITY + 1).is_err());
    }

    #[test]
    fn test_validate_new_sale_rejects_empty() {
        let err = validate_new_sale(&sale(vec![])).unwrap_err();
        assert!(matches!(err, ValidationError::Empty { .. }));
    }

    #[test]
    fn test_validate_new_sale_names_bad_line() {
        let err = validate_new_sale(&sale(vec![line(1), line(0)])).unwrap_err();
        assert_eq!(err.to_string(), "items[1].quantity must be positive");

        assert!(validate_new_sale(&sale(vec![line(2), line(1)])).is_ok());
    }

    #[test]
    fn test_validate_topup() {
        let mut topup = NewTopup {
            amount: 100,
            manager: "Rina".to_string(),
            note: None,
            date: None,
        };
        assert!(validate_topup(&topup).is_ok());

        topup.amount = 0;
        assert!(validate_topup(&topup).is_err());

        topup.amount = 10;
        topup.manager = " ".to_string();
        assert!(validate_topup(&topup).is_err());
    }

    #[test]
    fn test_validate_date_range() {
        let d = |day| NaiveDate::from_ymd_opt(2024, 3, day).unwrap();
        assert!(validate_date_range(&DateRange::new(Some(d(1)), Some(d(1)))).is_ok());
        assert!(validate_date_range(&DateRange::new(Some(d(5)), Some(d(1)))).is_err());
        assert!(validate_date_range(&DateRange::new(None, Some(d(1)))).is_ok());
    }

    #[test]
    fn test_validate_used_quota() {
        assert!(validate_used_quota(0).is_ok());
        assert!(validate_used_quota(-1).is_err());
    }
}
