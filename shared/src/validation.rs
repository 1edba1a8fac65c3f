//! Validation of ledger command inputs
//!
//! Transport code parses strings into typed commands; these checks enforce the
//! remaining range constraints before any command touches the store.

use rust_decimal::Decimal;
use thiserror::Error;

use crate::models::{MoveCommand, NewShipment, ReceiveCommand, RemoveCommand};
use crate::types::{Quantity, COST_LIMIT, COST_SCALE, MAX_TEXT_LEN};

/// A rejected input field and the reason
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct FieldError {
    pub field: &'static str,
    pub message: &'static str,
}

impl FieldError {
    fn new(field: &'static str, message: &'static str) -> Self {
        Self { field, message }
    }
}

// ============================================================================
// Field Validations
// ============================================================================

/// Quantities moved through the ledger must be at least one unit
pub fn validate_quantity(quantity: Quantity) -> Result<(), &'static str> {
    if quantity < 1 {
        return Err("Quantity must be a positive whole number");
    }
    Ok(())
}

/// Unit cost cannot be negative; zero-cost stock is allowed.
///
/// Costs are stored as `NUMERIC(12, 2)`, so anything finer than a cent or
/// at or above [`COST_LIMIT`] is rejected instead of being rounded by the
/// database.
pub fn validate_cost(cost: Decimal) -> Result<(), &'static str> {
    if cost < Decimal::ZERO {
        return Err("Cost cannot be negative");
    }
    if cost.normalize().scale() > COST_SCALE {
        return Err("Cost cannot have more than two decimal places");
    }
    if cost >= Decimal::from(COST_LIMIT) {
        return Err("Cost is too large");
    }
    Ok(())
}

/// Reorder thresholds must be non-negative and ordered
pub fn validate_thresholds(min: Quantity, max: Quantity) -> Result<(), &'static str> {
    if min < 0 || max < 0 {
        return Err("Reorder thresholds cannot be negative");
    }
    if min > max {
        return Err("Minimum quantity cannot exceed maximum quantity");
    }
    Ok(())
}

pub fn validate_stock_id(stock_id: &str) -> Result<(), &'static str> {
    if stock_id.trim().is_empty() {
        return Err("Stock ID is required");
    }
    Ok(())
}

pub fn validate_text(text: Option<&str>) -> Result<(), &'static str> {
    match text {
        Some(t) if t.chars().count() > MAX_TEXT_LEN => Err("Text is too long"),
        _ => Ok(()),
    }
}

// ============================================================================
// Command Validations
// ============================================================================

pub fn validate_receive(command: &ReceiveCommand) -> Result<(), FieldError> {
    validate_quantity(command.quantity).map_err(|m| FieldError::new("quantity", m))?;
    validate_text(command.notes.as_deref()).map_err(|m| FieldError::new("notes", m))?;
    Ok(())
}

pub fn validate_move(command: &MoveCommand) -> Result<(), FieldError> {
    validate_quantity(command.quantity).map_err(|m| FieldError::new("quantity", m))?;
    validate_text(command.notes.as_deref()).map_err(|m| FieldError::new("notes", m))?;
    Ok(())
}

pub fn validate_remove(command: &RemoveCommand) -> Result<(), FieldError> {
    validate_quantity(command.quantity).map_err(|m| FieldError::new("quantity", m))?;
    validate_text(command.job_ticket.as_deref()).map_err(|m| FieldError::new("jobTicket", m))?;
    Ok(())
}

pub fn validate_shipment(shipment: &NewShipment) -> Result<(), FieldError> {
    validate_stock_id(&shipment.stock_id).map_err(|m| FieldError::new("stockId", m))?;
    validate_quantity(shipment.quantity).map_err(|m| FieldError::new("quantity", m))?;
    validate_cost(shipment.cost).map_err(|m| FieldError::new("cost", m))?;
    validate_thresholds(shipment.min_required_quantity, shipment.max_required_quantity)
        .map_err(|m| FieldError::new("minQuantity", m))?;
    validate_text(Some(&shipment.description)).map_err(|m| FieldError::new("description", m))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn shipment() -> NewShipment {
        NewShipment {
            customer_id: 1,
            stock_id: "S1".to_string(),
            cost: Decimal::from_str("10.50").unwrap(),
            quantity: 20,
            min_required_quantity: 5,
            max_required_quantity: 50,
            description: "Steel sheet".to_string(),
            material_type: "sheet".to_string(),
            is_active: true,
            owner: "acme".to_string(),
        }
    }

    #[test]
    fn test_validate_quantity() {
        assert!(validate_quantity(1).is_ok());
        assert!(validate_quantity(0).is_err());
        assert!(validate_quantity(-4).is_err());
    }

    #[test]
    fn test_validate_cost() {
        assert!(validate_cost(Decimal::ZERO).is_ok());
        assert!(validate_cost(Decimal::from(-1)).is_err());
    }

    #[test]
    fn test_validate_cost_precision() {
        assert!(validate_cost(Decimal::from_str("10.25").unwrap()).is_ok());
        // trailing zeros do not count as precision
        assert!(validate_cost(Decimal::from_str("10.500").unwrap()).is_ok());
        assert!(validate_cost(Decimal::from_str("10.004").unwrap()).is_err());
    }

    #[test]
    fn test_validate_cost_limit() {
        assert!(validate_cost(Decimal::from_str("9999999999.99").unwrap()).is_ok());
        assert!(validate_cost(Decimal::from(COST_LIMIT)).is_err());
        assert!(validate_cost(Decimal::from_str("123456789012345.6789").unwrap()).is_err());
    }

    #[test]
    fn test_validate_thresholds() {
        assert!(validate_thresholds(0, 0).is_ok());
        assert!(validate_thresholds(10, 5).is_err());
        assert!(validate_thresholds(-1, 5).is_err());
    }

    #[test]
    fn test_validate_text_length() {
        assert!(validate_text(None).is_ok());
        assert!(validate_text(Some("short")).is_ok());
        let long = "x".repeat(MAX_TEXT_LEN + 1);
        assert!(validate_text(Some(&long)).is_err());
    }

    #[test]
    fn test_validate_receive_reports_field() {
        let command = ReceiveCommand {
            intake_id: 1,
            location_id: 1,
            quantity: 0,
            notes: None,
        };
        let err = validate_receive(&command).unwrap_err();
        assert_eq!(err.field, "quantity");
    }

    #[test]
    fn test_validate_remove_job_ticket_length() {
        let command = RemoveCommand {
            material_id: 1,
            quantity: 1,
            job_ticket: Some("t".repeat(MAX_TEXT_LEN + 1)),
        };
        assert_eq!(validate_remove(&command).unwrap_err().field, "jobTicket");
    }

    #[test]
    fn test_validate_shipment() {
        assert!(validate_shipment(&shipment()).is_ok());

        let mut blank = shipment();
        blank.stock_id = "  ".to_string();
        assert_eq!(validate_shipment(&blank).unwrap_err().field, "stockId");

        let mut negative = shipment();
        negative.cost = Decimal::from(-3);
        assert_eq!(validate_shipment(&negative).unwrap_err().field, "cost");
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn prop_positive_quantities_accepted(quantity in 1i32..=i32::MAX) {
                prop_assert!(validate_quantity(quantity).is_ok());
            }

            #[test]
            fn prop_non_positive_quantities_rejected(quantity in i32::MIN..=0i32) {
                prop_assert!(validate_quantity(quantity).is_err());
            }

            #[test]
            fn prop_ordered_thresholds_accepted(min in 0i32..1000, spread in 0i32..1000) {
                prop_assert!(validate_thresholds(min, min + spread).is_ok());
            }
        }
    }
}
