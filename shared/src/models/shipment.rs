//! Incoming shipments awaiting placement

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::{CustomerId, Quantity, ShipmentId};

/// A received shipment that has not yet been placed into a location.
///
/// Shipments are consumed exactly once, by the Receive command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomingShipment {
    pub shipping_id: ShipmentId,
    pub customer_id: CustomerId,
    /// Joined from the customer registry on read; `None` for unknown customers
    pub customer_name: Option<String>,
    pub stock_id: String,
    /// Unit cost of every item in the shipment
    pub cost: Decimal,
    pub quantity: Quantity,
    pub min_required_quantity: Quantity,
    pub max_required_quantity: Quantity,
    pub description: String,
    pub material_type: String,
    pub is_active: bool,
    pub owner: String,
}

/// Input for adding a shipment to the intake queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewShipment {
    pub customer_id: CustomerId,
    pub stock_id: String,
    pub cost: Decimal,
    pub quantity: Quantity,
    pub min_required_quantity: Quantity,
    pub max_required_quantity: Quantity,
    pub description: String,
    pub material_type: String,
    pub is_active: bool,
    pub owner: String,
}
