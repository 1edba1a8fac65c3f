//! Ledger commands and their receipts
//!
//! Commands arrive already parsed; the engine still checks them with
//! [`crate::validation`] before opening a transaction.

use serde::{Deserialize, Serialize};

use super::LotMovement;
use crate::types::{LocationId, LotId, MaterialId, Quantity, ShipmentId};

/// Place an incoming shipment into a location
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiveCommand {
    pub intake_id: ShipmentId,
    pub location_id: LocationId,
    pub quantity: Quantity,
    pub notes: Option<String>,
}

/// Move part or all of a located material to another location
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveCommand {
    pub material_id: MaterialId,
    pub location_id: LocationId,
    pub quantity: Quantity,
    pub notes: Option<String>,
}

/// Consume stock from a located material
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveCommand {
    pub material_id: MaterialId,
    pub quantity: Quantity,
    pub job_ticket: Option<String>,
}

/// Flag or unflag a located material as the primary location for its stock
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdjustCommand {
    pub material_id: MaterialId,
    pub is_primary: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiveReceipt {
    pub material_id: MaterialId,
    pub price_id: LotId,
    /// Quantity of the located material after the receipt
    pub quantity: Quantity,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveReceipt {
    pub source_id: MaterialId,
    pub source_quantity: Quantity,
    pub destination_id: MaterialId,
    pub destination_quantity: Quantity,
    /// Consumed source lots, oldest first, with the cost each carried over
    pub transferred: Vec<LotMovement>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveReceipt {
    pub material_id: MaterialId,
    pub remaining_quantity: Quantity,
    pub consumed: Vec<LotMovement>,
}
