//! Located materials: per-location quantity records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::IncomingShipment;
use crate::types::{CustomerId, LocationId, MaterialId, Quantity};

/// A material's quantity record at one location for one owner.
///
/// `location_id == None` marks a retired record: its quantity is zero and it
/// stays around so its identity can be reused by a later Receive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocatedMaterial {
    pub material_id: MaterialId,
    pub stock_id: String,
    pub location_id: Option<LocationId>,
    pub customer_id: CustomerId,
    pub material_type: String,
    pub description: String,
    pub notes: Option<String>,
    pub quantity: Quantity,
    pub is_active: bool,
    pub min_required_quantity: Quantity,
    pub max_required_quantity: Quantity,
    pub owner: String,
    pub is_primary: bool,
    pub updated_at: DateTime<Utc>,
}

impl LocatedMaterial {
    pub fn is_retired(&self) -> bool {
        self.location_id.is_none()
    }
}

/// Attributes for a freshly created located material
#[derive(Debug, Clone, PartialEq)]
pub struct NewLocatedMaterial {
    pub stock_id: String,
    pub location_id: LocationId,
    pub customer_id: CustomerId,
    pub material_type: String,
    pub description: String,
    pub notes: Option<String>,
    pub quantity: Quantity,
    pub is_active: bool,
    pub min_required_quantity: Quantity,
    pub max_required_quantity: Quantity,
    pub owner: String,
}

impl NewLocatedMaterial {
    /// First placement of a shipment's stock
    pub fn from_shipment(
        shipment: &IncomingShipment,
        location_id: LocationId,
        quantity: Quantity,
        notes: Option<String>,
    ) -> Self {
        Self {
            stock_id: shipment.stock_id.clone(),
            location_id,
            customer_id: shipment.customer_id,
            material_type: shipment.material_type.clone(),
            description: shipment.description.clone(),
            notes,
            quantity,
            is_active: shipment.is_active,
            min_required_quantity: shipment.min_required_quantity,
            max_required_quantity: shipment.max_required_quantity,
            owner: shipment.owner.clone(),
        }
    }

    /// Destination side of a move into a location that holds none of this stock yet
    pub fn from_source(
        source: &LocatedMaterial,
        location_id: LocationId,
        quantity: Quantity,
        notes: Option<String>,
    ) -> Self {
        Self {
            stock_id: source.stock_id.clone(),
            location_id,
            customer_id: source.customer_id,
            material_type: source.material_type.clone(),
            description: source.description.clone(),
            notes: notes.or_else(|| source.notes.clone()),
            quantity,
            is_active: source.is_active,
            min_required_quantity: source.min_required_quantity,
            max_required_quantity: source.max_required_quantity,
            owner: source.owner.clone(),
        }
    }
}

/// A located material joined with its display names, as returned by listings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaterialListing {
    #[serde(flatten)]
    pub material: LocatedMaterial,
    pub customer_name: Option<String>,
    pub location_name: Option<String>,
    pub warehouse_name: Option<String>,
}

/// Conjunctive listing filter. Empty strings and `None` match everything;
/// string fields are case-insensitive substring matches.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MaterialFilter {
    pub material_id: Option<MaterialId>,
    pub stock_id: String,
    pub customer_name: String,
    pub description: String,
    pub location_name: String,
}

impl MaterialFilter {
    /// Case-insensitive substring match where an empty needle always matches
    pub fn matches_text(needle: &str, haystack: Option<&str>) -> bool {
        if needle.is_empty() {
            return true;
        }
        haystack
            .map(|h| h.to_lowercase().contains(&needle.to_lowercase()))
            .unwrap_or(false)
    }
}
