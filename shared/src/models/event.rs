//! Change notifications emitted after a committed command

use serde::{Deserialize, Serialize};

use crate::types::{MaterialId, Quantity};

/// Event pushed to the notification sink.
///
/// Serialized as `{"kind":"materialsChanged","locatedMaterialId":1,"newQuantity":20}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum LedgerEvent {
    MaterialsChanged {
        located_material_id: MaterialId,
        new_quantity: Quantity,
    },
}

impl LedgerEvent {
    pub fn materials_changed(located_material_id: MaterialId, new_quantity: Quantity) -> Self {
        LedgerEvent::MaterialsChanged {
            located_material_id,
            new_quantity,
        }
    }
}
