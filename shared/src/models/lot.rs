//! FIFO cost lots and the append-only ledger

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::{EntryId, LotId, MaterialId, Quantity};

/// A quantity of one located material held at a single unit cost.
///
/// Lot ids are assigned monotonically, so ascending id order is arrival order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lot {
    pub price_id: LotId,
    pub material_id: MaterialId,
    pub quantity: Quantity,
    pub cost: Decimal,
}

impl Lot {
    /// Zero-quantity lots are kept for cost history but never consumed
    pub fn is_live(&self) -> bool {
        self.quantity > 0
    }
}

/// One immutable signed quantity change applied to one lot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    pub entry_id: EntryId,
    pub price_id: LotId,
    pub quantity_change: Quantity,
    pub notes: Option<String>,
    pub job_ticket: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Ledger entry before the store assigns its id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLedgerEntry {
    pub price_id: LotId,
    pub quantity_change: Quantity,
    pub notes: Option<String>,
    pub job_ticket: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Quantity taken from (or placed into) a lot at its unit cost
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LotMovement {
    pub price_id: LotId,
    pub quantity: Quantity,
    pub cost: Decimal,
}
