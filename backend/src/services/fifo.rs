//! FIFO lot consumption
//!
//! Planning is pure: [`plan_fifo`] walks the live lots oldest first and decides
//! how much to take from each. [`consume_fifo`] applies that plan inside a
//! transaction, writing one ledger entry per lot touched.

use chrono::{DateTime, Utc};
use ledger_shared::{Lot, LotId, LotMovement, MaterialId, NewLedgerEntry, Quantity};
use tracing::error;

use crate::error::{LedgerError, LedgerResult};
use crate::store::LedgerTx;

/// Live lots held less than the requested quantity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Shortfall {
    pub requested: Quantity,
    pub available: i64,
}

/// Notes, job ticket and timestamp written on every entry of one command step
#[derive(Debug, Clone)]
pub struct Provenance {
    pub notes: Option<String>,
    pub job_ticket: Option<String>,
    pub at: DateTime<Utc>,
}

impl Provenance {
    pub fn new(notes: impl Into<String>, job_ticket: Option<String>, at: DateTime<Utc>) -> Self {
        Self {
            notes: Some(notes.into()),
            job_ticket,
            at,
        }
    }

    pub fn entry(&self, price_id: LotId, quantity_change: Quantity) -> NewLedgerEntry {
        NewLedgerEntry {
            price_id,
            quantity_change,
            notes: self.notes.clone(),
            job_ticket: self.job_ticket.clone(),
            updated_at: self.at,
        }
    }
}

/// Job ticket stamped on both sides of a move
pub fn auto_ticket(at: DateTime<Utc>) -> String {
    format!("Auto-Ticket: {}", at.to_rfc3339())
}

/// Decide how much to draw from each lot, oldest first.
///
/// `lots` must already be ordered by lot id ascending. Inert lots are skipped.
pub fn plan_fifo(lots: &[Lot], quantity: Quantity) -> Result<Vec<LotMovement>, Shortfall> {
    let mut remaining = quantity;
    let mut draws = Vec::new();

    for lot in lots.iter().filter(|lot| lot.is_live()) {
        if remaining == 0 {
            break;
        }
        let take = remaining.min(lot.quantity);
        draws.push(LotMovement {
            price_id: lot.price_id,
            quantity: take,
            cost: lot.cost,
        });
        remaining -= take;
    }

    if remaining > 0 {
        return Err(Shortfall {
            requested: quantity,
            available: lots
                .iter()
                .filter(|lot| lot.is_live())
                .map(|lot| i64::from(lot.quantity))
                .sum(),
        });
    }

    Ok(draws)
}

/// Take `quantity` from a material's live lots and log a negative entry per lot
pub async fn consume_fifo<T: LedgerTx>(
    tx: &mut T,
    material_id: MaterialId,
    quantity: Quantity,
    provenance: &Provenance,
) -> LedgerResult<Vec<LotMovement>> {
    let lots = tx.list_live_lots(material_id).await?;

    let draws = plan_fifo(&lots, quantity).map_err(|shortfall| {
        error!(
            material_id,
            requested = shortfall.requested,
            available = shortfall.available,
            "Live lots do not cover the material quantity"
        );
        LedgerError::InsufficientLots {
            material_id,
            requested: shortfall.requested,
            available: shortfall.available,
        }
    })?;

    for draw in &draws {
        tx.adjust_lot_quantity(draw.price_id, -draw.quantity).await?;
        tx.append_entry(&provenance.entry(draw.price_id, -draw.quantity))
            .await?;
    }

    Ok(draws)
}

/// Carry consumed lots over to a material at their original cost.
///
/// Returns the destination lots, in the order of `draws`.
pub async fn place_lots<T: LedgerTx>(
    tx: &mut T,
    material_id: MaterialId,
    draws: &[LotMovement],
    provenance: &Provenance,
) -> LedgerResult<Vec<LotMovement>> {
    let mut placed = Vec::with_capacity(draws.len());

    for draw in draws {
        let price_id = tx.upsert_lot(material_id, draw.quantity, draw.cost).await?;
        tx.append_entry(&provenance.entry(price_id, draw.quantity))
            .await?;
        placed.push(LotMovement {
            price_id,
            quantity: draw.quantity,
            cost: draw.cost,
        });
    }

    Ok(placed)
}
