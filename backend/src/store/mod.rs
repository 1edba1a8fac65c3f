//! Persistence for the ledger engine
//!
//! [`LedgerStore`] hands out one [`LedgerTx`] per command. A transaction that is
//! dropped without [`LedgerTx::commit`] rolls back, so early returns, timeouts
//! and cancelled futures never leave partial writes behind.

use async_trait::async_trait;
use ledger_shared::{
    IncomingShipment, LedgerEntry, LocatedMaterial, LocationId, Lot, LotId, MaterialFilter,
    MaterialId, MaterialListing, NewLedgerEntry, NewLocatedMaterial, NewShipment, Quantity,
    ShipmentId,
};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::error::LedgerResult;

pub mod memory;
pub mod postgres;

pub use memory::{MemoryStore, StoreOp};
pub use postgres::PostgresStore;

/// A located material's quantity next to the sum of its live lots
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MaterialBalance {
    pub material_id: MaterialId,
    pub quantity: Quantity,
    pub lot_total: i64,
}

/// A lot's quantity next to the sum of its ledger entries
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LotBalance {
    pub price_id: LotId,
    pub quantity: Quantity,
    pub ledger_total: i64,
}

/// Entry point to a ledger backend: transactions plus read-only queries
#[async_trait]
pub trait LedgerStore: Send + Sync + 'static {
    type Tx: LedgerTx;

    /// Open the atomic scope for one command
    async fn begin(&self) -> LedgerResult<Self::Tx>;

    /// Material categories known to the store
    async fn material_types(&self) -> LedgerResult<Vec<String>>;

    /// Placed materials matching `filter`, ordered by stock id
    async fn materials(&self, filter: &MaterialFilter) -> LedgerResult<Vec<MaterialListing>>;

    /// Non-locking read of a single material, retired or not
    async fn material(&self, material_id: MaterialId) -> LedgerResult<LocatedMaterial>;

    /// Shipments in the intake queue; `None` lists all of them
    async fn incoming(&self, shipping_id: Option<ShipmentId>)
        -> LedgerResult<Vec<IncomingShipment>>;

    /// Add a shipment to the intake queue
    async fn enqueue_shipment(&self, shipment: &NewShipment) -> LedgerResult<ShipmentId>;

    /// Every lot of a material, inert ones included, oldest first
    async fn lots(&self, material_id: MaterialId) -> LedgerResult<Vec<Lot>>;

    /// Ledger entries of one lot in append order
    async fn entries(&self, price_id: LotId) -> LedgerResult<Vec<LedgerEntry>>;

    async fn material_balances(&self) -> LedgerResult<Vec<MaterialBalance>>;

    async fn lot_balances(&self) -> LedgerResult<Vec<LotBalance>>;
}

/// Operations available inside one command's transaction.
///
/// Reads of rows the command will write lock them until commit or rollback.
#[async_trait]
pub trait LedgerTx: Send + Sized {
    // Intake queue

    /// Load and lock a shipment
    async fn lock_shipment(&mut self, shipping_id: ShipmentId)
        -> LedgerResult<Option<IncomingShipment>>;

    async fn delete_shipment(&mut self, shipping_id: ShipmentId) -> LedgerResult<()>;

    // Material locations

    /// Load and lock a material; `NotFound` if absent
    async fn get_material(&mut self, material_id: MaterialId) -> LedgerResult<LocatedMaterial>;

    async fn find_by_location(
        &mut self,
        stock_id: &str,
        location_id: LocationId,
        owner: &str,
    ) -> LedgerResult<Option<LocatedMaterial>>;

    /// A retired record for the stock and owner, eligible for reuse
    async fn find_unplaced(
        &mut self,
        stock_id: &str,
        owner: &str,
    ) -> LedgerResult<Option<LocatedMaterial>>;

    async fn create_located(&mut self, material: &NewLocatedMaterial) -> LedgerResult<MaterialId>;

    /// Apply a signed delta and return the new quantity. `notes = None` keeps
    /// the current notes. A negative result is a `Conflict`.
    async fn increase_quantity(
        &mut self,
        material_id: MaterialId,
        delta: Quantity,
        notes: Option<&str>,
    ) -> LedgerResult<Quantity>;

    /// Put a retired record back into a location with a fresh quantity
    async fn place(
        &mut self,
        material_id: MaterialId,
        location_id: LocationId,
        quantity: Quantity,
        notes: Option<&str>,
    ) -> LedgerResult<()>;

    /// Clear the location and zero the quantity
    async fn retire(&mut self, material_id: MaterialId) -> LedgerResult<()>;

    async fn set_primary(&mut self, material_id: MaterialId, is_primary: bool) -> LedgerResult<()>;

    // Lots

    /// Live lots of a material ordered by lot id ascending
    async fn list_live_lots(&mut self, material_id: MaterialId) -> LedgerResult<Vec<Lot>>;

    /// Apply a signed delta to one lot and return its unit cost
    async fn adjust_lot_quantity(&mut self, price_id: LotId, delta: Quantity)
        -> LedgerResult<Decimal>;

    /// Create the lot for (material, cost) or add to the existing one
    async fn upsert_lot(
        &mut self,
        material_id: MaterialId,
        quantity: Quantity,
        cost: Decimal,
    ) -> LedgerResult<LotId>;

    // Transaction log

    async fn append_entry(&mut self, entry: &NewLedgerEntry) -> LedgerResult<()>;

    /// Make every write of this scope visible at once
    async fn commit(self) -> LedgerResult<()>;
}
