//! In-process ledger store
//!
//! Each transaction holds the store lock and works on a private copy of the
//! state; commit swaps the copy in, drop discards it. Commands against one
//! store run one at a time.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use chrono::Utc;
use ledger_shared::{
    CustomerId, IncomingShipment, LedgerEntry, LocatedMaterial, LocationId, Lot, LotId,
    MaterialFilter, MaterialId, MaterialListing, NewLedgerEntry, NewLocatedMaterial, NewShipment,
    Quantity, ShipmentId,
};
use rust_decimal::Decimal;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::{LedgerStore, LedgerTx, LotBalance, MaterialBalance};
use crate::error::{LedgerError, LedgerResult};

/// Store operations that can be made to fail for rollback testing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    Begin,
    LockShipment,
    DeleteShipment,
    GetMaterial,
    CreateLocated,
    IncreaseQuantity,
    Place,
    Retire,
    SetPrimary,
    ListLiveLots,
    AdjustLot,
    UpsertLot,
    AppendEntry,
    Commit,
}

#[derive(Debug, Clone)]
struct LocationRecord {
    name: String,
    warehouse: Option<String>,
}

#[derive(Debug, Clone, Default)]
struct Sequences {
    customer: i64,
    location: i64,
    shipment: i64,
    material: i64,
    lot: i64,
    entry: i64,
}

impl Sequences {
    fn next(counter: &mut i64) -> i64 {
        *counter += 1;
        *counter
    }
}

#[derive(Debug, Clone, Default)]
struct MemoryState {
    customers: BTreeMap<CustomerId, String>,
    locations: BTreeMap<LocationId, LocationRecord>,
    material_types: Vec<String>,
    shipments: BTreeMap<ShipmentId, IncomingShipment>,
    materials: BTreeMap<MaterialId, LocatedMaterial>,
    lots: BTreeMap<LotId, Lot>,
    entries: Vec<LedgerEntry>,
    seq: Sequences,
}

impl MemoryState {
    fn material(&self, material_id: MaterialId) -> LedgerResult<&LocatedMaterial> {
        self.materials
            .get(&material_id)
            .ok_or_else(|| LedgerError::not_found("Material", material_id))
    }

    fn material_mut(&mut self, material_id: MaterialId) -> LedgerResult<&mut LocatedMaterial> {
        self.materials
            .get_mut(&material_id)
            .ok_or_else(|| LedgerError::not_found("Material", material_id))
    }

    fn require_location(&self, location_id: LocationId) -> LedgerResult<()> {
        if self.locations.contains_key(&location_id) {
            Ok(())
        } else {
            Err(LedgerError::Conflict(format!(
                "location {location_id} does not exist"
            )))
        }
    }

    fn require_free_slot(
        &self,
        stock_id: &str,
        location_id: LocationId,
        owner: &str,
    ) -> LedgerResult<()> {
        let taken = self.materials.values().any(|m| {
            m.location_id == Some(location_id) && m.stock_id == stock_id && m.owner == owner
        });
        if taken {
            return Err(LedgerError::Conflict(format!(
                "stock {stock_id} of {owner} is already placed at location {location_id}"
            )));
        }
        Ok(())
    }

    fn with_customer_name(&self, mut shipment: IncomingShipment) -> IncomingShipment {
        shipment.customer_name = self.customers.get(&shipment.customer_id).cloned();
        shipment
    }

    fn listing(&self, material: &LocatedMaterial) -> MaterialListing {
        let location = material
            .location_id
            .and_then(|id| self.locations.get(&id));
        MaterialListing {
            material: material.clone(),
            customer_name: self.customers.get(&material.customer_id).cloned(),
            location_name: location.map(|l| l.name.clone()),
            warehouse_name: location.and_then(|l| l.warehouse.clone()),
        }
    }
}

#[derive(Debug, Default)]
struct FaultPlan {
    pending: StdMutex<HashSet<StoreOp>>,
}

impl FaultPlan {
    fn arm(&self, op: StoreOp) {
        self.pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(op);
    }

    fn check(&self, op: StoreOp) -> LedgerResult<()> {
        let fired = self
            .pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&op);
        if fired {
            Err(LedgerError::StorageUnavailable(format!(
                "injected failure at {op:?}"
            )))
        } else {
            Ok(())
        }
    }
}

/// Ledger store kept entirely in memory
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
    faults: Arc<FaultPlan>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_customer(&self, name: &str) -> CustomerId {
        let mut state = self.state.lock().await;
        let id = Sequences::next(&mut state.seq.customer);
        state.customers.insert(id, name.to_string());
        id
    }

    pub async fn add_location(&self, name: &str, warehouse: Option<&str>) -> LocationId {
        let mut state = self.state.lock().await;
        let id = Sequences::next(&mut state.seq.location);
        state.locations.insert(
            id,
            LocationRecord {
                name: name.to_string(),
                warehouse: warehouse.map(str::to_string),
            },
        );
        id
    }

    pub async fn add_material_type(&self, name: &str) {
        let mut state = self.state.lock().await;
        if !state.material_types.iter().any(|t| t == name) {
            state.material_types.push(name.to_string());
        }
    }

    /// Make the next call of `op` fail with `StorageUnavailable`
    pub fn fail_next(&self, op: StoreOp) {
        self.faults.arm(op);
    }

    /// Overwrite a material's quantity without touching its lots, the way a
    /// manual database edit would. Used to exercise integrity checks.
    pub async fn force_material_quantity(
        &self,
        material_id: MaterialId,
        quantity: Quantity,
    ) -> LedgerResult<()> {
        let mut state = self.state.lock().await;
        state.material_mut(material_id)?.quantity = quantity;
        Ok(())
    }

    /// Entries across all lots in append order
    pub async fn all_entries(&self) -> Vec<LedgerEntry> {
        self.state.lock().await.entries.clone()
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    type Tx = MemoryTx;

    async fn begin(&self) -> LedgerResult<MemoryTx> {
        self.faults.check(StoreOp::Begin)?;
        let guard = self.state.clone().lock_owned().await;
        let work = guard.clone();
        Ok(MemoryTx {
            guard,
            work,
            faults: self.faults.clone(),
        })
    }

    async fn material_types(&self) -> LedgerResult<Vec<String>> {
        Ok(self.state.lock().await.material_types.clone())
    }

    async fn materials(&self, filter: &MaterialFilter) -> LedgerResult<Vec<MaterialListing>> {
        let state = self.state.lock().await;
        let mut listings: Vec<MaterialListing> = state
            .materials
            .values()
            .filter(|m| !m.is_retired())
            .filter(|m| filter.material_id.map_or(true, |id| m.material_id == id))
            .map(|m| state.listing(m))
            .filter(|l| {
                MaterialFilter::matches_text(&filter.stock_id, Some(&l.material.stock_id))
                    && MaterialFilter::matches_text(
                        &filter.customer_name,
                        l.customer_name.as_deref(),
                    )
                    && MaterialFilter::matches_text(
                        &filter.description,
                        Some(&l.material.description),
                    )
                    && MaterialFilter::matches_text(
                        &filter.location_name,
                        l.location_name.as_deref(),
                    )
            })
            .collect();
        listings.sort_by(|a, b| {
            a.material
                .stock_id
                .cmp(&b.material.stock_id)
                .then(a.material.material_id.cmp(&b.material.material_id))
        });
        Ok(listings)
    }

    async fn material(&self, material_id: MaterialId) -> LedgerResult<LocatedMaterial> {
        self.state.lock().await.material(material_id).cloned()
    }

    async fn incoming(
        &self,
        shipping_id: Option<ShipmentId>,
    ) -> LedgerResult<Vec<IncomingShipment>> {
        let state = self.state.lock().await;
        Ok(state
            .shipments
            .values()
            .filter(|s| shipping_id.map_or(true, |id| s.shipping_id == id))
            .map(|s| state.with_customer_name(s.clone()))
            .collect())
    }

    async fn enqueue_shipment(&self, shipment: &NewShipment) -> LedgerResult<ShipmentId> {
        let mut state = self.state.lock().await;
        if !state.customers.contains_key(&shipment.customer_id) {
            return Err(LedgerError::Conflict(format!(
                "customer {} does not exist",
                shipment.customer_id
            )));
        }
        let id = Sequences::next(&mut state.seq.shipment);
        state.shipments.insert(
            id,
            IncomingShipment {
                shipping_id: id,
                customer_id: shipment.customer_id,
                customer_name: None,
                stock_id: shipment.stock_id.clone(),
                cost: shipment.cost,
                quantity: shipment.quantity,
                min_required_quantity: shipment.min_required_quantity,
                max_required_quantity: shipment.max_required_quantity,
                description: shipment.description.clone(),
                material_type: shipment.material_type.clone(),
                is_active: shipment.is_active,
                owner: shipment.owner.clone(),
            },
        );
        Ok(id)
    }

    async fn lots(&self, material_id: MaterialId) -> LedgerResult<Vec<Lot>> {
        let state = self.state.lock().await;
        Ok(state
            .lots
            .values()
            .filter(|l| l.material_id == material_id)
            .cloned()
            .collect())
    }

    async fn entries(&self, price_id: LotId) -> LedgerResult<Vec<LedgerEntry>> {
        let state = self.state.lock().await;
        Ok(state
            .entries
            .iter()
            .filter(|e| e.price_id == price_id)
            .cloned()
            .collect())
    }

    async fn material_balances(&self) -> LedgerResult<Vec<MaterialBalance>> {
        let state = self.state.lock().await;
        Ok(state
            .materials
            .values()
            .map(|m| MaterialBalance {
                material_id: m.material_id,
                quantity: m.quantity,
                lot_total: state
                    .lots
                    .values()
                    .filter(|l| l.material_id == m.material_id && l.is_live())
                    .map(|l| i64::from(l.quantity))
                    .sum(),
            })
            .collect())
    }

    async fn lot_balances(&self) -> LedgerResult<Vec<LotBalance>> {
        let state = self.state.lock().await;
        Ok(state
            .lots
            .values()
            .map(|l| LotBalance {
                price_id: l.price_id,
                quantity: l.quantity,
                ledger_total: state
                    .entries
                    .iter()
                    .filter(|e| e.price_id == l.price_id)
                    .map(|e| i64::from(e.quantity_change))
                    .sum(),
            })
            .collect())
    }
}

/// Transaction over [`MemoryStore`]
pub struct MemoryTx {
    guard: OwnedMutexGuard<MemoryState>,
    work: MemoryState,
    faults: Arc<FaultPlan>,
}

#[async_trait]
impl LedgerTx for MemoryTx {
    async fn lock_shipment(
        &mut self,
        shipping_id: ShipmentId,
    ) -> LedgerResult<Option<IncomingShipment>> {
        self.faults.check(StoreOp::LockShipment)?;
        Ok(self
            .work
            .shipments
            .get(&shipping_id)
            .map(|s| self.work.with_customer_name(s.clone())))
    }

    async fn delete_shipment(&mut self, shipping_id: ShipmentId) -> LedgerResult<()> {
        self.faults.check(StoreOp::DeleteShipment)?;
        self.work
            .shipments
            .remove(&shipping_id)
            .map(|_| ())
            .ok_or_else(|| LedgerError::not_found("Incoming shipment", shipping_id))
    }

    async fn get_material(&mut self, material_id: MaterialId) -> LedgerResult<LocatedMaterial> {
        self.faults.check(StoreOp::GetMaterial)?;
        self.work.material(material_id).cloned()
    }

    async fn find_by_location(
        &mut self,
        stock_id: &str,
        location_id: LocationId,
        owner: &str,
    ) -> LedgerResult<Option<LocatedMaterial>> {
        Ok(self
            .work
            .materials
            .values()
            .find(|m| {
                m.stock_id == stock_id && m.location_id == Some(location_id) && m.owner == owner
            })
            .cloned())
    }

    async fn find_unplaced(
        &mut self,
        stock_id: &str,
        owner: &str,
    ) -> LedgerResult<Option<LocatedMaterial>> {
        Ok(self
            .work
            .materials
            .values()
            .find(|m| m.stock_id == stock_id && m.is_retired() && m.owner == owner)
            .cloned())
    }

    async fn create_located(&mut self, material: &NewLocatedMaterial) -> LedgerResult<MaterialId> {
        self.faults.check(StoreOp::CreateLocated)?;
        self.work.require_location(material.location_id)?;
        self.work
            .require_free_slot(&material.stock_id, material.location_id, &material.owner)?;
        let id = Sequences::next(&mut self.work.seq.material);
        self.work.materials.insert(
            id,
            LocatedMaterial {
                material_id: id,
                stock_id: material.stock_id.clone(),
                location_id: Some(material.location_id),
                customer_id: material.customer_id,
                material_type: material.material_type.clone(),
                description: material.description.clone(),
                notes: material.notes.clone(),
                quantity: material.quantity,
                is_active: material.is_active,
                min_required_quantity: material.min_required_quantity,
                max_required_quantity: material.max_required_quantity,
                owner: material.owner.clone(),
                is_primary: false,
                updated_at: Utc::now(),
            },
        );
        Ok(id)
    }

    async fn increase_quantity(
        &mut self,
        material_id: MaterialId,
        delta: Quantity,
        notes: Option<&str>,
    ) -> LedgerResult<Quantity> {
        self.faults.check(StoreOp::IncreaseQuantity)?;
        let material = self.work.material_mut(material_id)?;
        let quantity = material
            .quantity
            .checked_add(delta)
            .filter(|q| *q >= 0)
            .ok_or_else(|| {
                LedgerError::Conflict(format!(
                    "material {material_id} quantity {} cannot change by {delta}",
                    material.quantity
                ))
            })?;
        material.quantity = quantity;
        if let Some(notes) = notes {
            material.notes = Some(notes.to_string());
        }
        material.updated_at = Utc::now();
        Ok(quantity)
    }

    async fn place(
        &mut self,
        material_id: MaterialId,
        location_id: LocationId,
        quantity: Quantity,
        notes: Option<&str>,
    ) -> LedgerResult<()> {
        self.faults.check(StoreOp::Place)?;
        self.work.require_location(location_id)?;
        let current = self.work.material(material_id)?;
        if current.location_id != Some(location_id) {
            let (stock_id, owner) = (current.stock_id.clone(), current.owner.clone());
            self.work.require_free_slot(&stock_id, location_id, &owner)?;
        }
        let material = self.work.material_mut(material_id)?;
        material.location_id = Some(location_id);
        material.quantity = quantity;
        if let Some(notes) = notes {
            material.notes = Some(notes.to_string());
        }
        material.updated_at = Utc::now();
        Ok(())
    }

    async fn retire(&mut self, material_id: MaterialId) -> LedgerResult<()> {
        self.faults.check(StoreOp::Retire)?;
        let material = self.work.material_mut(material_id)?;
        material.location_id = None;
        material.quantity = 0;
        material.updated_at = Utc::now();
        Ok(())
    }

    async fn set_primary(&mut self, material_id: MaterialId, is_primary: bool) -> LedgerResult<()> {
        self.faults.check(StoreOp::SetPrimary)?;
        self.work.material_mut(material_id)?.is_primary = is_primary;
        Ok(())
    }

    async fn list_live_lots(&mut self, material_id: MaterialId) -> LedgerResult<Vec<Lot>> {
        self.faults.check(StoreOp::ListLiveLots)?;
        // BTreeMap iteration is ascending by lot id
        Ok(self
            .work
            .lots
            .values()
            .filter(|l| l.material_id == material_id && l.is_live())
            .cloned()
            .collect())
    }

    async fn adjust_lot_quantity(
        &mut self,
        price_id: LotId,
        delta: Quantity,
    ) -> LedgerResult<Decimal> {
        self.faults.check(StoreOp::AdjustLot)?;
        let lot = self
            .work
            .lots
            .get_mut(&price_id)
            .ok_or_else(|| LedgerError::not_found("Lot", price_id))?;
        let quantity = lot
            .quantity
            .checked_add(delta)
            .filter(|q| *q >= 0)
            .ok_or_else(|| {
                LedgerError::Conflict(format!(
                    "lot {price_id} quantity {} cannot change by {delta}",
                    lot.quantity
                ))
            })?;
        lot.quantity = quantity;
        Ok(lot.cost)
    }

    async fn upsert_lot(
        &mut self,
        material_id: MaterialId,
        quantity: Quantity,
        cost: Decimal,
    ) -> LedgerResult<LotId> {
        self.faults.check(StoreOp::UpsertLot)?;
        self.work.material(material_id)?;

        if let Some(lot) = self
            .work
            .lots
            .values_mut()
            .find(|l| l.material_id == material_id && l.cost == cost)
        {
            lot.quantity = lot.quantity.checked_add(quantity).ok_or_else(|| {
                LedgerError::Conflict(format!("lot {} quantity overflow", lot.price_id))
            })?;
            return Ok(lot.price_id);
        }

        let price_id = Sequences::next(&mut self.work.seq.lot);
        self.work.lots.insert(
            price_id,
            Lot {
                price_id,
                material_id,
                quantity,
                cost,
            },
        );
        Ok(price_id)
    }

    async fn append_entry(&mut self, entry: &NewLedgerEntry) -> LedgerResult<()> {
        self.faults.check(StoreOp::AppendEntry)?;
        if !self.work.lots.contains_key(&entry.price_id) {
            return Err(LedgerError::Conflict(format!(
                "lot {} does not exist",
                entry.price_id
            )));
        }
        let entry_id = Sequences::next(&mut self.work.seq.entry);
        self.work.entries.push(LedgerEntry {
            entry_id,
            price_id: entry.price_id,
            quantity_change: entry.quantity_change,
            notes: entry.notes.clone(),
            job_ticket: entry.job_ticket.clone(),
            updated_at: entry.updated_at,
        });
        Ok(())
    }

    async fn commit(self) -> LedgerResult<()> {
        self.faults.check(StoreOp::Commit)?;
        let MemoryTx { mut guard, work, .. } = self;
        *guard = work;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_dropped_transaction_discards_writes() {
        let store = MemoryStore::new();
        let location = store.add_location("A1", None).await;
        let customer = store.add_customer("Acme").await;

        {
            let mut tx = store.begin().await.unwrap();
            let new = NewLocatedMaterial {
                stock_id: "S1".to_string(),
                location_id: location,
                customer_id: customer,
                material_type: "sheet".to_string(),
                description: "Steel".to_string(),
                notes: None,
                quantity: 4,
                is_active: true,
                min_required_quantity: 0,
                max_required_quantity: 10,
                owner: "acme".to_string(),
            };
            tx.create_located(&new).await.unwrap();
        }

        let listed = store.materials(&MaterialFilter::default()).await.unwrap();
        assert!(listed.is_empty());
    }

    #[tokio::test]
    async fn test_upsert_lot_merges_same_cost() {
        let store = MemoryStore::new();
        let location = store.add_location("A1", None).await;
        let mut tx = store.begin().await.unwrap();
        let material = tx
            .create_located(&NewLocatedMaterial {
                stock_id: "S1".to_string(),
                location_id: location,
                customer_id: 1,
                material_type: "sheet".to_string(),
                description: String::new(),
                notes: None,
                quantity: 0,
                is_active: true,
                min_required_quantity: 0,
                max_required_quantity: 0,
                owner: "acme".to_string(),
            })
            .await
            .unwrap();

        let first = tx.upsert_lot(material, 5, Decimal::from(10)).await.unwrap();
        let second = tx.upsert_lot(material, 3, Decimal::new(1000, 2)).await.unwrap();
        let third = tx.upsert_lot(material, 2, Decimal::from(12)).await.unwrap();

        assert_eq!(first, second);
        assert!(third > first);
        let lots = tx.list_live_lots(material).await.unwrap();
        assert_eq!(lots.len(), 2);
        assert_eq!(lots[0].quantity, 8);
    }

    #[tokio::test]
    async fn test_adjust_lot_rejects_negative_result() {
        let store = MemoryStore::new();
        let location = store.add_location("A1", None).await;
        let mut tx = store.begin().await.unwrap();
        let material = tx
            .create_located(&NewLocatedMaterial {
                stock_id: "S1".to_string(),
                location_id: location,
                customer_id: 1,
                material_type: "sheet".to_string(),
                description: String::new(),
                notes: None,
                quantity: 0,
                is_active: true,
                min_required_quantity: 0,
                max_required_quantity: 0,
                owner: "acme".to_string(),
            })
            .await
            .unwrap();
        let lot = tx.upsert_lot(material, 2, Decimal::ONE).await.unwrap();

        assert!(matches!(
            tx.adjust_lot_quantity(lot, -3).await,
            Err(LedgerError::Conflict(_))
        ));
        assert!(matches!(
            tx.adjust_lot_quantity(lot + 100, -1).await,
            Err(LedgerError::NotFound { .. })
        ));
        assert_eq!(tx.adjust_lot_quantity(lot, -2).await.unwrap(), Decimal::ONE);
        assert!(tx.list_live_lots(material).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_second_record_for_same_slot_conflicts() {
        let store = MemoryStore::new();
        let location = store.add_location("A1", None).await;
        let mut tx = store.begin().await.unwrap();
        let new = NewLocatedMaterial {
            stock_id: "S1".to_string(),
            location_id: location,
            customer_id: 1,
            material_type: "sheet".to_string(),
            description: String::new(),
            notes: None,
            quantity: 3,
            is_active: true,
            min_required_quantity: 0,
            max_required_quantity: 0,
            owner: "acme".to_string(),
        };
        tx.create_located(&new).await.unwrap();

        assert!(matches!(
            tx.create_located(&new).await,
            Err(LedgerError::Conflict(_))
        ));

        let other_owner = NewLocatedMaterial {
            owner: "globex".to_string(),
            ..new
        };
        assert!(tx.create_located(&other_owner).await.is_ok());
    }

    #[tokio::test]
    async fn test_injected_fault_fires_once() {
        let store = MemoryStore::new();
        store.fail_next(StoreOp::Begin);
        assert!(matches!(
            store.begin().await,
            Err(LedgerError::StorageUnavailable(_))
        ));
        assert!(store.begin().await.is_ok());
    }
}
