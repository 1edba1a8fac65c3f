//! Shared fixtures for ledger integration tests

#![allow(dead_code)]

use std::sync::Arc;

use inventory_ledger::{BroadcastNotifier, LedgerEngine, MemoryStore};
use ledger_shared::{
    CustomerId, LocationId, MaterialId, NewShipment, Quantity, ReceiveCommand, ReceiveReceipt,
};
use rust_decimal::Decimal;

pub const OWNER: &str = "acme";

/// An engine over a seeded in-memory store with three locations
pub struct Fixture {
    pub store: MemoryStore,
    pub engine: LedgerEngine<MemoryStore>,
    pub notifier: Arc<BroadcastNotifier>,
    pub customer: CustomerId,
    pub loc1: LocationId,
    pub loc2: LocationId,
    pub loc3: LocationId,
}

pub async fn fixture() -> Fixture {
    let store = MemoryStore::new();
    let customer = store.add_customer("Acme Packaging").await;
    let loc1 = store.add_location("Rack A1", Some("North")).await;
    let loc2 = store.add_location("Rack B2", Some("North")).await;
    let loc3 = store.add_location("Dock 3", None).await;
    store.add_material_type("Carton").await;
    store.add_material_type("Label").await;

    let notifier = Arc::new(BroadcastNotifier::new(64));
    let engine = LedgerEngine::new(store.clone(), notifier.clone());

    Fixture {
        store,
        engine,
        notifier,
        customer,
        loc1,
        loc2,
        loc3,
    }
}

pub fn shipment(customer: CustomerId, stock_id: &str, cost: i64, quantity: Quantity) -> NewShipment {
    NewShipment {
        customer_id: customer,
        stock_id: stock_id.to_string(),
        cost: Decimal::from(cost),
        quantity,
        min_required_quantity: 0,
        max_required_quantity: 100,
        description: format!("{stock_id} stock"),
        material_type: "Carton".to_string(),
        is_active: true,
        owner: OWNER.to_string(),
    }
}

impl Fixture {
    /// Queue a shipment and receive all of it into `location_id`
    pub async fn stock(
        &self,
        stock_id: &str,
        cost: i64,
        quantity: Quantity,
        location_id: LocationId,
    ) -> ReceiveReceipt {
        let intake_id = self
            .engine
            .submit_shipment(shipment(self.customer, stock_id, cost, quantity))
            .await
            .unwrap();
        self.engine
            .receive(ReceiveCommand {
                intake_id,
                location_id,
                quantity,
                notes: None,
            })
            .await
            .unwrap()
    }

    pub async fn quantity(&self, material_id: MaterialId) -> Quantity {
        self.engine.material(material_id).await.unwrap().quantity
    }

    /// (quantity, cost) of every lot of a material, oldest first
    pub async fn lots(&self, material_id: MaterialId) -> Vec<(Quantity, Decimal)> {
        self.engine
            .lots(material_id)
            .await
            .unwrap()
            .into_iter()
            .map(|lot| (lot.quantity, lot.cost))
            .collect()
    }

    /// Signed changes of every entry in the ledger, in append order
    pub async fn changes(&self) -> Vec<Quantity> {
        self.store
            .all_entries()
            .await
            .into_iter()
            .map(|e| e.quantity_change)
            .collect()
    }

    pub async fn assert_balanced(&self) {
        let report = self.engine.audit().await.unwrap();
        assert!(report.is_clean(), "{:?}", report.discrepancies);
    }
}
