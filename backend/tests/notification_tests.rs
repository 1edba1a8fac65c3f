//! Change notification tests
//!
//! Events go out only after a committed command, one per material whose
//! quantity changed, and a failing sink never fails the command.

mod common;

use std::sync::Arc;

use common::fixture;
use inventory_ledger::{
    services::NotifyError, LedgerEngine, MemoryStore, NoopNotifier, NotificationSink, StoreOp,
};
use ledger_shared::{AdjustCommand, LedgerEvent, MoveCommand, RemoveCommand};
use tokio::sync::broadcast::error::TryRecvError;

/// Sink that refuses every event
struct RejectingSink;

impl NotificationSink for RejectingSink {
    fn publish(&self, _event: &LedgerEvent) -> Result<(), NotifyError> {
        Err(NotifyError::Rejected("transport offline".to_string()))
    }
}

// ============================================================================
// Emitted Events
// ============================================================================

#[tokio::test]
async fn test_receive_emits_new_quantity() {
    let f = fixture().await;
    let mut events = f.notifier.subscribe();

    let receipt = f.stock("S1", 10, 20, f.loc1).await;

    assert_eq!(
        events.recv().await.unwrap(),
        LedgerEvent::materials_changed(receipt.material_id, 20)
    );
    assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));
}

#[tokio::test]
async fn test_move_emits_source_then_destination() {
    let f = fixture().await;
    let source = f.stock("S1", 10, 20, f.loc1).await.material_id;
    let mut events = f.notifier.subscribe();

    let receipt = f
        .engine
        .move_material(MoveCommand {
            material_id: source,
            location_id: f.loc2,
            quantity: 5,
            notes: None,
        })
        .await
        .unwrap();

    assert_eq!(
        events.recv().await.unwrap(),
        LedgerEvent::materials_changed(source, 15)
    );
    assert_eq!(
        events.recv().await.unwrap(),
        LedgerEvent::materials_changed(receipt.destination_id, 5)
    );
}

#[tokio::test]
async fn test_remove_emits_remaining_quantity() {
    let f = fixture().await;
    let material_id = f.stock("S1", 10, 20, f.loc1).await.material_id;
    let mut events = f.notifier.subscribe();

    f.engine
        .remove(RemoveCommand {
            material_id,
            quantity: 20,
            job_ticket: None,
        })
        .await
        .unwrap();

    assert_eq!(
        events.recv().await.unwrap(),
        LedgerEvent::materials_changed(material_id, 0)
    );
}

#[tokio::test]
async fn test_adjust_emits_nothing() {
    let f = fixture().await;
    let material_id = f.stock("S1", 10, 20, f.loc1).await.material_id;
    let mut events = f.notifier.subscribe();

    f.engine
        .adjust(AdjustCommand {
            material_id,
            is_primary: true,
        })
        .await
        .unwrap();

    assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));
}

#[tokio::test]
async fn test_failed_command_emits_nothing() {
    let f = fixture().await;
    let material_id = f.stock("S1", 10, 20, f.loc1).await.material_id;
    let mut events = f.notifier.subscribe();
    f.store.fail_next(StoreOp::AdjustLot);

    let result = f
        .engine
        .remove(RemoveCommand {
            material_id,
            quantity: 5,
            job_ticket: None,
        })
        .await;

    assert!(result.is_err());
    assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));
}

// ============================================================================
// Sink Failures
// ============================================================================

#[tokio::test]
async fn test_sink_failure_does_not_fail_command() {
    let store = MemoryStore::new();
    let customer = store.add_customer("Acme Packaging").await;
    let location = store.add_location("Rack A1", None).await;
    let engine = LedgerEngine::new(store.clone(), Arc::new(RejectingSink));

    let intake_id = engine
        .submit_shipment(common::shipment(customer, "S1", 10, 20))
        .await
        .unwrap();
    let receipt = engine
        .receive(ledger_shared::ReceiveCommand {
            intake_id,
            location_id: location,
            quantity: 20,
            notes: None,
        })
        .await
        .unwrap();

    assert_eq!(engine.material(receipt.material_id).await.unwrap().quantity, 20);
}

#[tokio::test]
async fn test_no_subscribers_is_fine() {
    let f = fixture().await;
    assert_eq!(f.notifier.receiver_count(), 0);

    let receipt = f.stock("S1", 10, 20, f.loc1).await;

    assert_eq!(receipt.quantity, 20);
}

#[test]
fn test_noop_sink_accepts_everything() {
    assert!(NoopNotifier
        .publish(&LedgerEvent::materials_changed(1, 1))
        .is_ok());
}
