//! Inventory ledger engine
//!
//! Each command runs in exactly one store transaction, committed only on the
//! success path. Any error, timeout or cancellation drops the transaction and
//! leaves the ledger untouched. Change events go out after the commit.

use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use ledger_shared::{
    validate_move, validate_receive, validate_remove, validate_shipment, AdjustCommand,
    IncomingShipment, LedgerEntry, LedgerEvent, LocatedMaterial, Lot, LotId, MaterialFilter,
    MaterialId, MaterialListing, MoveCommand, MoveReceipt, NewLocatedMaterial, NewShipment,
    Quantity, ReceiveCommand, ReceiveReceipt, RemoveCommand, RemoveReceipt, ShipmentId,
    MOVED_FROM_NOTE, MOVED_TO_NOTE, REMOVED_FROM_NOTE,
};
use tracing::{info, instrument, warn};

use super::audit::{find_discrepancies, AuditReport};
use super::fifo::{auto_ticket, consume_fifo, place_lots, Provenance};
use super::notification::NotificationSink;
use crate::config::LedgerSettings;
use crate::error::{LedgerError, LedgerResult};
use crate::store::{LedgerStore, LedgerTx};

/// Ledger engine over a store and a notification sink
pub struct LedgerEngine<S: LedgerStore> {
    store: Arc<S>,
    notifier: Arc<dyn NotificationSink>,
    settings: LedgerSettings,
}

impl<S: LedgerStore> Clone for LedgerEngine<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            notifier: self.notifier.clone(),
            settings: self.settings,
        }
    }
}

/// Source side of a Move or Remove after its quantity was taken
struct Drawn {
    source: LocatedMaterial,
    remaining: Quantity,
}

impl<S: LedgerStore> LedgerEngine<S> {
    pub fn new(store: S, notifier: Arc<dyn NotificationSink>) -> Self {
        Self {
            store: Arc::new(store),
            notifier,
            settings: LedgerSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: LedgerSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    // ========================================================================
    // Commands
    // ========================================================================

    /// Place an incoming shipment into a location.
    ///
    /// Not idempotent: the shipment is consumed, so a repeat fails with
    /// `NotFound`.
    #[instrument(skip(self))]
    pub async fn receive(&self, command: ReceiveCommand) -> LedgerResult<ReceiveReceipt> {
        validate_receive(&command)?;

        let subject = format!(
            "intake {} into location {}",
            command.intake_id, command.location_id
        );
        let receipt = self
            .run("receive", subject, self.apply_receive(&command))
            .await?;

        info!(
            material_id = receipt.material_id,
            price_id = receipt.price_id,
            quantity = receipt.quantity,
            "Shipment received"
        );
        self.publish(LedgerEvent::materials_changed(
            receipt.material_id,
            receipt.quantity,
        ));

        Ok(receipt)
    }

    /// Move stock to another location, carrying its lots over at cost
    #[instrument(skip(self))]
    pub async fn move_material(&self, command: MoveCommand) -> LedgerResult<MoveReceipt> {
        validate_move(&command)?;

        let subject = format!(
            "material {} to location {}",
            command.material_id, command.location_id
        );
        let receipt = self.run("move", subject, self.apply_move(&command)).await?;

        info!(
            source_id = receipt.source_id,
            destination_id = receipt.destination_id,
            quantity = command.quantity,
            lots = receipt.transferred.len(),
            "Material moved"
        );
        self.publish(LedgerEvent::materials_changed(
            receipt.source_id,
            receipt.source_quantity,
        ));
        self.publish(LedgerEvent::materials_changed(
            receipt.destination_id,
            receipt.destination_quantity,
        ));

        Ok(receipt)
    }

    /// Consume stock from a location, oldest lots first
    #[instrument(skip(self))]
    pub async fn remove(&self, command: RemoveCommand) -> LedgerResult<RemoveReceipt> {
        validate_remove(&command)?;

        let subject = format!("material {}", command.material_id);
        let receipt = self
            .run("remove", subject, self.apply_remove(&command))
            .await?;

        info!(
            material_id = receipt.material_id,
            remaining = receipt.remaining_quantity,
            lots = receipt.consumed.len(),
            "Material removed"
        );
        self.publish(LedgerEvent::materials_changed(
            receipt.material_id,
            receipt.remaining_quantity,
        ));

        Ok(receipt)
    }

    /// Set the primary flag. Idempotent, no ledger entries.
    #[instrument(skip(self))]
    pub async fn adjust(&self, command: AdjustCommand) -> LedgerResult<()> {
        let subject = format!("material {}", command.material_id);
        self.run("adjust", subject, async {
            let mut tx = self.store.begin().await?;
            tx.set_primary(command.material_id, command.is_primary)
                .await?;
            tx.commit().await
        })
        .await?;

        info!(
            material_id = command.material_id,
            is_primary = command.is_primary,
            "Primary flag updated"
        );
        Ok(())
    }

    /// Add a shipment to the intake queue
    #[instrument(skip(self))]
    pub async fn submit_shipment(&self, shipment: NewShipment) -> LedgerResult<ShipmentId> {
        validate_shipment(&shipment)?;

        let subject = format!("stock {}", shipment.stock_id);
        let shipping_id = self
            .run("submit", subject, self.store.enqueue_shipment(&shipment))
            .await?;

        info!(shipping_id, stock_id = %shipment.stock_id, "Shipment queued");
        Ok(shipping_id)
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub async fn material_types(&self) -> LedgerResult<Vec<String>> {
        self.store.material_types().await
    }

    pub async fn materials(&self, filter: &MaterialFilter) -> LedgerResult<Vec<MaterialListing>> {
        self.store.materials(filter).await
    }

    pub async fn material(&self, material_id: MaterialId) -> LedgerResult<LocatedMaterial> {
        self.store.material(material_id).await
    }

    pub async fn incoming(
        &self,
        shipping_id: Option<ShipmentId>,
    ) -> LedgerResult<Vec<IncomingShipment>> {
        self.store.incoming(shipping_id).await
    }

    pub async fn lots(&self, material_id: MaterialId) -> LedgerResult<Vec<Lot>> {
        self.store.lots(material_id).await
    }

    pub async fn entries(&self, price_id: LotId) -> LedgerResult<Vec<LedgerEntry>> {
        self.store.entries(price_id).await
    }

    /// Compare quantities against live lots and lots against the ledger
    #[instrument(skip(self))]
    pub async fn audit(&self) -> LedgerResult<AuditReport> {
        let materials = self.store.material_balances().await?;
        let lots = self.store.lot_balances().await?;
        let report = find_discrepancies(&materials, &lots);

        if report.is_clean() {
            info!(
                materials = report.materials_checked,
                lots = report.lots_checked,
                "Ledger reconciled"
            );
        } else {
            warn!(
                discrepancies = report.discrepancies.len(),
                "Ledger out of balance"
            );
        }
        Ok(report)
    }

    // ========================================================================
    // Command bodies
    // ========================================================================

    async fn apply_receive(&self, command: &ReceiveCommand) -> LedgerResult<ReceiveReceipt> {
        let mut tx = self.store.begin().await?;

        let shipment = tx
            .lock_shipment(command.intake_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("Incoming shipment", command.intake_id))?;
        if command.quantity > shipment.quantity {
            return Err(LedgerError::InvalidQuantity {
                action: "receiving",
                requested: command.quantity,
                available: shipment.quantity,
            });
        }

        let notes = command.notes.as_deref();
        let existing = tx
            .find_by_location(&shipment.stock_id, command.location_id, &shipment.owner)
            .await?;

        let (material_id, quantity) = match existing {
            Some(material) => {
                let quantity = tx
                    .increase_quantity(material.material_id, command.quantity, notes)
                    .await?;
                (material.material_id, quantity)
            }
            None => match tx.find_unplaced(&shipment.stock_id, &shipment.owner).await? {
                Some(unplaced) => {
                    tx.place(
                        unplaced.material_id,
                        command.location_id,
                        command.quantity,
                        notes,
                    )
                    .await?;
                    (unplaced.material_id, command.quantity)
                }
                None => {
                    let new = NewLocatedMaterial::from_shipment(
                        &shipment,
                        command.location_id,
                        command.quantity,
                        command.notes.clone(),
                    );
                    (tx.create_located(&new).await?, command.quantity)
                }
            },
        };

        let price_id = tx
            .upsert_lot(material_id, command.quantity, shipment.cost)
            .await?;
        tx.delete_shipment(shipment.shipping_id).await?;

        let provenance = Provenance {
            notes: command.notes.clone(),
            job_ticket: None,
            at: Utc::now(),
        };
        tx.append_entry(&provenance.entry(price_id, command.quantity))
            .await?;

        tx.commit().await?;

        Ok(ReceiveReceipt {
            material_id,
            price_id,
            quantity,
        })
    }

    async fn apply_move(&self, command: &MoveCommand) -> LedgerResult<MoveReceipt> {
        let mut tx = self.store.begin().await?;

        let source = tx.get_material(command.material_id).await?;
        if source.location_id == Some(command.location_id) {
            return Err(LedgerError::Validation {
                field: "locationId".to_string(),
                message: "Destination must differ from the current location".to_string(),
            });
        }

        let drawn = draw_from(&mut tx, source, command.quantity, "moving").await?;
        let source = drawn.source;

        let at = Utc::now();
        let ticket = auto_ticket(at);
        let transferred = consume_fifo(
            &mut tx,
            source.material_id,
            command.quantity,
            &Provenance::new(MOVED_TO_NOTE, Some(ticket.clone()), at),
        )
        .await?;

        // Exact match only: an unplaced record could be the source just retired.
        // An existing destination keeps its own notes.
        let existing = tx
            .find_by_location(&source.stock_id, command.location_id, &source.owner)
            .await?;
        let (destination_id, destination_quantity) = match existing {
            Some(material) => {
                let quantity = tx
                    .increase_quantity(material.material_id, command.quantity, None)
                    .await?;
                (material.material_id, quantity)
            }
            None => {
                let new = NewLocatedMaterial::from_source(
                    &source,
                    command.location_id,
                    command.quantity,
                    command.notes.clone(),
                );
                (tx.create_located(&new).await?, command.quantity)
            }
        };

        place_lots(
            &mut tx,
            destination_id,
            &transferred,
            &Provenance::new(MOVED_FROM_NOTE, Some(ticket), at),
        )
        .await?;

        tx.commit().await?;

        Ok(MoveReceipt {
            source_id: source.material_id,
            source_quantity: drawn.remaining,
            destination_id,
            destination_quantity,
            transferred,
        })
    }

    async fn apply_remove(&self, command: &RemoveCommand) -> LedgerResult<RemoveReceipt> {
        let mut tx = self.store.begin().await?;

        let source = tx.get_material(command.material_id).await?;
        let drawn = draw_from(&mut tx, source, command.quantity, "removing").await?;

        let consumed = consume_fifo(
            &mut tx,
            drawn.source.material_id,
            command.quantity,
            &Provenance::new(REMOVED_FROM_NOTE, command.job_ticket.clone(), Utc::now()),
        )
        .await?;

        tx.commit().await?;

        Ok(RemoveReceipt {
            material_id: drawn.source.material_id,
            remaining_quantity: drawn.remaining,
            consumed,
        })
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    /// Bound a command body by the configured timeout and attach context
    async fn run<T, F>(&self, command: &'static str, subject: String, work: F) -> LedgerResult<T>
    where
        F: Future<Output = LedgerResult<T>>,
    {
        match tokio::time::timeout(self.settings.command_timeout, work).await {
            Ok(result) => result.map_err(|e| e.in_command(command, subject)),
            Err(_) => Err(LedgerError::Timeout.in_command(command, subject)),
        }
    }

    fn publish(&self, event: LedgerEvent) {
        if let Err(e) = self.notifier.publish(&event) {
            warn!(error = %e, ?event, "Failed to publish ledger event");
        }
    }
}

/// Take `quantity` off the source record: retire it when emptied, otherwise
/// decrement and keep its notes.
async fn draw_from<T: LedgerTx>(
    tx: &mut T,
    source: LocatedMaterial,
    quantity: Quantity,
    action: &'static str,
) -> LedgerResult<Drawn> {
    if quantity > source.quantity {
        return Err(LedgerError::InvalidQuantity {
            action,
            requested: quantity,
            available: source.quantity,
        });
    }

    let remaining = if quantity == source.quantity {
        tx.retire(source.material_id).await?;
        0
    } else {
        tx.increase_quantity(source.material_id, -quantity, None)
            .await?
    };

    Ok(Drawn { source, remaining })
}
