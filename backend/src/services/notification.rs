//! Change notifications for the transport layer
//!
//! The engine publishes a [`LedgerEvent`] after each committed command that
//! changed a quantity. Delivery is at most once: a failed publish is logged and
//! never fails the command.

use ledger_shared::LedgerEvent;
use thiserror::Error;
use tokio::sync::broadcast;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Notification channel closed")]
    Closed,

    #[error("Notification rejected: {0}")]
    Rejected(String),
}

/// Destination for committed-change events
pub trait NotificationSink: Send + Sync {
    fn publish(&self, event: &LedgerEvent) -> Result<(), NotifyError>;
}

/// Fan-out hub backed by a `tokio::sync::broadcast` channel.
///
/// Subscribers that fall more than `capacity` events behind skip ahead and
/// lose the oldest events.
#[derive(Clone)]
pub struct BroadcastNotifier {
    sender: broadcast::Sender<LedgerEvent>,
}

impl BroadcastNotifier {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LedgerEvent> {
        self.sender.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for BroadcastNotifier {
    fn default() -> Self {
        Self::new(256)
    }
}

impl NotificationSink for BroadcastNotifier {
    fn publish(&self, event: &LedgerEvent) -> Result<(), NotifyError> {
        // send only fails when nobody is listening
        if self.sender.receiver_count() == 0 {
            return Ok(());
        }
        self.sender
            .send(event.clone())
            .map(|_| ())
            .map_err(|_| NotifyError::Closed)
    }
}

/// Sink that drops every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

impl NotificationSink for NoopNotifier {
    fn publish(&self, _event: &LedgerEvent) -> Result<(), NotifyError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_without_subscribers_is_ok() {
        let notifier = BroadcastNotifier::new(4);
        assert!(notifier
            .publish(&LedgerEvent::materials_changed(1, 5))
            .is_ok());
    }

    #[tokio::test]
    async fn test_every_subscriber_receives() {
        let notifier = BroadcastNotifier::new(4);
        let mut first = notifier.subscribe();
        let mut second = notifier.subscribe();

        notifier
            .publish(&LedgerEvent::materials_changed(2, 7))
            .unwrap();

        assert_eq!(first.recv().await.unwrap(), LedgerEvent::materials_changed(2, 7));
        assert_eq!(second.recv().await.unwrap(), LedgerEvent::materials_changed(2, 7));
    }

    #[tokio::test]
    async fn test_lagging_subscriber_skips_oldest() {
        let notifier = BroadcastNotifier::new(2);
        let mut receiver = notifier.subscribe();

        for quantity in 1..=3 {
            notifier
                .publish(&LedgerEvent::materials_changed(1, quantity))
                .unwrap();
        }

        assert!(matches!(
            receiver.recv().await,
            Err(broadcast::error::RecvError::Lagged(1))
        ));
        assert_eq!(receiver.recv().await.unwrap(), LedgerEvent::materials_changed(1, 2));
    }
}
