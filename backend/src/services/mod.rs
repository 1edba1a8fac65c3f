//! Ledger engine and the pieces it is built from

pub mod audit;
pub mod fifo;
pub mod ledger;
pub mod notification;

pub use audit::{AuditReport, Discrepancy};
pub use ledger::LedgerEngine;
pub use notification::{BroadcastNotifier, NoopNotifier, NotificationSink, NotifyError};
