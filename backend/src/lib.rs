//! Inventory ledger engine
//!
//! Converts incoming shipments into located stock, moves stock between
//! locations and consumes it, keeping every unit costed by FIFO lots and every
//! lot change recorded in an append-only transaction log.

pub mod config;
pub mod error;
pub mod services;
pub mod store;

pub use config::{Config, LedgerSettings};
pub use error::{LedgerError, LedgerResult};
pub use services::{
    AuditReport, BroadcastNotifier, Discrepancy, LedgerEngine, NoopNotifier, NotificationSink,
};
pub use store::{LedgerStore, LedgerTx, MemoryStore, PostgresStore, StoreOp};
