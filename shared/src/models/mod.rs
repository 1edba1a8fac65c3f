//! Domain models for the inventory ledger

mod command;
mod event;
mod lot;
mod material;
mod shipment;

pub use command::*;
pub use event::*;
pub use lot::*;
pub use material::*;
pub use shipment::*;
