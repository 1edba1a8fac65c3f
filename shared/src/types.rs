//! Common identifier and quantity types

/// Whole units of a material. Stored as a Postgres `INTEGER`.
pub type Quantity = i32;

pub type ShipmentId = i64;
pub type MaterialId = i64;
pub type LotId = i64;
pub type EntryId = i64;
pub type LocationId = i64;
pub type CustomerId = i64;

/// Note recorded on the source lots of a move
pub const MOVED_TO_NOTE: &str = "Moved TO a Location";

/// Note recorded on the destination lots of a move
pub const MOVED_FROM_NOTE: &str = "Moved FROM a Location";

/// Note recorded on lots consumed by a removal
pub const REMOVED_FROM_NOTE: &str = "Removed FROM a Location";

/// Decimal places kept for a unit cost
pub const COST_SCALE: u32 = 2;

/// Exclusive upper bound of a unit cost
pub const COST_LIMIT: i64 = 10_000_000_000;

/// Maximum length of free-text notes and job tickets
pub const MAX_TEXT_LEN: usize = 1000;
