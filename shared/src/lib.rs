//! Shared types and models for the inventory ledger
//!
//! This crate holds the persisted entity shapes, typed commands and change
//! events exchanged between the ledger engine and its transport layer.

pub mod models;
pub mod types;
pub mod validation;

pub use models::*;
pub use types::*;
pub use validation::*;
