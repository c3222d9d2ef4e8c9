//! Domain models for the inventory and sales server
//!
//! Re-exports the database-free domain layer from the shared crate: catalog
//! and document models, validation, pricing and the stock engine.

pub use shared::*;
