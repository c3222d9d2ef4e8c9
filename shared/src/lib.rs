//! Shared types and domain logic for the Inventory & Sales backend
//!
//! This crate holds everything that does not touch the database: the catalog
//! and document models, input validation, line pricing, document totals and
//! the stock-reconciliation engine used by the purchase and sale flows.

pub mod models;
pub mod pricing;
pub mod stock;
pub mod types;
pub mod validation;

pub use models::*;
pub use pricing::*;
pub use stock::*;
pub use types::*;
pub use validation::*;
