//! Domain models for the Inventory & Sales backend

mod catalog;
mod document;
mod purchase;
mod sale;

pub use catalog::*;
pub use document::*;
pub use purchase::*;
pub use sale::*;
