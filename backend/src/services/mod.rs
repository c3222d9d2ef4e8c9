//! Business logic services for the inventory and sales server

pub mod catalog;
pub mod document;
pub mod purchase;
pub mod sale;

pub use catalog::CatalogService;
pub use purchase::{PurchaseFilter, PurchaseService};
pub use sale::{SaleFilter, SaleService};
