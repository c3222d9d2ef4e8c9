//! HTTP handlers

mod catalog;
mod health;
mod purchase;
mod sale;

pub use catalog::*;
pub use health::*;
pub use purchase::*;
pub use sale::*;
