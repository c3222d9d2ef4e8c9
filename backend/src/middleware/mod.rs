//! Request middleware

pub mod auth;

pub use auth::{auth_middleware, check_permission, CurrentUser, PURCHASES_WRITE, SALES_WRITE};
