//! Swimdesk Shared Types and Utilities
//!
//! This crate contains types and database utilities shared across the
//! swimdesk platform.

pub mod db;
pub mod schema;
pub mod types;

pub use db::*;
pub use schema::verify_billing_schema;
pub use types::*;
