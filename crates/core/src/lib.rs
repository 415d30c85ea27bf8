//! Orderbox Core - Order record model and validation.
//!
//! This crate provides the types shared by every orderbox component:
//! - `server` - Stream ingestion, durable storage, cached lookups
//! - `cli` - Migrations and offline payload checks
//!
//! # Architecture
//!
//! The core crate contains only types and pure validation - no I/O, no
//! database access, no network clients. Storage and transport live in the
//! server crate.
//!
//! # Modules
//!
//! - [`types`] - Newtypes for identifiers and contact formats
//! - [`order`] - The order aggregate (order, delivery, payment, items)
//! - [`validate`] - Fail-fast validation of a decoded order

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod order;
pub mod types;
pub mod validate;

pub use order::{Delivery, Item, Order, Payment};
pub use types::*;
pub use validate::ValidationError;
