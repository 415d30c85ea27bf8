//! Core types for orderbox.
//!
//! This module provides type-safe wrappers for identifiers and the contact
//! formats checked during validation.

pub mod email;
pub mod id;
pub mod phone;

pub use email::{Email, EmailError};
pub use id::{OrderUid, OrderUidError};
pub use phone::{Phone, PhoneError};
