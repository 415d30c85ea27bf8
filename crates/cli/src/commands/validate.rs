//! Offline payload validation.
//!
//! Applies the same decode and validation steps as the ingestion pipeline,
//! without touching storage.

use std::path::Path;

use orderbox_core::{Order, ValidationError};

#[derive(Debug, thiserror::Error)]
pub enum CheckError {
    #[error("Failed to read payload: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed payload: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Invalid order: {0}")]
    Invalid(#[from] ValidationError),
}

/// Decode and validate a raw payload, returning the order on success.
///
/// # Errors
///
/// Returns `CheckError::Decode` or `CheckError::Invalid` for the first
/// problem found.
pub fn check(payload: &[u8]) -> Result<Order, CheckError> {
    let order = Order::from_slice(payload)?;
    order.validate()?;
    Ok(order)
}

/// Validate the payload stored at `path`.
///
/// # Errors
///
/// Returns `CheckError` if the file cannot be read, decoded, or validated.
pub fn run(path: &Path) -> Result<(), CheckError> {
    let payload = std::fs::read(path)?;
    let order = check(&payload)?;

    tracing::info!(
        order_uid = %order.order_uid,
        items = order.items.len(),
        "Payload is a valid order"
    );
    Ok(())
}
