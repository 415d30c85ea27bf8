//! Order lookup handler.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
};

use orderbox_core::{Order, OrderUid};

use crate::error::{AppError, Result};
use crate::state::AppState;

/// `GET /order/{order_uid}` - fetch one order, cache first.
pub async fn show(
    State(state): State<AppState>,
    Path(order_uid): Path<String>,
) -> Result<Json<Arc<Order>>> {
    let uid = OrderUid::parse(&order_uid).map_err(|e| AppError::BadRequest(e.to_string()))?;

    state
        .lookup()
        .lookup(&uid)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound("order not found".to_string()))
}
