//! Durable order storage.
//!
//! # Database
//!
//! ## Tables
//!
//! - `orders` - Root order rows, one per `order_uid`
//! - `delivery` - Recipient block, keyed by `order_uid`
//! - `payment` - Payment block, keyed by `transaction` (equals `order_uid`)
//! - `items` - Line items, keyed by `order_uid` and ordered by `position`
//!
//! # Migrations
//!
//! Migrations are stored in `crates/server/migrations/` and run via:
//! ```bash
//! cargo run -p orderbox-cli -- migrate
//! ```
//!
//! # Store implementations
//!
//! - [`PgOrderStore`] - `PostgreSQL`, used by the binary
//! - [`MemoryOrderStore`] - in-process, used by tests

pub mod memory;
pub mod orders;

use std::num::NonZeroUsize;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use orderbox_core::{Order, OrderUid};
use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

pub use memory::MemoryOrderStore;
pub use orders::PgOrderStore;

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested order was not found.
    #[error("not found")]
    NotFound,

    /// Constraint violation (e.g., a payment transaction already in use).
    #[error("constraint violation: {0}")]
    Conflict(String),

    /// The store cannot serve requests right now.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Result of persisting an order aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    /// The aggregate was written in full.
    Inserted,
    /// An order with this identifier already exists; nothing was written.
    AlreadyStored,
}

/// Root fields of a stored order, without delivery, payment or items.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct OrderSummary {
    pub order_uid: String,
    pub track_number: String,
    pub entry: Option<String>,
    pub locale: Option<String>,
    pub internal_signature: Option<String>,
    pub customer_id: Option<String>,
    pub delivery_service: Option<String>,
    #[sqlx(rename = "shardkey")]
    pub shard_key: Option<String>,
    pub sm_id: Option<i64>,
    pub date_created: Option<DateTime<Utc>>,
    pub oof_shard: Option<String>,
}

impl OrderSummary {
    /// Build an order from the root fields, leaving nested parts at their
    /// defaults.
    #[must_use]
    pub fn into_order(self) -> Order {
        Order {
            order_uid: self.order_uid,
            track_number: self.track_number,
            entry: self.entry,
            locale: self.locale,
            internal_signature: self.internal_signature,
            customer_id: self.customer_id,
            delivery_service: self.delivery_service,
            shard_key: self.shard_key,
            sm_id: self.sm_id,
            date_created: self.date_created,
            oof_shard: self.oof_shard,
            ..Order::default()
        }
    }
}

impl From<&Order> for OrderSummary {
    fn from(order: &Order) -> Self {
        Self {
            order_uid: order.order_uid.clone(),
            track_number: order.track_number.clone(),
            entry: order.entry.clone(),
            locale: order.locale.clone(),
            internal_signature: order.internal_signature.clone(),
            customer_id: order.customer_id.clone(),
            delivery_service: order.delivery_service.clone(),
            shard_key: order.shard_key.clone(),
            sm_id: order.sm_id,
            date_created: order.date_created,
            oof_shard: order.oof_shard.clone(),
        }
    }
}

/// Durable storage for order aggregates.
///
/// Implementations must be safe to share across the ingestion loop and any
/// number of concurrent lookups.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Persist an order with its delivery, payment and items as one atomic
    /// unit. Rows are written root first, then delivery, payment and each
    /// item in sequence order.
    ///
    /// Saving an identifier that already exists writes nothing and returns
    /// [`SaveOutcome::AlreadyStored`].
    async fn save_order(&self, order: &Order) -> Result<SaveOutcome, RepositoryError>;

    /// Load the full aggregate for `uid`.
    ///
    /// Fails with [`RepositoryError::NotFound`] when no root row exists and
    /// with [`RepositoryError::DataCorruption`] when a nested part is
    /// missing. Never returns a partially populated order.
    async fn get_order_by_id(&self, uid: &OrderUid) -> Result<Order, RepositoryError>;

    /// One page of root rows, newest first.
    ///
    /// Skips the `offset` most recently created orders and returns at most
    /// `limit` of the ones before them. Paging with a growing offset walks
    /// every stored order in reverse creation order.
    async fn list_order_summaries(
        &self,
        offset: usize,
        limit: NonZeroUsize,
    ) -> Result<Vec<OrderSummary>, RepositoryError>;

    /// Complete a summary with its nested parts.
    ///
    /// A missing delivery or payment row leaves that part at its default;
    /// any other read failure is returned.
    async fn load_summary(&self, summary: OrderSummary) -> Result<Order, RepositoryError>;

    /// Check that the store is reachable.
    async fn ping(&self) -> Result<(), RepositoryError>;
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Arguments
///
/// * `database_url` - `PostgreSQL` connection string (wrapped in `SecretString`)
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}
