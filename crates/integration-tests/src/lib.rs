//! Integration tests for orderbox.
//!
//! # Running Tests
//!
//! ```bash
//! # Database tests: a disposable PostgreSQL database
//! DATABASE_URL=postgres://localhost/orderbox_test \
//!     cargo test -p orderbox-integration-tests -- --ignored
//!
//! # HTTP tests: a running server
//! ORDERBOX_BASE_URL=http://localhost:8081 \
//!     cargo test -p orderbox-integration-tests --test http -- --ignored
//! ```
//!
//! # Test Categories
//!
//! - `storage` - `PgOrderStore` against a live database
//! - `http` - Lookup API against a running server

use orderbox_core::Order;
use orderbox_server::demo::sample_order;
use secrecy::SecretString;
use sqlx::PgPool;

/// Connect to the test database and apply migrations.
///
/// # Panics
///
/// Panics if `DATABASE_URL` is unset or the database is unreachable.
pub async fn test_pool() -> PgPool {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let pool = orderbox_server::db::create_pool(&SecretString::from(url))
        .await
        .expect("Failed to connect to test database");

    sqlx::migrate!("../server/migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    pool
}

/// A valid order with a fresh identifier and `item_count` items.
#[must_use]
pub fn fresh_order(item_count: usize) -> Order {
    let mut order = sample_order();
    let template = order.items.first().cloned().unwrap_or_default();
    order.items = (0..item_count)
        .map(|i| {
            let mut item = template.clone();
            item.chrt_id += i64::try_from(i).unwrap_or_default();
            item.name = format!("{} #{i}", template.name);
            item
        })
        .collect();
    order
}

/// Base URL for the running server (configurable via environment).
#[must_use]
pub fn base_url() -> String {
    std::env::var("ORDERBOX_BASE_URL").unwrap_or_else(|_| "http://localhost:8081".to_string())
}
