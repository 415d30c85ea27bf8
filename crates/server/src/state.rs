//! Application state shared across handlers.

use std::sync::Arc;

use crate::cache::OrderCache;
use crate::db::OrderStore;
use crate::lookup::OrderLookup;

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc`. It shares one cache and one
/// store with the ingestion pipeline.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    store: Arc<dyn OrderStore>,
    lookup: OrderLookup,
}

impl AppState {
    /// Create a new application state.
    ///
    /// # Arguments
    ///
    /// * `store` - Durable order storage
    /// * `cache` - The cache the ingestion pipeline writes to
    #[must_use]
    pub fn new(store: Arc<dyn OrderStore>, cache: Arc<OrderCache>) -> Self {
        let lookup = OrderLookup::new(cache, Arc::clone(&store));
        Self {
            inner: Arc::new(AppStateInner {
                store,
                lookup,
            }),
        }
    }

    /// Get a reference to the order store.
    #[must_use]
    pub fn store(&self) -> &dyn OrderStore {
        self.inner.store.as_ref()
    }

    /// Get a reference to the read-through lookup.
    #[must_use]
    pub fn lookup(&self) -> &OrderLookup {
        &self.inner.lookup
    }
}
