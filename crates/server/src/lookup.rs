//! Read-through order lookup.

use std::sync::Arc;

use tracing::instrument;

use orderbox_core::{Order, OrderUid};

use crate::cache::OrderCache;
use crate::db::{OrderStore, RepositoryError};

/// Serves orders from the cache, falling back to storage on a miss.
#[derive(Clone)]
pub struct OrderLookup {
    cache: Arc<OrderCache>,
    store: Arc<dyn OrderStore>,
}

impl OrderLookup {
    #[must_use]
    pub fn new(cache: Arc<OrderCache>, store: Arc<dyn OrderStore>) -> Self {
        Self { cache, store }
    }

    /// Find an order by identifier.
    ///
    /// A cache hit returns without touching storage. A miss reads storage
    /// once and, if the order exists, caches it before returning.
    ///
    /// # Errors
    ///
    /// Returns any storage error other than not-found, which is `Ok(None)`.
    #[instrument(skip_all, fields(order_uid = %uid, cache_hit = tracing::field::Empty))]
    pub async fn lookup(&self, uid: &OrderUid) -> Result<Option<Arc<Order>>, RepositoryError> {
        if let Some(order) = self.cache.get(uid) {
            tracing::Span::current().record("cache_hit", true);
            return Ok(Some(order));
        }
        tracing::Span::current().record("cache_hit", false);

        match self.store.get_order_by_id(uid).await {
            Ok(order) => {
                let order = Arc::new(order);
                self.cache.set(uid.clone(), Arc::clone(&order));
                tracing::debug!("Order loaded from storage");
                Ok(Some(order))
            }
            Err(RepositoryError::NotFound) => Ok(None),
            Err(e) => Err(e),
        }
    }
}
