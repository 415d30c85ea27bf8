//! Bounded in-process order cache.
//!
//! Entries are evicted strictly in insertion order (FIFO). Overwriting an
//! existing key replaces the value in place and keeps its original position
//! in the eviction queue; reads never touch the queue.
//!
//! The map and the queue live behind a single `RwLock`, so concurrent
//! lookups proceed in parallel while writers are serialized. The lock is
//! never held across an `.await`.

use std::collections::{HashMap, VecDeque};
use std::num::NonZeroUsize;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::instrument;

use orderbox_core::{Order, OrderUid};

use crate::db::{OrderStore, RepositoryError};

/// Default number of cached orders.
pub const DEFAULT_CAPACITY: NonZeroUsize = NonZeroUsize::MIN.saturating_add(999);

struct Entries {
    map: HashMap<OrderUid, Arc<Order>>,
    queue: VecDeque<OrderUid>,
}

/// Fixed-capacity FIFO cache of order aggregates.
pub struct OrderCache {
    entries: RwLock<Entries>,
    capacity: NonZeroUsize,
}

impl OrderCache {
    /// Create an empty cache holding at most `capacity` orders.
    #[must_use]
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            entries: RwLock::new(Entries {
                map: HashMap::with_capacity(capacity.get()),
                queue: VecDeque::with_capacity(capacity.get()),
            }),
            capacity,
        }
    }

    /// Build a cache holding the `capacity` most recently created usable
    /// orders in storage.
    ///
    /// Summaries are read newest first, a page at a time, and nested rows
    /// are loaded only until the cache is full. Orders are then inserted
    /// oldest first, so the result matches setting every stored order in
    /// creation order. Orders without items or with an invalid id are
    /// skipped and do not take a slot.
    ///
    /// # Errors
    ///
    /// Returns the first read error from `store`; no cache is returned in
    /// that case.
    #[instrument(skip_all, fields(capacity = capacity.get()))]
    pub async fn hydrate_from_storage(
        capacity: NonZeroUsize,
        store: &dyn OrderStore,
    ) -> Result<Self, RepositoryError> {
        let mut newest_first = Vec::with_capacity(capacity.get());
        let mut offset = 0_usize;
        let mut skipped = 0_usize;

        'pages: loop {
            let page = store.list_order_summaries(offset, capacity).await?;
            let page_len = page.len();
            offset += page_len;

            for summary in page {
                let Ok(uid) = OrderUid::parse(&summary.order_uid) else {
                    tracing::warn!(order_uid = %summary.order_uid, "skipping stored order with invalid id");
                    skipped += 1;
                    continue;
                };

                let order = store.load_summary(summary).await?;
                if order.items.is_empty() {
                    tracing::warn!(order_uid = %uid, "skipping stored order with no items");
                    skipped += 1;
                    continue;
                }

                newest_first.push((uid, order));
                if newest_first.len() == capacity.get() {
                    break 'pages;
                }
            }

            if page_len < capacity.get() {
                break;
            }
        }

        let cache = Self::new(capacity);
        for (uid, order) in newest_first.into_iter().rev() {
            cache.set(uid, order);
        }

        tracing::info!(
            listed = offset,
            skipped,
            cached = cache.len(),
            "cache hydrated from storage"
        );
        Ok(cache)
    }

    /// Insert or replace the order stored under `uid`.
    ///
    /// A new key goes to the back of the eviction queue and, if the cache is
    /// then over capacity, the oldest key is evicted. Replacing an existing
    /// key never evicts.
    pub fn set(&self, uid: OrderUid, order: impl Into<Arc<Order>>) {
        let order = order.into();
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);

        if entries.map.insert(uid.clone(), order).is_none() {
            entries.queue.push_back(uid);
            if entries.queue.len() > self.capacity.get()
                && let Some(oldest) = entries.queue.pop_front()
            {
                entries.map.remove(&oldest);
                tracing::trace!(order_uid = %oldest, "evicted cached order");
            }
        }
    }

    /// Get a shared handle to the order stored under `uid`.
    #[must_use]
    pub fn get(&self, uid: &OrderUid) -> Option<Arc<Order>> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .map
            .get(uid)
            .cloned()
    }

    /// Number of cached orders.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .map
            .len()
    }

    /// Returns `true` if the cache holds no orders.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for OrderCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderCache")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .finish_non_exhaustive()
    }
}
