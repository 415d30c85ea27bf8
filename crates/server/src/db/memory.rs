//! In-process order store.
//!
//! Keeps whole aggregates in insertion order behind a mutex. Counts reads and
//! can be told to fail, which lets tests observe how often the cache falls
//! through to storage and how callers react to storage outages.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use orderbox_core::{Order, OrderUid};

use super::{OrderStore, OrderSummary, RepositoryError, SaveOutcome};

#[derive(Default)]
struct Stored {
    orders: Vec<Order>,
    index: HashMap<String, usize>,
}

/// Order store held entirely in memory.
#[derive(Default)]
pub struct MemoryOrderStore {
    stored: Mutex<Stored>,
    reads: AtomicUsize,
    summary_loads: AtomicUsize,
    saves: AtomicUsize,
    fail_saves: AtomicBool,
    fail_reads: AtomicBool,
}

impl MemoryOrderStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store that already holds `orders`, in the given order.
    ///
    /// Seeded orders are stored as-is, without validation.
    #[must_use]
    pub fn with_orders(orders: impl IntoIterator<Item = Order>) -> Self {
        let store = Self::new();
        {
            let mut stored = store
                .stored
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            for order in orders {
                let next = stored.orders.len();
                stored.index.insert(order.order_uid.clone(), next);
                stored.orders.push(order);
            }
        }
        store
    }

    /// Make every subsequent save fail with [`RepositoryError::Unavailable`].
    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent read fail with [`RepositoryError::Unavailable`].
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Number of `get_order_by_id` calls served so far.
    #[must_use]
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Number of `load_summary` calls served so far.
    #[must_use]
    pub fn summary_loads(&self) -> usize {
        self.summary_loads.load(Ordering::SeqCst)
    }

    /// Number of aggregates inserted so far.
    #[must_use]
    pub fn saves(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    /// Number of stored orders.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().map_or(0, |stored| stored.orders.len())
    }

    /// Returns `true` if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<MutexGuard<'_, Stored>, RepositoryError> {
        self.stored
            .lock()
            .map_err(|_| RepositoryError::Unavailable("memory store lock poisoned".to_owned()))
    }

    fn check_reads(&self) -> Result<(), RepositoryError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(RepositoryError::Unavailable("reads disabled".to_owned()));
        }
        Ok(())
    }
}

#[async_trait]
impl OrderStore for MemoryOrderStore {
    async fn save_order(&self, order: &Order) -> Result<SaveOutcome, RepositoryError> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(RepositoryError::Unavailable("saves disabled".to_owned()));
        }

        let mut stored = self.lock()?;
        if stored.index.contains_key(&order.order_uid) {
            return Ok(SaveOutcome::AlreadyStored);
        }

        let next = stored.orders.len();
        stored.index.insert(order.order_uid.clone(), next);
        stored.orders.push(order.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(SaveOutcome::Inserted)
    }

    async fn get_order_by_id(&self, uid: &OrderUid) -> Result<Order, RepositoryError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.check_reads()?;

        let stored = self.lock()?;
        let order = stored
            .index
            .get(uid.as_str())
            .and_then(|&i| stored.orders.get(i))
            .ok_or(RepositoryError::NotFound)?;

        if order.items.is_empty() {
            return Err(RepositoryError::DataCorruption(format!(
                "order {uid} has no items"
            )));
        }
        Ok(order.clone())
    }

    async fn list_order_summaries(
        &self,
        offset: usize,
        limit: NonZeroUsize,
    ) -> Result<Vec<OrderSummary>, RepositoryError> {
        self.check_reads()?;
        let stored = self.lock()?;
        Ok(stored
            .orders
            .iter()
            .rev()
            .skip(offset)
            .take(limit.get())
            .map(OrderSummary::from)
            .collect())
    }

    async fn load_summary(&self, summary: OrderSummary) -> Result<Order, RepositoryError> {
        self.summary_loads.fetch_add(1, Ordering::SeqCst);
        self.check_reads()?;
        let stored = self.lock()?;
        let order = stored
            .index
            .get(&summary.order_uid)
            .and_then(|&i| stored.orders.get(i))
            .ok_or(RepositoryError::NotFound)?;

        Ok(Order {
            delivery: order.delivery.clone(),
            payment: order.payment.clone(),
            items: order.items.clone(),
            ..summary.into_order()
        })
    }

    async fn ping(&self) -> Result<(), RepositoryError> {
        self.check_reads()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use orderbox_core::Item;

    use super::*;

    fn order(uid: &str) -> Order {
        Order {
            order_uid: uid.to_owned(),
            track_number: "TRACK".to_owned(),
            items: vec![Item {
                chrt_id: 1,
                name: "thing".to_owned(),
                ..Item::default()
            }],
            ..Order::default()
        }
    }

    #[tokio::test]
    async fn test_save_then_get() {
        let store = MemoryOrderStore::new();
        assert_eq!(
            store.save_order(&order("a1")).await.unwrap(),
            SaveOutcome::Inserted
        );

        let uid = OrderUid::parse("a1").unwrap();
        let loaded = store.get_order_by_id(&uid).await.unwrap();
        assert_eq!(loaded, order("a1"));
        assert_eq!(store.reads(), 1);
    }

    #[tokio::test]
    async fn test_resave_is_not_written_twice() {
        let store = MemoryOrderStore::new();
        store.save_order(&order("a1")).await.unwrap();
        assert_eq!(
            store.save_order(&order("a1")).await.unwrap(),
            SaveOutcome::AlreadyStored
        );
        assert_eq!(store.saves(), 1);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_order_is_not_found() {
        let store = MemoryOrderStore::new();
        let uid = OrderUid::parse("nope").unwrap();
        assert!(matches!(
            store.get_order_by_id(&uid).await,
            Err(RepositoryError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_summaries_page_newest_first() {
        let store =
            MemoryOrderStore::with_orders([order("b"), order("a"), order("c"), order("d")]);
        let page = |offset: usize| {
            let store = &store;
            async move {
                store
                    .list_order_summaries(offset, NonZeroUsize::new(3).unwrap())
                    .await
                    .unwrap()
                    .into_iter()
                    .map(|s| s.order_uid)
                    .collect::<Vec<_>>()
            }
        };

        assert_eq!(page(0).await, ["d", "c", "a"]);
        assert_eq!(page(3).await, ["b"]);
        assert!(page(4).await.is_empty());
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let store = MemoryOrderStore::new();
        store.set_fail_saves(true);
        assert!(matches!(
            store.save_order(&order("a1")).await,
            Err(RepositoryError::Unavailable(_))
        ));
        assert!(store.is_empty());

        store.set_fail_reads(true);
        assert!(store.ping().await.is_err());
        assert!(
            store
                .list_order_summaries(0, NonZeroUsize::MIN)
                .await
                .is_err()
        );
    }
}
