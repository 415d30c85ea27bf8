//! The ingestion loop.
//!
//! Messages are handled one at a time in fetch order. For each one the steps
//! are decode, validate, persist, cache, acknowledge. A failure before the
//! persist commits skips the message without acknowledging it; nothing
//! reaches the cache unless storage accepted it first.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use orderbox_core::{Order, ValidationError};

use super::stream::{MessageStream, StreamError, StreamMessage};
use crate::cache::OrderCache;
use crate::db::{OrderStore, RepositoryError, SaveOutcome};

/// Default pause after a failed fetch.
pub const DEFAULT_FETCH_BACKOFF: Duration = Duration::from_millis(500);

/// Why a message was not fully processed.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// The payload is not an order JSON object.
    #[error("decode failed: {0}")]
    Decode(#[from] serde_json::Error),

    /// The order breaks a validation rule.
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// Storage rejected the order.
    #[error("persist failed: {0}")]
    Persist(#[from] RepositoryError),

    /// The order was stored but the acknowledgement failed.
    #[error("acknowledge failed: {source}")]
    Acknowledge {
        /// What the store did with the order.
        outcome: SaveOutcome,
        /// Stream error from the acknowledgement.
        source: StreamError,
    },

    /// Reading the next message failed.
    #[error("fetch failed: {0}")]
    Fetch(StreamError),
}

/// Message counts reported when the pipeline stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    /// Orders newly written to storage.
    pub stored: u64,
    /// Orders that storage already held.
    pub duplicates: u64,
    pub decode_failed: u64,
    pub validation_failed: u64,
    pub persist_failed: u64,
    /// Stored orders whose acknowledgement failed.
    pub ack_failed: u64,
    pub fetch_failed: u64,
}

impl IngestStats {
    fn record_outcome(&mut self, outcome: SaveOutcome) {
        match outcome {
            SaveOutcome::Inserted => self.stored += 1,
            SaveOutcome::AlreadyStored => self.duplicates += 1,
        }
    }

    fn record_error(&mut self, error: &IngestError) {
        match error {
            IngestError::Decode(_) => self.decode_failed += 1,
            IngestError::Validation(_) => self.validation_failed += 1,
            IngestError::Persist(_) => self.persist_failed += 1,
            IngestError::Acknowledge { outcome, .. } => {
                self.record_outcome(*outcome);
                self.ack_failed += 1;
            }
            IngestError::Fetch(_) => self.fetch_failed += 1,
        }
    }
}

/// Consumes a [`MessageStream`] into storage and the cache.
pub struct IngestPipeline<S> {
    stream: S,
    store: Arc<dyn OrderStore>,
    cache: Arc<OrderCache>,
    fetch_backoff: Duration,
}

impl<S: MessageStream> IngestPipeline<S> {
    #[must_use]
    pub fn new(stream: S, store: Arc<dyn OrderStore>, cache: Arc<OrderCache>) -> Self {
        Self {
            stream,
            store,
            cache,
            fetch_backoff: DEFAULT_FETCH_BACKOFF,
        }
    }

    /// Set the pause between a failed fetch and the next attempt.
    #[must_use]
    pub const fn with_fetch_backoff(mut self, backoff: Duration) -> Self {
        self.fetch_backoff = backoff;
        self
    }

    /// Run until `shutdown` fires or the stream closes.
    ///
    /// Cancellation interrupts a pending fetch or backoff. A message that was
    /// already fetched is processed to completion first.
    pub async fn run(mut self, shutdown: CancellationToken) -> IngestStats {
        let mut stats = IngestStats::default();
        tracing::info!("Ingestion pipeline started");

        loop {
            if shutdown.is_cancelled() {
                break;
            }

            let fetched = tokio::select! {
                biased;
                () = shutdown.cancelled() => break,
                fetched = self.stream.fetch_next() => fetched,
            };

            let message = match fetched {
                Ok(message) => message,
                Err(StreamError::Closed) => {
                    tracing::info!("Message stream closed");
                    break;
                }
                Err(e) => {
                    let error = IngestError::Fetch(e);
                    log_rejection(&error);
                    stats.record_error(&error);

                    tokio::select! {
                        biased;
                        () = shutdown.cancelled() => break,
                        () = tokio::time::sleep(self.fetch_backoff) => continue,
                    }
                }
            };

            let span = tracing::info_span!("ingest", offset = message.offset);
            match self.ingest(&message).instrument(span.clone()).await {
                Ok(outcome) => stats.record_outcome(outcome),
                Err(error) => {
                    span.in_scope(|| log_rejection(&error));
                    stats.record_error(&error);
                }
            }
        }

        tracing::info!(?stats, "Ingestion pipeline stopped");
        stats
    }

    async fn ingest(&mut self, message: &StreamMessage) -> Result<SaveOutcome, IngestError> {
        let order = Order::from_slice(&message.payload)?;
        order.validate()?;

        // Validation has already checked the identifier format.
        let uid = order.uid().map_err(|e| ValidationError::Format {
            field: "order_uid",
            reason: e.to_string(),
        })?;

        let outcome = self.store.save_order(&order).await?;
        match outcome {
            SaveOutcome::Inserted => {
                tracing::info!(order_uid = %uid, items = order.items.len(), "Order stored");
                self.cache.set(uid, order);
            }
            SaveOutcome::AlreadyStored => {
                tracing::info!(order_uid = %uid, "Order already stored, acknowledging redelivery");
            }
        }

        self.stream
            .acknowledge(message)
            .await
            .map_err(|source| IngestError::Acknowledge { outcome, source })?;

        Ok(outcome)
    }
}

fn log_rejection(error: &IngestError) {
    match error {
        IngestError::Decode(_) | IngestError::Validation(_) => {
            tracing::warn!(error = %error, "Rejected message");
        }
        IngestError::Persist(_) => {
            tracing::error!(error = %error, "Failed to persist order");
        }
        IngestError::Acknowledge { .. } => {
            tracing::warn!(error = %error, "Order stored but not acknowledged");
        }
        IngestError::Fetch(_) => {
            tracing::warn!(error = %error, "Failed to fetch message");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::VecDeque;
    use std::num::NonZeroUsize;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use orderbox_core::OrderUid;

    use super::*;
    use crate::db::MemoryOrderStore;

    /// Stream that replays a fixed script, then closes or hangs.
    struct ScriptedStream {
        script: VecDeque<Result<StreamMessage, StreamError>>,
        acked: Arc<Mutex<Vec<u64>>>,
        fail_acks: bool,
        hang_when_empty: bool,
    }

    impl ScriptedStream {
        fn new(payloads: impl IntoIterator<Item = Result<Vec<u8>, StreamError>>) -> Self {
            let script = payloads
                .into_iter()
                .zip(0..)
                .map(|(p, offset)| p.map(|payload| StreamMessage { offset, payload }))
                .collect();
            Self {
                script,
                acked: Arc::default(),
                fail_acks: false,
                hang_when_empty: false,
            }
        }
    }

    #[async_trait]
    impl MessageStream for ScriptedStream {
        async fn fetch_next(&mut self) -> Result<StreamMessage, StreamError> {
            match self.script.pop_front() {
                Some(next) => next,
                None if self.hang_when_empty => std::future::pending().await,
                None => Err(StreamError::Closed),
            }
        }

        async fn acknowledge(&mut self, message: &StreamMessage) -> Result<(), StreamError> {
            if self.fail_acks {
                return Err(StreamError::Transport("broker went away".to_owned()));
            }
            self.acked.lock().unwrap().push(message.offset);
            Ok(())
        }
    }

    fn payload(uid: &str) -> Vec<u8> {
        serde_json::to_vec(&serde_json::json!({
            "order_uid": uid,
            "track_number": "WBILMTESTTRACK",
            "entry": "WBIL",
            "delivery": {
                "name": "Test Testov",
                "phone": "+9720000000",
                "zip": "2639809",
                "city": "Kiryat Mozkin",
                "address": "Ploshad Mira 15",
                "email": "test@gmail.com"
            },
            "payment": {
                "transaction": uid,
                "currency": "USD",
                "provider": "wbpay",
                "amount": 1817,
                "payment_dt": 1_637_907_727,
                "delivery_cost": 1500,
                "goods_total": 317
            },
            "items": [{
                "chrt_id": 9_934_930,
                "track_number": "WBILMTESTTRACK",
                "price": 453,
                "name": "Mascaras",
                "total_price": 317
            }]
        }))
        .unwrap()
    }

    fn without_items(uid: &str) -> Vec<u8> {
        let mut value: serde_json::Value = serde_json::from_slice(&payload(uid)).unwrap();
        value["items"] = serde_json::json!([]);
        serde_json::to_vec(&value).unwrap()
    }

    struct Harness {
        store: Arc<MemoryOrderStore>,
        cache: Arc<OrderCache>,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                store: Arc::new(MemoryOrderStore::new()),
                cache: Arc::new(OrderCache::new(NonZeroUsize::new(16).unwrap())),
            }
        }

        fn pipeline(&self, stream: ScriptedStream) -> IngestPipeline<ScriptedStream> {
            IngestPipeline::new(stream, self.store.clone(), Arc::clone(&self.cache))
                .with_fetch_backoff(Duration::from_millis(1))
        }

        fn cached(&self, uid: &str) -> bool {
            self.cache.get(&OrderUid::parse(uid).unwrap()).is_some()
        }
    }

    #[tokio::test]
    async fn test_valid_message_is_stored_cached_and_acked() {
        let h = Harness::new();
        let stream = ScriptedStream::new([Ok(payload("order1"))]);
        let acked = Arc::clone(&stream.acked);

        let stats = h.pipeline(stream).run(CancellationToken::new()).await;

        assert_eq!(stats.stored, 1);
        assert_eq!(h.store.saves(), 1);
        assert!(h.cached("order1"));
        assert_eq!(*acked.lock().unwrap(), [0]);
    }

    #[tokio::test]
    async fn test_empty_items_is_never_saved_or_acked() {
        let h = Harness::new();
        let stream = ScriptedStream::new([Ok(without_items("order1"))]);
        let acked = Arc::clone(&stream.acked);

        let stats = h.pipeline(stream).run(CancellationToken::new()).await;

        assert_eq!(stats.validation_failed, 1);
        assert_eq!(h.store.saves(), 0);
        assert!(h.cache.is_empty());
        assert!(acked.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_payload_is_skipped() {
        let h = Harness::new();
        let stream = ScriptedStream::new([
            Ok(b"{\"order_uid\": 12".to_vec()),
            Ok(payload("order2")),
        ]);
        let acked = Arc::clone(&stream.acked);

        let stats = h.pipeline(stream).run(CancellationToken::new()).await;

        assert_eq!(stats.decode_failed, 1);
        assert_eq!(stats.stored, 1);
        assert_eq!(*acked.lock().unwrap(), [1]);
    }

    #[tokio::test]
    async fn test_persist_failure_skips_cache_and_ack() {
        let h = Harness::new();
        h.store.set_fail_saves(true);
        let stream = ScriptedStream::new([Ok(payload("order1")), Ok(payload("order2"))]);
        let acked = Arc::clone(&stream.acked);

        let stats = h.pipeline(stream).run(CancellationToken::new()).await;

        assert_eq!(stats.persist_failed, 2);
        assert!(h.cache.is_empty());
        assert!(acked.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_ack_failure_keeps_stored_order() {
        let h = Harness::new();
        let mut stream = ScriptedStream::new([Ok(payload("order1")), Ok(payload("order2"))]);
        stream.fail_acks = true;

        let stats = h.pipeline(stream).run(CancellationToken::new()).await;

        assert_eq!(stats.stored, 2);
        assert_eq!(stats.ack_failed, 2);
        assert!(h.cached("order1"));
        assert!(h.cached("order2"));
    }

    #[tokio::test]
    async fn test_fetch_error_does_not_stop_the_loop() {
        let h = Harness::new();
        let stream = ScriptedStream::new([
            Err(StreamError::Transport("timeout".to_owned())),
            Ok(payload("order1")),
        ]);

        let stats = h.pipeline(stream).run(CancellationToken::new()).await;

        assert_eq!(stats.fetch_failed, 1);
        assert_eq!(stats.stored, 1);
    }

    #[tokio::test]
    async fn test_redelivery_is_acked_without_second_write() {
        let h = Harness::new();
        let stream = ScriptedStream::new([Ok(payload("order1")), Ok(payload("order1"))]);
        let acked = Arc::clone(&stream.acked);

        let stats = h.pipeline(stream).run(CancellationToken::new()).await;

        assert_eq!(stats.stored, 1);
        assert_eq!(stats.duplicates, 1);
        assert_eq!(h.store.saves(), 1);
        assert_eq!(*acked.lock().unwrap(), [0, 1]);
    }

    #[tokio::test]
    async fn test_messages_are_acked_in_fetch_order() {
        let h = Harness::new();
        let stream = ScriptedStream::new(["a1", "a2", "a3", "a4"].map(|id| Ok(payload(id))));
        let acked = Arc::clone(&stream.acked);

        h.pipeline(stream).run(CancellationToken::new()).await;

        assert_eq!(*acked.lock().unwrap(), [0, 1, 2, 3]);
    }

    #[tokio::test]
    async fn test_cancellation_interrupts_pending_fetch() {
        let h = Harness::new();
        let mut stream = ScriptedStream::new([Ok(payload("order1"))]);
        stream.hang_when_empty = true;

        let shutdown = CancellationToken::new();
        let task = tokio::spawn(h.pipeline(stream).run(shutdown.clone()));

        // Wait for the first message to land before cancelling.
        while !h.cached("order1") {
            tokio::task::yield_now().await;
        }
        shutdown.cancel();

        let stats = tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stats.stored, 1);
    }

    #[tokio::test]
    async fn test_cancelled_before_start_fetches_nothing() {
        let h = Harness::new();
        let stream = ScriptedStream::new([Ok(payload("order1"))]);
        let shutdown = CancellationToken::new();
        shutdown.cancel();

        let stats = h.pipeline(stream).run(shutdown).await;

        assert_eq!(stats, IngestStats::default());
        assert_eq!(h.store.saves(), 0);
    }

    #[tokio::test]
    async fn test_cancellation_interrupts_backoff() {
        let h = Harness::new();
        let mut stream = ScriptedStream::new([Err(StreamError::Transport("down".to_owned()))]);
        stream.hang_when_empty = true;

        let shutdown = CancellationToken::new();
        let pipeline = h.pipeline(stream).with_fetch_backoff(Duration::from_secs(3600));
        let task = tokio::spawn(pipeline.run(shutdown.clone()));
        tokio::task::yield_now().await;
        shutdown.cancel();

        let stats = tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stats.stored, 0);
        assert!(stats.fetch_failed <= 1);
    }
}
