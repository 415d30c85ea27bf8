//! Inbound message stream.
//!
//! [`MessageStream`] is the consumer side of an at-least-once broker. The
//! pipeline owns one stream exclusively and calls it from a single task.
//!
//! [`channel`] builds an in-process stream over a bounded `mpsc` queue. The
//! binary feeds it from the demo producer; tests feed it directly.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

/// One raw message read from the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamMessage {
    /// Position of the message in its stream, increasing per publish.
    pub offset: u64,
    /// Undecoded payload bytes.
    pub payload: Vec<u8>,
}

/// Errors raised by a [`MessageStream`].
#[derive(Debug, Error)]
pub enum StreamError {
    /// The stream has ended; no further messages will arrive.
    #[error("stream closed")]
    Closed,

    /// A transient transport failure.
    #[error("stream transport error: {0}")]
    Transport(String),

    /// Acknowledged an offset the stream never delivered or already acked.
    #[error("unknown offset {0}")]
    UnknownOffset(u64),
}

/// Consumer side of a message stream.
#[async_trait]
pub trait MessageStream: Send {
    /// Wait for the next message.
    ///
    /// Must be cancel safe: dropping the returned future before it completes
    /// must not lose a message.
    async fn fetch_next(&mut self) -> Result<StreamMessage, StreamError>;

    /// Mark `message` as processed so it is not redelivered.
    async fn acknowledge(&mut self, message: &StreamMessage) -> Result<(), StreamError>;
}

/// Create a connected in-process publisher and stream.
///
/// `buffer` bounds the number of published but unfetched messages.
#[must_use]
pub fn channel(buffer: usize) -> (ChannelPublisher, ChannelStream) {
    let (tx, rx) = mpsc::channel(buffer.max(1));
    let publisher = ChannelPublisher {
        tx,
        next_offset: Arc::new(AtomicU64::new(0)),
    };
    let stream = ChannelStream {
        rx,
        in_flight: BTreeSet::new(),
        acked: AckLog::default(),
    };
    (publisher, stream)
}

/// Producer handle for a [`ChannelStream`]. Cheap to clone.
#[derive(Debug, Clone)]
pub struct ChannelPublisher {
    tx: mpsc::Sender<StreamMessage>,
    next_offset: Arc<AtomicU64>,
}

impl ChannelPublisher {
    /// Publish a payload, waiting for buffer space. Returns its offset.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::Closed`] if the stream has been dropped.
    pub async fn publish(&self, payload: impl Into<Vec<u8>>) -> Result<u64, StreamError> {
        let offset = self.next_offset.fetch_add(1, Ordering::SeqCst);
        self.tx
            .send(StreamMessage {
                offset,
                payload: payload.into(),
            })
            .await
            .map_err(|_| StreamError::Closed)?;
        Ok(offset)
    }
}

/// Offsets acknowledged on a [`ChannelStream`], in acknowledgement order.
#[derive(Debug, Clone, Default)]
pub struct AckLog(Arc<Mutex<Vec<u64>>>);

impl AckLog {
    /// Snapshot of acknowledged offsets.
    #[must_use]
    pub fn offsets(&self) -> Vec<u64> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn push(&self, offset: u64) {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(offset);
    }
}

/// In-process stream over a bounded channel.
///
/// Closes once every [`ChannelPublisher`] is dropped and the buffer drains.
#[derive(Debug)]
pub struct ChannelStream {
    rx: mpsc::Receiver<StreamMessage>,
    in_flight: BTreeSet<u64>,
    acked: AckLog,
}

impl ChannelStream {
    /// Handle to the acknowledgement log, usable after the stream moves.
    #[must_use]
    pub fn ack_log(&self) -> AckLog {
        self.acked.clone()
    }
}

#[async_trait]
impl MessageStream for ChannelStream {
    async fn fetch_next(&mut self) -> Result<StreamMessage, StreamError> {
        let message = self.rx.recv().await.ok_or(StreamError::Closed)?;
        self.in_flight.insert(message.offset);
        Ok(message)
    }

    async fn acknowledge(&mut self, message: &StreamMessage) -> Result<(), StreamError> {
        if !self.in_flight.remove(&message.offset) {
            return Err(StreamError::UnknownOffset(message.offset));
        }
        self.acked.push(message.offset);
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_offsets_increase_and_acks_are_logged() {
        let (publisher, mut stream) = channel(4);
        let log = stream.ack_log();

        assert_eq!(publisher.publish(b"one".to_vec()).await.unwrap(), 0);
        assert_eq!(publisher.publish(b"two".to_vec()).await.unwrap(), 1);

        let first = stream.fetch_next().await.unwrap();
        let second = stream.fetch_next().await.unwrap();
        assert_eq!(first.payload, b"one");
        assert_eq!(second.offset, 1);

        stream.acknowledge(&second).await.unwrap();
        assert_eq!(log.offsets(), [1]);
    }

    #[tokio::test]
    async fn test_double_ack_is_rejected() {
        let (publisher, mut stream) = channel(1);
        publisher.publish(b"x".to_vec()).await.unwrap();
        let message = stream.fetch_next().await.unwrap();

        stream.acknowledge(&message).await.unwrap();
        assert!(matches!(
            stream.acknowledge(&message).await,
            Err(StreamError::UnknownOffset(0))
        ));
    }

    #[tokio::test]
    async fn test_closes_when_publishers_drop() {
        let (publisher, mut stream) = channel(2);
        publisher.publish(b"last".to_vec()).await.unwrap();
        drop(publisher);

        assert!(stream.fetch_next().await.is_ok());
        assert!(matches!(stream.fetch_next().await, Err(StreamError::Closed)));
    }

    #[tokio::test]
    async fn test_publish_after_stream_drop_fails() {
        let (publisher, stream) = channel(1);
        drop(stream);
        assert!(matches!(
            publisher.publish(b"x".to_vec()).await,
            Err(StreamError::Closed)
        ));
    }
}
