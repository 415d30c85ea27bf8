//! Stream ingestion.
//!
//! - [`stream`] - the consumer capability and an in-process channel stream
//! - [`pipeline`] - the decode, validate, persist, cache, acknowledge loop

pub mod pipeline;
pub mod stream;

pub use pipeline::{DEFAULT_FETCH_BACKOFF, IngestError, IngestPipeline, IngestStats};
pub use stream::{
    AckLog, ChannelPublisher, ChannelStream, MessageStream, StreamError, StreamMessage, channel,
};
