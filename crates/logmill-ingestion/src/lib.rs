//! logmill ingestion
//!
//! The bounded queue between log calls and the writer worker. Producers
//! never wait on it: a full queue drops the event and counts the drop.

pub mod queue;

pub use queue::{create_event_queue, Enqueue, EventReceiver, EventSender, QueueSnapshot, QueueStats};

/// Default queue capacity
pub const DEFAULT_QUEUE_SIZE: usize = logmill_core::config::DEFAULT_QUEUE_SIZE;
