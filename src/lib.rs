//! Consumer-group client for log-structured, append-only stream servers
//! (the Redis Streams command family: `XADD`, `XREADGROUP`, `XPENDING`,
//! `XCLAIM`, `XACK`, `XDEL`, `XRANGE`, `XGROUP`).
//!
//! The core is [`consumer::Consumer`]: a poll/claim loop that combines live
//! delivery (`XREADGROUP`) with recovery of messages abandoned by other
//! consumers (`XPENDING` + `XCLAIM`), handing each one to the caller as a
//! [`message::Message`] with independent, fire-at-most-once `ack`/`delete`.
//!
//! Producing messages ([`producer::Producer`]) and managing consumer groups
//! ([`admin::Admin`]) are thin wrappers kept alongside the engine; they are
//! not part of the read/claim loop itself.

pub mod admin;
pub mod broker;
pub mod client;
pub mod consumer;
pub mod consumer_client;
pub mod cyclic_counter;
pub mod error;
pub mod forwarder;
pub mod message;
pub mod message_content;
pub mod message_state;
pub mod producer;
pub mod stream_registry;

pub mod prelude {
    pub use crate::admin::Admin;
    pub use crate::broker::{BrokerAdapter, PendingEntry, RedisBrokerAdapter, StreamMessage};
    pub use crate::client::{ClientArgs, ClientCredentials};
    pub use crate::consumer::{Consumer, ConsumerConfig, ErrorHandler, MessageHandler};
    pub use crate::error::{GroupStreamError, GroupStreamResult};
    pub use crate::forwarder::{Forwarder, ForwarderRunner};
    pub use crate::message::{Message, MessageDelegate};
    pub use crate::message_content::{MessageContent, DEFAULT_HEADER_KEY_PREFIX};
    pub use crate::message_state::{MessageState, MessageStateCarrier};
    pub use crate::producer::{ProduceId, Producer};
}
