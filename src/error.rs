use thiserror::Error;

/// Crate-wide result alias.
pub type GroupStreamResult<T> = Result<T, GroupStreamError>;

/// Errors surfaced by the consumer engine, the producer and the admin helpers.
///
/// `Display`/`source` never recurse into `self` — each variant delegates to the
/// error it wraps exactly once.
#[derive(Debug, Error)]
pub enum GroupStreamError {
    /// The caller used a `Consumer`/`ConsumerClient` outside its allowed lifecycle
    /// (subscribing twice, subscribing an empty stream list, acting after `close`).
    #[error("lifecycle misuse: {0}")]
    LifecycleMisuse(String),

    /// A broker command failed for a reason other than the "no such entry" sentinel.
    #[error("broker transport error: {0}")]
    Transport(#[from] redis::RedisError),

    /// An invariant the engine depends on did not hold in a broker response, e.g.
    /// a claim reply longer than the request. Treat as non-recoverable.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// The broker replied `NOGROUP`: the stream or the consumer group named in
    /// the call does not exist (never deliberately created, or the stream key
    /// was deleted/recreated out from under an existing group). Distinct from
    /// an empty read/pending/claim reply, which is not an error at all.
    #[error("consumer group missing on broker: {0}")]
    MissingConsumerGroup(String),
}

impl GroupStreamError {
    pub fn lifecycle<S: Into<String>>(message: S) -> Self {
        GroupStreamError::LifecycleMisuse(message.into())
    }

    pub fn invariant<S: Into<String>>(message: S) -> Self {
        GroupStreamError::InvariantViolation(message.into())
    }

    pub fn missing_consumer_group<S: Into<String>>(message: S) -> Self {
        GroupStreamError::MissingConsumerGroup(message.into())
    }
}
