use std::collections::BTreeMap;
use std::sync::Arc;

use crate::broker::BrokerAdapter;
use crate::error::GroupStreamResult;
use crate::message_content::{MessageContent, DEFAULT_HEADER_KEY_PREFIX};

/// Stream ID to request from the broker when adding an entry. `Auto` lets the
/// broker assign one (`XADD stream * ...`); `Explicit` pins a specific ID.
#[derive(Debug, Clone)]
pub enum ProduceId {
    Auto,
    Explicit(String),
}

impl ProduceId {
    fn as_str(&self) -> &str {
        match self {
            ProduceId::Auto => "*",
            ProduceId::Explicit(id) => id,
        }
    }
}

/// Thin `XADD` wrapper. An external collaborator from the consumer engine's
/// point of view, but implemented here since the crate owns the wire format.
pub struct Producer {
    broker: Arc<dyn BrokerAdapter>,
    header_key_prefix: String,
}

impl Producer {
    pub fn new(broker: Arc<dyn BrokerAdapter>) -> Self {
        Producer {
            broker,
            header_key_prefix: DEFAULT_HEADER_KEY_PREFIX.to_string(),
        }
    }

    pub fn with_header_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.header_key_prefix = prefix.into();
        self
    }

    /// Write a raw field map, returning the ID the broker assigned (or confirmed).
    pub async fn write(
        &self,
        stream: &str,
        id: ProduceId,
        fields: &BTreeMap<String, String>,
    ) -> GroupStreamResult<String> {
        self.broker.add(stream, id.as_str(), fields).await
    }

    /// Flatten `content`'s headers and payload, then write them as one entry.
    pub async fn write_content(
        &self,
        stream: &str,
        id: ProduceId,
        content: &MessageContent,
    ) -> GroupStreamResult<String> {
        let mut fields = BTreeMap::new();
        content.write_to(&mut fields, &self.header_key_prefix);
        self.write(stream, id, &fields).await
    }
}
