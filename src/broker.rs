use std::collections::BTreeMap;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::streams::{
    StreamClaimOptions, StreamClaimReply, StreamPendingCountReply, StreamRangeReply,
    StreamReadOptions, StreamReadReply,
};
use redis::{AsyncCommands, RedisError};

use crate::error::{GroupStreamError, GroupStreamResult};

/// A single stream entry as delivered to or read from the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamMessage {
    pub id: String,
    pub fields: BTreeMap<String, String>,
}

/// One row of a `XPENDING` summary reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingEntry {
    pub id: String,
    pub consumer: String,
    pub idle_ms: i64,
    pub deliveries: i64,
}

/// The broker primitives the consumer engine, producer and admin helpers
/// depend on. Implemented for production use by [`RedisBrokerAdapter`] and by
/// a hand-written mock in tests.
///
/// `read_group`/`pending`/`claim` surface a missing stream or consumer group
/// (`NOGROUP`) as [`GroupStreamError::MissingConsumerGroup`], not as a quiet
/// empty result — a legitimately idle stream/group and a group that was never
/// created (or was lost when its stream key got recreated) are different
/// situations and callers need to tell them apart.
#[async_trait]
pub trait BrokerAdapter: Send + Sync {
    async fn ping(&self) -> GroupStreamResult<()>;

    async fn read_group(
        &self,
        group: &str,
        consumer: &str,
        count: usize,
        block_ms: u64,
        streams: &[String],
        offsets: &[String],
    ) -> GroupStreamResult<Vec<(String, Vec<StreamMessage>)>>;

    async fn pending(
        &self,
        stream: &str,
        group: &str,
        count: usize,
    ) -> GroupStreamResult<Vec<PendingEntry>>;

    async fn claim(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        min_idle_ms: u64,
        ids: &[String],
    ) -> GroupStreamResult<Vec<StreamMessage>>;

    /// `true` iff `id` still exists as an entry in `stream` (probed via `XRANGE id id`).
    async fn entry_exists(&self, stream: &str, id: &str) -> GroupStreamResult<bool>;

    async fn ack(&self, stream: &str, group: &str, ids: &[String]) -> GroupStreamResult<()>;

    async fn del(&self, stream: &str, ids: &[String]) -> GroupStreamResult<()>;

    async fn add(
        &self,
        stream: &str,
        id: &str,
        fields: &BTreeMap<String, String>,
    ) -> GroupStreamResult<String>;

    /// Idempotent: a `BUSYGROUP` reply (group already exists) is treated as success.
    async fn create_group(&self, stream: &str, group: &str, start_id: &str) -> GroupStreamResult<()>;

    async fn destroy_group(&self, stream: &str, group: &str) -> GroupStreamResult<()>;
}

/// Production [`BrokerAdapter`] backed by a `redis` multiplexed async connection.
#[derive(Clone)]
pub struct RedisBrokerAdapter {
    connection: ConnectionManager,
}

impl RedisBrokerAdapter {
    pub async fn connect(connection_string: &str) -> GroupStreamResult<Self> {
        let client = redis::Client::open(connection_string).map_err(GroupStreamError::from)?;
        let connection = ConnectionManager::new(client).await?;
        Ok(RedisBrokerAdapter { connection })
    }

    fn conn(&self) -> ConnectionManager {
        self.connection.clone()
    }
}

fn is_missing_group(error: &RedisError) -> bool {
    error.code() == Some("NOGROUP") || error.to_string().contains("NOGROUP")
}

#[async_trait]
impl BrokerAdapter for RedisBrokerAdapter {
    async fn ping(&self) -> GroupStreamResult<()> {
        let _: String = redis::cmd("PING")
            .query_async(&mut self.conn())
            .await?;
        Ok(())
    }

    async fn read_group(
        &self,
        group: &str,
        consumer: &str,
        count: usize,
        block_ms: u64,
        streams: &[String],
        offsets: &[String],
    ) -> GroupStreamResult<Vec<(String, Vec<StreamMessage>)>> {
        if streams.is_empty() {
            return Ok(Vec::new());
        }
        let options = StreamReadOptions::default()
            .group(group, consumer)
            .count(count)
            .block(block_ms as usize);

        let reply: StreamReadReply = match self
            .conn()
            .xread_options(streams, offsets, &options)
            .await
        {
            Ok(reply) => reply,
            Err(error) if is_missing_group(&error) => {
                return Err(GroupStreamError::missing_consumer_group(format!(
                    "group {group} on one of {streams:?}: {error}"
                )))
            }
            Err(error) => return Err(error.into()),
        };

        Ok(reply
            .keys
            .into_iter()
            .map(|key| {
                let messages = key
                    .ids
                    .into_iter()
                    .map(|stream_id| StreamMessage {
                        id: stream_id.id,
                        fields: fields_to_strings(stream_id.map),
                    })
                    .collect();
                (key.key, messages)
            })
            .collect())
    }

    async fn pending(
        &self,
        stream: &str,
        group: &str,
        count: usize,
    ) -> GroupStreamResult<Vec<PendingEntry>> {
        let reply: StreamPendingCountReply = match self
            .conn()
            .xpending_count(stream, group, "-", "+", count)
            .await
        {
            Ok(reply) => reply,
            Err(error) if is_missing_group(&error) => {
                return Err(GroupStreamError::missing_consumer_group(format!(
                    "group {group} on stream {stream}: {error}"
                )))
            }
            Err(error) => return Err(error.into()),
        };

        Ok(reply
            .ids
            .into_iter()
            .map(|entry| PendingEntry {
                id: entry.id,
                consumer: entry.consumer,
                idle_ms: entry.last_delivered_ms as i64,
                deliveries: entry.times_delivered as i64,
            })
            .collect())
    }

    async fn claim(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        min_idle_ms: u64,
        ids: &[String],
    ) -> GroupStreamResult<Vec<StreamMessage>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let reply: StreamClaimReply = match self
            .conn()
            .xclaim_options(
                stream,
                group,
                consumer,
                min_idle_ms,
                ids,
                StreamClaimOptions::default(),
            )
            .await
        {
            Ok(reply) => reply,
            Err(error) if is_missing_group(&error) => {
                return Err(GroupStreamError::missing_consumer_group(format!(
                    "group {group} on stream {stream}: {error}"
                )))
            }
            Err(error) => return Err(error.into()),
        };

        Ok(reply
            .ids
            .into_iter()
            .map(|stream_id| StreamMessage {
                id: stream_id.id,
                fields: fields_to_strings(stream_id.map),
            })
            .collect())
    }

    async fn entry_exists(&self, stream: &str, id: &str) -> GroupStreamResult<bool> {
        let reply: StreamRangeReply = self.conn().xrange(stream, id, id).await?;
        Ok(!reply.ids.is_empty())
    }

    async fn ack(&self, stream: &str, group: &str, ids: &[String]) -> GroupStreamResult<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let _: i64 = self.conn().xack(stream, group, ids).await?;
        Ok(())
    }

    async fn del(&self, stream: &str, ids: &[String]) -> GroupStreamResult<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let _: i64 = self.conn().xdel(stream, ids).await?;
        Ok(())
    }

    async fn add(
        &self,
        stream: &str,
        id: &str,
        fields: &BTreeMap<String, String>,
    ) -> GroupStreamResult<String> {
        let items: Vec<(&String, &String)> = fields.iter().collect();
        let new_id: String = self.conn().xadd(stream, id, &items).await?;
        Ok(new_id)
    }

    async fn create_group(&self, stream: &str, group: &str, start_id: &str) -> GroupStreamResult<()> {
        let result: Result<bool, RedisError> = self
            .conn()
            .xgroup_create_mkstream(stream, group, start_id)
            .await;
        match result {
            Ok(_) => Ok(()),
            Err(error) if error.to_string().contains("BUSYGROUP") => Ok(()),
            Err(error) => Err(error.into()),
        }
    }

    async fn destroy_group(&self, stream: &str, group: &str) -> GroupStreamResult<()> {
        let _: bool = self.conn().xgroup_destroy(stream, group).await?;
        Ok(())
    }
}

fn fields_to_strings(
    map: std::collections::HashMap<String, redis::Value>,
) -> BTreeMap<String, String> {
    map.into_iter()
        .filter_map(|(key, value)| match value {
            redis::Value::Data(bytes) => {
                Some((key, String::from_utf8_lossy(&bytes).into_owned()))
            }
            redis::Value::Status(status) => Some((key, status)),
            redis::Value::Int(n) => Some((key, n.to_string())),
            _ => None,
        })
        .collect()
}
