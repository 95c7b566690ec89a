use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::debug;
use tokio::sync::Mutex;

use crate::broker::{BrokerAdapter, StreamMessage};
use crate::error::{GroupStreamError, GroupStreamResult};
use crate::stream_registry::StreamRegistry;

/// One-shot state machine owning the broker connection and stream registry:
/// `subscribe` once, then `read`/`claim`/`ack`/`del`/`pause`/`resume` any
/// number of times, then `close` once.
pub struct ConsumerClient {
    group: String,
    name: String,
    broker: Arc<dyn BrokerAdapter>,
    registry: Mutex<Option<StreamRegistry>>,
    running: AtomicBool,
    disposed: AtomicBool,
    // Barrier over in-flight broker calls so `close` never tears down the
    // connection while one is outstanding.
    inflight: Arc<tokio::sync::Semaphore>,
}

impl ConsumerClient {
    pub fn new(group: impl Into<String>, name: impl Into<String>, broker: Arc<dyn BrokerAdapter>) -> Self {
        ConsumerClient {
            group: group.into(),
            name: name.into(),
            broker,
            registry: Mutex::new(None),
            running: AtomicBool::new(false),
            disposed: AtomicBool::new(false),
            inflight: Arc::new(tokio::sync::Semaphore::new(1)),
        }
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// `streams` pairs a stream name with its initial offset (empty string
    /// defaults to the never-delivered sentinel `">"`).
    ///
    /// On any error once `running` has been claimed, the client transitions to
    /// `disposed` rather than being left running-but-unsubscribed: there is no
    /// partial-subscribe state to recover from, so the only way forward is a
    /// fresh client.
    pub async fn subscribe(&self, streams: Vec<(String, String)>) -> GroupStreamResult<()> {
        if self.disposed.load(Ordering::SeqCst) {
            return Err(GroupStreamError::lifecycle("subscribe called after close"));
        }
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(GroupStreamError::lifecycle("subscribe called while already running"));
        }

        match self.subscribe_inner(streams).await {
            Ok(()) => Ok(()),
            Err(error) => {
                self.running.store(false, Ordering::SeqCst);
                self.disposed.store(true, Ordering::SeqCst);
                Err(error)
            }
        }
    }

    async fn subscribe_inner(&self, streams: Vec<(String, String)>) -> GroupStreamResult<()> {
        if streams.is_empty() {
            return Err(GroupStreamError::lifecycle("subscribe requires at least one stream"));
        }

        self.broker.ping().await?;
        let mut registry_slot = self.registry.lock().await;
        *registry_slot = Some(StreamRegistry::new(streams));
        debug!("consumer client {}/{} subscribed", self.group, self.name);
        Ok(())
    }

    async fn registry(&self) -> GroupStreamResult<tokio::sync::MappedMutexGuard<'_, StreamRegistry>> {
        let guard = self.registry.lock().await;
        if guard.is_none() {
            return Err(GroupStreamError::lifecycle("client is not subscribed"));
        }
        Ok(tokio::sync::MutexGuard::map(guard, |slot| {
            slot.as_mut().expect("checked Some above")
        }))
    }

    pub async fn pause(&self, stream: &str) -> GroupStreamResult<()> {
        self.registry().await?.pause(stream);
        Ok(())
    }

    pub async fn resume(&self, stream: &str) -> GroupStreamResult<()> {
        self.registry().await?.resume(stream);
        Ok(())
    }

    /// Read new messages across every active stream. Returns immediately with
    /// an empty result if every stream is paused.
    pub async fn read(
        &self,
        count: usize,
        block_ms: u64,
    ) -> GroupStreamResult<Vec<(String, Vec<StreamMessage>)>> {
        let (streams, offsets) = self.registry().await?.active_view();
        if streams.is_empty() {
            return Ok(Vec::new());
        }

        let _permit = self.inflight.acquire().await.expect("semaphore not closed");
        self.broker
            .read_group(&self.group, &self.name, count, block_ms, &streams, &offsets)
            .await
    }

    /// Recover messages abandoned by other consumers: sweep each active
    /// stream's pending list, claim the stale entries, and purge any ghost
    /// IDs (pending entries whose underlying stream entry no longer exists).
    pub async fn claim(
        &self,
        min_idle_ms: u64,
        count: usize,
        pending_fetching_size: usize,
    ) -> GroupStreamResult<Vec<(String, Vec<StreamMessage>)>> {
        let active_streams = {
            let (streams, _) = self.registry().await?.active_view();
            streams
        };

        let _permit = self.inflight.acquire().await.expect("semaphore not closed");
        let mut result = Vec::new();
        for stream in active_streams {
            let claimed = self
                .claim_one_stream(&stream, min_idle_ms, count, pending_fetching_size)
                .await?;
            if !claimed.is_empty() {
                result.push((stream, claimed));
            }
        }
        Ok(result)
    }

    async fn claim_one_stream(
        &self,
        stream: &str,
        min_idle_ms: u64,
        count: usize,
        pending_fetching_size: usize,
    ) -> GroupStreamResult<Vec<StreamMessage>> {
        let pending = self
            .broker
            .pending(stream, &self.group, pending_fetching_size)
            .await?;

        let requested: Vec<String> = pending
            .into_iter()
            .filter(|entry| entry.idle_ms as u64 >= min_idle_ms)
            .take(count)
            .map(|entry| entry.id)
            .collect();

        if requested.is_empty() {
            return Ok(Vec::new());
        }

        let claimed = self
            .broker
            .claim(stream, &self.group, &self.name, min_idle_ms, &requested)
            .await?;

        if claimed.len() > requested.len() {
            return Err(GroupStreamError::invariant(format!(
                "stream {stream}: claim reply ({}) longer than request ({})",
                claimed.len(),
                requested.len()
            )));
        }

        let ghosts = find_ghost_ids(&requested, &claimed);
        if !ghosts.is_empty() {
            self.ack_ghost_ids(stream, &ghosts).await?;
        }

        Ok(claimed)
    }

    /// For each ghost ID, probe with `XRANGE id id`; if the entry is truly
    /// gone, `XACK` it to drop it from the pending list for good.
    async fn ack_ghost_ids(&self, stream: &str, ghosts: &[String]) -> GroupStreamResult<()> {
        let mut to_ack = Vec::new();
        for id in ghosts {
            if !self.broker.entry_exists(stream, id).await? {
                to_ack.push(id.clone());
            }
        }
        if !to_ack.is_empty() {
            self.broker.ack(stream, &self.group, &to_ack).await?;
        }
        Ok(())
    }

    pub async fn ack(&self, stream: &str, ids: &[String]) -> GroupStreamResult<()> {
        let _permit = self.inflight.acquire().await.expect("semaphore not closed");
        self.broker.ack(stream, &self.group, ids).await
    }

    pub async fn del(&self, stream: &str, ids: &[String]) -> GroupStreamResult<()> {
        let _permit = self.inflight.acquire().await.expect("semaphore not closed");
        self.broker.del(stream, ids).await
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst) && !self.disposed.load(Ordering::SeqCst)
    }

    /// Idempotent. Waits for in-flight broker calls to finish, then disposes
    /// the client permanently.
    pub async fn close(&self) -> GroupStreamResult<()> {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.running.store(false, Ordering::SeqCst);
        // Acquiring the only permit blocks until any call holding it returns.
        let _permit = self.inflight.acquire().await.expect("semaphore not closed");
        debug!("consumer client {}/{} closed", self.group, self.name);
        Ok(())
    }
}

/// Walk `requested` against `claimed` (order-preserving subsequence) and
/// return every requested ID that did not survive the claim.
fn find_ghost_ids(requested: &[String], claimed: &[StreamMessage]) -> Vec<String> {
    let mut ghosts = Vec::new();
    let mut cursor = 0;
    for id in requested {
        if cursor < claimed.len() && &claimed[cursor].id == id {
            cursor += 1;
        } else {
            ghosts.push(id.clone());
        }
    }
    ghosts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::{PendingEntry, StreamMessage};
    use std::collections::BTreeMap;
    use std::sync::Mutex as StdMutex;

    struct MockBroker {
        pending: StdMutex<HashMap<String, Vec<PendingEntry>>>,
        claimed: StdMutex<HashMap<String, Vec<StreamMessage>>>,
        existing_ids: StdMutex<Vec<String>>,
        acked: StdMutex<Vec<(String, Vec<String>)>>,
    }

    impl MockBroker {
        fn new() -> Self {
            MockBroker {
                pending: StdMutex::new(HashMap::new()),
                claimed: StdMutex::new(HashMap::new()),
                existing_ids: StdMutex::new(Vec::new()),
                acked: StdMutex::new(Vec::new()),
            }
        }
    }

    #[async_trait::async_trait]
    impl BrokerAdapter for MockBroker {
        async fn ping(&self) -> GroupStreamResult<()> {
            Ok(())
        }

        async fn read_group(
            &self,
            _group: &str,
            _consumer: &str,
            _count: usize,
            _block_ms: u64,
            _streams: &[String],
            _offsets: &[String],
        ) -> GroupStreamResult<Vec<(String, Vec<StreamMessage>)>> {
            Ok(Vec::new())
        }

        async fn pending(
            &self,
            stream: &str,
            _group: &str,
            _count: usize,
        ) -> GroupStreamResult<Vec<PendingEntry>> {
            Ok(self.pending.lock().unwrap().get(stream).cloned().unwrap_or_default())
        }

        async fn claim(
            &self,
            stream: &str,
            _group: &str,
            _consumer: &str,
            _min_idle_ms: u64,
            _ids: &[String],
        ) -> GroupStreamResult<Vec<StreamMessage>> {
            Ok(self.claimed.lock().unwrap().get(stream).cloned().unwrap_or_default())
        }

        async fn entry_exists(&self, _stream: &str, id: &str) -> GroupStreamResult<bool> {
            Ok(self.existing_ids.lock().unwrap().contains(&id.to_string()))
        }

        async fn ack(&self, stream: &str, _group: &str, ids: &[String]) -> GroupStreamResult<()> {
            self.acked.lock().unwrap().push((stream.to_string(), ids.to_vec()));
            Ok(())
        }

        async fn del(&self, _stream: &str, _ids: &[String]) -> GroupStreamResult<()> {
            Ok(())
        }

        async fn add(
            &self,
            _stream: &str,
            _id: &str,
            _fields: &BTreeMap<String, String>,
        ) -> GroupStreamResult<String> {
            Ok("1-0".into())
        }

        async fn create_group(&self, _stream: &str, _group: &str, _start_id: &str) -> GroupStreamResult<()> {
            Ok(())
        }

        async fn destroy_group(&self, _stream: &str, _group: &str) -> GroupStreamResult<()> {
            Ok(())
        }
    }

    fn pending_entry(id: &str, idle_ms: i64) -> PendingEntry {
        PendingEntry {
            id: id.to_string(),
            consumer: "other".into(),
            idle_ms,
            deliveries: 1,
        }
    }

    fn stream_message(id: &str) -> StreamMessage {
        StreamMessage {
            id: id.to_string(),
            fields: BTreeMap::new(),
        }
    }

    #[test]
    fn ghost_ids_are_the_requested_minus_claimed() {
        let requested = vec!["1-0".to_string(), "2-0".to_string(), "3-0".to_string()];
        let claimed = vec![stream_message("2-0")];
        let ghosts = find_ghost_ids(&requested, &claimed);
        assert_eq!(ghosts, vec!["1-0".to_string(), "3-0".to_string()]);
    }

    #[test]
    fn no_ghosts_when_everything_claimed() {
        let requested = vec!["1-0".to_string(), "2-0".to_string()];
        let claimed = vec![stream_message("1-0"), stream_message("2-0")];
        assert!(find_ghost_ids(&requested, &claimed).is_empty());
    }

    #[tokio::test]
    async fn claim_acks_ghosts_that_no_longer_exist() {
        let broker = Arc::new(MockBroker::new());
        broker.pending.lock().unwrap().insert(
            "orders".into(),
            vec![pending_entry("1-0", 5000), pending_entry("2-0", 5000), pending_entry("3-0", 5000)],
        );
        broker
            .claimed
            .lock()
            .unwrap()
            .insert("orders".into(), vec![stream_message("2-0")]);
        // 1-0 and 3-0 no longer exist as stream entries.
        broker.existing_ids.lock().unwrap().clear();

        let client = ConsumerClient::new("group", "consumer", broker.clone());
        client
            .subscribe(vec![("orders".to_string(), ">".to_string())])
            .await
            .unwrap();

        let claimed = client.claim(4000, 10, 16).await.unwrap();
        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].1.len(), 1);

        let acked = broker.acked.lock().unwrap();
        assert_eq!(acked.len(), 1);
        let (stream, ids) = &acked[0];
        assert_eq!(stream, "orders");
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&"1-0".to_string()));
        assert!(ids.contains(&"3-0".to_string()));
    }

    #[tokio::test]
    async fn subscribe_twice_is_rejected() {
        let broker = Arc::new(MockBroker::new());
        let client = ConsumerClient::new("group", "consumer", broker);
        client
            .subscribe(vec![("orders".to_string(), ">".to_string())])
            .await
            .unwrap();
        let second = client.subscribe(vec![("orders".to_string(), ">".to_string())]).await;
        assert!(second.is_err());
    }

    #[tokio::test]
    async fn subscribe_with_no_streams_is_rejected() {
        let broker = Arc::new(MockBroker::new());
        let client = ConsumerClient::new("group", "consumer", broker);
        assert!(client.subscribe(Vec::new()).await.is_err());
    }

    #[tokio::test]
    async fn failed_subscribe_disposes_the_client() {
        let broker = Arc::new(MockBroker::new());
        let client = ConsumerClient::new("group", "consumer", broker);

        client.subscribe(Vec::new()).await.unwrap_err();
        assert!(!client.is_running());

        // A disposed client rejects retry with "after close", not "already running".
        let retry = client
            .subscribe(vec![("orders".to_string(), ">".to_string())])
            .await;
        assert!(retry.is_err());
    }

    #[tokio::test]
    async fn pause_excludes_stream_from_claim() {
        let broker = Arc::new(MockBroker::new());
        broker
            .pending
            .lock()
            .unwrap()
            .insert("orders".into(), vec![pending_entry("1-0", 5000)]);
        broker
            .claimed
            .lock()
            .unwrap()
            .insert("orders".into(), vec![stream_message("1-0")]);
        broker.existing_ids.lock().unwrap().push("1-0".to_string());

        let client = ConsumerClient::new("group", "consumer", broker);
        client
            .subscribe(vec![
                ("orders".to_string(), ">".to_string()),
                ("payments".to_string(), ">".to_string()),
            ])
            .await
            .unwrap();
        client.pause("orders").await.unwrap();

        let claimed = client.claim(4000, 10, 16).await.unwrap();
        assert!(claimed.is_empty());
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let broker = Arc::new(MockBroker::new());
        let client = ConsumerClient::new("group", "consumer", broker);
        client
            .subscribe(vec![("orders".to_string(), ">".to_string())])
            .await
            .unwrap();
        client.close().await.unwrap();
        client.close().await.unwrap();
    }
}
