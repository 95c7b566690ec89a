use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, error, warn};
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration};

use crate::broker::BrokerAdapter;
use crate::consumer_client::ConsumerClient;
use crate::cyclic_counter::CyclicCounter;
use crate::error::{GroupStreamError, GroupStreamResult};
use crate::message::{Message, MessageDelegate};

const MIN_PENDING_FETCHING_SIZE: usize = 16;
const MAX_PENDING_FETCHING_SIZE: usize = 4096;
const PENDING_FETCHING_SIZE_COEFFICIENT: usize = 3;

/// Invoked once per delivered or claimed message. Runs on the consumer's
/// single worker task, so a slow handler stalls the whole loop.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, message: Message);
}

/// Invoked when a tick of the loop fails. Returning `true` stops the consumer
/// cleanly; returning `false` is treated as fatal and also stops the loop,
/// after logging.
#[async_trait]
pub trait ErrorHandler: Send + Sync {
    async fn handle(&self, error: &GroupStreamError) -> bool;
}

/// Tuning knobs for a [`Consumer`]. Defaults mirror values long proven out in
/// production use of this style of consumer loop.
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    pub group: String,
    pub name: String,
    pub max_in_flight: usize,
    pub max_polling_timeout_ms: u64,
    pub claim_min_idle_time_ms: u64,
    pub idling_timeout_ms: u64,
    pub claim_sensitivity: usize,
    pub claim_occurrence_rate: i32,
}

impl ConsumerConfig {
    pub fn new(group: impl Into<String>, name: impl Into<String>) -> Self {
        ConsumerConfig {
            group: group.into(),
            name: name.into(),
            max_in_flight: 64,
            max_polling_timeout_ms: 5_000,
            claim_min_idle_time_ms: 30_000,
            idling_timeout_ms: 1_000,
            claim_sensitivity: 1,
            claim_occurrence_rate: 10,
        }
    }

    pub fn with_max_in_flight(mut self, value: usize) -> Self {
        self.max_in_flight = value;
        self
    }

    pub fn with_max_polling_timeout_ms(mut self, value: u64) -> Self {
        self.max_polling_timeout_ms = value;
        self
    }

    pub fn with_claim_min_idle_time_ms(mut self, value: u64) -> Self {
        self.claim_min_idle_time_ms = value;
        self
    }

    pub fn with_idling_timeout_ms(mut self, value: u64) -> Self {
        self.idling_timeout_ms = value;
        self
    }

    pub fn with_claim_sensitivity(mut self, value: usize) -> Self {
        self.claim_sensitivity = value;
        self
    }

    pub fn with_claim_occurrence_rate(mut self, value: i32) -> Self {
        self.claim_occurrence_rate = value;
        self
    }
}

fn pending_fetching_size(max_in_flight: usize) -> usize {
    (max_in_flight * PENDING_FETCHING_SIZE_COEFFICIENT)
        .clamp(MIN_PENDING_FETCHING_SIZE, MAX_PENDING_FETCHING_SIZE)
}

/// The long-running driver. Owns a [`ConsumerClient`], a single worker task,
/// and the claim-trigger counter; dispatches delivered and claimed messages to
/// a user-supplied [`MessageHandler`].
pub struct Consumer {
    config: ConsumerConfig,
    client: Arc<ConsumerClient>,
    handler: Arc<dyn MessageHandler>,
    error_handler: Arc<dyn ErrorHandler>,
    claim_trigger: CyclicCounter,
    running: AtomicBool,
    disposed: AtomicBool,
    stop: Arc<Notify>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Consumer {
    pub fn new(
        config: ConsumerConfig,
        broker: Arc<dyn BrokerAdapter>,
        handler: Arc<dyn MessageHandler>,
        error_handler: Arc<dyn ErrorHandler>,
    ) -> Arc<Self> {
        let claim_trigger = CyclicCounter::new(config.claim_occurrence_rate);
        let client = Arc::new(ConsumerClient::new(
            config.group.clone(),
            config.name.clone(),
            broker,
        ));
        Arc::new(Consumer {
            config,
            client,
            handler,
            error_handler,
            claim_trigger,
            running: AtomicBool::new(false),
            disposed: AtomicBool::new(false),
            stop: Arc::new(Notify::new()),
            worker: Mutex::new(None),
        })
    }

    /// `streams` pairs a stream name with its initial offset; an empty offset
    /// defaults to `">"` (never delivered to this consumer).
    ///
    /// On error, the consumer transitions to `disposed` rather than being left
    /// running-but-unsubscribed — same rationale as `ConsumerClient::subscribe`.
    pub async fn subscribe(self: &Arc<Self>, streams: Vec<(String, String)>) -> GroupStreamResult<()> {
        if self.disposed.load(Ordering::SeqCst) {
            return Err(GroupStreamError::lifecycle("subscribe called after close"));
        }
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(GroupStreamError::lifecycle("subscribe called while already running"));
        }

        if let Err(error) = self.client.subscribe(streams).await {
            self.running.store(false, Ordering::SeqCst);
            self.disposed.store(true, Ordering::SeqCst);
            return Err(error);
        }

        let this = Arc::clone(self);
        let handle = tokio::spawn(async move { this.run().await });
        *self.worker.lock().await = Some(handle);
        debug!(
            "consumer {}/{} started",
            self.config.group, self.config.name
        );
        Ok(())
    }

    async fn run(self: Arc<Self>) {
        loop {
            tokio::select! {
                _ = self.stop.notified() => {
                    debug!("consumer {}/{} stopping", self.config.group, self.config.name);
                    return;
                }
                result = self.process_message() => {
                    match result {
                        Ok(()) => {}
                        Err(error) => {
                            let disposed = self.error_handler.handle(&error).await;
                            if disposed {
                                debug!(
                                    "consumer {}/{} error handler requested shutdown: {error}",
                                    self.config.group, self.config.name
                                );
                            } else {
                                error!(
                                    "consumer {}/{} fatal error, stopping loop: {error}",
                                    self.config.group, self.config.name
                                );
                            }
                            return;
                        }
                    }
                }
            }
        }
    }

    /// One iteration of the poll/claim loop: read new messages, conditionally
    /// sweep for abandoned pending messages, and back off when nothing was
    /// delivered at all.
    async fn process_message(self: &Arc<Self>) -> GroupStreamResult<()> {
        let mut delivered = 0usize;

        let read_result = self
            .client
            .read(self.config.max_in_flight, self.config.max_polling_timeout_ms)
            .await?;
        for (stream, messages) in read_result {
            for message in messages {
                delivered += 1;
                self.dispatch(stream.clone(), message).await;
            }
        }

        let mut claimed_any = false;
        if self.claim_trigger.spin() || delivered <= self.config.claim_sensitivity {
            let size = pending_fetching_size(self.config.max_in_flight);
            let claim_result = self
                .client
                .claim(self.config.claim_min_idle_time_ms, self.config.max_in_flight, size)
                .await?;
            for (stream, messages) in claim_result {
                for message in messages {
                    claimed_any = true;
                    self.dispatch(stream.clone(), message).await;
                }
            }
        }

        if !claimed_any && delivered == 0 {
            sleep(Duration::from_millis(self.config.idling_timeout_ms)).await;
        }

        Ok(())
    }

    async fn dispatch(self: &Arc<Self>, stream: String, raw: crate::broker::StreamMessage) {
        let message = Message::new(
            raw.id,
            stream,
            self.config.group.clone(),
            raw.fields,
            Arc::clone(self) as Arc<dyn MessageDelegate>,
        );
        self.handler.handle(message).await;
    }

    /// Idempotent. Signals the worker task to stop and waits for it to exit.
    pub async fn close(self: &Arc<Self>) -> GroupStreamResult<()> {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.running.store(false, Ordering::SeqCst);
        self.stop.notify_one();

        let handle = self.worker.lock().await.take();
        if let Some(handle) = handle {
            if let Err(join_error) = handle.await {
                warn!("consumer worker task panicked: {join_error}");
            }
        }
        self.client.close().await
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst) && !self.disposed.load(Ordering::SeqCst)
    }

    /// Exclude `stream` from the read/claim loop until [`Consumer::resume`] is
    /// called. Takes effect no later than the start of the next tick.
    pub async fn pause(&self, stream: &str) -> GroupStreamResult<()> {
        self.client.pause(stream).await
    }

    pub async fn resume(&self, stream: &str) -> GroupStreamResult<()> {
        self.client.resume(stream).await
    }
}

#[async_trait]
impl MessageDelegate for Consumer {
    async fn on_ack(&self, message: &Message) {
        if !self.is_running() {
            return;
        }
        if let Err(error) = self.client.ack(&message.stream, &[message.id.clone()]).await {
            warn!(
                "consumer {}/{} failed to ack {} on {}: {error}",
                self.config.group, self.config.name, message.id, message.stream
            );
        }
    }

    async fn on_del(&self, message: &Message) {
        if !self.is_running() {
            return;
        }
        if let Err(error) = self.client.del(&message.stream, &[message.id.clone()]).await {
            warn!(
                "consumer {}/{} failed to delete {} on {}: {error}",
                self.config.group, self.config.name, message.id, message.stream
            );
        }
    }
}
