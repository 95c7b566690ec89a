use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

/// Receives the `ack`/`delete` calls a [`Message`] wins the race to make.
/// Implemented by [`crate::consumer::Consumer`]; a fresh mock per test is the
/// usual stand-in elsewhere.
#[async_trait]
pub trait MessageDelegate: Send + Sync {
    async fn on_ack(&self, message: &Message);
    async fn on_del(&self, message: &Message);
}

/// A single delivered entry, handed to the user's message handler. `ack` and
/// `delete` are each fire-at-most-once and independent of one another: a
/// handler may legitimately call both.
pub struct Message {
    pub id: String,
    pub stream: String,
    pub group: String,
    pub fields: BTreeMap<String, String>,
    delegate: Arc<dyn MessageDelegate>,
    responded: AtomicBool,
    killed: AtomicBool,
}

impl Message {
    pub fn new(
        id: String,
        stream: String,
        group: String,
        fields: BTreeMap<String, String>,
        delegate: Arc<dyn MessageDelegate>,
    ) -> Self {
        Message {
            id,
            stream,
            group,
            fields,
            delegate,
            responded: AtomicBool::new(false),
            killed: AtomicBool::new(false),
        }
    }

    /// Acknowledge the message. A no-op on every call after the first.
    pub async fn ack(&self) {
        if self
            .responded
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            self.delegate.on_ack(self).await;
        }
    }

    /// Delete the message from its stream. A no-op on every call after the first.
    pub async fn delete(&self) {
        if self
            .killed
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            self.delegate.on_del(self).await;
        }
    }

    /// `true` once either `ack` or `delete` has won its race; monotone.
    pub fn has_responded(&self) -> bool {
        self.responded.load(Ordering::SeqCst) || self.killed.load(Ordering::SeqCst)
    }
}
