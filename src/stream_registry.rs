use std::collections::HashMap;
use std::sync::RwLock;

const NEVER_DELIVERED_OFFSET: &str = ">";

/// The set of streams a [`crate::consumer_client::ConsumerClient`] is subscribed
/// to, each with an active/paused flag, plus the original subscription offsets.
///
/// `pause`/`resume` only affect streams already present; unknown stream names
/// are silently ignored, matching the broker's own tolerance for subscribing
/// past what a single read call can address.
pub struct StreamRegistry {
    // Kept in insertion order; the broker's positional `STREAMS k1 k2 o1 o2`
    // syntax requires a stable ordering between keys and offsets.
    entries: Vec<(String, String)>,
    active: RwLock<HashMap<String, bool>>,
}

impl StreamRegistry {
    pub fn new(streams: Vec<(String, String)>) -> Self {
        let active = streams
            .iter()
            .map(|(stream, _)| (stream.clone(), true))
            .collect();
        StreamRegistry {
            entries: streams,
            active: RwLock::new(active),
        }
    }

    pub fn is_active(&self, stream: &str) -> bool {
        self.active
            .read()
            .expect("stream registry lock poisoned")
            .get(stream)
            .copied()
            .unwrap_or(false)
    }

    pub fn pause(&self, stream: &str) {
        let mut active = self.active.write().expect("stream registry lock poisoned");
        if let Some(flag) = active.get_mut(stream) {
            *flag = false;
        }
    }

    pub fn resume(&self, stream: &str) {
        let mut active = self.active.write().expect("stream registry lock poisoned");
        if let Some(flag) = active.get_mut(stream) {
            *flag = true;
        }
    }

    /// All subscribed stream names, active or not, in subscription order.
    pub fn all_streams(&self) -> Vec<String> {
        self.entries.iter().map(|(stream, _)| stream.clone()).collect()
    }

    /// `(streams, offsets)` for the currently active subset, in subscription order,
    /// ready to hand to a `XREADGROUP STREAMS ... ...` call.
    pub fn active_view(&self) -> (Vec<String>, Vec<String>) {
        let active = self.active.read().expect("stream registry lock poisoned");
        let mut streams = Vec::new();
        let mut offsets = Vec::new();
        for (stream, offset) in &self.entries {
            if active.get(stream).copied().unwrap_or(false) {
                streams.push(stream.clone());
                offsets.push(if offset.is_empty() {
                    NEVER_DELIVERED_OFFSET.to_string()
                } else {
                    offset.clone()
                });
            }
        }
        (streams, offsets)
    }
}
