use std::sync::Arc;

use crate::broker::BrokerAdapter;
use crate::error::GroupStreamResult;

/// `XGROUP CREATE`/`XGROUP DESTROY` wrapper. An external collaborator from the
/// consumer engine's perspective — group lifecycle is an operational concern,
/// not something the read/claim loop manages for itself.
pub struct Admin {
    broker: Arc<dyn BrokerAdapter>,
}

impl Admin {
    pub fn new(broker: Arc<dyn BrokerAdapter>) -> Self {
        Admin { broker }
    }

    /// Create `group` on `stream`, starting from `start_id` (`"$"` for
    /// "only new entries from here on", `"0"` to replay the whole stream).
    /// Idempotent: an already-existing group is not an error.
    pub async fn create_group(&self, stream: &str, group: &str, start_id: &str) -> GroupStreamResult<()> {
        self.broker.create_group(stream, group, start_id).await
    }

    pub async fn destroy_group(&self, stream: &str, group: &str) -> GroupStreamResult<()> {
        self.broker.destroy_group(stream, group).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::{PendingEntry, StreamMessage};
    use async_trait::async_trait;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    struct RecordingBroker {
        groups_created: Mutex<Vec<(String, String, String)>>,
        groups_destroyed: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl BrokerAdapter for RecordingBroker {
        async fn ping(&self) -> GroupStreamResult<()> {
            Ok(())
        }
        async fn read_group(
            &self,
            _: &str,
            _: &str,
            _: usize,
            _: u64,
            _: &[String],
            _: &[String],
        ) -> GroupStreamResult<Vec<(String, Vec<StreamMessage>)>> {
            Ok(Vec::new())
        }
        async fn pending(&self, _: &str, _: &str, _: usize) -> GroupStreamResult<Vec<PendingEntry>> {
            Ok(Vec::new())
        }
        async fn claim(
            &self,
            _: &str,
            _: &str,
            _: &str,
            _: u64,
            _: &[String],
        ) -> GroupStreamResult<Vec<StreamMessage>> {
            Ok(Vec::new())
        }
        async fn entry_exists(&self, _: &str, _: &str) -> GroupStreamResult<bool> {
            Ok(true)
        }
        async fn ack(&self, _: &str, _: &str, _: &[String]) -> GroupStreamResult<()> {
            Ok(())
        }
        async fn del(&self, _: &str, _: &[String]) -> GroupStreamResult<()> {
            Ok(())
        }
        async fn add(&self, _: &str, _: &str, _: &BTreeMap<String, String>) -> GroupStreamResult<String> {
            Ok("1-0".to_string())
        }
        async fn create_group(&self, stream: &str, group: &str, start_id: &str) -> GroupStreamResult<()> {
            self.groups_created
                .lock()
                .unwrap()
                .push((stream.to_string(), group.to_string(), start_id.to_string()));
            Ok(())
        }
        async fn destroy_group(&self, stream: &str, group: &str) -> GroupStreamResult<()> {
            self.groups_destroyed
                .lock()
                .unwrap()
                .push((stream.to_string(), group.to_string()));
            Ok(())
        }
    }

    #[tokio::test]
    async fn create_and_destroy_delegate_to_broker() {
        let broker = Arc::new(RecordingBroker {
            groups_created: Mutex::new(Vec::new()),
            groups_destroyed: Mutex::new(Vec::new()),
        });
        let admin = Admin::new(broker.clone());

        admin.create_group("orders", "workers", "$").await.unwrap();
        admin.destroy_group("orders", "workers").await.unwrap();

        assert_eq!(
            *broker.groups_created.lock().unwrap(),
            vec![("orders".to_string(), "workers".to_string(), "$".to_string())]
        );
        assert_eq!(
            *broker.groups_destroyed.lock().unwrap(),
            vec![("orders".to_string(), "workers".to_string())]
        );
    }
}
