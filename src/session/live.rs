use crate::error::Result;
use crate::store::{MessageStore, StoredMessage, Subscription};
use std::sync::Arc;

#[derive(Debug)]
pub enum LiveEvent {
    Row(StoredMessage),
    /// The channel for this session ended on its own
    Lost(String),
}

/// Owns the one push channel of the active session.
pub struct LiveUpdates {
    store: Arc<dyn MessageStore>,
    current: Option<Subscription>,
}

impl LiveUpdates {
    pub fn new(store: Arc<dyn MessageStore>) -> Self {
        Self {
            store,
            current: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.current.is_some()
    }

    /// Close the current channel, then open one for `session_id`.
    pub async fn resubscribe(&mut self, session_id: &str) -> Result<()> {
        self.close().await;
        let subscription = self.store.subscribe(session_id).await?;
        tracing::debug!(session_id, "Listening for new messages");
        self.current = Some(subscription);
        Ok(())
    }

    pub async fn close(&mut self) {
        if let Some(subscription) = self.current.take() {
            subscription.close().await;
        }
    }

    /// Next event of the current channel. Waits forever while no channel is open.
    pub async fn recv(&mut self) -> LiveEvent {
        let Some(subscription) = self.current.as_mut() else {
            return std::future::pending().await;
        };

        match subscription.recv().await {
            Some(row) => LiveEvent::Row(row),
            None => {
                let session_id = subscription.session_id().to_string();
                self.current = None;
                LiveEvent::Lost(session_id)
            }
        }
    }
}
