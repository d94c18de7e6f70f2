#[cfg(test)]
pub mod memory;
pub mod realtime;
pub mod rest;
pub mod types;

pub use realtime::RealtimeClient;
pub use rest::SupabaseStore;
pub use types::*;

use crate::error::Result;
use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Persistent, queryable, subscribable log of chat messages keyed by session.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// All rows of one session, oldest first.
    async fn fetch_session(&self, session_id: &str) -> Result<Vec<StoredMessage>>;

    /// Every row of every session, oldest first.
    async fn fetch_all(&self) -> Result<Vec<StoredMessage>>;

    /// Open a push channel delivering rows inserted for `session_id`.
    async fn subscribe(&self, session_id: &str) -> Result<Subscription>;
}

/// Receiving end of one push channel.
///
/// Dropping a subscription aborts its background task; [`Subscription::close`]
/// shuts it down cleanly and waits for it to finish.
pub struct Subscription {
    session_id: String,
    rows: mpsc::UnboundedReceiver<StoredMessage>,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    pub fn new(
        session_id: impl Into<String>,
        rows: mpsc::UnboundedReceiver<StoredMessage>,
        shutdown: oneshot::Sender<()>,
        task: JoinHandle<()>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            rows,
            shutdown: Some(shutdown),
            task: Some(task),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub async fn recv(&mut self) -> Option<StoredMessage> {
        self.rows.recv().await
    }

    /// Stop delivery. No row is received through this subscription afterwards.
    pub async fn close(mut self) {
        self.rows.close();

        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }

        if let Some(mut task) = self.task.take() {
            if tokio::time::timeout(CLOSE_TIMEOUT, &mut task).await.is_err() {
                tracing::warn!(
                    session_id = %self.session_id,
                    "Push channel did not shut down in time, aborting"
                );
                task.abort();
            }
        }

        tracing::debug!(session_id = %self.session_id, "Push channel closed");
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
