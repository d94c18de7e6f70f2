//! In-process message store used by tests.

use super::{Message, MessageStore, StoredMessage, Subscription};
use crate::error::{ParleyError, Result};
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tokio::sync::{broadcast, mpsc, oneshot, Notify};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    Opened(String),
    Closed(String),
}

#[derive(Default)]
struct Inner {
    rows: Vec<StoredMessage>,
    gates: HashMap<String, Arc<Notify>>,
    failing: HashSet<String>,
    dropping: HashSet<String>,
    channel_log: Vec<ChannelEvent>,
}

#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
    inserts: broadcast::Sender<StoredMessage>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        let (inserts, _) = broadcast::channel(256);
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
            inserts,
        }
    }

    /// Append a row and notify open channels. Ids and timestamps increase
    /// with insertion order.
    pub fn insert(&self, session_id: &str, message: Message) -> StoredMessage {
        let row = {
            let mut inner = self.inner.lock().unwrap();
            let n = inner.rows.len() as i64 + 1;
            let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
            let row = StoredMessage {
                id: Some(json!(n)),
                session_id: session_id.to_string(),
                message,
                created_at: Some(base + ChronoDuration::seconds(n)),
            };
            inner.rows.push(row.clone());
            row
        };
        let _ = self.inserts.send(row.clone());
        row
    }

    /// Push an event on open channels without storing it.
    pub fn emit(&self, row: StoredMessage) {
        let _ = self.inserts.send(row);
    }

    /// Make the next history fetch for `session_id` wait until the returned
    /// handle is notified.
    pub fn hold(&self, session_id: &str) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.inner
            .lock()
            .unwrap()
            .gates
            .insert(session_id.to_string(), gate.clone());
        gate
    }

    pub fn fail_fetches_for(&self, session_id: &str) {
        self.inner
            .lock()
            .unwrap()
            .failing
            .insert(session_id.to_string());
    }

    /// End the next channel opened for `session_id` right after it opens,
    /// as a dropped connection would.
    pub fn drop_next_channel(&self, session_id: &str) {
        self.inner
            .lock()
            .unwrap()
            .dropping
            .insert(session_id.to_string());
    }

    pub fn channel_log(&self) -> Vec<ChannelEvent> {
        self.inner.lock().unwrap().channel_log.clone()
    }

    pub fn open_channels(&self) -> usize {
        let log = self.channel_log();
        let opened = log
            .iter()
            .filter(|e| matches!(e, ChannelEvent::Opened(_)))
            .count();
        opened - (log.len() - opened)
    }
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn fetch_session(&self, session_id: &str) -> Result<Vec<StoredMessage>> {
        // Snapshot before waiting so a held fetch returns the state at call time.
        let (rows, gate, failing) = {
            let mut inner = self.inner.lock().unwrap();
            let rows: Vec<StoredMessage> = inner
                .rows
                .iter()
                .filter(|r| r.session_id == session_id)
                .cloned()
                .collect();
            (
                rows,
                inner.gates.remove(session_id),
                inner.failing.contains(session_id),
            )
        };

        if let Some(gate) = gate {
            gate.notified().await;
        }

        if failing {
            return Err(ParleyError::Store("connection reset".to_string()));
        }
        Ok(rows)
    }

    async fn fetch_all(&self) -> Result<Vec<StoredMessage>> {
        Ok(self.inner.lock().unwrap().rows.clone())
    }

    async fn subscribe(&self, session_id: &str) -> Result<Subscription> {
        let mut inserts = self.inserts.subscribe();
        let (rows_tx, rows_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
        let inner = self.inner.clone();
        let owner = session_id.to_string();

        let dropped = {
            let mut guard = inner.lock().unwrap();
            guard.channel_log.push(ChannelEvent::Opened(owner.clone()));
            guard.dropping.remove(&owner)
        };

        let task = tokio::spawn(async move {
            while !dropped {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    row = inserts.recv() => match row {
                        Ok(row) if row.session_id == owner => {
                            if rows_tx.send(row).is_err() {
                                break;
                            }
                        }
                        Ok(_) => {}
                        Err(broadcast::error::RecvError::Lagged(_)) => {}
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
            inner
                .lock()
                .unwrap()
                .channel_log
                .push(ChannelEvent::Closed(owner));
        });

        Ok(Subscription::new(session_id, rows_rx, shutdown_tx, task))
    }
}
