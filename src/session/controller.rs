use super::history::HistoryLoader;
use super::live::{LiveEvent, LiveUpdates};
use super::state::{SessionState, StateChange};
use crate::api::{Dispatch, DispatchRequest};
use crate::error::{ParleyError, Result};
use crate::store::{MessageStore, StoredMessage};
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Completion of background work started by the controller
#[derive(Debug)]
pub enum SessionEvent {
    HistoryLoaded {
        generation: u64,
        session_id: String,
        result: Result<Vec<StoredMessage>>,
    },
    Inserted(StoredMessage),
    ChannelLost {
        session_id: String,
    },
    DispatchCompleted {
        request_id: String,
        result: Result<()>,
    },
}

/// Keeps the active session's message list in step with the message store.
///
/// All mutation happens on the task that calls [`ChatController::handle_event`];
/// background fetches and dispatches report back through [`SessionEvent`]s.
pub struct ChatController {
    state: SessionState,
    history: HistoryLoader,
    live: LiveUpdates,
    dispatcher: Arc<dyn Dispatch>,
    user_id: String,
    /// Bumped on every session change; history results carry the value
    /// current when they were requested.
    generation: u64,
    /// Inserts received while the history fetch is in flight
    backlog: Vec<StoredMessage>,
    events_tx: mpsc::UnboundedSender<SessionEvent>,
    events_rx: mpsc::UnboundedReceiver<SessionEvent>,
}

impl ChatController {
    pub fn new(
        store: Arc<dyn MessageStore>,
        dispatcher: Arc<dyn Dispatch>,
        user_id: String,
        title_max_chars: usize,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            state: SessionState::new(generate_session_id()),
            history: HistoryLoader::new(store.clone(), title_max_chars),
            live: LiveUpdates::new(store),
            dispatcher,
            user_id,
            generation: 0,
            backlog: Vec::new(),
            events_tx,
            events_rx,
        }
    }

    /// Load and subscribe to the initial session.
    pub async fn start(&mut self) -> Result<()> {
        let session_id = self.state.session_id().to_string();
        self.on_session_changed(None, session_id).await
    }

    pub fn observe(&mut self) -> mpsc::UnboundedReceiver<StateChange> {
        self.state.observe()
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn session_id(&self) -> &str {
        self.state.session_id()
    }

    pub fn history(&self) -> &HistoryLoader {
        &self.history
    }

    /// Switch the live channel and history to `new`. Closes the old channel
    /// before the new one is opened; history results of earlier sessions
    /// are ignored from here on.
    pub async fn on_session_changed(&mut self, old: Option<String>, new: String) -> Result<()> {
        self.generation += 1;
        self.backlog.clear();
        self.state.set_loading(true);

        tracing::debug!(
            old = old.as_deref().unwrap_or("-"),
            new = %new,
            generation = self.generation,
            "Session changed"
        );

        self.live.close().await;

        let loader = self.history.clone();
        let events = self.events_tx.clone();
        let generation = self.generation;
        let session_id = new.clone();
        tokio::spawn(async move {
            let result = loader.load(&session_id).await;
            let _ = events.send(SessionEvent::HistoryLoaded {
                generation,
                session_id,
                result,
            });
        });

        self.live.resubscribe(&new).await.map_err(|e| {
            tracing::error!(session_id = %new, error = %e, "Failed to open push channel");
            e
        })
    }

    /// Begin a new, empty conversation.
    pub async fn start_new_session(&mut self) -> Result<()> {
        let old = self.state.session_id().to_string();
        let new = generate_session_id();
        self.state.reset(new.clone());
        self.on_session_changed(Some(old), new).await
    }

    /// Show a previously seen conversation. The current messages stay on
    /// screen until its history arrives. Returns `false` if it is already
    /// active and live. Selecting the active session after its push channel
    /// was lost reconnects it and reloads its history.
    pub async fn select_session(&mut self, session_id: &str) -> Result<bool> {
        if session_id == self.state.session_id() {
            if self.live.is_open() {
                return Ok(false);
            }
            tracing::info!(session_id, "Reconnecting push channel");
            self.on_session_changed(Some(session_id.to_string()), session_id.to_string())
                .await?;
            return Ok(true);
        }

        let old = self.state.session_id().to_string();
        self.state.switch_to(session_id.to_string());
        self.on_session_changed(Some(old), session_id.to_string())
            .await?;
        Ok(true)
    }

    /// Dispatch a user message. Blank input is ignored and returns `None`;
    /// otherwise the request id is returned and the session is pending until
    /// the stored reply arrives or the dispatch fails.
    pub fn send(&mut self, text: &str) -> Option<String> {
        let query = text.trim();
        if query.is_empty() {
            return None;
        }

        let request_id = Uuid::new_v4().to_string();
        let request = DispatchRequest {
            query: query.to_string(),
            user_id: self.user_id.clone(),
            request_id: request_id.clone(),
            session_id: self.state.session_id().to_string(),
        };

        self.state.set_pending(true);

        let dispatcher = self.dispatcher.clone();
        let events = self.events_tx.clone();
        tokio::spawn(async move {
            let result = dispatcher.dispatch(&request).await;
            let _ = events.send(SessionEvent::DispatchCompleted {
                request_id: request.request_id,
                result,
            });
        });

        Some(request_id)
    }

    pub async fn next_event(&mut self) -> SessionEvent {
        tokio::select! {
            Some(event) = self.events_rx.recv() => event,
            live = self.live.recv() => match live {
                LiveEvent::Row(row) => SessionEvent::Inserted(row),
                LiveEvent::Lost(session_id) => SessionEvent::ChannelLost { session_id },
            },
        }
    }

    /// Apply a completed event to the session state. Returns the failure to
    /// show the user, if any.
    pub fn handle_event(&mut self, event: SessionEvent) -> Option<ParleyError> {
        match event {
            SessionEvent::HistoryLoaded {
                generation,
                session_id,
                result,
            } => {
                if generation != self.generation {
                    tracing::debug!(session_id = %session_id, generation, "Discarding stale history");
                    return None;
                }
                self.apply_history(&session_id, result);
                None
            }
            SessionEvent::Inserted(row) => {
                if row.session_id != self.state.session_id() {
                    tracing::debug!(
                        session_id = %row.session_id,
                        "Dropping insert for inactive session"
                    );
                    return None;
                }

                if self.state.is_loading() {
                    self.backlog.push(row);
                } else {
                    self.state.append(row);
                }
                self.state.set_pending(false);
                None
            }
            SessionEvent::ChannelLost { session_id } => {
                if session_id != self.state.session_id() {
                    return None;
                }
                tracing::warn!(session_id = %session_id, "Push channel lost");
                self.state.set_pending(false);
                Some(ParleyError::Realtime(
                    "Live updates stopped; /open this conversation again to reconnect".to_string(),
                ))
            }
            SessionEvent::DispatchCompleted { request_id, result } => match result {
                Ok(()) => {
                    tracing::debug!(request_id = %request_id, "Awaiting stored reply");
                    None
                }
                Err(e) => {
                    self.state.set_pending(false);
                    Some(e)
                }
            },
        }
    }

    fn apply_history(&mut self, session_id: &str, result: Result<Vec<StoredMessage>>) {
        let backlog = std::mem::take(&mut self.backlog);
        self.state.set_loading(false);

        match result {
            Ok(rows) => {
                let mut missing: Vec<StoredMessage> = Vec::new();
                for event in backlog {
                    let known = rows.iter().chain(missing.iter()).any(|row| row.same_row(&event));
                    if !known {
                        missing.push(event);
                    }
                }
                tracing::debug!(
                    session_id,
                    count = rows.len(),
                    late = missing.len(),
                    "History loaded"
                );
                self.state.replace_all(rows);
                for row in missing {
                    self.state.append(row);
                }
            }
            Err(e) => {
                tracing::error!(session_id, error = %e, "Error fetching messages");
                for row in backlog {
                    self.state.append(row);
                }
            }
        }
    }

    /// Close the push channel and ignore any history still in flight, e.g.
    /// when leaving the chat view.
    pub async fn stop(&mut self) {
        self.generation += 1;
        self.backlog.clear();
        self.state.set_loading(false);
        self.live.close().await;
    }

    pub async fn shutdown(mut self) {
        self.stop().await;
        tracing::debug!("Chat controller shut down");
    }
}

pub fn generate_session_id() -> String {
    Uuid::new_v4().to_string()
}
