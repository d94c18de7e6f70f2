use crate::store::StoredMessage;
use tokio::sync::mpsc;

/// Notification emitted after every mutation of [`SessionState`]
#[derive(Debug, Clone, PartialEq)]
pub enum StateChange {
    /// New session id, message list cleared
    Reset { session_id: String },
    /// New session id, message list kept until the history arrives
    Switched { session_id: String },
    /// Whole message list replaced
    Replaced,
    Appended(StoredMessage),
    Pending(bool),
    Loading(bool),
}

/// In-memory view of the active chat session.
///
/// Performs no validation; the controller is trusted to call it correctly.
pub struct SessionState {
    session_id: String,
    messages: Vec<StoredMessage>,
    pending: bool,
    loading: bool,
    observer: Option<mpsc::UnboundedSender<StateChange>>,
}

impl SessionState {
    pub fn new(session_id: String) -> Self {
        Self {
            session_id,
            messages: Vec::new(),
            pending: false,
            loading: false,
            observer: None,
        }
    }

    /// Register the single observer of this state, replacing any previous one.
    pub fn observe(&mut self) -> mpsc::UnboundedReceiver<StateChange> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.observer = Some(tx);
        rx
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn messages(&self) -> &[StoredMessage] {
        &self.messages
    }

    pub fn is_pending(&self) -> bool {
        self.pending
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn replace_all(&mut self, messages: Vec<StoredMessage>) {
        self.messages = messages;
        self.notify(StateChange::Replaced);
    }

    pub fn append(&mut self, message: StoredMessage) {
        self.messages.push(message.clone());
        self.notify(StateChange::Appended(message));
    }

    pub fn set_pending(&mut self, pending: bool) {
        if self.pending != pending {
            self.pending = pending;
            self.notify(StateChange::Pending(pending));
        }
    }

    pub fn set_loading(&mut self, loading: bool) {
        if self.loading != loading {
            self.loading = loading;
            self.notify(StateChange::Loading(loading));
        }
    }

    /// Start over with a fresh session: no messages, nothing pending.
    pub fn reset(&mut self, new_session_id: String) {
        self.session_id = new_session_id.clone();
        self.messages.clear();
        self.pending = false;
        self.notify(StateChange::Reset {
            session_id: new_session_id,
        });
    }

    /// Point at another session without clearing the displayed messages.
    pub fn switch_to(&mut self, session_id: String) {
        self.session_id = session_id.clone();
        self.notify(StateChange::Switched { session_id });
    }

    fn notify(&mut self, change: StateChange) {
        if let Some(observer) = &self.observer {
            if observer.send(change).is_err() {
                self.observer = None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Message;

    fn row(content: &str) -> StoredMessage {
        StoredMessage::new("s1", Message::human(content))
    }

    #[test]
    fn test_mutations_notify_observer() {
        let mut state = SessionState::new("s1".to_string());
        let mut changes = state.observe();

        state.replace_all(vec![row("a")]);
        state.append(row("b"));
        state.set_pending(true);
        state.set_pending(true);

        assert_eq!(changes.try_recv().unwrap(), StateChange::Replaced);
        assert_eq!(changes.try_recv().unwrap(), StateChange::Appended(row("b")));
        assert_eq!(changes.try_recv().unwrap(), StateChange::Pending(true));
        assert!(changes.try_recv().is_err(), "unchanged flag must not notify");
        assert_eq!(state.messages().len(), 2);
    }

    #[test]
    fn test_reset_clears_messages_and_pending() {
        let mut state = SessionState::new("s1".to_string());
        state.append(row("a"));
        state.set_pending(true);

        state.reset("s2".to_string());

        assert_eq!(state.session_id(), "s2");
        assert!(state.messages().is_empty());
        assert!(!state.is_pending());
    }

    #[test]
    fn test_switch_keeps_messages() {
        let mut state = SessionState::new("s1".to_string());
        state.append(row("a"));

        state.switch_to("s2".to_string());

        assert_eq!(state.session_id(), "s2");
        assert_eq!(state.messages().len(), 1);
    }

    #[test]
    fn test_dropped_observer_is_forgotten() {
        let mut state = SessionState::new("s1".to_string());
        drop(state.observe());
        state.append(row("a"));
        assert!(state.observer.is_none());
    }
}
