use super::controller::SessionEvent;
use super::*;
use crate::api::{Dispatch, DispatchRequest};
use crate::error::{ParleyError, Result};
use crate::store::memory::{ChannelEvent, MemoryStore};
use crate::store::{Message, StoredMessage};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Stands in for the inference service, which stores both sides of the
/// exchange itself.
#[derive(Default)]
struct FakeAgent {
    store: Option<MemoryStore>,
    fail: bool,
    calls: Mutex<Vec<DispatchRequest>>,
}

impl FakeAgent {
    fn echoing(store: &MemoryStore) -> Self {
        Self {
            store: Some(store.clone()),
            ..Default::default()
        }
    }

    fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    fn calls(&self) -> Vec<DispatchRequest> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Dispatch for FakeAgent {
    async fn dispatch(&self, request: &DispatchRequest) -> Result<()> {
        self.calls.lock().unwrap().push(request.clone());
        if self.fail {
            return Err(ParleyError::DispatchFailed("Request failed".to_string()));
        }
        if let Some(store) = &self.store {
            store.insert(&request.session_id, Message::human(request.query.clone()));
            store.insert(&request.session_id, Message::ai(format!("echo: {}", request.query)));
        }
        Ok(())
    }
}

fn controller(store: &MemoryStore, agent: Arc<FakeAgent>) -> ChatController {
    ChatController::new(Arc::new(store.clone()), agent, "NA".to_string(), 100)
}

/// Apply events until the controller has been idle for a moment.
async fn settle(ctrl: &mut ChatController) -> Vec<ParleyError> {
    let mut notices = Vec::new();
    while let Ok(event) = tokio::time::timeout(Duration::from_millis(100), ctrl.next_event()).await
    {
        if let Some(notice) = ctrl.handle_event(event) {
            notices.push(notice);
        }
    }
    notices
}

fn contents(ctrl: &ChatController) -> Vec<String> {
    ctrl.state()
        .messages()
        .iter()
        .map(|row| row.message.content.clone())
        .collect()
}

#[tokio::test]
async fn test_history_then_inserts_in_delivery_order() {
    let store = MemoryStore::new();
    store.insert("s1", Message::human("one"));
    store.insert("s1", Message::ai("two"));
    store.insert("other", Message::human("elsewhere"));

    let mut ctrl = controller(&store, Arc::new(FakeAgent::default()));
    ctrl.start().await.unwrap();
    assert!(ctrl.select_session("s1").await.unwrap());
    settle(&mut ctrl).await;
    assert_eq!(contents(&ctrl), vec!["one", "two"]);

    store.insert("s1", Message::human("three"));
    store.insert("s1", Message::ai("four"));
    store.insert("s1", Message::human("five"));
    settle(&mut ctrl).await;

    assert_eq!(contents(&ctrl), vec!["one", "two", "three", "four", "five"]);
}

#[tokio::test]
async fn test_stale_history_is_discarded() {
    let store = MemoryStore::new();
    store.insert("a", Message::human("from a"));
    store.insert("b", Message::human("from b"));

    let mut ctrl = controller(&store, Arc::new(FakeAgent::default()));
    ctrl.start().await.unwrap();
    settle(&mut ctrl).await;

    let gate = store.hold("a");
    ctrl.select_session("a").await.unwrap();
    ctrl.select_session("b").await.unwrap();
    settle(&mut ctrl).await;
    assert_eq!(contents(&ctrl), vec!["from b"]);

    gate.notify_one();
    settle(&mut ctrl).await;

    assert_eq!(ctrl.session_id(), "b");
    assert_eq!(contents(&ctrl), vec!["from b"]);
}

#[tokio::test]
async fn test_pending_until_stored_reply() {
    let store = MemoryStore::new();
    let mut ctrl = controller(&store, Arc::new(FakeAgent::default()));
    ctrl.start().await.unwrap();
    settle(&mut ctrl).await;

    assert!(ctrl.send("hello").is_some());
    assert!(ctrl.state().is_pending());

    settle(&mut ctrl).await;
    assert!(ctrl.state().is_pending(), "dispatch success alone keeps pending");

    let session_id = ctrl.session_id().to_string();
    store.insert(&session_id, Message::ai("reply"));
    settle(&mut ctrl).await;

    assert!(!ctrl.state().is_pending());
    assert_eq!(contents(&ctrl), vec!["reply"]);
}

#[tokio::test]
async fn test_echoed_exchange_is_rendered() {
    let store = MemoryStore::new();
    let agent = Arc::new(FakeAgent::echoing(&store));
    let mut ctrl = controller(&store, agent.clone());
    ctrl.start().await.unwrap();
    settle(&mut ctrl).await;

    ctrl.send("  what is rust?  ").unwrap();
    settle(&mut ctrl).await;

    let calls = agent.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].query, "what is rust?");
    assert_eq!(calls[0].user_id, "NA");
    assert_eq!(calls[0].session_id, ctrl.session_id());
    assert_eq!(contents(&ctrl), vec!["what is rust?", "echo: what is rust?"]);
    assert!(!ctrl.state().is_pending());
}

#[tokio::test]
async fn test_failed_dispatch_clears_pending_and_notifies() {
    let store = MemoryStore::new();
    let mut ctrl = controller(&store, Arc::new(FakeAgent::failing()));
    ctrl.start().await.unwrap();
    settle(&mut ctrl).await;

    ctrl.send("hello").unwrap();
    assert!(ctrl.state().is_pending());

    let notices = settle(&mut ctrl).await;
    assert!(!ctrl.state().is_pending());
    assert_eq!(notices.len(), 1);
    assert!(matches!(notices[0], ParleyError::DispatchFailed(_)));
}

#[tokio::test]
async fn test_blank_input_is_not_dispatched() {
    let store = MemoryStore::new();
    let agent = Arc::new(FakeAgent::default());
    let mut ctrl = controller(&store, agent.clone());
    ctrl.start().await.unwrap();

    assert!(ctrl.send("").is_none());
    assert!(ctrl.send("   \n\t ").is_none());
    settle(&mut ctrl).await;

    assert!(agent.calls().is_empty());
    assert!(!ctrl.state().is_pending());
}

#[tokio::test]
async fn test_request_ids_are_fresh_per_send() {
    let store = MemoryStore::new();
    let mut ctrl = controller(&store, Arc::new(FakeAgent::default()));
    ctrl.start().await.unwrap();

    let first = ctrl.send("a").unwrap();
    let second = ctrl.send("b").unwrap();
    assert_ne!(first, second);
}

#[tokio::test]
async fn test_old_channel_closed_before_new_opens() {
    let store = MemoryStore::new();
    let mut ctrl = controller(&store, Arc::new(FakeAgent::default()));
    ctrl.start().await.unwrap();
    let first = ctrl.session_id().to_string();

    ctrl.select_session("b").await.unwrap();
    settle(&mut ctrl).await;

    assert_eq!(
        store.channel_log(),
        vec![
            ChannelEvent::Opened(first.clone()),
            ChannelEvent::Closed(first.clone()),
            ChannelEvent::Opened("b".to_string()),
        ]
    );
    assert_eq!(store.open_channels(), 1);

    store.insert(&first, Message::ai("late reply for the old session"));
    settle(&mut ctrl).await;
    assert!(ctrl.state().messages().is_empty());
}

#[tokio::test]
async fn test_insert_for_inactive_session_is_dropped() {
    let store = MemoryStore::new();
    let mut ctrl = controller(&store, Arc::new(FakeAgent::default()));
    ctrl.start().await.unwrap();
    ctrl.select_session("b").await.unwrap();
    settle(&mut ctrl).await;

    let stray = StoredMessage::new("a", Message::ai("crossed wires"));
    assert!(ctrl.handle_event(SessionEvent::Inserted(stray)).is_none());
    assert!(ctrl.state().messages().is_empty());
}

#[tokio::test]
async fn test_inserts_during_history_fetch_are_kept_once() {
    let store = MemoryStore::new();
    store.insert("b", Message::human("before"));

    let mut ctrl = controller(&store, Arc::new(FakeAgent::default()));
    ctrl.start().await.unwrap();
    settle(&mut ctrl).await;

    let gate = store.hold("b");
    ctrl.select_session("b").await.unwrap();
    let late = store.insert("b", Message::ai("during"));
    // Delivered again by the channel after it is already part of the log.
    store.emit(late);
    settle(&mut ctrl).await;
    assert!(ctrl.state().is_loading());

    gate.notify_one();
    settle(&mut ctrl).await;

    assert!(!ctrl.state().is_loading());
    assert_eq!(contents(&ctrl), vec!["before", "during"]);
}

#[tokio::test]
async fn test_failed_history_keeps_messages() {
    let store = MemoryStore::new();
    store.insert("a", Message::human("kept"));
    store.fail_fetches_for("b");

    let mut ctrl = controller(&store, Arc::new(FakeAgent::default()));
    ctrl.start().await.unwrap();
    ctrl.select_session("a").await.unwrap();
    settle(&mut ctrl).await;

    ctrl.select_session("b").await.unwrap();
    let notices = settle(&mut ctrl).await;

    assert!(notices.is_empty(), "history failures are not shown");
    assert_eq!(ctrl.session_id(), "b");
    assert_eq!(contents(&ctrl), vec!["kept"]);
}

#[tokio::test]
async fn test_new_session_clears_state() {
    let store = MemoryStore::new();
    store.insert("a", Message::human("hello"));

    let mut ctrl = controller(&store, Arc::new(FakeAgent::default()));
    ctrl.start().await.unwrap();
    ctrl.select_session("a").await.unwrap();
    settle(&mut ctrl).await;
    ctrl.send("pending question").unwrap();

    ctrl.start_new_session().await.unwrap();

    assert_ne!(ctrl.session_id(), "a");
    assert!(ctrl.state().messages().is_empty());
    assert!(!ctrl.state().is_pending());
    assert!(uuid::Uuid::parse_str(ctrl.session_id()).is_ok());
}

#[tokio::test]
async fn test_selecting_active_session_is_a_no_op() {
    let store = MemoryStore::new();
    let mut ctrl = controller(&store, Arc::new(FakeAgent::default()));
    ctrl.start().await.unwrap();
    let current = ctrl.session_id().to_string();

    assert!(!ctrl.select_session(&current).await.unwrap());
    assert_eq!(store.channel_log().len(), 1);
}

#[tokio::test]
async fn test_observer_sees_replace_then_appends() {
    let store = MemoryStore::new();
    store.insert("a", Message::human("hi"));

    let mut ctrl = controller(&store, Arc::new(FakeAgent::default()));
    let mut changes = ctrl.observe();
    ctrl.start().await.unwrap();
    ctrl.select_session("a").await.unwrap();
    settle(&mut ctrl).await;
    store.insert("a", Message::ai("hello"));
    settle(&mut ctrl).await;

    let mut seen = Vec::new();
    while let Ok(change) = changes.try_recv() {
        seen.push(change);
    }

    assert!(seen.contains(&StateChange::Switched {
        session_id: "a".to_string()
    }));
    let replaced = seen
        .iter()
        .rposition(|c| *c == StateChange::Replaced)
        .unwrap();
    match seen.last() {
        Some(StateChange::Appended(row)) => assert_eq!(row.message.content, "hello"),
        other => panic!("expected an append last, got {other:?}"),
    }
    assert!(replaced < seen.len() - 1);
}

#[tokio::test]
async fn test_stop_closes_channel_and_ignores_history() {
    let store = MemoryStore::new();
    store.insert("a", Message::human("late"));

    let mut ctrl = controller(&store, Arc::new(FakeAgent::default()));
    ctrl.start().await.unwrap();
    settle(&mut ctrl).await;

    let gate = store.hold("a");
    ctrl.select_session("a").await.unwrap();
    ctrl.stop().await;
    gate.notify_one();
    settle(&mut ctrl).await;

    assert_eq!(store.open_channels(), 0);
    assert!(ctrl.state().messages().is_empty());
    assert!(!ctrl.state().is_loading());
}

#[tokio::test]
async fn test_reopening_session_after_channel_loss_reconnects() {
    let store = MemoryStore::new();
    let mut ctrl = controller(&store, Arc::new(FakeAgent::default()));
    ctrl.start().await.unwrap();
    settle(&mut ctrl).await;

    store.drop_next_channel("a");
    ctrl.select_session("a").await.unwrap();
    let notices = settle(&mut ctrl).await;
    assert!(matches!(notices.as_slice(), [ParleyError::Realtime(_)]));

    assert!(ctrl.select_session("a").await.unwrap());
    settle(&mut ctrl).await;

    let opened = store
        .channel_log()
        .into_iter()
        .filter(|e| *e == ChannelEvent::Opened("a".to_string()))
        .count();
    assert_eq!(opened, 2);
    assert_eq!(store.open_channels(), 1);

    store.insert("a", Message::ai("back online"));
    settle(&mut ctrl).await;
    assert_eq!(contents(&ctrl), vec!["back online"]);

    assert!(!ctrl.select_session("a").await.unwrap());
}
