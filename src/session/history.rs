use crate::error::{ParleyError, Result};
use crate::store::{ConversationSummary, MessageStore, StoredMessage};
use std::collections::HashSet;
use std::sync::Arc;

/// Reads conversation history from the message store
#[derive(Clone)]
pub struct HistoryLoader {
    store: Arc<dyn MessageStore>,
    title_max_chars: usize,
}

impl HistoryLoader {
    pub fn new(store: Arc<dyn MessageStore>, title_max_chars: usize) -> Self {
        Self {
            store,
            title_max_chars,
        }
    }

    /// Full history of one session, oldest first.
    pub async fn load(&self, session_id: &str) -> Result<Vec<StoredMessage>> {
        self.store
            .fetch_session(session_id)
            .await
            .map_err(|e| ParleyError::HistoryFetchFailed(e.to_string()))
    }

    /// One entry per session that has a human message, titled with the
    /// earliest one.
    pub async fn list_conversations(&self) -> Result<Vec<ConversationSummary>> {
        let rows = self.store.fetch_all().await?;
        Ok(summarize(&rows, self.title_max_chars))
    }
}

/// Group rows (oldest first) by session, keeping each session's first human
/// message as its title. Sessions without a human message are left out.
pub fn summarize(rows: &[StoredMessage], title_max_chars: usize) -> Vec<ConversationSummary> {
    let mut seen = HashSet::new();
    let mut summaries = Vec::new();

    for row in rows {
        if !row.message.is_human() || seen.contains(row.session_id.as_str()) {
            continue;
        }
        seen.insert(row.session_id.as_str());
        summaries.push(ConversationSummary {
            session_id: row.session_id.clone(),
            title: truncate_title(&row.message.content, title_max_chars),
        });
    }

    summaries
}

fn truncate_title(content: &str, max_chars: usize) -> String {
    match content.char_indices().nth(max_chars) {
        Some((end, _)) => content[..end].to_string(),
        None => content.to_string(),
    }
}
