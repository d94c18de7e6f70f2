use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Producer of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Human,
    Ai,
}

/// Body of a stored chat message, as kept in the `message` column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub content: String,
    #[serde(rename = "type")]
    pub message_type: MessageType,
}

impl Message {
    #[cfg(test)]
    pub fn human(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            message_type: MessageType::Human,
        }
    }

    #[cfg(test)]
    pub fn ai(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            message_type: MessageType::Ai,
        }
    }

    pub fn is_human(&self) -> bool {
        self.message_type == MessageType::Human
    }
}

/// One row of the message log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredMessage {
    /// Primary key, whatever its column type
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(default)]
    pub session_id: String,
    pub message: Message,
    #[serde(
        default,
        deserialize_with = "lenient_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub created_at: Option<DateTime<Utc>>,
}

/// Accept both RFC 3339 and Postgres' text rendering of `timestamptz`;
/// anything else becomes `None`.
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.and_then(|s| {
        DateTime::parse_from_rfc3339(&s)
            .or_else(|_| DateTime::parse_from_str(&s, "%Y-%m-%d %H:%M:%S%.f%#z"))
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
    }))
}

impl StoredMessage {
    #[cfg(test)]
    pub fn new(session_id: impl Into<String>, message: Message) -> Self {
        Self {
            id: None,
            session_id: session_id.into(),
            message,
            created_at: None,
        }
    }

    /// Whether two rows denote the same stored record.
    ///
    /// Rows with ids compare by id; otherwise by body and timestamp.
    pub fn same_row(&self, other: &StoredMessage) -> bool {
        match (&self.id, &other.id) {
            (Some(a), Some(b)) => a == b,
            _ => {
                self.session_id == other.session_id
                    && self.message == other.message
                    && self.created_at == other.created_at
            }
        }
    }
}

/// Entry of the conversation list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationSummary {
    pub session_id: String,
    pub title: String,
}
