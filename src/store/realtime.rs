use super::{StoredMessage, Subscription};
use crate::api::utils::websocket_base;
use crate::auth::AuthHandle;
use crate::config::ParleyConfig;
use crate::error::{ParleyError, Result};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval_at, Instant};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;

const JOIN_TIMEOUT: Duration = Duration::from_secs(10);
const JOIN_REF: &str = "1";

/// Frame of the Phoenix channel protocol spoken by Supabase Realtime
#[derive(Debug, Clone, Serialize, Deserialize)]
struct PhoenixMessage {
    topic: String,
    event: String,
    #[serde(default)]
    payload: Value,
    #[serde(rename = "ref", default)]
    msg_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    join_ref: Option<String>,
}

impl PhoenixMessage {
    fn new(topic: &str, event: &str, payload: Value, msg_ref: u64) -> Self {
        Self {
            topic: topic.to_string(),
            event: event.to_string(),
            payload,
            msg_ref: Some(msg_ref.to_string()),
            join_ref: None,
        }
    }

    fn to_frame(&self) -> Result<WsMessage> {
        Ok(WsMessage::text(serde_json::to_string(self)?))
    }
}

/// Opens push channels that deliver inserts into the message table
#[derive(Clone)]
pub struct RealtimeClient {
    socket_url: String,
    schema: String,
    table: String,
    heartbeat_interval: Duration,
    auth: AuthHandle,
    anon_key: String,
}

impl RealtimeClient {
    pub fn new(config: &ParleyConfig, auth: AuthHandle) -> Result<Self> {
        let base = websocket_base(&config.supabase_url)?;
        Ok(Self {
            socket_url: format!(
                "{}/realtime/v1/websocket?apikey={}&vsn=1.0.0",
                base, config.supabase_anon_key
            ),
            schema: config.schema.clone(),
            table: config.messages_table.clone(),
            heartbeat_interval: config.heartbeat_interval,
            auth,
            anon_key: config.supabase_anon_key.clone(),
        })
    }

    fn topic(&self, session_id: &str) -> String {
        format!("realtime:{}:{}", self.table, session_id)
    }

    fn join_payload(&self, session_id: &str) -> Value {
        if !self.auth.is_authenticated() {
            tracing::debug!(session_id, "Joining channel with the anon key");
        }
        let access_token = self
            .auth
            .access_token()
            .unwrap_or_else(|| self.anon_key.clone());
        json!({
            "config": {
                "broadcast": {"ack": false, "self": false},
                "presence": {"key": ""},
                "postgres_changes": [{
                    "event": "INSERT",
                    "schema": self.schema,
                    "table": self.table,
                    "filter": format!("session_id=eq.{}", session_id),
                }],
                "private": false
            },
            "access_token": access_token
        })
    }

    /// Connect, join the filtered channel and wait for the server to confirm
    /// the join before returning.
    pub async fn subscribe(&self, session_id: &str) -> Result<Subscription> {
        let topic = self.topic(session_id);

        let (socket, _) = connect_async(self.socket_url.as_str())
            .await
            .map_err(|e| ParleyError::Realtime(format!("WebSocket connect failed: {}", e)))?;
        let (mut write, mut read) = socket.split();

        let mut join = PhoenixMessage::new(&topic, "phx_join", self.join_payload(session_id), 1);
        join.join_ref = Some(JOIN_REF.to_string());
        write
            .send(join.to_frame()?)
            .await
            .map_err(|e| ParleyError::Realtime(format!("Failed to join channel: {}", e)))?;

        tokio::time::timeout(JOIN_TIMEOUT, async {
            while let Some(frame) = read.next().await {
                let frame = frame
                    .map_err(|e| ParleyError::Realtime(format!("WebSocket error: {}", e)))?;
                let WsMessage::Text(text) = frame else {
                    continue;
                };
                let Ok(msg) = serde_json::from_str::<PhoenixMessage>(text.as_str()) else {
                    continue;
                };
                if msg.event == "phx_reply" && msg.msg_ref.as_deref() == Some(JOIN_REF) {
                    return match msg.payload.get("status").and_then(Value::as_str) {
                        Some("ok") => Ok(()),
                        _ => Err(ParleyError::Realtime(format!(
                            "Channel join rejected: {}",
                            msg.payload
                        ))),
                    };
                }
            }
            Err::<(), ParleyError>(ParleyError::Realtime(
                "Socket closed before join was confirmed".to_string(),
            ))
        })
        .await
        .map_err(|_| ParleyError::Realtime("Timed out joining channel".to_string()))??;

        tracing::debug!(session_id, topic = %topic, "Joined realtime channel");

        let (rows_tx, rows_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
        let period = self.heartbeat_interval;
        let owner = session_id.to_string();

        let task = tokio::spawn(async move {
            let mut heartbeat = interval_at(Instant::now() + period, period);
            let mut next_ref: u64 = 2;

            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => {
                        let leave = PhoenixMessage::new(&topic, "phx_leave", json!({}), next_ref);
                        if let Ok(frame) = leave.to_frame() {
                            let _ = write.send(frame).await;
                        }
                        let _ = write.close().await;
                        break;
                    }
                    _ = heartbeat.tick() => {
                        let beat = PhoenixMessage::new("phoenix", "heartbeat", json!({}), next_ref);
                        next_ref += 1;
                        let sent = match beat.to_frame() {
                            Ok(frame) => write.send(frame).await.is_ok(),
                            Err(_) => false,
                        };
                        if !sent {
                            tracing::warn!(session_id = %owner, "Heartbeat failed, channel lost");
                            break;
                        }
                    }
                    frame = read.next() => {
                        match frame {
                            Some(Ok(WsMessage::Text(text))) => {
                                match serde_json::from_str::<PhoenixMessage>(text.as_str()) {
                                    Ok(msg) if msg.topic == topic => {
                                        if matches!(msg.event.as_str(), "phx_error" | "phx_close") {
                                            tracing::warn!(session_id = %owner, event = %msg.event, "Channel closed by server");
                                            break;
                                        }
                                        if let Some(row) = parse_insert(&msg) {
                                            if rows_tx.send(row).is_err() {
                                                break;
                                            }
                                        }
                                    }
                                    Ok(_) => {}
                                    Err(e) => {
                                        tracing::debug!(error = %e, "Ignoring unparsable realtime frame");
                                    }
                                }
                            }
                            Some(Ok(WsMessage::Close(_))) | None => {
                                tracing::warn!(session_id = %owner, "Realtime socket closed");
                                break;
                            }
                            Some(Ok(_)) => {}
                            Some(Err(e)) => {
                                tracing::warn!(session_id = %owner, error = %e, "Realtime socket error");
                                break;
                            }
                        }
                    }
                }
            }
        });

        Ok(Subscription::new(session_id, rows_rx, shutdown_tx, task))
    }
}

/// Extract the inserted row from a change notification, if it is one.
fn parse_insert(msg: &PhoenixMessage) -> Option<StoredMessage> {
    let record = match msg.event.as_str() {
        "postgres_changes" => {
            let data = msg.payload.get("data")?;
            let kind = data
                .get("type")
                .or_else(|| data.get("eventType"))
                .and_then(Value::as_str);
            if kind.is_some_and(|k| k != "INSERT") {
                return None;
            }
            data.get("record").or_else(|| data.get("new"))?
        }
        "INSERT" => msg.payload.get("record")?,
        _ => return None,
    };

    match serde_json::from_value::<StoredMessage>(record.clone()) {
        Ok(row) => Some(row),
        Err(e) => {
            tracing::warn!(error = %e, "Inserted row has an unexpected shape");
            None
        }
    }
}
