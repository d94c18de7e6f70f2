use super::{MessageStore, RealtimeClient, StoredMessage, Subscription};
use crate::api::utils::check_response_status;
use crate::auth::AuthHandle;
use crate::config::ParleyConfig;
use crate::error::{ParleyError, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use reqwest::Url;

const SERVICE_NAME: &str = "Message store";

/// Message store backed by a Supabase project: PostgREST for queries and the
/// Realtime socket for inserts.
pub struct SupabaseStore {
    client: reqwest::Client,
    rest_url: String,
    table: String,
    schema: String,
    anon_key: String,
    auth: AuthHandle,
    realtime: RealtimeClient,
}

impl SupabaseStore {
    pub fn new(config: &ParleyConfig, auth: AuthHandle) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "apikey",
            HeaderValue::from_str(&config.supabase_anon_key)
                .map_err(|e| ParleyError::Config(format!("Invalid anon key format: {}", e)))?,
        );
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(
            "Accept-Profile",
            HeaderValue::from_str(&config.schema)
                .map_err(|e| ParleyError::Config(format!("Invalid schema name: {}", e)))?,
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ParleyError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            rest_url: format!("{}/rest/v1", config.supabase_url.trim_end_matches('/')),
            table: config.messages_table.clone(),
            schema: config.schema.clone(),
            anon_key: config.supabase_anon_key.clone(),
            realtime: RealtimeClient::new(config, auth.clone())?,
            auth,
        })
    }

    fn bearer(&self) -> String {
        self.auth
            .access_token()
            .unwrap_or_else(|| self.anon_key.clone())
    }

    fn rows_url(&self, filters: &[(&str, String)]) -> Result<Url> {
        let mut params = vec![
            ("select", "*".to_string()),
            ("order", "created_at.asc".to_string()),
        ];
        params.extend(filters.iter().map(|(k, v)| (*k, v.clone())));

        Url::parse_with_params(&format!("{}/{}", self.rest_url, self.table), &params)
            .map_err(|e| ParleyError::Config(format!("Invalid Supabase URL: {}", e)))
    }

    async fn get_rows(&self, url: Url) -> Result<Vec<StoredMessage>> {
        let response = self
            .client
            .get(url)
            .bearer_auth(self.bearer())
            .send()
            .await?;
        let response = check_response_status(SERVICE_NAME, response).await?;
        Ok(response.json::<Vec<StoredMessage>>().await?)
    }
}

#[async_trait]
impl MessageStore for SupabaseStore {
    async fn fetch_session(&self, session_id: &str) -> Result<Vec<StoredMessage>> {
        let url = self.rows_url(&[("session_id", format!("eq.{}", session_id))])?;
        let rows = self.get_rows(url).await?;
        tracing::debug!(
            session_id,
            schema = %self.schema,
            count = rows.len(),
            "Fetched session history"
        );
        Ok(rows)
    }

    async fn fetch_all(&self) -> Result<Vec<StoredMessage>> {
        let url = self.rows_url(&[])?;
        self.get_rows(url).await
    }

    async fn subscribe(&self, session_id: &str) -> Result<Subscription> {
        self.realtime.subscribe(session_id).await
    }
}
