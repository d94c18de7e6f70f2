use super::{AuthProvider, AuthSession, AuthUser};
use crate::error::{ParleyError, Result};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

#[derive(Serialize)]
struct PasswordCredentials<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct RefreshGrant<'a> {
    refresh_token: &'a str,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    expires_at: Option<i64>,
    user: AuthUser,
}

impl From<TokenResponse> for AuthSession {
    fn from(token: TokenResponse) -> Self {
        let expires_at = token
            .expires_at
            .or_else(|| token.expires_in.map(|secs| Utc::now().timestamp() + secs));
        Self {
            access_token: token.access_token,
            refresh_token: token.refresh_token,
            expires_at,
            user: token.user,
        }
    }
}

/// Client for the GoTrue auth API of a Supabase project
#[derive(Clone)]
pub struct AuthClient {
    client: reqwest::Client,
    base_url: String,
}

impl AuthClient {
    pub fn new(supabase_url: &str, anon_key: &str, timeout: Duration) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "apikey",
            HeaderValue::from_str(anon_key)
                .map_err(|e| ParleyError::Config(format!("Invalid anon key format: {}", e)))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| ParleyError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: format!("{}/auth/v1", supabase_url.trim_end_matches('/')),
        })
    }

    async fn token_grant<T: Serialize + ?Sized>(&self, grant: &str, body: &T) -> Result<AuthSession> {
        let url = format!("{}/token?grant_type={}", self.base_url, grant);
        let response = self.client.post(&url).json(body).send().await?;
        let response = check_auth_response(response).await?;
        let token = response.json::<TokenResponse>().await?;
        Ok(token.into())
    }
}

#[async_trait]
impl AuthProvider for AuthClient {
    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<AuthSession> {
        self.token_grant("password", &PasswordCredentials { email, password })
            .await
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<Option<AuthSession>> {
        let url = format!("{}/signup", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&PasswordCredentials { email, password })
            .send()
            .await?;
        let response = check_auth_response(response).await?;
        let body: Value = response.json().await?;

        // Projects that require email confirmation answer with a bare user.
        if body.get("access_token").is_some() {
            let token: TokenResponse = serde_json::from_value(body)?;
            Ok(Some(token.into()))
        } else {
            Ok(None)
        }
    }

    async fn refresh_session(&self, refresh_token: &str) -> Result<AuthSession> {
        self.token_grant("refresh_token", &RefreshGrant { refresh_token })
            .await
    }

    async fn get_user(&self, access_token: &str) -> Result<AuthUser> {
        let url = format!("{}/user", self.base_url);
        let response = self
            .client
            .get(&url)
            .bearer_auth(access_token)
            .send()
            .await?;
        let response = check_auth_response(response).await?;
        Ok(response.json::<AuthUser>().await?)
    }

    async fn sign_out(&self, access_token: &str) -> Result<()> {
        let url = format!("{}/logout", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(access_token)
            .send()
            .await?;
        check_auth_response(response).await?;
        Ok(())
    }
}

/// Map GoTrue error bodies to [`ParleyError::Auth`].
async fn check_auth_response(response: reqwest::Response) -> Result<reqwest::Response> {
    if response.status().is_success() {
        return Ok(response);
    }

    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<Value>(&body)
        .ok()
        .and_then(|v| {
            ["error_description", "msg", "message", "error"]
                .iter()
                .find_map(|key| v.get(*key).and_then(|m| m.as_str()).map(str::to_string))
        })
        .unwrap_or(body);

    tracing::warn!(status = %status, error = %message, "Auth request failed");
    Err(ParleyError::Auth(message))
}
