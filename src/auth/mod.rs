pub mod client;
pub mod state;

pub use client::AuthClient;
pub use state::{AuthHandle, AuthState};

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// A signed-in session as issued by the auth provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthSession {
    pub access_token: String,
    pub refresh_token: String,
    /// Unix timestamp (seconds) at which `access_token` expires
    #[serde(default)]
    pub expires_at: Option<i64>,
    pub user: AuthUser,
}

impl AuthSession {
    /// Tokens within `leeway_secs` of expiry count as expired.
    pub fn is_expired(&self, now: i64, leeway_secs: i64) -> bool {
        self.expires_at.is_some_and(|at| at <= now + leeway_secs)
    }
}

#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<AuthSession>;

    /// `None` when the account still has to be confirmed by email.
    async fn sign_up(&self, email: &str, password: &str) -> Result<Option<AuthSession>>;

    async fn refresh_session(&self, refresh_token: &str) -> Result<AuthSession>;

    async fn get_user(&self, access_token: &str) -> Result<AuthUser>;

    async fn sign_out(&self, access_token: &str) -> Result<()>;
}
