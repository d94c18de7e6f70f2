use super::{AuthProvider, AuthSession};
use crate::error::{ParleyError, Result};
use crate::error_ext::Context;
use chrono::Utc;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::watch;

const AUTH_FILE: &str = "auth.json";
const EXPIRY_LEEWAY_SECS: i64 = 60;

#[derive(Debug, Clone)]
pub enum AuthEvent {
    SignedIn(AuthSession),
    TokenRefreshed(AuthSession),
    SignedOut,
}

/// Process-wide authentication state.
///
/// Created once by [`AuthState::init`]. Every change goes through
/// [`AuthState::apply`], which persists the session and publishes it to
/// subscribers.
pub struct AuthState {
    provider: Arc<dyn AuthProvider>,
    session_file: PathBuf,
    tx: watch::Sender<Option<AuthSession>>,
}

/// Read-only view of the current session, cheap to clone.
#[derive(Clone)]
pub struct AuthHandle {
    rx: watch::Receiver<Option<AuthSession>>,
}

impl AuthHandle {
    pub fn access_token(&self) -> Option<String> {
        self.rx.borrow().as_ref().map(|s| s.access_token.clone())
    }

    pub fn is_authenticated(&self) -> bool {
        self.rx.borrow().is_some()
    }
}

impl AuthState {
    /// Restore the persisted session, if any. Expired sessions are refreshed;
    /// sessions the provider rejects are discarded.
    pub async fn init(provider: Arc<dyn AuthProvider>, parley_dir: PathBuf) -> Result<Self> {
        let session_file = parley_dir.join(AUTH_FILE);
        let (tx, _) = watch::channel(None);
        let state = Self {
            provider,
            session_file,
            tx,
        };

        let Some(stored) = state.load_persisted()? else {
            return Ok(state);
        };

        let restored = if stored.is_expired(Utc::now().timestamp(), EXPIRY_LEEWAY_SECS) {
            state.try_refresh(&stored).await
        } else {
            match state.provider.get_user(&stored.access_token).await {
                Ok(user) => Some(AuthSession { user, ..stored }),
                Err(ParleyError::Auth(reason)) => {
                    tracing::info!(reason = %reason, "Stored session rejected, refreshing");
                    state.try_refresh(&stored).await
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Could not verify stored session, keeping it");
                    Some(stored)
                }
            }
        };

        match restored {
            Some(session) => state.apply(AuthEvent::TokenRefreshed(session))?,
            None => state.apply(AuthEvent::SignedOut)?,
        }

        Ok(state)
    }

    async fn try_refresh(&self, stored: &AuthSession) -> Option<AuthSession> {
        match self.provider.refresh_session(&stored.refresh_token).await {
            Ok(session) => Some(session),
            Err(e) => {
                tracing::info!(error = %e, "Stored session could not be refreshed");
                None
            }
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<AuthSession>> {
        self.tx.subscribe()
    }

    pub fn handle(&self) -> AuthHandle {
        AuthHandle {
            rx: self.tx.subscribe(),
        }
    }

    pub fn current(&self) -> Option<AuthSession> {
        self.tx.borrow().clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.tx.borrow().is_some()
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<()> {
        let session = self.provider.sign_in_with_password(email, password).await?;
        tracing::info!(user_id = %session.user.id, "Signed in");
        self.apply(AuthEvent::SignedIn(session))
    }

    /// Returns whether the new account is signed in right away.
    pub async fn sign_up(&self, email: &str, password: &str) -> Result<bool> {
        match self.provider.sign_up(email, password).await? {
            Some(session) => {
                self.apply(AuthEvent::SignedIn(session))?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// On failure the local session is kept.
    pub async fn sign_out(&self) -> Result<()> {
        let Some(session) = self.current() else {
            return Ok(());
        };

        self.provider
            .sign_out(&session.access_token)
            .await
            .map_err(|e| ParleyError::SignOutFailed(e.to_string()))?;

        self.apply(AuthEvent::SignedOut)
    }

    /// Refresh the access token if it is about to expire.
    pub async fn ensure_fresh(&self) -> Result<()> {
        let Some(session) = self.current() else {
            return Err(ParleyError::AuthRequired);
        };

        if !session.is_expired(Utc::now().timestamp(), EXPIRY_LEEWAY_SECS) {
            return Ok(());
        }

        match self.provider.refresh_session(&session.refresh_token).await {
            Ok(fresh) => self.apply(AuthEvent::TokenRefreshed(fresh)),
            Err(ParleyError::Auth(reason)) => {
                tracing::warn!(reason = %reason, "Session expired");
                self.apply(AuthEvent::SignedOut)?;
                Err(ParleyError::AuthRequired)
            }
            Err(e) => Err(e),
        }
    }

    /// The single path through which the session changes.
    pub fn apply(&self, event: AuthEvent) -> Result<()> {
        let next = match event {
            AuthEvent::SignedIn(session) | AuthEvent::TokenRefreshed(session) => Some(session),
            AuthEvent::SignedOut => None,
        };

        self.persist(next.as_ref())?;
        self.tx.send_replace(next);
        Ok(())
    }

    pub fn shutdown(self) {
        tracing::debug!("Auth state shut down");
    }

    fn load_persisted(&self) -> Result<Option<AuthSession>> {
        if !self.session_file.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&self.session_file)
            .with_context(|| format!("Failed to read {:?}", self.session_file))?;

        match serde_json::from_str(&content) {
            Ok(session) => Ok(Some(session)),
            Err(e) => {
                tracing::warn!(error = %e, "Ignoring unreadable auth session file");
                Ok(None)
            }
        }
    }

    fn persist(&self, session: Option<&AuthSession>) -> Result<()> {
        match session {
            Some(session) => {
                if let Some(dir) = self.session_file.parent() {
                    fs::create_dir_all(dir)
                        .with_context(|| format!("Failed to create {:?}", dir))?;
                }
                let content = serde_json::to_string_pretty(session)?;
                write_private(&self.session_file, &content)
                    .with_context(|| format!("Failed to write {:?}", self.session_file))?;
            }
            None => {
                if self.session_file.exists() {
                    fs::remove_file(&self.session_file)?;
                }
            }
        }
        Ok(())
    }
}

/// Write a file only the owner can read, tightening an existing one too.
fn write_private(path: &Path, content: &str) -> std::io::Result<()> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(path)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(fs::Permissions::from_mode(0o600))?;
    }
    file.write_all(content.as_bytes())
}
