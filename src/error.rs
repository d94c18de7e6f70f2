use thiserror::Error;

#[derive(Error, Debug)]
pub enum ParleyError {
    #[error("Not signed in")]
    AuthRequired,

    #[error("Failed to fetch messages: {0}")]
    HistoryFetchFailed(String),

    #[error("{0}")]
    DispatchFailed(String),

    #[error("Sign out failed: {0}")]
    SignOutFailed(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Message store error: {0}")]
    Store(String),

    #[error("Realtime channel error: {0}")]
    Realtime(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config file: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{message}: {source}")]
    Context {
        message: String,
        #[source]
        source: Box<ParleyError>,
    },
}

impl ParleyError {
    /// Whether the failure is surfaced to the user as a notice. History and
    /// conversation-list failures are only logged.
    pub fn is_user_visible(&self) -> bool {
        match self {
            ParleyError::HistoryFetchFailed(_) => false,
            ParleyError::Context { source, .. } => source.is_user_visible(),
            _ => true,
        }
    }

    pub fn hint(&self) -> Option<&'static str> {
        match self {
            ParleyError::AuthRequired => Some("Sign in to open the chat"),
            ParleyError::DispatchFailed(_) => Some("Send the message again to retry"),
            ParleyError::SignOutFailed(_) => Some("Check your connection and run /signout again"),
            ParleyError::Config(_) => {
                Some("Set SUPABASE_URL, SUPABASE_ANON_KEY and API_URL or pass them as flags")
            }
            ParleyError::Context { source, .. } => source.hint(),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ParleyError>;
