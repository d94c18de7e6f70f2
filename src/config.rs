use crate::cli::Cli;
use crate::error::{ParleyError, Result};
use crate::error_ext::{Context, Required};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const PARLEY_DIR: &str = ".parley";
const CONFIG_FILE: &str = "config.toml";

/// Optional settings read from `.parley/config.toml`
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    supabase_url: Option<String>,
    supabase_anon_key: Option<String>,
    api_url: Option<String>,
    user_id: Option<String>,
    title_max_chars: Option<usize>,
    messages_table: Option<String>,
    schema: Option<String>,
    heartbeat_secs: Option<u64>,
    request_timeout_secs: Option<u64>,
}

/// Central configuration for Parley
#[derive(Debug, Clone)]
pub struct ParleyConfig {
    pub workspace: PathBuf,
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub api_url: String,
    /// Placeholder user id sent with every dispatch
    pub user_id: String,
    pub title_max_chars: usize,
    pub messages_table: String,
    pub schema: String,
    pub heartbeat_interval: Duration,
    pub request_timeout: Duration,
}

impl Default for ParleyConfig {
    fn default() -> Self {
        Self {
            workspace: PathBuf::from("."),
            supabase_url: String::new(),
            supabase_anon_key: String::new(),
            api_url: String::new(),
            user_id: "NA".to_string(),
            title_max_chars: 100,
            messages_table: "messages".to_string(),
            schema: "public".to_string(),
            heartbeat_interval: Duration::from_secs(25),
            request_timeout: Duration::from_secs(60),
        }
    }
}

impl ParleyConfig {
    /// Merge defaults, the workspace config file and CLI/env values, in that
    /// order of increasing precedence.
    pub fn load(cli: &Cli, workspace: PathBuf) -> Result<Self> {
        let file = read_file_config(&workspace.join(PARLEY_DIR).join(CONFIG_FILE))?;
        let defaults = Self::default();

        let supabase_url = cli
            .supabase_url
            .clone()
            .or(file.supabase_url)
            .required("SUPABASE_URL")?;
        let supabase_anon_key = cli
            .supabase_anon_key
            .clone()
            .or(file.supabase_anon_key)
            .required("SUPABASE_ANON_KEY")?;
        let api_url = cli
            .api_url
            .clone()
            .or(file.api_url)
            .required("API_URL")?;

        Ok(Self {
            workspace,
            supabase_url: supabase_url.trim_end_matches('/').to_string(),
            supabase_anon_key,
            api_url,
            user_id: file.user_id.unwrap_or(defaults.user_id),
            title_max_chars: file.title_max_chars.unwrap_or(defaults.title_max_chars),
            messages_table: file.messages_table.unwrap_or(defaults.messages_table),
            schema: file.schema.unwrap_or(defaults.schema),
            heartbeat_interval: seconds(
                "heartbeat_secs",
                file.heartbeat_secs,
                defaults.heartbeat_interval,
            )?,
            request_timeout: seconds(
                "request_timeout_secs",
                file.request_timeout_secs,
                defaults.request_timeout,
            )?,
        })
    }

    pub fn parley_dir(&self) -> PathBuf {
        self.workspace.join(PARLEY_DIR)
    }
}

/// Intervals of zero would spin the heartbeat timer or time out every request.
fn seconds(key: &str, value: Option<u64>, default: Duration) -> Result<Duration> {
    match value {
        Some(0) => Err(ParleyError::Config(format!("{} must be at least 1", key))),
        Some(secs) => Ok(Duration::from_secs(secs)),
        None => Ok(default),
    }
}

fn read_file_config(path: &Path) -> Result<FileConfig> {
    if !path.exists() {
        return Ok(FileConfig::default());
    }

    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config from {:?}", path))?;
    let config: FileConfig =
        toml::from_str(&content).with_context(|| format!("Failed to parse {:?}", path))?;
    Ok(config)
}
