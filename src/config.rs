//! Runtime configuration, read from the environment (and `.env`).

use anyhow::Context;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_BACKEND_URL: &str = "http://localhost:5001";
const DEFAULT_BIND: &str = "0.0.0.0:3000";
const DEFAULT_FRONTEND_DIR: &str = "frontend";
const DEFAULT_HISTORY_PATH: &str = "./data/history.json";
const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 300;
const DEFAULT_MAX_LOG_BYTES: usize = 16 * 1024 * 1024;
const DEFAULT_EVENT_CAPACITY: usize = 1024;
const DEFAULT_SUMMARY_PREFIX_CHARS: usize = 12_000;

const DEFAULT_MODEL: &str = "claude-3-5-sonnet-latest";
const DEFAULT_VERSION: &str = "2023-06-01";
const DEFAULT_API_URL: &str = "https://api.anthropic.com/v1/messages";

#[derive(Debug, Clone)]
pub struct ConsoleConfig {
    /// Scan backend base URL (`/run`, `/input`, `/summarize` live under it)
    pub backend_url: String,
    pub bind: SocketAddr,
    pub frontend_dir: PathBuf,
    /// `None` waits forever for the next chunk
    pub idle_timeout: Option<Duration>,
    /// `None` keeps the whole log in memory
    pub max_log_bytes: Option<usize>,
    /// Backend path POSTed when a scan is cancelled
    pub cancel_path: Option<String>,
    pub history_path: PathBuf,
    /// Buffered live events per dashboard subscriber
    pub event_capacity: usize,
    pub remote: RemoteSummarizerConfig,
}

/// Hosted chat-completion API used when the local model is not selected.
#[derive(Debug, Clone)]
pub struct RemoteSummarizerConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub version: String,
    pub api_url: String,
    /// Longest log prefix (in characters) sent to the API
    pub max_prefix_chars: usize,
}

impl Default for RemoteSummarizerConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            version: DEFAULT_VERSION.to_string(),
            api_url: DEFAULT_API_URL.to_string(),
            max_prefix_chars: DEFAULT_SUMMARY_PREFIX_CHARS,
        }
    }
}

impl ConsoleConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; unset or blank keys take their defaults.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let bind_raw = get("SECOPS_BIND").unwrap_or_else(|| DEFAULT_BIND.to_string());
        let bind = bind_raw
            .parse::<SocketAddr>()
            .with_context(|| format!("SECOPS_BIND is not a socket address: {}", bind_raw))?;

        let idle_secs = parse_number(get("SECOPS_IDLE_TIMEOUT_SECS"), "SECOPS_IDLE_TIMEOUT_SECS")?
            .unwrap_or(DEFAULT_IDLE_TIMEOUT_SECS);
        let max_log_bytes = parse_number(get("SECOPS_MAX_LOG_BYTES"), "SECOPS_MAX_LOG_BYTES")?
            .unwrap_or(DEFAULT_MAX_LOG_BYTES);
        let max_prefix_chars = parse_number(get("SECOPS_SUMMARY_PREFIX_CHARS"), "SECOPS_SUMMARY_PREFIX_CHARS")?
            .unwrap_or(DEFAULT_SUMMARY_PREFIX_CHARS);

        let remote = RemoteSummarizerConfig {
            api_key: get("ANTHROPIC_API_KEY"),
            model: get("ANTHROPIC_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            version: get("ANTHROPIC_VERSION").unwrap_or_else(|| DEFAULT_VERSION.to_string()),
            api_url: get("ANTHROPIC_API_URL").unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            max_prefix_chars,
        };

        Ok(Self {
            backend_url: get("SECOPS_BACKEND_URL").unwrap_or_else(|| DEFAULT_BACKEND_URL.to_string()),
            bind,
            frontend_dir: PathBuf::from(get("SECOPS_FRONTEND_DIR").unwrap_or_else(|| DEFAULT_FRONTEND_DIR.to_string())),
            idle_timeout: (idle_secs > 0).then(|| Duration::from_secs(idle_secs)),
            max_log_bytes: (max_log_bytes > 0).then_some(max_log_bytes),
            cancel_path: get("SECOPS_CANCEL_PATH"),
            history_path: PathBuf::from(get("SECOPS_HISTORY_PATH").unwrap_or_else(|| DEFAULT_HISTORY_PATH.to_string())),
            event_capacity: DEFAULT_EVENT_CAPACITY,
            remote,
        })
    }

    /// Defaults pointed at a specific backend; handy for embedding and tests.
    pub fn for_backend(backend_url: impl Into<String>) -> Self {
        Self {
            backend_url: backend_url.into(),
            ..Self::default()
        }
    }
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            backend_url: DEFAULT_BACKEND_URL.to_string(),
            bind: SocketAddr::from(([0, 0, 0, 0], 3000)),
            frontend_dir: PathBuf::from(DEFAULT_FRONTEND_DIR),
            idle_timeout: Some(Duration::from_secs(DEFAULT_IDLE_TIMEOUT_SECS)),
            max_log_bytes: Some(DEFAULT_MAX_LOG_BYTES),
            cancel_path: None,
            history_path: PathBuf::from(DEFAULT_HISTORY_PATH),
            event_capacity: DEFAULT_EVENT_CAPACITY,
            remote: RemoteSummarizerConfig::default(),
        }
    }
}

fn parse_number<T>(raw: Option<String>, key: &str) -> anyhow::Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.map(|v| v.parse::<T>().with_context(|| format!("{} must be a number, got {:?}", key, v)))
        .transpose()
}
