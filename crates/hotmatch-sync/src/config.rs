//! Runtime configuration read from the environment.

use std::path::PathBuf;
use std::time::Duration;

use hotmatch_fetch::{AnthropicClient, OpenAiClient, DEFAULT_USER_AGENT};
use thiserror::Error;

use crate::queue::QueueConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    #[error("invalid value for {name}: `{value}`")]
    Invalid { name: &'static str, value: String },
    #[error("could not build llm client: {0}")]
    Client(String),
}

#[derive(Debug, Clone)]
pub struct HotMatchConfig {
    pub database_url: Option<String>,
    pub openai_api_key: Option<String>,
    pub anthropic_api_key: Option<String>,
    pub workspace_root: PathBuf,
    pub reports_dir: PathBuf,
    pub user_agent: String,
    pub http_timeout_secs: u64,
    pub llm_delay: Duration,
    pub batch_size: i64,
    pub queue: QueueConfig,
    pub scheduler_enabled: bool,
    pub discover_cron: String,
    pub rescore_cron: String,
    pub bind_addr: String,
}

impl HotMatchConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any variable source; `from_env` passes `std::env::var`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let workspace_root = var("HOTMATCH_WORKSPACE_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));
        let reports_dir = var("HOTMATCH_REPORTS_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| workspace_root.join("reports"));

        let defaults = QueueConfig::default();
        let queue = QueueConfig {
            batch_size: parse_or(&var, "HOTMATCH_QUEUE_BATCH_SIZE", defaults.batch_size)?,
            poll_interval: Duration::from_secs(parse_or(
                &var,
                "HOTMATCH_QUEUE_POLL_SECS",
                defaults.poll_interval.as_secs(),
            )?),
            concurrency: parse_or(&var, "HOTMATCH_QUEUE_CONCURRENCY", defaults.concurrency)?
                .max(1),
            ..defaults
        };

        Ok(Self {
            database_url: var("POSTGRES_URL").or_else(|| var("DATABASE_URL")),
            openai_api_key: var("OPENAI_API_KEY").or_else(|| var("VITE_OPENAI_API_KEY")),
            anthropic_api_key: var("ANTHROPIC_API_KEY"),
            workspace_root,
            reports_dir,
            user_agent: var("HOTMATCH_USER_AGENT").unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
            http_timeout_secs: parse_or(&var, "HOTMATCH_HTTP_TIMEOUT_SECS", 20)?,
            llm_delay: Duration::from_millis(parse_or(&var, "HOTMATCH_LLM_DELAY_MS", 1500)?),
            batch_size: parse_or(&var, "HOTMATCH_BATCH_SIZE", 500i64)?.max(1),
            queue,
            scheduler_enabled: var("HOTMATCH_SCHEDULER_ENABLED")
                .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(false),
            discover_cron: var("HOTMATCH_DISCOVER_CRON").unwrap_or_else(|| "0 0 */6 * * *".to_string()),
            rescore_cron: var("HOTMATCH_RESCORE_CRON").unwrap_or_else(|| "0 30 3 * * *".to_string()),
            bind_addr: var("HOTMATCH_BIND_ADDR").unwrap_or_else(|| "127.0.0.1:3000".to_string()),
        })
    }

    pub fn require_database_url(&self) -> Result<&str, ConfigError> {
        self.database_url
            .as_deref()
            .ok_or(ConfigError::Missing("POSTGRES_URL"))
    }

    pub fn openai_client(&self) -> Result<OpenAiClient, ConfigError> {
        let key = self
            .openai_api_key
            .as_deref()
            .ok_or(ConfigError::Missing("OPENAI_API_KEY"))?;
        OpenAiClient::new(key).map_err(|err| ConfigError::Client(err.to_string()))
    }

    pub fn anthropic_client(&self) -> Result<AnthropicClient, ConfigError> {
        let key = self
            .anthropic_api_key
            .as_deref()
            .ok_or(ConfigError::Missing("ANTHROPIC_API_KEY"))?;
        AnthropicClient::new(key).map_err(|err| ConfigError::Client(err.to_string()))
    }
}

fn parse_or<T, V>(var: &V, name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    V: Fn(&str) -> Option<String>,
{
    match var(name) {
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid { name, value: raw }),
        None => Ok(default),
    }
}
