use anyhow::{Context, Result};
use indexer_console_core::PageSize;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub api: ApiConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default)]
    pub search: SearchConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ApiConfig {
    pub base_url: String,
    /// Per-request timeout. Unset means the HTTP client's default.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SessionConfig {
    #[serde(default = "default_session_path")]
    pub path: PathBuf,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            path: default_session_path(),
        }
    }
}

fn default_session_path() -> PathBuf {
    PathBuf::from("./.ixc/session.json")
}

#[derive(Debug, Deserialize, Clone)]
pub struct PollingConfig {
    #[serde(default = "default_job_interval_ms")]
    pub job_status_interval_ms: u64,
    #[serde(default = "default_job_interval_ms")]
    pub job_list_interval_ms: u64,
    #[serde(default = "default_log_tail_interval_ms")]
    pub log_tail_interval_ms: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            job_status_interval_ms: default_job_interval_ms(),
            job_list_interval_ms: default_job_interval_ms(),
            log_tail_interval_ms: default_log_tail_interval_ms(),
        }
    }
}

impl PollingConfig {
    pub fn job_status_interval(&self) -> Duration {
        Duration::from_millis(self.job_status_interval_ms)
    }
    pub fn job_list_interval(&self) -> Duration {
        Duration::from_millis(self.job_list_interval_ms)
    }
    pub fn log_tail_interval(&self) -> Duration {
        Duration::from_millis(self.log_tail_interval_ms)
    }
}

fn default_job_interval_ms() -> u64 {
    5000
}
fn default_log_tail_interval_ms() -> u64 {
    3000
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    #[serde(default = "default_text_debounce_ms")]
    pub text_debounce_ms: u64,
    #[serde(default = "default_filter_debounce_ms")]
    pub filter_debounce_ms: u64,
    #[serde(default = "default_page_size")]
    pub default_page_size: u32,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            text_debounce_ms: default_text_debounce_ms(),
            filter_debounce_ms: default_filter_debounce_ms(),
            default_page_size: default_page_size(),
        }
    }
}

impl SearchConfig {
    /// The configured default page size; validated by [`load_config`].
    pub fn page_size(&self) -> PageSize {
        PageSize::try_from(self.default_page_size).unwrap_or_default()
    }
}

fn default_text_debounce_ms() -> u64 {
    500
}
fn default_filter_debounce_ms() -> u64 {
    300
}
fn default_page_size() -> u32 {
    15
}

impl Config {
    /// Settings used when no config file exists: a local API and defaults
    /// everywhere else.
    pub fn minimal() -> Self {
        Self {
            api: ApiConfig {
                base_url: "http://localhost:8000".to_string(),
                timeout_secs: None,
            },
            session: SessionConfig::default(),
            polling: PollingConfig::default(),
            search: SearchConfig::default(),
        }
    }
}

/// Loads and validates the config at `path`.
///
/// A missing file is not an error: [`Config::minimal`] is returned instead.
pub fn load_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        tracing::debug!(
            "config file {} not found, using defaults",
            path.display()
        );
        return Ok(Config::minimal());
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    let base_url = config.api.base_url.trim();
    if base_url.is_empty() {
        anyhow::bail!("api.base_url must not be empty");
    }
    if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
        anyhow::bail!("api.base_url must start with http:// or https://");
    }
    if config.api.timeout_secs == Some(0) {
        anyhow::bail!("api.timeout_secs must be > 0 when set");
    }

    for (name, value) in [
        ("polling.job_status_interval_ms", config.polling.job_status_interval_ms),
        ("polling.job_list_interval_ms", config.polling.job_list_interval_ms),
        ("polling.log_tail_interval_ms", config.polling.log_tail_interval_ms),
    ] {
        if value == 0 {
            anyhow::bail!("{} must be > 0", name);
        }
    }

    PageSize::try_from(config.search.default_page_size)
        .map_err(|e| anyhow::anyhow!("search.default_page_size: {}", e))?;

    Ok(())
}
