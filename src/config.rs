//! Configuration management for stackrelay
//!
//! Parses TOML configuration files and provides typed access to settings.

use crate::error::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Upper bound for any timeout setting, in seconds
const MAX_TIMEOUT_SECONDS: u64 = 300;
/// Upper bound for provider call attempts
const MAX_ATTEMPTS: usize = 10;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub server: ServerConfig,
    pub provider: ProviderConfig,
    #[serde(default)]
    pub streaming: StreamingConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// IP address literal to bind; hostnames are rejected at load time
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    /// Address the listener binds to
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` when `host` is not an IP address.
    pub fn socket_addr(&self) -> AppResult<SocketAddr> {
        let ip: IpAddr = self.host.trim().parse().map_err(|_| {
            AppError::Config(format!(
                "server.host '{}' must be an IP address such as 127.0.0.1 or 0.0.0.0",
                self.host
            ))
        })?;
        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Provider connection settings
///
/// Fields are private so validated values cannot be mutated after loading.
/// The API key is redacted from `Debug` output.
#[derive(Clone, Deserialize, Serialize)]
pub struct ProviderConfig {
    base_url: String,
    model: String,
    #[serde(default, skip_serializing)]
    api_key: Option<String>,
    #[serde(default = "default_api_key_env")]
    api_key_env: String,
    #[serde(default = "default_timeout_seconds")]
    timeout_seconds: u64,
    /// Total attempts for idempotent analysis calls (1 = no retry)
    #[serde(default = "default_max_retries")]
    max_retries: usize,
    /// Base backoff in milliseconds (doubles each retry)
    #[serde(default = "default_retry_backoff_ms")]
    retry_backoff_ms: u64,
    #[serde(default)]
    temperature: Option<f64>,
    #[serde(default)]
    max_tokens: Option<u32>,
    #[serde(default = "default_analysis_prompt")]
    analysis_prompt: String,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("api_key_env", &self.api_key_env)
            .field("timeout_seconds", &self.timeout_seconds)
            .field("max_retries", &self.max_retries)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .finish_non_exhaustive()
    }
}

impl ProviderConfig {
    /// Get the provider base URL (e.g. `https://api.openai.com/v1`)
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Get the model name sent with every request
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Name of the environment variable consulted for the API key
    pub fn api_key_env(&self) -> &str {
        &self.api_key_env
    }

    /// Resolve the API key: config file first, then the environment
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| {
                std::env::var(&self.api_key_env)
                    .ok()
                    .filter(|k| !k.trim().is_empty())
            })
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn timeout_seconds(&self) -> u64 {
        self.timeout_seconds
    }

    pub fn max_retries(&self) -> usize {
        self.max_retries
    }

    pub fn retry_backoff_ms(&self) -> u64 {
        self.retry_backoff_ms
    }

    pub fn temperature(&self) -> Option<f64> {
        self.temperature
    }

    pub fn max_tokens(&self) -> Option<u32> {
        self.max_tokens
    }

    /// System prompt sent ahead of the text on `/analyze`
    pub fn analysis_prompt(&self) -> &str {
        &self.analysis_prompt
    }
}

fn default_api_key_env() -> String {
    "STACKRELAY_API_KEY".to_string()
}

fn default_timeout_seconds() -> u64 {
    30
}

fn default_max_retries() -> usize {
    3
}

fn default_retry_backoff_ms() -> u64 {
    100
}

fn default_analysis_prompt() -> String {
    "You analyze descriptions of software systems and identify their engine stack. \
    Reply with a single JSON object with the keys \"engines\" (array of strings), \
    \"languages\" (array of strings), \"frameworks\" (array of strings) and \
    \"summary\" (string). Reply with JSON only."
        .to_string()
}

/// Server-sent event stream settings for `/chat` with `stream: true`
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StreamingConfig {
    /// Interval between SSE keep-alive comments while the provider is silent
    #[serde(default = "default_keep_alive_seconds")]
    pub keep_alive_seconds: u64,
    /// Maximum wait for the next upstream chunk once the stream is open
    #[serde(default = "default_idle_timeout_seconds")]
    pub idle_timeout_seconds: u64,
    /// Emit `data: [DONE]` before closing a cleanly finished stream
    #[serde(default)]
    pub done_sentinel: bool,
}

impl StreamingConfig {
    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_seconds)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_seconds)
    }
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            keep_alive_seconds: default_keep_alive_seconds(),
            idle_timeout_seconds: default_idle_timeout_seconds(),
            done_sentinel: false,
        }
    }
}

fn default_keep_alive_seconds() -> u64 {
    15
}

fn default_idle_timeout_seconds() -> u64 {
    60
}

/// Observability configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let path_display = path.as_ref().display().to_string();

        // Phase 1: Read file (preserves io::Error context)
        let content = std::fs::read_to_string(path.as_ref()).map_err(|source| {
            AppError::ConfigFileRead {
                path: path_display.clone(),
                source,
            }
        })?;

        // Phase 2: Parse TOML (preserves toml::de::Error context)
        let config: Self =
            toml::from_str(&content).map_err(|source| AppError::ConfigParseFailed {
                path: path_display.clone(),
                source,
            })?;

        // Phase 3: Validate parsed config (provides contextual reason)
        config
            .validate()
            .map_err(|e| AppError::ConfigValidationFailed {
                path: path_display,
                reason: e.to_string(),
            })?;

        Ok(config)
    }

    /// Validate configuration after parsing
    ///
    /// Called by `from_file()` and `from_str()`, and can be called explicitly
    /// on configs constructed in tests.
    pub fn validate(&self) -> AppResult<()> {
        self.server.socket_addr()?;

        let provider = &self.provider;

        if !provider.base_url.starts_with("http://") && !provider.base_url.starts_with("https://")
        {
            return Err(AppError::Config(format!(
                "provider.base_url '{}' must start with 'http://' or 'https://'",
                provider.base_url
            )));
        }

        if provider.model.trim().is_empty() {
            return Err(AppError::Config(
                "provider.model cannot be empty".to_string(),
            ));
        }

        if provider.api_key_env.trim().is_empty() {
            return Err(AppError::Config(
                "provider.api_key_env cannot be empty".to_string(),
            ));
        }

        validate_timeout("provider.timeout_seconds", provider.timeout_seconds)?;
        validate_timeout(
            "streaming.idle_timeout_seconds",
            self.streaming.idle_timeout_seconds,
        )?;
        validate_timeout(
            "streaming.keep_alive_seconds",
            self.streaming.keep_alive_seconds,
        )?;

        if provider.max_retries == 0 || provider.max_retries > MAX_ATTEMPTS {
            return Err(AppError::Config(format!(
                "provider.max_retries must be between 1 and {}, got {}",
                MAX_ATTEMPTS, provider.max_retries
            )));
        }

        if let Some(temperature) = provider.temperature
            && (!temperature.is_finite() || !(0.0..=2.0).contains(&temperature))
        {
            return Err(AppError::Config(format!(
                "provider.temperature must be a finite number between 0.0 and 2.0, got {}",
                temperature
            )));
        }

        if provider.max_tokens == Some(0) {
            return Err(AppError::Config(
                "provider.max_tokens must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

fn validate_timeout(name: &str, seconds: u64) -> AppResult<()> {
    if seconds == 0 {
        return Err(AppError::Config(format!(
            "{} must be greater than 0, got {}",
            name, seconds
        )));
    }
    if seconds > MAX_TIMEOUT_SECONDS {
        return Err(AppError::Config(format!(
            "{} cannot exceed {} seconds, got {}",
            name, MAX_TIMEOUT_SECONDS, seconds
        )));
    }
    Ok(())
}

impl FromStr for Config {
    type Err = AppError;

    fn from_str(toml_str: &str) -> Result<Self, Self::Err> {
        let config: Config =
            toml::from_str(toml_str).map_err(|source| AppError::ConfigParseFailed {
                path: "<string>".to_string(),
                source,
            })?;

        // Validate config before returning
        config.validate()?;
        Ok(config)
    }
}
