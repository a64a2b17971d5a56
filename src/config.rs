//! Client configuration parsing and validation.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::Url;
use serde::Deserialize;

use crate::framing::FramingMode;
use crate::retry::RetryPolicy;
use crate::{AppError, Result};

fn default_base_url() -> String {
    "http://localhost:9090".into()
}

fn default_request_timeout() -> u64 {
    120
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    500
}

fn default_true() -> bool {
    true
}

fn default_max_frame_bytes() -> usize {
    1_048_576
}

fn default_terminal_states() -> Vec<String> {
    vec!["DELIVERED".into()]
}

fn default_highlight_capacity() -> usize {
    64
}

/// Retry settings for non-streaming calls.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct RetryConfig {
    /// Total attempts, including the first one.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay before the first retry; doubles on each subsequent retry.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Whether `POST /agent/prompt` may be retried.
    #[serde(default = "default_true")]
    pub prompt_idempotent: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            prompt_idempotent: true,
        }
    }
}

/// Streaming ingestion settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct StreamConfig {
    /// Upper bound on the retained partial-frame buffer.
    #[serde(default = "default_max_frame_bytes")]
    pub max_frame_bytes: usize,
    /// Domain-event `state` values that complete a session.
    #[serde(default = "default_terminal_states")]
    pub terminal_states: Vec<String>,
    /// Seconds without any bytes before the stream is failed; 0 disables.
    #[serde(default)]
    pub idle_timeout_seconds: u64,
    /// Buffer size of the node-highlight side channel.
    #[serde(default = "default_highlight_capacity")]
    pub highlight_capacity: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            max_frame_bytes: default_max_frame_bytes(),
            terminal_states: default_terminal_states(),
            idle_timeout_seconds: 0,
            highlight_capacity: default_highlight_capacity(),
        }
    }
}

/// Client configuration parsed from `config.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ClientConfig {
    /// Root URL of the agent server.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Framing protocol of the streaming endpoint.
    #[serde(default)]
    pub framing: FramingMode,
    /// Timeout for non-streaming calls; 0 disables.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
    /// File that persists the thread id between runs.
    #[serde(default)]
    pub thread_file: Option<PathBuf>,
    /// Retry behavior for non-streaming calls.
    #[serde(default)]
    pub retry: RetryConfig,
    /// Streaming ingestion behavior.
    #[serde(default)]
    pub stream: StreamConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            framing: FramingMode::default(),
            request_timeout_seconds: default_request_timeout(),
            thread_file: None,
            retry: RetryConfig::default(),
            stream: StreamConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Parsed agent root URL.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if `base_url` is not an absolute http(s) URL.
    pub fn base_url(&self) -> Result<Url> {
        let url = Url::parse(&self.base_url)
            .map_err(|err| AppError::Config(format!("base_url invalid: {err}")))?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(AppError::Config(format!(
                "base_url scheme must be http or https, got {other}"
            ))),
        }
    }

    /// Timeout applied to non-streaming calls, if any.
    #[must_use]
    pub fn request_timeout(&self) -> Option<Duration> {
        (self.request_timeout_seconds > 0).then(|| Duration::from_secs(self.request_timeout_seconds))
    }

    /// Stall window for streaming reads, if any.
    #[must_use]
    pub fn idle_timeout(&self) -> Option<Duration> {
        (self.stream.idle_timeout_seconds > 0)
            .then(|| Duration::from_secs(self.stream.idle_timeout_seconds))
    }

    /// Retry policy derived from the `[retry]` table.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry.max_attempts,
            Duration::from_millis(self.retry.base_delay_ms),
        )
    }

    /// Re-run validation after CLI overrides have been applied.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` describing the first invalid setting.
    pub fn validate(&self) -> Result<()> {
        self.base_url()?;

        if self.retry.max_attempts == 0 {
            return Err(AppError::Config(
                "retry.max_attempts must be greater than zero".into(),
            ));
        }

        if self.stream.max_frame_bytes == 0 {
            return Err(AppError::Config(
                "stream.max_frame_bytes must be greater than zero".into(),
            ));
        }

        if self.stream.terminal_states.is_empty() {
            return Err(AppError::Config(
                "stream.terminal_states must not be empty".into(),
            ));
        }

        if self.stream.terminal_states.iter().any(|s| s.trim().is_empty()) {
            return Err(AppError::Config(
                "stream.terminal_states must not contain blank entries".into(),
            ));
        }

        if self.stream.highlight_capacity == 0 {
            return Err(AppError::Config(
                "stream.highlight_capacity must be greater than zero".into(),
            ));
        }

        Ok(())
    }
}
