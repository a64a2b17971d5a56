//! Error types shared across the client.

use std::fmt::{Display, Formatter};

/// Shared client result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Fallback text shown to the user when the agent cannot be reached.
pub const TRANSPORT_FALLBACK_MESSAGE: &str =
    "The agent could not be reached. Please try again in a moment.";

/// Client error enumeration covering every failure mode of a conversation turn.
#[derive(Debug)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// Network or HTTP failure talking to the agent.
    Transport(String),
    /// Malformed frame or quasi-JSON that failed strict parsing.
    Parse(String),
    /// Well-formed payload missing a required domain field.
    Validation(String),
    /// Request explicitly aborted by the user or superseded by a newer one.
    Cancelled(String),
    /// File-system or I/O operation failure.
    Io(String),
}

impl AppError {
    /// User-visible text for this error, if it should be surfaced at all.
    ///
    /// Only transport failures are user-visible. Parse and validation
    /// failures drop a single value, and cancellation is an expected outcome.
    #[must_use]
    pub fn user_message(&self) -> Option<String> {
        match self {
            Self::Transport(_) => Some(TRANSPORT_FALLBACK_MESSAGE.to_owned()),
            Self::Config(msg) => Some(format!("configuration error: {msg}")),
            Self::Io(msg) => Some(format!("i/o error: {msg}")),
            Self::Parse(_) | Self::Validation(_) | Self::Cancelled(_) => None,
        }
    }

    /// Whether this error represents an expected cancellation.
    #[must_use]
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Transport(msg) => write!(f, "transport: {msg}"),
            Self::Parse(msg) => write!(f, "parse: {msg}"),
            Self::Validation(msg) => write!(f, "validation: {msg}"),
            Self::Cancelled(msg) => write!(f, "cancelled: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::Parse(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
