//! Unit tests for `AppError` display and user-facing text.

use agent_stream::errors::TRANSPORT_FALLBACK_MESSAGE;
use agent_stream::AppError;

/// Each variant displays with its kind prefix.
#[test]
fn display_includes_kind_prefix() {
    let cases = [
        (AppError::Config("c".into()), "config: c"),
        (AppError::Transport("t".into()), "transport: t"),
        (AppError::Parse("p".into()), "parse: p"),
        (AppError::Validation("v".into()), "validation: v"),
        (AppError::Cancelled("x".into()), "cancelled: x"),
        (AppError::Io("i".into()), "io: i"),
    ];

    for (err, expected) in cases {
        assert_eq!(err.to_string(), expected);
    }
}

/// Transport failures surface the fallback text, not the raw error.
#[test]
fn transport_surfaces_fallback_message() {
    let err = AppError::Transport("connection refused (os error 111)".into());
    assert_eq!(
        err.user_message().as_deref(),
        Some(TRANSPORT_FALLBACK_MESSAGE)
    );
}

/// Dropped-value and cancellation errors are never user-visible.
#[test]
fn silent_kinds_have_no_user_message() {
    assert!(AppError::Parse("bad".into()).user_message().is_none());
    assert!(AppError::Validation("bad".into()).user_message().is_none());
    assert!(AppError::Cancelled("stop".into()).user_message().is_none());
}

/// Only cancellation is an expected outcome.
#[test]
fn cancellation_is_identified() {
    assert!(AppError::Cancelled("stop".into()).is_cancellation());
    assert!(!AppError::Transport("down".into()).is_cancellation());
}

/// Conversions map into the matching kind.
#[test]
fn conversions_map_to_kind() {
    let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
    assert!(matches!(AppError::from(io), AppError::Io(_)));

    let json = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
    assert!(matches!(AppError::from(json), AppError::Parse(_)));

    let toml = toml::from_str::<toml::Table>("= nope").unwrap_err();
    assert!(matches!(AppError::from(toml), AppError::Config(_)));
}
