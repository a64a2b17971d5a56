#![forbid(unsafe_code)]

//! Streaming ingestion and request-resilience core for a conversational
//! agent client.
//!
//! Bytes from the agent's streaming endpoint are decoded by
//! [`framing::FrameCodec`], interpreted by [`client::wire`], normalized by
//! [`normalize`], and applied to a [`session::SessionMachine`]. Every
//! result is gated by the [`lifecycle::RequestLifecycle`] so a superseded
//! request can never touch the state of a newer one.

pub mod client;
pub mod config;
pub mod conversation;
pub mod errors;
pub mod framing;
pub mod lifecycle;
pub mod models;
pub mod normalize;
pub mod retry;
pub mod session;
pub mod thread;

pub use config::ClientConfig;
pub use conversation::Conversation;
pub use errors::{AppError, Result};
