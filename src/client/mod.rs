//! HTTP client for the agent server.
//!
//! | Endpoint                   | Method | Used by                          |
//! |----------------------------|--------|----------------------------------|
//! | `/agent/prompt`            | POST   | [`AgentClient::prompt`]          |
//! | `/agent/prompt/stream`     | POST   | [`AgentClient::open_stream`]     |
//! | `/health`                  | GET    | [`AgentClient::health`]          |
//! | `/v1/health`               | GET    | [`AgentClient::connectivity`]    |
//! | `/transport/config`        | GET    | [`AgentClient::transport_config`]|

pub mod reader;
pub mod wire;

use std::io;
use std::time::Duration;

use bytes::Bytes;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use reqwest::{Response, Url};
use serde::de::DeserializeOwned;
use tokio_util::io::StreamReader;
use tracing::debug;

use crate::config::ClientConfig;
use crate::{AppError, Result};

pub use reader::{run_reader, ReaderItem, ReaderOptions, Tagged};
pub use wire::{HealthStatus, PromptRequest, PromptResponse, TransportInfo};

/// Connect timeout applied to every request.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Streaming response body exposed as [`tokio::io::AsyncRead`].
pub type BodyReader = StreamReader<BoxStream<'static, io::Result<Bytes>>, Bytes>;

/// Thin typed wrapper over the agent's HTTP endpoints.
#[derive(Debug, Clone)]
pub struct AgentClient {
    http: reqwest::Client,
    base_url: Url,
    request_timeout: Option<Duration>,
}

impl AgentClient {
    /// Build a client for the configured agent.
    ///
    /// # Errors
    ///
    /// - [`AppError::Config`] — `base_url` is invalid.
    /// - [`AppError::Transport`] — the HTTP client could not be constructed.
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let mut base_url = config.base_url()?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;

        Ok(Self {
            http,
            base_url,
            request_timeout: config.request_timeout(),
        })
    }

    /// Root URL every endpoint is resolved against.
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Send a prompt and wait for the complete answer.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Transport`] on network failure, timeout, or a
    /// non-success status, and [`AppError::Parse`] for an unexpected body.
    pub async fn prompt(&self, prompt: &str) -> Result<String> {
        let url = self.endpoint("agent/prompt")?;
        let body = PromptRequest {
            prompt: prompt.to_owned(),
            thread_id: None,
        };

        let mut request = self.http.post(url.clone()).json(&body);
        if let Some(timeout) = self.request_timeout {
            request = request.timeout(timeout);
        }

        let response = request.send().await.map_err(|err| transport(&url, &err))?;
        let reply: PromptResponse = read_json(&url, response).await?;
        Ok(reply.response)
    }

    /// Open the streaming endpoint and return the response once headers arrive.
    ///
    /// No overall timeout is applied; the body may stay open for as long as
    /// the agent keeps producing output.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Transport`] on connection failure or a
    /// non-success status.
    pub async fn open_stream(&self, prompt: &str, thread_id: Option<&str>) -> Result<Response> {
        let url = self.endpoint("agent/prompt/stream")?;
        let body = PromptRequest {
            prompt: prompt.to_owned(),
            thread_id: thread_id.map(ToOwned::to_owned),
        };

        debug!(%url, thread_id, "opening stream");
        let response = self
            .http
            .post(url.clone())
            .json(&body)
            .send()
            .await
            .map_err(|err| transport(&url, &err))?;

        response
            .error_for_status()
            .map_err(|err| transport(&url, &err))
    }

    /// Adapt a streaming response body into an async byte reader.
    #[must_use]
    pub fn body_reader(response: Response) -> BodyReader {
        StreamReader::new(
            response
                .bytes_stream()
                .map(|chunk| chunk.map_err(io::Error::other))
                .boxed(),
        )
    }

    /// `GET /health`.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Transport`] when the agent is unreachable.
    pub async fn health(&self) -> Result<HealthStatus> {
        self.get_json("health").await
    }

    /// `GET /v1/health`: round-trip check through the agent's own backend.
    ///
    /// Unlike [`health`](Self::health), the agent answers only after its
    /// model backend responded, so a server error here means the agent is
    /// up but cannot serve prompts.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Transport`] when the agent is unreachable or
    /// reports a failed check.
    pub async fn connectivity(&self) -> Result<HealthStatus> {
        self.get_json("v1/health").await
    }

    /// `GET /transport/config`.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Transport`] when the agent is unreachable.
    pub async fn transport_config(&self) -> Result<TransportInfo> {
        self.get_json("transport/config").await
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.endpoint(path)?;
        let mut request = self.http.get(url.clone());
        if let Some(timeout) = self.request_timeout {
            request = request.timeout(timeout);
        }
        let response = request.send().await.map_err(|err| transport(&url, &err))?;
        read_json(&url, response).await
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|err| AppError::Config(format!("invalid endpoint {path}: {err}")))
    }
}

async fn read_json<T: DeserializeOwned>(url: &Url, response: Response) -> Result<T> {
    let response = response
        .error_for_status()
        .map_err(|err| transport(url, &err))?;
    let bytes = response.bytes().await.map_err(|err| transport(url, &err))?;
    serde_json::from_slice(&bytes)
        .map_err(|err| AppError::Parse(format!("unexpected body from {url}: {err}")))
}

fn transport(url: &Url, err: &reqwest::Error) -> AppError {
    AppError::Transport(format!("{url}: {err}"))
}
