//! Shared helpers for integration tests.
//!
//! Provides an in-process agent server built on axum, chunked response
//! bodies with a delay between chunks, and client configuration pointing at
//! the server.

use std::io;
use std::time::Duration;

use axum::body::Body;
use axum::Router;
use bytes::Bytes;
use futures_util::stream::{self, StreamExt};
use tokio::net::TcpListener;
use tokio_util::io::StreamReader;

use agent_stream::framing::FramingMode;
use agent_stream::ClientConfig;

/// Serve `router` on an ephemeral local port and return its base URL.
pub async fn spawn_server(router: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test listener");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("test server");
    });
    format!("http://{addr}")
}

/// Base URL of a local port with nothing listening on it.
pub async fn closed_port_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test listener");
    let addr = listener.local_addr().expect("local addr");
    drop(listener);
    format!("http://{addr}")
}

/// Response body that yields `chunks` with `delay` before each one.
pub fn chunked_body(chunks: Vec<String>, delay: Duration) -> Body {
    let stream = stream::iter(chunks).then(move |chunk| async move {
        tokio::time::sleep(delay).await;
        Ok::<_, io::Error>(Bytes::from(chunk))
    });
    Body::from_stream(stream)
}

/// In-memory reader that yields `chunks` as separate reads.
pub fn chunked_reader(
    chunks: &[&str],
) -> StreamReader<stream::Iter<std::vec::IntoIter<io::Result<Bytes>>>, Bytes> {
    let items: Vec<io::Result<Bytes>> = chunks
        .iter()
        .map(|chunk| Ok(Bytes::copy_from_slice(chunk.as_bytes())))
        .collect();
    StreamReader::new(stream::iter(items))
}

/// Client configuration for a test server.
pub fn test_config(base_url: &str, framing: FramingMode) -> ClientConfig {
    let mut config = ClientConfig {
        base_url: base_url.to_owned(),
        framing,
        request_timeout_seconds: 5,
        ..ClientConfig::default()
    };
    config.retry.base_delay_ms = 10;
    config
}

/// The three reads of a domain event split mid-key and mid-value.
pub fn three_fragments() -> [&'static str; 3] {
    [
        r#"{"respo"#,
        r#"nse": "{'order_id': '1', 'sender': 'A', 'receiver':'B','message':'hi','timestamp':'t','sta"#,
        r#"te':'DELIVERED'}"}"#,
    ]
}
