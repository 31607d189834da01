// Transport seam between the chat session and the relay
//
// The session's read loop only sees a stream of byte chunks, so tests can
// feed it scripted fragments and the real implementation can be a plain
// HTTP POST against the relay's streaming endpoint.

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;

use super::Turn;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Failure before any content was streamed: unreachable relay, or a
/// non-success status on the response.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct StreamSetupError(pub String);

/// Byte chunks of one streaming exchange. An `Err` item is a mid-stream
/// read failure; the stream ends when the connection closes.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, String>> + Send>>;

/// Opens one streaming exchange for an outbound payload of turns.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn open(&self, turns: &[Turn]) -> Result<ByteStream, StreamSetupError>;
}

#[derive(Serialize)]
struct StreamRequest<'a> {
    messages: &'a [Turn],
}

/// Error body the relay sends on setup failures
#[derive(Deserialize)]
struct RelayFailure {
    message: String,
}

/// HTTP transport talking to the relay's streaming chat endpoint.
pub struct HttpTransport {
    base_url: String,
    client: reqwest::Client,
}

impl HttpTransport {
    /// `base_url` is the relay origin, e.g. "http://127.0.0.1:8380".
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            base_url: base_url.into(),
            client,
        }
    }
}

#[async_trait]
impl ChatTransport for HttpTransport {
    async fn open(&self, turns: &[Turn]) -> Result<ByteStream, StreamSetupError> {
        let url = format!("{}/api/chat/stream", self.base_url.trim_end_matches('/'));

        let response = self
            .client
            .post(&url)
            .json(&StreamRequest { messages: turns })
            .send()
            .await
            .map_err(|e| StreamSetupError(format!("Failed to stream response: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            // Setup failures carry a JSON {success, message} body
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<RelayFailure>(&body)
                .map(|f| f.message)
                .unwrap_or_else(|_| format!("Failed to stream response: HTTP {}", status));
            return Err(StreamSetupError(message));
        }

        Ok(Box::pin(
            response.bytes_stream().map(|item| item.map_err(|e| e.to_string())),
        ))
    }
}
