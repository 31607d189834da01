// Streaming chat relay
// - Validates the inbound turn list (400 before any upstream call)
// - Flattens the conversation into one prompt
// - Forwards upstream fragments as a raw text/plain byte stream,
//   flushed per fragment, no framing
// - Upstream failure after headers committed stays in-band as a
//   visible marker; the status is already 200 by then

use axum::{
    body::Body,
    extract::State,
    http::{header, StatusCode},
    response::Response,
    routing::post,
    Json, Router,
};
use bytes::Bytes;
use futures::{Stream, StreamExt};
use serde::Deserialize;
use std::convert::Infallible;
use std::sync::Arc;

use super::routes::fail;
use super::ServerState;
use crate::ai::{prompts, GeminiClient};
use crate::chat::Turn;

/// Appended to the outbound stream when upstream breaks mid-generation.
const STREAM_ERROR_MARKER: &str = "\n[Streaming error]";

#[derive(Debug, Deserialize)]
pub struct ChatStreamRequest {
    #[serde(default)]
    pub messages: Option<Vec<Turn>>,
}

pub fn stream_routes() -> Router<Arc<ServerState>> {
    Router::new().route("/api/chat/stream", post(chat_stream))
}

async fn chat_stream(
    State(state): State<Arc<ServerState>>,
    Json(body): Json<ChatStreamRequest>,
) -> Response {
    let messages = match body.messages {
        Some(m) if !m.is_empty() => m,
        _ => return fail(StatusCode::BAD_REQUEST, "Messages are required"),
    };

    let prompt = prompts::build_chat_prompt(&messages);

    // Short-lived client per request; the only shared state is the
    // read-only credential in the config
    let client = GeminiClient::new(state.config.gemini_api_key.clone());

    let upstream = match client.generate_stream(&prompt).await {
        Ok(stream) => stream,
        Err(e) => {
            eprintln!("[relay] Upstream setup failed: {}", e);
            return fail(StatusCode::INTERNAL_SERVER_ERROR, e.to_string());
        }
    };

    eprintln!("[relay] Stream opened ({} turns in payload)", messages.len());

    match Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
        .header(header::CACHE_CONTROL, "no-cache")
        .body(Body::from_stream(relay_body(upstream)))
    {
        Ok(response) => response,
        Err(e) => fail(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

/// Re-encode upstream fragments as outbound bytes, in arrival order.
/// A mid-stream upstream error yields the visible marker and ends the
/// stream; the partial output already sent stays delivered. The stream
/// always terminates, so the response body closes exactly once.
fn relay_body<S, E>(upstream: S) -> impl Stream<Item = Result<Bytes, Infallible>>
where
    S: Stream<Item = Result<String, E>>,
    E: std::fmt::Display,
{
    async_stream::stream! {
        futures::pin_mut!(upstream);

        while let Some(item) = upstream.next().await {
            match item {
                Ok(text) => {
                    if !text.is_empty() {
                        yield Ok(Bytes::from(text));
                    }
                }
                Err(e) => {
                    eprintln!("[relay] Upstream failed mid-stream: {}", e);
                    yield Ok(Bytes::from(STREAM_ERROR_MARKER));
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;

    fn test_state() -> Arc<ServerState> {
        Arc::new(ServerState {
            config: AppConfig {
                gemini_api_key: "test-key".to_string(),
                port: 0,
            },
        })
    }

    async fn collect(stream: impl Stream<Item = Result<Bytes, Infallible>>) -> String {
        futures::pin_mut!(stream);
        let mut out = Vec::new();
        while let Some(item) = stream.next().await {
            let bytes = item.unwrap();
            out.extend_from_slice(&bytes);
        }
        String::from_utf8(out).unwrap()
    }

    #[tokio::test]
    async fn test_empty_messages_rejected_before_upstream() {
        let response = chat_stream(
            State(test_state()),
            Json(ChatStreamRequest {
                messages: Some(Vec::new()),
            }),
        )
        .await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_missing_messages_rejected_before_upstream() {
        let response =
            chat_stream(State(test_state()), Json(ChatStreamRequest { messages: None })).await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed["success"], false);
        assert_eq!(parsed["message"], "Messages are required");
    }

    #[tokio::test]
    async fn test_relay_body_passes_fragments_through() {
        let upstream =
            futures::stream::iter(vec![Ok::<_, String>("Hi".to_string()), Ok("!".to_string())]);
        assert_eq!(collect(relay_body(upstream)).await, "Hi!");
    }

    #[tokio::test]
    async fn test_relay_body_marks_midstream_failure_in_band() {
        let upstream = futures::stream::iter(vec![
            Ok("Hel".to_string()),
            Ok("lo".to_string()),
            Err("upstream died".to_string()),
        ]);

        assert_eq!(
            collect(relay_body(upstream)).await,
            "Hello\n[Streaming error]"
        );
    }

    #[tokio::test]
    async fn test_relay_body_skips_empty_fragments() {
        let upstream = futures::stream::iter(vec![
            Ok::<_, String>(String::new()),
            Ok("ok".to_string()),
        ]);
        assert_eq!(collect(relay_body(upstream)).await, "ok");
    }
}
