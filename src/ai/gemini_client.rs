// Gemini API client with streaming support
//
// Implements communication with Google's Generative Language API for:
// - One-shot text generation (chat, mood analysis, song picks)
// - Incremental generation over SSE for the streaming chat relay
// - JSON extraction for prompts that demand structured output

use futures::{Stream, StreamExt};
use reqwest::{header, Client};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::error::AiError;

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
const GEMINI_MODEL: &str = "gemini-3-flash-preview";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Request to the Gemini generateContent endpoints
#[derive(Debug, Serialize)]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
}

#[derive(Debug, Serialize)]
struct GeminiContent {
    role: &'static str,
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize)]
struct GeminiPart {
    text: String,
}

impl GeminiRequest {
    /// The whole conversation is flattened into one prompt string upstream,
    /// so every request is a single user content with a single text part.
    fn from_prompt(prompt: &str) -> Self {
        GeminiRequest {
            contents: vec![GeminiContent {
                role: "user",
                parts: vec![GeminiPart {
                    text: prompt.to_string(),
                }],
            }],
        }
    }
}

/// Response from Gemini (whole responses and stream chunks share this shape)
#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: CandidateContent,
}

#[derive(Debug, Default, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: String,
}

impl GenerateResponse {
    /// Concatenated text of all candidate parts, in order.
    fn text(self) -> String {
        self.candidates
            .into_iter()
            .flat_map(|c| c.content.parts)
            .map(|p| p.text)
            .collect()
    }
}

pub struct GeminiClient {
    api_key: String,
    client: Client,
}

impl GeminiClient {
    /// Create a new Gemini client with the given API key.
    /// Cheap to construct; handlers build one per request.
    pub fn new(api_key: String) -> Self {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .expect("Failed to create HTTP client");

        Self { api_key, client }
    }

    /// Generate a complete response for the prompt (no streaming).
    pub async fn generate(&self, prompt: &str) -> Result<String, AiError> {
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            GEMINI_API_BASE, GEMINI_MODEL, self.api_key
        );

        let response = self
            .client
            .post(&url)
            .header(header::CONTENT_TYPE, "application/json")
            .timeout(REQUEST_TIMEOUT)
            .json(&GeminiRequest::from_prompt(prompt))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AiError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: GenerateResponse = response.json().await?;
        Ok(parsed.text())
    }

    /// Generate a response that the prompt constrains to JSON, and parse it.
    /// The model occasionally wraps JSON in markdown fences; those are
    /// stripped before parsing.
    pub async fn generate_json<T: DeserializeOwned>(&self, prompt: &str) -> Result<T, AiError> {
        let raw = self.generate(prompt).await?;
        let json = Self::extract_json(&raw)?;
        serde_json::from_str::<T>(&json).map_err(|e| AiError::MalformedOutput(e.to_string()))
    }

    /// Open an incremental generation stream for the prompt.
    ///
    /// Returns after response headers arrive, so a failed call surfaces as
    /// `Err` here (setup failure) rather than inside the stream. Items are
    /// the incremental text fragments; an `Err` item means the stream broke
    /// after it had started.
    pub async fn generate_stream(
        &self,
        prompt: &str,
    ) -> Result<impl Stream<Item = Result<String, AiError>> + Send, AiError> {
        // alt=sse gives newline-framed "data: {json}" events
        let url = format!(
            "{}/models/{}:streamGenerateContent?alt=sse&key={}",
            GEMINI_API_BASE, GEMINI_MODEL, self.api_key
        );

        let response = self
            .client
            .post(&url)
            .header(header::CONTENT_TYPE, "application/json")
            .json(&GeminiRequest::from_prompt(prompt))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AiError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let mut bytes = response.bytes_stream();

        Ok(async_stream::stream! {
            // Buffer bytes, not text: a multi-byte character can be split
            // across network chunks, but never across a complete line
            let mut buffer: Vec<u8> = Vec::new();

            while let Some(chunk) = bytes.next().await {
                let chunk = match chunk {
                    Ok(c) => c,
                    Err(e) => {
                        yield Err(AiError::Stream(e.to_string()));
                        return;
                    }
                };

                buffer.extend_from_slice(&chunk);

                while let Some(pos) = buffer.iter().position(|&b| b == b'\n') {
                    let line_bytes: Vec<u8> = buffer.drain(..=pos).collect();
                    if let Some(text) = event_text(&line_bytes) {
                        yield Ok(text);
                    }
                }
            }

            // Trailing event without a final newline
            if let Some(text) = event_text(&buffer) {
                yield Ok(text);
            }
        })
    }

    /// Extract JSON from response text (handles markdown code blocks)
    pub fn extract_json(text: &str) -> Result<String, AiError> {
        // Try to find JSON in a ```json code block
        if let Some(start) = text.find("```json") {
            let json_start = start + 7;
            if let Some(end) = text[json_start..].find("```") {
                let json_end = json_start + end;
                return Ok(text[json_start..json_end].trim().to_string());
            }
        }

        // Try a generic code block
        if let Some(start) = text.find("```\n") {
            let json_start = start + 4;
            if let Some(end) = text[json_start..].find("```") {
                let json_end = json_start + end;
                return Ok(text[json_start..json_end].trim().to_string());
            }
        }

        // Try raw JSON object
        if let Some(start) = text.find('{') {
            if let Some(end) = text.rfind('}') {
                return Ok(text[start..=end].trim().to_string());
            }
        }

        Err(AiError::MalformedOutput(
            "no JSON found in response".to_string(),
        ))
    }
}

/// Extract the payload of an SSE "data: ..." line, if it is one.
fn parse_sse_line(line: &str) -> Option<&str> {
    line.strip_prefix("data: ").map(|s| s.trim())
}

/// Decode one buffered line and pull its fragment text, if any.
fn event_text(line_bytes: &[u8]) -> Option<String> {
    let line = std::str::from_utf8(line_bytes).ok()?.trim();
    let data = parse_sse_line(line)?;
    chunk_text(data).filter(|text| !text.is_empty())
}

/// Pull the incremental text out of one SSE data payload.
/// Unparseable payloads are dropped rather than failing the stream.
fn chunk_text(data: &str) -> Option<String> {
    serde_json::from_str::<GenerateResponse>(data)
        .ok()
        .map(|r| r.text())
}
