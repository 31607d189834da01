// Error type for the Gemini provider client

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AiError {
    /// Transport-level failure talking to the API (connect, timeout, body read)
    #[error("API request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The API answered with a non-success status before any content
    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    /// The model was asked for structured JSON and returned something else
    #[error("malformed model output: {0}")]
    MalformedOutput(String),

    /// The incremental stream broke after it had started
    #[error("stream error: {0}")]
    Stream(String),
}
