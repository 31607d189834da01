// AI module for Gemini API integration
//
// This module provides:
// - Gemini API client with one-shot and streaming generation
// - Prompt text for chat, mood analysis, song picks and agent dispatch
// - The provider error taxonomy

pub mod error;
pub mod gemini_client;
pub mod prompts;

// Re-export commonly used types
pub use error::AiError;
pub use gemini_client::GeminiClient;
pub use prompts::CHAT_SYSTEM_PROMPT;
