// Prompt text for the Gemini-backed features
//
// Everything the model is told lives here: the chat system instruction,
// the flattened conversation format, and the JSON-only prompts for mood
// analysis, song recommendation and agent dispatch.

use crate::chat::{Role, Turn};

/// System instruction prepended to every chat conversation.
pub const CHAT_SYSTEM_PROMPT: &str = "You are a helpful assistant. Reply in simple English. \
Do not use markdown symbols like ** or #. Use plain text only.";

/// Flatten a conversation into a single Gemini-friendly prompt:
/// one "System:" line followed by one "User:"/"Assistant:" line per turn,
/// newline-joined, preserving input order.
pub fn build_chat_prompt(turns: &[Turn]) -> String {
    let mut lines = Vec::with_capacity(turns.len() + 1);
    lines.push(format!("System: {}", CHAT_SYSTEM_PROMPT));
    for turn in turns {
        let who = match turn.role {
            Role::User => "User",
            Role::Assistant => "Assistant",
        };
        lines.push(format!("{}: {}", who, turn.content));
    }
    lines.join("\n")
}

/// Mood-analysis prompt. The model must answer with bare JSON.
pub fn mood_prompt(text: &str) -> String {
    format!(
        r#"You are an advanced mood analyzer.

Return ONLY valid JSON:
{{
  "primaryMood": "romantic|happy|sad|angry|chill",
  "secondaryMood": "romantic|happy|sad|angry|chill|null",
  "energyLevel": "low|medium|high",
  "language": "Hindi|English"
}}

Rules:
- Detect compound moods if present (e.g. romantic + sad)
- Detect song language preference from text
- If unsure, default language to English

User text:
{}"#,
        text
    )
}

/// Song-recommendation prompt, parameterized by the detected mood blend.
pub fn song_prompt(text: &str, primary: &str, secondary: &str, energy: &str, language: &str) -> String {
    format!(
        r#"You are a music recommendation assistant.

Return ONLY valid JSON:
{{
  "songs": [
    {{
      "title": "string",
      "artist": "string",
      "reason": "string",
      "spotifyQuery": "string",
      "youtubeQuery": "string"
    }}
  ]
}}

Rules:
- Return EXACTLY 5 songs
- Songs MUST be in {language}
- Match the mood blend:
  Primary: {primary}
  Secondary: {secondary}
- Energy: {energy}
- Avoid repeating previous songs
- Give fresh recommendations every time

spotifyQuery format:
"title artist"

youtubeQuery format:
"title artist official audio"

User text:
{text}"#,
    )
}

/// Agent-dispatch prompt: the model picks an action for the given text.
pub fn agent_decision_prompt(user_text: &str) -> String {
    format!(
        r#"You are an AI agent.
Decide which action to take based on user text.

Return ONLY valid JSON:
{{
"action": "recommendSongs | none",
"params": {{ "mood": "romantic|sad|happy|angry" }}
}}

User text:
{}"#,
        user_text
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_prompt_format() {
        let turns = vec![
            Turn::user("Hi"),
            Turn::assistant("Hello!"),
            Turn::user("How are you?"),
        ];

        let prompt = build_chat_prompt(&turns);
        let lines: Vec<&str> = prompt.lines().collect();

        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("System: You are a helpful assistant."));
        assert_eq!(lines[1], "User: Hi");
        assert_eq!(lines[2], "Assistant: Hello!");
        assert_eq!(lines[3], "User: How are you?");
    }

    #[test]
    fn test_chat_prompt_preserves_order() {
        let turns = vec![Turn::user("a"), Turn::user("b"), Turn::user("c")];
        let prompt = build_chat_prompt(&turns);
        assert!(prompt.ends_with("User: a\nUser: b\nUser: c"));
    }

    #[test]
    fn test_song_prompt_interpolation() {
        let prompt = song_prompt("rainy evening", "romantic", "sad", "low", "Hindi");
        assert!(prompt.contains("Songs MUST be in Hindi"));
        assert!(prompt.contains("Primary: romantic"));
        assert!(prompt.contains("Secondary: sad"));
        assert!(prompt.contains("Energy: low"));
        assert!(prompt.contains("rainy evening"));
    }
}
