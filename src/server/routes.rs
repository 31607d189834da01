// JSON API routes
// - /api/chat: one-shot chat completion
// - /api/recommend: mood analysis + five song picks (two model calls)
// - /api/agent: model decides an action, static tool runs it
// - /api/status: name/version probe

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::ServerState;
use crate::ai::{prompts, AiError, GeminiClient};
use crate::chat::Turn;
use crate::tools;

// ---- Request/Response types ----

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub messages: Option<Vec<Turn>>,
}

#[derive(Serialize)]
pub struct ChatResponse {
    pub success: bool,
    pub data: String,
}

#[derive(Serialize)]
pub struct ErrorBody {
    pub success: bool,
    pub message: String,
}

/// Mood blend as reported by the model. A client may echo the whole
/// object back on follow-up requests to skip re-detection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoodAnalysis {
    pub primary_mood: String,
    #[serde(default)]
    pub secondary_mood: Option<String>,
    pub energy_level: String,
    #[serde(default = "default_language")]
    pub language: String,
}

fn default_language() -> String {
    "English".to_string()
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Song {
    pub title: String,
    pub artist: String,
    pub reason: String,
    pub spotify_query: String,
    pub youtube_query: String,
}

#[derive(Debug, Deserialize)]
struct SongList {
    #[serde(default)]
    songs: Vec<Song>,
}

#[derive(Debug, Deserialize)]
pub struct RecommendRequest {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub mood: Option<MoodAnalysis>,
}

#[derive(Serialize)]
pub struct RecommendResponse {
    pub success: bool,
    pub mood: MoodAnalysis,
    pub songs: Vec<Song>,
}

#[derive(Debug, Deserialize)]
pub struct AgentRequest {
    #[serde(rename = "userText")]
    pub user_text: String,
}

#[derive(Serialize)]
pub struct AgentResponse {
    pub success: bool,
    pub result: serde_json::Value,
}

/// What the model answers on the agent-dispatch prompt
#[derive(Debug, Default, Deserialize)]
struct AgentDecision {
    #[serde(default)]
    action: String,
    #[serde(default)]
    params: AgentParams,
}

#[derive(Debug, Default, Deserialize)]
struct AgentParams {
    #[serde(default)]
    mood: Option<String>,
}

#[derive(Serialize)]
pub struct StatusResponse {
    pub name: String,
    pub version: String,
}

/// Uniform failure response: `{success:false, message}` with the status.
pub(super) fn fail(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorBody {
            success: false,
            message: message.into(),
        }),
    )
        .into_response()
}

fn ai_failure(what: &str, e: AiError) -> Response {
    eprintln!("[api] {} failed: {}", what, e);
    fail(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}

// ---- Route registration ----

pub fn api_routes() -> Router<Arc<ServerState>> {
    Router::new()
        .route("/api/status", get(get_status))
        .route("/api/chat", post(chat))
        .route("/api/recommend", post(recommend))
        .route("/api/agent", post(agent))
}

// ---- Handlers ----

async fn get_status() -> Json<StatusResponse> {
    Json(StatusResponse {
        name: "MoodTune".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// One-shot chat: same prompt assembly as the relay, whole reply at once.
async fn chat(State(state): State<Arc<ServerState>>, Json(body): Json<ChatRequest>) -> Response {
    let messages = match body.messages {
        Some(m) if !m.is_empty() => m,
        _ => return fail(StatusCode::BAD_REQUEST, "Messages are required"),
    };

    let prompt = prompts::build_chat_prompt(&messages);
    let client = GeminiClient::new(state.config.gemini_api_key.clone());

    match client.generate(&prompt).await {
        Ok(data) => Json(ChatResponse {
            success: true,
            data,
        })
        .into_response(),
        Err(e) => ai_failure("Chat generation", e),
    }
}

/// Mood detection (skipped when the caller already has one) followed by
/// a song-recommendation call; both constrained to JSON output.
async fn recommend(
    State(state): State<Arc<ServerState>>,
    Json(body): Json<RecommendRequest>,
) -> Response {
    let text = body.text.unwrap_or_default();
    let client = GeminiClient::new(state.config.gemini_api_key.clone());

    let mood = match body.mood {
        Some(mood) => mood,
        None => {
            if text.trim().is_empty() {
                return fail(StatusCode::BAD_REQUEST, "Text is required");
            }
            match client
                .generate_json::<MoodAnalysis>(&prompts::mood_prompt(&text))
                .await
            {
                Ok(mood) => mood,
                Err(e) => return ai_failure("Mood analysis", e),
            }
        }
    };

    let secondary = mood.secondary_mood.clone().unwrap_or_else(|| "null".to_string());
    let prompt = prompts::song_prompt(
        &text,
        &mood.primary_mood,
        &secondary,
        &mood.energy_level,
        &mood.language,
    );

    match client.generate_json::<SongList>(&prompt).await {
        Ok(list) => Json(RecommendResponse {
            success: true,
            mood,
            songs: list.songs,
        })
        .into_response(),
        Err(e) => ai_failure("Song recommendation", e),
    }
}

/// The model picks an action for the text; "recommendSongs" dispatches
/// to the static lookup tool, anything else is a no-op acknowledgement.
async fn agent(State(state): State<Arc<ServerState>>, Json(body): Json<AgentRequest>) -> Response {
    let client = GeminiClient::new(state.config.gemini_api_key.clone());

    let decision = match client
        .generate(&prompts::agent_decision_prompt(&body.user_text))
        .await
    {
        Ok(raw) => parse_decision(&raw),
        Err(e) => return ai_failure("Agent decision", e),
    };

    if decision.action == "recommendSongs" {
        let mood = decision.params.mood.unwrap_or_default();
        let result = tools::recommend_songs(&mood);
        return Json(AgentResponse {
            success: true,
            result: serde_json::json!({ "mood": result.mood, "songs": result.songs }),
        })
        .into_response();
    }

    Json(AgentResponse {
        success: true,
        result: serde_json::json!({ "message": "No action needed." }),
    })
    .into_response()
}

/// An unparseable decision downgrades to "no action", never a failure.
fn parse_decision(raw: &str) -> AgentDecision {
    GeminiClient::extract_json(raw)
        .ok()
        .and_then(|json| serde_json::from_str(&json).ok())
        .unwrap_or_default()
}
