// Process-wide configuration
//
// A single required credential (GEMINI_API_KEY) plus the server port,
// read once at startup and shared read-only. Request handlers construct
// short-lived API clients from this; nothing here is mutated after boot.

const API_KEY_ENV: &str = "GEMINI_API_KEY";
const PORT_ENV: &str = "MOODTUNE_PORT";
const DEFAULT_PORT: u16 = 8380;

/// Immutable application configuration, loaded from the environment.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub gemini_api_key: String,
    pub port: u16,
}

impl AppConfig {
    /// Load configuration from the environment.
    /// Fails with a readable message when the API key is missing or blank.
    pub fn from_env() -> Result<Self, String> {
        let gemini_api_key = std::env::var(API_KEY_ENV)
            .map_err(|_| format!("{} is not set. Export your Gemini API key.", API_KEY_ENV))?;

        if gemini_api_key.trim().is_empty() {
            return Err(format!("{} is set but empty", API_KEY_ENV));
        }

        let port = match std::env::var(PORT_ENV) {
            Ok(raw) => raw
                .parse::<u16>()
                .map_err(|_| format!("{} must be a port number, got {:?}", PORT_ENV, raw))?,
            Err(_) => DEFAULT_PORT,
        };

        Ok(AppConfig {
            gemini_api_key,
            port,
        })
    }
}
