// Chat client core
//
// The client half of the streaming chat: conversation state, the
// cancellable stream-consumption loop, incremental UTF-8 decoding, and
// the transport seam the loop reads from.

pub mod decoder;
pub mod session;
pub mod transport;

use serde::{Deserialize, Serialize};

// Re-export commonly used types
pub use decoder::Utf8Decoder;
pub use session::{ChatSession, Phase, SessionHandle, StreamOutcome};
pub use transport::{ChatTransport, HttpTransport, StreamSetupError};

/// Who authored a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One message in a conversation. Content only changes while this is the
/// in-progress assistant turn of an open stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Turn {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Turn {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_turn_wire_shape() {
        let turn = Turn::user("Hi");
        let json = serde_json::to_string(&turn).unwrap();
        assert_eq!(json, r#"{"role":"user","content":"Hi"}"#);

        let back: Turn = serde_json::from_str(r#"{"role":"assistant","content":"Hello!"}"#).unwrap();
        assert_eq!(back, Turn::assistant("Hello!"));
    }
}
