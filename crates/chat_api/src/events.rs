use serde::{Deserialize, Serialize};

/// One semantic event decoded from a stream frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// Incremental text fragment of the assistant reply.
    Token(String),
    /// Terminal failure reported by the backend.
    Error(String),
    /// Terminal completion signal.
    Done {
        tokens_used: Option<u64>,
        thinking: Option<String>,
    },
}

impl StreamEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Error(_) | Self::Done { .. })
    }
}

/// Raw JSON shape of one stream frame.
///
/// The backend sends exactly one of `token`, `error` and `done`. When a
/// misbehaving backend sends several, `error` wins over `done`, which wins over
/// `token`.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct StreamFrame {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    done: Option<bool>,
    #[serde(default)]
    tokens_used: Option<u64>,
    #[serde(default)]
    thinking: Option<String>,
}

impl StreamFrame {
    pub(crate) fn into_event(self) -> Option<StreamEvent> {
        if let Some(error) = self.error {
            return Some(StreamEvent::Error(error));
        }

        if self.done == Some(true) {
            return Some(StreamEvent::Done {
                tokens_used: self.tokens_used,
                thinking: self.thinking.filter(|value| !value.is_empty()),
            });
        }

        self.token.map(StreamEvent::Token)
    }
}

/// `GET /api/health` response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    #[serde(default)]
    pub model_loaded: bool,
}

/// Successful reply of a request/response chat exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatResponse {
    pub content: String,
    pub tokens_used: Option<u64>,
    /// Conversation id echoed by some backend revisions; informational only.
    pub conversation_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ChatResponseBody {
    #[serde(default)]
    pub response: Option<String>,
    #[serde(default)]
    pub tokens_used: Option<u64>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub conversation_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct NewConversationBody {
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}
