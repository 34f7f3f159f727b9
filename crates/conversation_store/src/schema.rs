use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    Error,
}

/// One transcript entry.
///
/// Only messages that receive later updates (streamed assistant replies) carry
/// an `id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking: Option<String>,
}

impl Message {
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(None, Role::User, content)
    }

    #[must_use]
    pub fn assistant(id: Option<String>, content: impl Into<String>) -> Self {
        Self::new(id, Role::Assistant, content)
    }

    #[must_use]
    pub fn error(content: impl Into<String>) -> Self {
        Self::new(None, Role::Error, content)
    }

    #[must_use]
    pub fn with_tokens(mut self, tokens: Option<u64>) -> Self {
        self.tokens = tokens;
        self
    }

    #[must_use]
    pub fn with_thinking(mut self, thinking: Option<String>) -> Self {
        self.thinking = thinking;
        self
    }

    fn new(id: Option<String>, role: Role, content: impl Into<String>) -> Self {
        Self {
            id,
            role,
            content: content.into(),
            tokens: None,
            thinking: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    #[serde(default)]
    pub messages: Vec<Message>,
}

impl Conversation {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            messages: Vec::new(),
        }
    }
}

/// The persisted record: every cached conversation plus the most recently
/// active one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreSnapshot {
    #[serde(default)]
    pub conversations: BTreeMap<String, Conversation>,
    #[serde(default)]
    pub last_conversation_id: Option<String>,
}

impl StoreSnapshot {
    /// Restores the record invariants after reading untrusted input: map keys
    /// and conversation ids agree, and `last_conversation_id` names an entry.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        for (key, conversation) in &mut self.conversations {
            if conversation.id != *key {
                conversation.id = key.clone();
            }
        }

        if self
            .last_conversation_id
            .as_ref()
            .is_some_and(|id| !self.conversations.contains_key(id))
        {
            self.last_conversation_id = None;
        }

        self
    }

    #[must_use]
    pub fn last_conversation(&self) -> Option<&Conversation> {
        self.last_conversation_id
            .as_ref()
            .and_then(|id| self.conversations.get(id))
    }
}
