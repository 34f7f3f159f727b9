use std::sync::Arc;

use crate::error::StoreError;
use crate::schema::{Conversation, Message, StoreSnapshot};
use crate::storage::StorageBackend;

/// Storage key of the single conversation record.
pub const STORE_KEY: &str = "gene_chat_conversations";

/// Local cache of conversation transcripts.
///
/// Reads never fail: absent or corrupt records load as an empty snapshot.
/// Writes are best-effort through [`ConversationStore::save`]; callers that
/// need to observe failures use [`ConversationStore::try_save`].
pub struct ConversationStore {
    storage: Arc<dyn StorageBackend>,
    key: String,
    snapshot: StoreSnapshot,
}

impl ConversationStore {
    pub fn open(storage: Arc<dyn StorageBackend>) -> Self {
        Self::with_key(storage, STORE_KEY)
    }

    pub fn with_key(storage: Arc<dyn StorageBackend>, key: impl Into<String>) -> Self {
        let mut store = Self {
            storage,
            key: key.into(),
            snapshot: StoreSnapshot::default(),
        };
        store.snapshot = store.load();
        store
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Read the persisted record from storage.
    pub fn load(&self) -> StoreSnapshot {
        let raw = match self.storage.read(&self.key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return StoreSnapshot::default(),
            Err(error) => {
                tracing::warn!(%error, key = %self.key, "failed to read conversation store");
                return StoreSnapshot::default();
            }
        };

        match serde_json::from_str::<StoreSnapshot>(&raw) {
            Ok(snapshot) => snapshot.normalized(),
            Err(error) => {
                tracing::warn!(%error, key = %self.key, "discarding unreadable conversation store");
                StoreSnapshot::default()
            }
        }
    }

    pub fn try_save(&self, snapshot: &StoreSnapshot) -> Result<(), StoreError> {
        let raw = serde_json::to_string(snapshot)
            .map_err(|source| StoreError::json_serialize(&self.key, source))?;
        self.storage.write(&self.key, &raw)
    }

    pub fn save(&self, snapshot: &StoreSnapshot) {
        if let Err(error) = self.try_save(snapshot) {
            tracing::warn!(%error, key = %self.key, "failed to persist conversation store");
        }
    }

    /// Replace the transcript of `conversation_id`, mark it as the last active
    /// conversation, and persist.
    pub fn upsert(&mut self, conversation_id: &str, messages: &[Message]) {
        let conversation = self
            .snapshot
            .conversations
            .entry(conversation_id.to_owned())
            .or_insert_with(|| Conversation::new(conversation_id));
        conversation.messages = messages.to_vec();
        self.snapshot.last_conversation_id = Some(conversation_id.to_owned());

        tracing::trace!(
            conversation_id,
            messages = messages.len(),
            "conversation transcript updated"
        );
        self.save(&self.snapshot);
    }

    pub fn snapshot(&self) -> &StoreSnapshot {
        &self.snapshot
    }

    pub fn conversation(&self, conversation_id: &str) -> Option<&Conversation> {
        self.snapshot.conversations.get(conversation_id)
    }

    pub fn last_conversation(&self) -> Option<&Conversation> {
        self.snapshot.last_conversation()
    }
}

impl std::fmt::Debug for ConversationStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationStore")
            .field("key", &self.key)
            .field("snapshot", &self.snapshot)
            .finish_non_exhaustive()
    }
}
