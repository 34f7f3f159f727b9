use conversation_store::{ConversationStore, Message};

/// Ordered transcript of the active conversation.
///
/// Every mutation is written through to the [`ConversationStore`] once a
/// conversation id is active, in the order the mutations happen.
#[derive(Debug)]
pub struct MessageLog {
    conversation_id: Option<String>,
    messages: Vec<Message>,
    store: ConversationStore,
}

impl MessageLog {
    pub fn new(store: ConversationStore) -> Self {
        Self {
            conversation_id: None,
            messages: Vec::new(),
            store,
        }
    }

    /// Log positioned on the most recently active stored conversation, if any.
    pub fn restored(store: ConversationStore) -> Self {
        let mut log = Self::new(store);
        if let Some(conversation) = log.store.last_conversation().cloned() {
            tracing::debug!(
                conversation_id = %conversation.id,
                messages = conversation.messages.len(),
                "restored last conversation"
            );
            log.reset(Some(conversation.id), conversation.messages);
        }
        log
    }

    pub fn conversation_id(&self) -> Option<&str> {
        self.conversation_id.as_deref()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn find_by_id(&self, id: &str) -> Option<&Message> {
        self.messages
            .iter()
            .find(|message| message.id.as_deref() == Some(id))
    }

    pub fn store(&self) -> &ConversationStore {
        &self.store
    }

    pub fn append(&mut self, message: Message) {
        self.messages.push(message);
        self.persist();
    }

    /// Apply `updater` to the message with `id`. Returns `false` and leaves the
    /// log untouched when no such message exists.
    pub fn update_by_id<F>(&mut self, id: &str, updater: F) -> bool
    where
        F: FnOnce(&mut Message),
    {
        let Some(message) = self
            .messages
            .iter_mut()
            .find(|message| message.id.as_deref() == Some(id))
        else {
            tracing::trace!(id, "update for unknown message ignored");
            return false;
        };

        updater(message);
        self.persist();
        true
    }

    /// Switch to another conversation without writing anything.
    pub fn reset(&mut self, conversation_id: Option<String>, messages: Vec<Message>) {
        self.conversation_id = conversation_id;
        self.messages = messages;
    }

    /// Bind the current messages to `conversation_id` and persist them.
    pub fn register_conversation(&mut self, conversation_id: String) {
        self.conversation_id = Some(conversation_id);
        self.persist();
    }

    fn persist(&mut self) {
        if let Some(conversation_id) = self.conversation_id.as_deref() {
            self.store.upsert(conversation_id, &self.messages);
        }
    }
}
