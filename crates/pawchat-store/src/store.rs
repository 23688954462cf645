use std::sync::Arc;

use pawchat_types::{
    ChatError, ChatResult, Conversation, CounterpartProfile, Deletion, Message, MessageId,
    MessageStatus,
};

use crate::kv::KeyValueStore;

/// Load a conversation collection. Absent keys and unparseable content
/// both yield an empty list; a missing or corrupt collection is never
/// fatal.
pub fn load_conversations(store: &dyn KeyValueStore, key: &str) -> Vec<Conversation> {
    match store.get(key) {
        Ok(Some(raw)) => serde_json::from_str(&raw).unwrap_or_default(),
        Ok(None) | Err(_) => Vec::new(),
    }
}

/// Serialize and overwrite the entire collection. No partial merge:
/// callers supply the full, already-merged list.
pub fn save_conversations(
    store: &dyn KeyValueStore,
    key: &str,
    conversations: &[Conversation],
) -> ChatResult<()> {
    let json = serde_json::to_string_pretty(conversations)
        .map_err(|e| ChatError::PersistenceUnavailable(e.to_string()))?;
    store.set(key, &json)
}

/// Authoritative ordered message lists for one collection key.
///
/// All reads and writes funnel through here. Every mutation serializes
/// the full collection back through the adapter; when a write fails, the
/// in-memory state stays authoritative for the session and the error is
/// returned for reporting, not escalated.
pub struct ConversationStore {
    adapter: Arc<dyn KeyValueStore>,
    collection_key: String,
    conversations: Vec<Conversation>,
    last_id: i64,
}

impl ConversationStore {
    /// Open the store for `collection_key`, hydrating from the adapter.
    pub fn open(adapter: Arc<dyn KeyValueStore>, collection_key: impl Into<String>) -> Self {
        let collection_key = collection_key.into();
        let conversations = load_conversations(adapter.as_ref(), &collection_key);
        let last_id = conversations
            .iter()
            .flat_map(|c| c.messages.iter())
            .map(|m| m.id.0)
            .max()
            .unwrap_or(0);

        Self {
            adapter,
            collection_key,
            conversations,
            last_id,
        }
    }

    /// Allocate the next message id, strictly greater than any handed
    /// out before.
    pub fn next_id(&mut self) -> MessageId {
        let id = MessageId::next_after(self.last_id);
        self.last_id = id.0;
        id
    }

    pub fn conversations(&self) -> &[Conversation] {
        &self.conversations
    }

    pub fn conversation(&self, counterpart_id: &str) -> Option<&Conversation> {
        self.conversations
            .iter()
            .find(|c| c.counterpart_id == counterpart_id)
    }

    /// Snapshot of one conversation's messages, for rendering.
    pub fn messages(&self, counterpart_id: &str) -> Vec<Message> {
        self.conversation(counterpart_id)
            .map(|c| c.messages.clone())
            .unwrap_or_default()
    }

    /// Append at the end of the counterpart's conversation, creating it
    /// lazily on first send. Messages land in the order their producing
    /// operation completes; no cross-operation ordering is imposed.
    ///
    /// The message is kept in memory even when the write-through fails.
    pub fn append(&mut self, profile: &CounterpartProfile, message: Message) -> ChatResult<()> {
        let idx = match self
            .conversations
            .iter()
            .position(|c| c.counterpart_id == profile.id)
        {
            Some(idx) => idx,
            None => {
                self.conversations.push(Conversation::new(profile));
                self.conversations.len() - 1
            }
        };
        self.last_id = self.last_id.max(message.id.0);
        self.conversations[idx].messages.push(message);
        self.persist()
    }

    /// Advance a message's delivery status. Backward and sideways
    /// transitions are ignored; only a forward move mutates and persists.
    /// Returns whether the status changed.
    pub fn update_status(
        &mut self,
        counterpart_id: &str,
        id: MessageId,
        new_status: MessageStatus,
    ) -> ChatResult<bool> {
        let Some(message) = self
            .conversations
            .iter_mut()
            .find(|c| c.counterpart_id == counterpart_id)
            .and_then(|c| c.message_mut(id))
        else {
            return Ok(false);
        };

        if !message.status.can_advance_to(new_status) {
            return Ok(false);
        }
        message.status = new_status;
        self.persist().map(|_| true)
    }

    /// Mark a message deleted. The payload is not purged; rendering is
    /// responsible for showing the placeholder. In this single-client
    /// setting "for everyone" and "for me" differ only in the rendered
    /// placeholder.
    pub fn soft_delete(
        &mut self,
        counterpart_id: &str,
        id: MessageId,
        for_everyone: bool,
    ) -> ChatResult<bool> {
        let Some(message) = self
            .conversations
            .iter_mut()
            .find(|c| c.counterpart_id == counterpart_id)
            .and_then(|c| c.message_mut(id))
        else {
            return Ok(false);
        };

        message.deleted = Some(Deletion { for_everyone });
        self.persist().map(|_| true)
    }

    fn persist(&self) -> ChatResult<()> {
        save_conversations(self.adapter.as_ref(), &self.collection_key, &self.conversations)
    }
}
