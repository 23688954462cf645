//! Persistence for pawchat conversations.
//!
//! Two layers: a string-keyed [`KeyValueStore`] contract (any conforming
//! store is substitutable for the browser-local-storage shape), and the
//! [`ConversationStore`] that owns the ordered message lists for one
//! collection and writes the whole collection through on every mutation.

pub mod kv;
pub mod store;

pub use kv::{FileKeyValueStore, KeyValueStore, MemoryKeyValueStore};
pub use store::{load_conversations, save_conversations, ConversationStore};
