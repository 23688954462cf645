//! Conversation sessions for pawchat.
//!
//! A [`ConversationSession`] owns exactly one open conversation: it
//! composes the message store, the voice capture session and the
//! simulated counterpart responder behind a single send/receive surface,
//! and pushes state to the presentation layer through an event feed.

pub mod responder;
pub mod session;

pub use responder::{default_reply_pool, Responder};
pub use session::{
    ConversationSession, MediaKind, ReplyPolicy, SessionConfig, SessionEvent,
};
