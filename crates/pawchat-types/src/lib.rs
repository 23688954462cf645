//! Core types and structures for pawchat
//!
//! This crate provides the foundational types used across all pawchat crates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Constants
// ============================================================================

/// Recordings shorter than this many seconds are discarded, never sent
pub const MIN_RECORDING_SECS: u32 = 1;

/// Lower bound of the simulated reply delay, in milliseconds
pub const DEFAULT_REPLY_DELAY_MIN_MS: u64 = 1_000;

/// Upper bound of the simulated reply delay, in milliseconds
pub const DEFAULT_REPLY_DELAY_MAX_MS: u64 = 3_000;

// ============================================================================
// Identifiers
// ============================================================================

/// Message identifier, unique and sortable within a conversation.
///
/// Derived from epoch milliseconds; collisions with an earlier id are
/// resolved by bumping past it, so creation order and id order agree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub i64);

impl MessageId {
    /// Next id after `last`, anchored to the current wall clock.
    pub fn next_after(last: i64) -> Self {
        MessageId(Utc::now().timestamp_millis().max(last + 1))
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Message Types
// ============================================================================

/// Delivery state of a user-authored message.
///
/// Moves only forward: `Sent` -> `Delivered` -> `Read`. Counterpart
/// messages are created directly as `Delivered`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    Sent,
    Delivered,
    Read,
}

impl MessageStatus {
    /// True if moving from `self` to `next` is a forward transition.
    pub fn can_advance_to(self, next: MessageStatus) -> bool {
        next > self
    }
}

impl std::fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageStatus::Sent => write!(f, "sent"),
            MessageStatus::Delivered => write!(f, "delivered"),
            MessageStatus::Read => write!(f, "read"),
        }
    }
}

/// Message payload, discriminated by `kind`.
///
/// Binary payloads (`data`) are carried as base64 strings so the whole
/// message serializes as one JSON document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum MessageBody {
    Text {
        content: String,
    },
    Image {
        data: String,
        file_name: String,
        file_size: u64,
    },
    File {
        data: String,
        file_name: String,
        file_size: u64,
    },
    Audio {
        data: String,
        duration_secs: u32,
    },
}

impl MessageBody {
    pub fn kind(&self) -> &'static str {
        match self {
            MessageBody::Text { .. } => "text",
            MessageBody::Image { .. } => "image",
            MessageBody::File { .. } => "file",
            MessageBody::Audio { .. } => "audio",
        }
    }

    /// Short human-readable preview of the payload.
    pub fn preview(&self) -> String {
        match self {
            MessageBody::Text { content } => content.clone(),
            MessageBody::Image { file_name, .. } => format!("[image: {}]", file_name),
            MessageBody::File {
                file_name,
                file_size,
                ..
            } => format!("[file: {} ({} bytes)]", file_name, file_size),
            MessageBody::Audio { duration_secs, .. } => {
                format!("[voice message {}]", format_duration(*duration_secs))
            }
        }
    }
}

/// Soft-delete mark. The payload may remain in storage but must never
/// render once this is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deletion {
    pub for_everyone: bool,
}

/// A single authored unit within a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub from_user: bool,
    #[serde(flatten)]
    pub body: MessageBody,
    pub status: MessageStatus,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub deleted: Option<Deletion>,
}

impl Message {
    /// Build a locally authored message, starting in `Sent`.
    pub fn from_user(id: MessageId, body: MessageBody) -> Self {
        Self {
            id,
            from_user: true,
            body,
            status: MessageStatus::Sent,
            created_at: Utc::now(),
            deleted: None,
        }
    }

    /// Build a counterpart-authored message, created directly as `Delivered`.
    pub fn from_counterpart(id: MessageId, body: MessageBody) -> Self {
        Self {
            id,
            from_user: false,
            body,
            status: MessageStatus::Delivered,
            created_at: Utc::now(),
            deleted: None,
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted.is_some()
    }

    /// Text to render for this message. Deleted messages render a
    /// placeholder, never their payload.
    pub fn render_text(&self) -> String {
        match self.deleted {
            Some(Deletion { for_everyone: true }) => "This message was deleted".to_string(),
            Some(Deletion {
                for_everyone: false,
            }) => "You deleted this message".to_string(),
            None => self.body.preview(),
        }
    }
}

// ============================================================================
// Conversation Types
// ============================================================================

/// Identity of the party on the other side of a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CounterpartProfile {
    pub id: String,
    pub display_name: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub online: bool,
}

impl CounterpartProfile {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            avatar: None,
            online: true,
        }
    }
}

/// The full message history with one counterpart.
///
/// Created lazily on first send, persisted on every mutation, never
/// explicitly deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub counterpart_id: String,
    pub display_name: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub online: bool,
    pub messages: Vec<Message>,
}

impl Conversation {
    pub fn new(profile: &CounterpartProfile) -> Self {
        Self {
            counterpart_id: profile.id.clone(),
            display_name: profile.display_name.clone(),
            avatar: profile.avatar.clone(),
            online: profile.online,
            messages: Vec::new(),
        }
    }

    pub fn message(&self, id: MessageId) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == id)
    }

    pub fn message_mut(&mut self, id: MessageId) -> Option<&mut Message> {
        self.messages.iter_mut().find(|m| m.id == id)
    }
}

// ============================================================================
// Recording Types
// ============================================================================

/// A recorded-but-unsent audio payload awaiting user confirmation.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioPreview {
    pub data: String,
    pub duration_secs: u32,
}

/// Capture state machine. Transient, never persisted.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum RecorderState {
    #[default]
    Idle,
    Requesting,
    Recording {
        elapsed_secs: u32,
    },
    Stopped {
        preview: AudioPreview,
    },
}

/// Flat view of the recorder for presentation layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecorderSnapshot {
    pub is_recording: bool,
    pub elapsed_secs: u32,
    pub has_preview: bool,
}

impl RecorderState {
    pub fn snapshot(&self) -> RecorderSnapshot {
        match self {
            RecorderState::Idle | RecorderState::Requesting => RecorderSnapshot {
                is_recording: false,
                elapsed_secs: 0,
                has_preview: false,
            },
            RecorderState::Recording { elapsed_secs } => RecorderSnapshot {
                is_recording: true,
                elapsed_secs: *elapsed_secs,
                has_preview: false,
            },
            RecorderState::Stopped { preview } => RecorderSnapshot {
                is_recording: false,
                elapsed_secs: preview.duration_secs,
                has_preview: true,
            },
        }
    }
}

/// Render a duration in seconds as `M:SS` (e.g. 3 -> "0:03").
pub fn format_duration(secs: u32) -> String {
    format!("{}:{:02}", secs / 60, secs % 60)
}

// ============================================================================
// Errors
// ============================================================================

/// Error taxonomy for the messaging core.
///
/// None of these are fatal to the application; the worst case is an
/// unsent or unpersisted message.
#[derive(Debug, Clone, Error)]
pub enum ChatError {
    /// Microphone access refused. User-visible, recoverable by retry.
    #[error("microphone permission denied")]
    PermissionDenied,

    /// Storage read/write failure. Reported as a transient warning;
    /// in-memory state remains usable for the session.
    #[error("storage unavailable: {0}")]
    PersistenceUnavailable(String),

    /// State-machine misuse by the caller. Asserts in debug builds.
    #[error("invalid state: {0}")]
    InvalidState(&'static str),
}

impl ChatError {
    /// Contract violation by the caller. Fails fast in development
    /// builds and degrades to an error value in release.
    pub fn invalid_state(what: &'static str) -> Self {
        debug_assert!(false, "invalid state: {}", what);
        ChatError::InvalidState(what)
    }
}

pub type ChatResult<T> = Result<T, ChatError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_forward_only() {
        assert!(MessageStatus::Sent.can_advance_to(MessageStatus::Delivered));
        assert!(MessageStatus::Sent.can_advance_to(MessageStatus::Read));
        assert!(MessageStatus::Delivered.can_advance_to(MessageStatus::Read));
        assert!(!MessageStatus::Delivered.can_advance_to(MessageStatus::Sent));
        assert!(!MessageStatus::Read.can_advance_to(MessageStatus::Delivered));
        assert!(!MessageStatus::Sent.can_advance_to(MessageStatus::Sent));
    }

    #[test]
    fn test_message_id_monotonic() {
        let first = MessageId::next_after(0);
        let second = MessageId::next_after(first.0);
        assert!(second > first);

        // A last id far in the future still yields a strictly larger id
        let future = Utc::now().timestamp_millis() + 60_000;
        let bumped = MessageId::next_after(future);
        assert_eq!(bumped.0, future + 1);
    }

    #[test]
    fn test_body_serde_kind_tag() {
        let body = MessageBody::Audio {
            data: "AAAA".to_string(),
            duration_secs: 3,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["kind"], "audio");
        assert_eq!(json["duration_secs"], 3);

        let text: MessageBody =
            serde_json::from_str(r#"{"kind":"text","content":"hi"}"#).unwrap();
        assert_eq!(
            text,
            MessageBody::Text {
                content: "hi".to_string()
            }
        );
    }

    #[test]
    fn test_message_round_trip() {
        let msg = Message::from_user(
            MessageId(42),
            MessageBody::Image {
                data: "aGk=".to_string(),
                file_name: "rex.png".to_string(),
                file_size: 2,
            },
        );
        let json = serde_json::to_string(&msg).unwrap();
        let back: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(msg, back);
    }

    #[test]
    fn test_deleted_message_never_renders_payload() {
        let mut msg = Message::from_user(
            MessageId(1),
            MessageBody::Text {
                content: "secret".to_string(),
            },
        );
        msg.deleted = Some(Deletion { for_everyone: true });
        assert_eq!(msg.render_text(), "This message was deleted");

        msg.deleted = Some(Deletion {
            for_everyone: false,
        });
        assert_eq!(msg.render_text(), "You deleted this message");
        assert!(!msg.render_text().contains("secret"));
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(3), "0:03");
        assert_eq!(format_duration(59), "0:59");
        assert_eq!(format_duration(60), "1:00");
        assert_eq!(format_duration(125), "2:05");
    }

    #[test]
    fn test_recorder_snapshot() {
        assert_eq!(
            RecorderState::Idle.snapshot(),
            RecorderSnapshot {
                is_recording: false,
                elapsed_secs: 0,
                has_preview: false
            }
        );
        let recording = RecorderState::Recording { elapsed_secs: 4 };
        assert!(recording.snapshot().is_recording);
        assert_eq!(recording.snapshot().elapsed_secs, 4);

        let stopped = RecorderState::Stopped {
            preview: AudioPreview {
                data: "AA==".to_string(),
                duration_secs: 2,
            },
        };
        assert!(stopped.snapshot().has_preview);
        assert!(!stopped.snapshot().is_recording);
    }
}
