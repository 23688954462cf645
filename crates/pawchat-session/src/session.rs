use std::ops::Range;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use pawchat_media::{AudioSink, CaptureSession, Microphone, PlaybackController};
use pawchat_store::{ConversationStore, KeyValueStore};
use pawchat_types::{
    AudioPreview, ChatError, ChatResult, CounterpartProfile, Message, MessageBody, MessageId,
    MessageStatus, RecorderSnapshot, DEFAULT_REPLY_DELAY_MAX_MS, DEFAULT_REPLY_DELAY_MIN_MS,
    MIN_RECORDING_SECS,
};

use crate::responder::{default_reply_pool, Responder};

/// Whether a send schedules a simulated counterpart reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReplyPolicy {
    /// Reply only to text sends. Default; matches most screens.
    #[default]
    TextOnly,
    /// Reply to every send, media included (storefront behavior).
    Always,
}

/// Media kinds accepted by `send_media`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    File,
}

/// Push feed from a session to its presentation layer.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// Full snapshot of the open conversation after a mutation.
    MessagesChanged(Vec<Message>),
    /// Recorder state changed (including each elapsed-second tick).
    RecorderChanged(RecorderSnapshot),
    /// A reportable, non-fatal condition (storage trouble, denied mic).
    Warning(String),
}

/// Per-session configuration supplied by the embedding screen.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Persistence collection this conversation lives in.
    pub collection_key: String,
    pub reply_policy: ReplyPolicy,
    /// Simulated reply delay, sampled uniformly per reply.
    pub reply_delay_ms: Range<u64>,
    pub reply_pool: Vec<String>,
}

impl SessionConfig {
    pub fn new(collection_key: impl Into<String>) -> Self {
        Self {
            collection_key: collection_key.into(),
            reply_policy: ReplyPolicy::TextOnly,
            reply_delay_ms: DEFAULT_REPLY_DELAY_MIN_MS..DEFAULT_REPLY_DELAY_MAX_MS,
            reply_pool: default_reply_pool(),
        }
    }

    pub fn with_reply_policy(mut self, policy: ReplyPolicy) -> Self {
        self.reply_policy = policy;
        self
    }

    pub fn with_reply_delay_ms(mut self, delay_ms: Range<u64>) -> Self {
        self.reply_delay_ms = delay_ms;
        self
    }
}

pub(crate) struct SessionInner {
    session_id: Uuid,
    profile: CounterpartProfile,
    store: Mutex<ConversationStore>,
    capture: tokio::sync::Mutex<CaptureSession>,
    playback: PlaybackController,
    responder: Responder,
    reply_policy: ReplyPolicy,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<SessionEvent>>>,
    pub(crate) cancel: CancellationToken,
    closed: AtomicBool,
}

/// One open conversation with one counterpart.
///
/// All sends and mutations for the conversation funnel through here; no
/// other writer touches its message store. Dropping or closing the
/// session cancels pending simulated replies and in-flight recordings.
pub struct ConversationSession {
    inner: Arc<SessionInner>,
}

impl ConversationSession {
    pub fn new(
        profile: CounterpartProfile,
        adapter: Arc<dyn KeyValueStore>,
        mic: Arc<dyn Microphone>,
        sink: Arc<dyn AudioSink>,
        config: SessionConfig,
    ) -> Self {
        let cancel = CancellationToken::new();
        let (recorder_tx, mut recorder_rx) = mpsc::unbounded_channel();

        let inner = Arc::new(SessionInner {
            session_id: Uuid::new_v4(),
            profile,
            store: Mutex::new(ConversationStore::open(adapter, config.collection_key)),
            capture: tokio::sync::Mutex::new(CaptureSession::new(
                mic,
                recorder_tx,
                cancel.clone(),
            )),
            playback: PlaybackController::new(sink),
            responder: Responder::new(config.reply_delay_ms, config.reply_pool),
            reply_policy: config.reply_policy,
            subscribers: Mutex::new(Vec::new()),
            cancel,
            closed: AtomicBool::new(false),
        });

        // Forward recorder snapshots into the session event feed. Ends
        // when the capture side drops or the session goes away.
        let weak = Arc::downgrade(&inner);
        tokio::spawn(async move {
            while let Some(snapshot) = recorder_rx.recv().await {
                let Some(inner) = weak.upgrade() else { break };
                inner.broadcast(SessionEvent::RecorderChanged(snapshot));
            }
        });

        Self { inner }
    }

    pub fn session_id(&self) -> Uuid {
        self.inner.session_id
    }

    pub fn counterpart(&self) -> &CounterpartProfile {
        &self.inner.profile
    }

    /// Subscribe to session events. The current message snapshot is
    /// delivered immediately.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<SessionEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(SessionEvent::MessagesChanged(self.messages()));
        self.inner.subscribers.lock().unwrap().push(tx);
        rx
    }

    /// Snapshot of the open conversation's messages.
    pub fn messages(&self) -> Vec<Message> {
        self.inner
            .store
            .lock()
            .unwrap()
            .messages(&self.inner.profile.id)
    }

    pub async fn recorder_state(&self) -> RecorderSnapshot {
        self.inner.capture.lock().await.snapshot()
    }

    /// Send a text message. Whitespace-only content is a silent no-op:
    /// nothing is appended and nothing is written.
    pub fn send_text(&self, content: &str) -> ChatResult<()> {
        self.inner.ensure_open()?;
        let trimmed = content.trim();
        if trimmed.is_empty() {
            return Ok(());
        }

        let id = self.inner.append_from_user(MessageBody::Text {
            content: trimmed.to_string(),
        });
        // Text always qualifies for a reply, under either policy
        self.inner.responder.schedule(&self.inner, id);
        Ok(())
    }

    /// Send an image or file payload. Scheduling a counterpart reply
    /// follows the session's [`ReplyPolicy`].
    pub fn send_media(&self, kind: MediaKind, bytes: &[u8], file_name: &str) -> ChatResult<()> {
        self.inner.ensure_open()?;
        let data = STANDARD.encode(bytes);
        let file_size = bytes.len() as u64;
        let body = match kind {
            MediaKind::Image => MessageBody::Image {
                data,
                file_name: file_name.to_string(),
                file_size,
            },
            MediaKind::File => MessageBody::File {
                data,
                file_name: file_name.to_string(),
                file_size,
            },
        };

        let id = self.inner.append_from_user(body);
        if self.inner.reply_policy == ReplyPolicy::Always {
            self.inner.responder.schedule(&self.inner, id);
        }
        Ok(())
    }

    /// Send a recorded audio payload. Recordings shorter than the
    /// 1-second floor are discarded here even if a caller bypassed the
    /// capture pipeline; no message is created for them.
    pub fn send_recorded_audio(&self, preview: AudioPreview) -> ChatResult<()> {
        self.inner.ensure_open()?;
        if preview.duration_secs < MIN_RECORDING_SECS {
            return Ok(());
        }

        let id = self.inner.append_from_user(MessageBody::Audio {
            data: preview.data,
            duration_secs: preview.duration_secs,
        });
        if self.inner.reply_policy == ReplyPolicy::Always {
            self.inner.responder.schedule(&self.inner, id);
        }
        Ok(())
    }

    /// Begin a voice recording. Permission denial is surfaced on the
    /// event feed as a warning and returned for the caller to retry.
    pub async fn start_recording(&self) -> ChatResult<()> {
        self.inner.ensure_open()?;
        let result = self.inner.capture.lock().await.start().await;
        if let Err(ref e) = result {
            self.inner.broadcast(SessionEvent::Warning(e.to_string()));
        }
        result
    }

    /// Stop the recording; returns the pending preview, or `None` when
    /// the take was under a second and was silently discarded.
    pub async fn stop_recording(&self) -> ChatResult<Option<AudioPreview>> {
        self.inner.ensure_open()?;
        self.inner.capture.lock().await.stop().await
    }

    /// Confirm the pending preview and send it as an audio message.
    pub async fn confirm_recording(&self) -> ChatResult<()> {
        self.inner.ensure_open()?;
        let preview = self.inner.capture.lock().await.take_preview()?;
        self.send_recorded_audio(preview)
    }

    /// Discard the in-flight recording or pending preview.
    pub async fn cancel_recording(&self) -> ChatResult<()> {
        self.inner.ensure_open()?;
        self.inner.capture.lock().await.cancel().await
    }

    /// Play a stored audio message. Only one playback is active
    /// system-wide; starting a new one stops the previous.
    pub fn play_audio(&self, id: MessageId) -> ChatResult<()> {
        self.inner.ensure_open()?;
        let (data, duration_secs) = {
            let store = self.inner.store.lock().unwrap();
            let message = store
                .conversation(&self.inner.profile.id)
                .and_then(|c| c.message(id))
                .ok_or(ChatError::InvalidState("unknown message"))?;
            if message.is_deleted() {
                return Err(ChatError::InvalidState("message deleted"));
            }
            match &message.body {
                MessageBody::Audio {
                    data,
                    duration_secs,
                } => (data.clone(), *duration_secs),
                _ => return Err(ChatError::InvalidState("not an audio message")),
            }
        };

        match STANDARD.decode(&data) {
            Ok(bytes) => {
                self.inner.playback.play(id.to_string(), bytes, duration_secs);
                Ok(())
            }
            Err(e) => {
                self.inner
                    .broadcast(SessionEvent::Warning(format!("audio payload unreadable: {}", e)));
                Ok(())
            }
        }
    }

    /// Play the pending recording preview.
    pub async fn play_preview(&self) -> ChatResult<()> {
        self.inner.ensure_open()?;
        let preview = self
            .inner
            .capture
            .lock()
            .await
            .pending_preview()
            .ok_or_else(|| ChatError::invalid_state("no pending preview"))?;

        match STANDARD.decode(&preview.data) {
            Ok(bytes) => {
                self.inner
                    .playback
                    .play("preview", bytes, preview.duration_secs);
                Ok(())
            }
            Err(e) => {
                self.inner
                    .broadcast(SessionEvent::Warning(format!("audio payload unreadable: {}", e)));
                Ok(())
            }
        }
    }

    pub fn stop_playback(&self) {
        self.inner.playback.stop();
    }

    /// Label of the active playback, if any.
    pub fn playing(&self) -> Option<String> {
        self.inner.playback.playing()
    }

    /// Soft-delete a message. Both flags replace the payload in this
    /// client's view; only the placeholder wording differs.
    pub fn delete_message(&self, id: MessageId, for_everyone: bool) -> ChatResult<()> {
        self.inner.ensure_open()?;
        let result = {
            self.inner
                .store
                .lock()
                .unwrap()
                .soft_delete(&self.inner.profile.id, id, for_everyone)
        };
        self.inner.report_store_result(result);
        Ok(())
    }

    /// Advance a message's delivery status; backward transitions are
    /// ignored. Returns whether the status changed.
    pub fn update_status(&self, id: MessageId, status: MessageStatus) -> ChatResult<bool> {
        self.inner.ensure_open()?;
        let result = {
            self.inner
                .store
                .lock()
                .unwrap()
                .update_status(&self.inner.profile.id, id, status)
        };
        Ok(self.inner.report_store_result(result))
    }

    /// Tear the session down: pending simulated replies are cancelled
    /// and will never append, recording and playback stop.
    pub fn close(&self) {
        self.inner.close();
    }
}

impl Drop for ConversationSession {
    fn drop(&mut self) {
        self.inner.close();
    }
}

impl SessionInner {
    fn ensure_open(&self) -> ChatResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ChatError::invalid_state("session closed"));
        }
        Ok(())
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.cancel.cancel();
        self.playback.stop();
    }

    /// Append a user-authored message; persistence trouble becomes a
    /// warning on the feed while memory stays authoritative.
    fn append_from_user(&self, body: MessageBody) -> MessageId {
        let (id, result) = {
            let mut store = self.store.lock().unwrap();
            let id = store.next_id();
            let result = store.append(&self.profile, Message::from_user(id, body));
            (id, result)
        };
        if let Err(e) = result {
            self.broadcast(SessionEvent::Warning(e.to_string()));
        }
        self.broadcast_messages();
        id
    }

    /// Append the delayed synthetic reply. Re-checks teardown: a closed
    /// session must never be written to, even if the timer already won
    /// the race.
    pub(crate) fn counterpart_reply(&self, trigger: MessageId, text: String) {
        if self.closed.load(Ordering::SeqCst) {
            return;
        }

        let (status_result, append_result) = {
            let mut store = self.store.lock().unwrap();
            // The counterpart "saw" the triggering message before replying
            let status_result = store.update_status(&self.profile.id, trigger, MessageStatus::Read);
            let id = store.next_id();
            let append_result = store.append(
                &self.profile,
                Message::from_counterpart(id, MessageBody::Text { content: text }),
            );
            (status_result, append_result)
        };
        if let Err(e) = status_result.and(append_result) {
            self.broadcast(SessionEvent::Warning(e.to_string()));
        }
        self.broadcast_messages();
    }

    fn report_store_result(&self, result: ChatResult<bool>) -> bool {
        match result {
            Ok(changed) => {
                if changed {
                    self.broadcast_messages();
                }
                changed
            }
            Err(e) => {
                // The mutation landed in memory; only the write-through failed
                self.broadcast(SessionEvent::Warning(e.to_string()));
                self.broadcast_messages();
                true
            }
        }
    }

    fn broadcast_messages(&self) {
        let messages = self.store.lock().unwrap().messages(&self.profile.id);
        self.broadcast(SessionEvent::MessagesChanged(messages));
    }

    fn broadcast(&self, event: SessionEvent) {
        let mut subscribers = self.subscribers.lock().unwrap();
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pawchat_media::{SimAudioSink, SimMicrophone};
    use pawchat_store::{load_conversations, MemoryKeyValueStore};
    use pawchat_types::format_duration;
    use std::time::Duration;

    struct Fixture {
        session: ConversationSession,
        adapter: Arc<MemoryKeyValueStore>,
        sink: Arc<SimAudioSink>,
    }

    fn fixture(config: SessionConfig) -> Fixture {
        let adapter = Arc::new(MemoryKeyValueStore::new());
        let sink = Arc::new(SimAudioSink::new());
        let session = ConversationSession::new(
            CounterpartProfile::new("groomer-3", "Pawfect Grooming"),
            adapter.clone(),
            Arc::new(SimMicrophone::new()),
            sink.clone(),
            config,
        );
        Fixture {
            session,
            adapter,
            sink,
        }
    }

    fn default_fixture() -> Fixture {
        fixture(SessionConfig::new("community_chats"))
    }

    async fn advance(total: Duration) {
        let step = Duration::from_millis(100);
        let mut remaining = total;
        // Let any just-spawned task run and anchor its interval at the current
        // instant before we start stepping the paused clock.
        tokio::task::yield_now().await;
        while remaining > Duration::ZERO {
            let d = step.min(remaining);
            tokio::time::advance(d).await;
            tokio::task::yield_now().await;
            remaining -= d;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_text_then_simulated_reply() {
        let f = default_fixture();
        f.session.send_text("Hello").unwrap();

        let messages = f.session.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].body.kind(), "text");
        assert_eq!(messages[0].render_text(), "Hello");
        assert_eq!(messages[0].status, MessageStatus::Sent);
        assert!(messages[0].from_user);

        // Reply delay is sampled from 1000..3000 ms
        advance(Duration::from_secs(4)).await;

        let messages = f.session.messages();
        assert_eq!(messages.len(), 2);
        assert!(!messages[1].from_user);
        assert_eq!(messages[1].status, MessageStatus::Delivered);
        // The triggering message advanced forward, never backward
        assert_eq!(messages[0].status, MessageStatus::Read);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_text_is_silent_noop() {
        let f = default_fixture();
        f.session.send_text("").unwrap();
        f.session.send_text("   \t\n").unwrap();

        advance(Duration::from_secs(5)).await;
        assert!(f.session.messages().is_empty());
        assert_eq!(f.adapter.write_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_media_reply_follows_policy() {
        // Default policy: no reply for media
        let f = default_fixture();
        f.session
            .send_media(MediaKind::Image, b"pngbytes", "rex.png")
            .unwrap();
        advance(Duration::from_secs(5)).await;
        assert_eq!(f.session.messages().len(), 1);

        // Storefront policy: media always gets a reply
        let f = fixture(
            SessionConfig::new("shop_chats").with_reply_policy(ReplyPolicy::Always),
        );
        f.session
            .send_media(MediaKind::File, b"invoice", "invoice.pdf")
            .unwrap();
        advance(Duration::from_secs(5)).await;
        assert_eq!(f.session.messages().len(), 2);
        assert!(!f.session.messages()[1].from_user);
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_cancels_pending_reply() {
        let f = default_fixture();
        f.session.send_text("anyone there?").unwrap();
        assert_eq!(f.session.messages().len(), 1);

        f.session.close();
        advance(Duration::from_secs(6)).await;

        // The scheduled reply never landed in the torn-down conversation
        let conversations = load_conversations(f.adapter.as_ref(), "community_chats");
        assert_eq!(conversations[0].messages.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_cancels_pending_reply() {
        let adapter = Arc::new(MemoryKeyValueStore::new());
        {
            let session = ConversationSession::new(
                CounterpartProfile::new("sitter-1", "Happy Tails"),
                adapter.clone(),
                Arc::new(SimMicrophone::new()),
                Arc::new(SimAudioSink::new()),
                SessionConfig::new("caretaker_chats"),
            );
            session.send_text("hi").unwrap();
        }
        advance(Duration::from_secs(6)).await;

        let conversations = load_conversations(adapter.as_ref(), "caretaker_chats");
        assert_eq!(conversations[0].messages.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recording_confirm_produces_audio_message() {
        let f = default_fixture();
        f.session.start_recording().await.unwrap();
        advance(Duration::from_secs(3)).await;

        let preview = f.session.stop_recording().await.unwrap().expect("preview");
        assert_eq!(preview.duration_secs, 3);
        assert!(f.session.recorder_state().await.has_preview);

        f.session.confirm_recording().await.unwrap();
        let messages = f.session.messages();
        assert_eq!(messages.len(), 1);
        match &messages[0].body {
            MessageBody::Audio { duration_secs, .. } => {
                assert_eq!(format_duration(*duration_secs), "0:03");
            }
            other => panic!("expected audio, got {}", other.kind()),
        }
        assert!(!f.session.recorder_state().await.has_preview);
    }

    #[tokio::test(start_paused = true)]
    async fn test_short_recording_creates_nothing() {
        let f = default_fixture();
        f.session.start_recording().await.unwrap();
        advance(Duration::from_millis(500)).await;

        assert_eq!(f.session.stop_recording().await.unwrap(), None);
        assert!(f.session.messages().is_empty());
        let snapshot = f.session.recorder_state().await;
        assert!(!snapshot.is_recording);
        assert!(!snapshot.has_preview);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sub_threshold_audio_send_is_noop() {
        let f = default_fixture();
        f.session
            .send_recorded_audio(AudioPreview {
                data: "AA==".to_string(),
                duration_secs: 0,
            })
            .unwrap();
        assert!(f.session.messages().is_empty());
        assert_eq!(f.adapter.write_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_persistence_failure_warns_but_keeps_memory() {
        let f = default_fixture();
        let mut events = f.session.subscribe();
        f.adapter.set_unavailable(true);

        f.session.send_text("still here?").unwrap();
        assert_eq!(f.session.messages().len(), 1);

        let mut saw_warning = false;
        while let Ok(event) = events.try_recv() {
            if matches!(event, SessionEvent::Warning(_)) {
                saw_warning = true;
            }
        }
        assert!(saw_warning);
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscribe_delivers_snapshot_and_updates() {
        let f = default_fixture();
        f.session.send_text("first").unwrap();

        let mut events = f.session.subscribe();
        match events.try_recv().unwrap() {
            SessionEvent::MessagesChanged(messages) => assert_eq!(messages.len(), 1),
            other => panic!("expected snapshot, got {:?}", other),
        }

        advance(Duration::from_secs(4)).await;
        let mut latest = None;
        while let Ok(event) = events.try_recv() {
            if let SessionEvent::MessagesChanged(messages) = event {
                latest = Some(messages);
            }
        }
        assert_eq!(latest.unwrap().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_message_replaces_payload() {
        let f = default_fixture();
        f.session.send_text("wrong chat, sorry").unwrap();
        let id = f.session.messages()[0].id;

        f.session.delete_message(id, true).unwrap();
        assert_eq!(f.session.messages()[0].render_text(), "This message was deleted");

        f.session.send_text("second").unwrap();
        let id2 = f.session.messages()[1].id;
        f.session.delete_message(id2, false).unwrap();
        assert_eq!(f.session.messages()[1].render_text(), "You deleted this message");
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_updates_are_forward_only() {
        let f = default_fixture();
        f.session.send_text("ping").unwrap();
        let id = f.session.messages()[0].id;

        assert!(f.session.update_status(id, MessageStatus::Delivered).unwrap());
        assert!(!f.session.update_status(id, MessageStatus::Sent).unwrap());
        assert_eq!(f.session.messages()[0].status, MessageStatus::Delivered);
    }

    #[tokio::test(start_paused = true)]
    async fn test_play_audio_single_active() {
        let f = default_fixture();
        f.session
            .send_recorded_audio(AudioPreview {
                data: STANDARD.encode(b"take-one"),
                duration_secs: 2,
            })
            .unwrap();
        f.session
            .send_recorded_audio(AudioPreview {
                data: STANDARD.encode(b"take-two"),
                duration_secs: 2,
            })
            .unwrap();
        let ids: Vec<MessageId> = f.session.messages().iter().map(|m| m.id).collect();

        f.session.play_audio(ids[0]).unwrap();
        advance(Duration::from_secs(1)).await;
        f.session.play_audio(ids[1]).unwrap();
        assert_eq!(f.session.playing(), Some(ids[1].to_string()));

        advance(Duration::from_secs(5)).await;
        // Only the second playback ran to completion
        assert_eq!(f.sink.completed(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_conversation_persists_across_sessions() {
        let adapter = Arc::new(MemoryKeyValueStore::new());
        let profile = CounterpartProfile::new("vet-1", "Dr. Fluff");
        {
            let session = ConversationSession::new(
                profile.clone(),
                adapter.clone(),
                Arc::new(SimMicrophone::new()),
                Arc::new(SimAudioSink::new()),
                SessionConfig::new("doctor_chats"),
            );
            session.send_text("see you at 9").unwrap();
            session.close();
        }

        let session = ConversationSession::new(
            profile,
            adapter,
            Arc::new(SimMicrophone::new()),
            Arc::new(SimAudioSink::new()),
            SessionConfig::new("doctor_chats"),
        );
        let messages = session.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].render_text(), "see you at 9");
    }
}
