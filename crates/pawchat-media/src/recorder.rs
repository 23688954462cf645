use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use pawchat_types::{
    AudioPreview, ChatError, ChatResult, RecorderSnapshot, RecorderState, MIN_RECORDING_SECS,
};

use crate::mic::Microphone;

/// Voice-recording state machine.
///
/// `Idle -> Requesting -> Recording -> Stopped(preview)`, then back to
/// `Idle` on confirm or cancel. Recordings shorter than
/// [`MIN_RECORDING_SECS`] are discarded silently at `stop()`; no message
/// is ever created for them.
pub struct CaptureSession {
    mic: Arc<dyn Microphone>,
    state: Arc<Mutex<RecorderState>>,
    events: mpsc::UnboundedSender<RecorderSnapshot>,
    parent: CancellationToken,
    active: Option<ActiveRecording>,
}

struct ActiveRecording {
    token: CancellationToken,
    chunks: Arc<Mutex<Vec<u8>>>,
    elapsed: Arc<AtomicU32>,
    task: JoinHandle<()>,
}

impl CaptureSession {
    /// `events` receives a snapshot after every state change (including
    /// each 1-second tick); `parent` cancels any in-flight recording when
    /// the owning session tears down.
    pub fn new(
        mic: Arc<dyn Microphone>,
        events: mpsc::UnboundedSender<RecorderSnapshot>,
        parent: CancellationToken,
    ) -> Self {
        Self {
            mic,
            state: Arc::new(Mutex::new(RecorderState::Idle)),
            events,
            parent,
            active: None,
        }
    }

    pub fn state(&self) -> RecorderState {
        self.state.lock().unwrap().clone()
    }

    pub fn snapshot(&self) -> RecorderSnapshot {
        self.state.lock().unwrap().snapshot()
    }

    pub fn pending_preview(&self) -> Option<AudioPreview> {
        match &*self.state.lock().unwrap() {
            RecorderState::Stopped { preview } => Some(preview.clone()),
            _ => None,
        }
    }

    fn set_state(&self, next: RecorderState) {
        let snapshot = next.snapshot();
        *self.state.lock().unwrap() = next;
        let _ = self.events.send(snapshot);
    }

    /// Request microphone access and begin buffering chunks.
    ///
    /// Only one microphone stream may be active at a time; starting again
    /// while recording stops the prior holder and discards its buffer.
    /// Denied access returns [`ChatError::PermissionDenied`] and leaves
    /// the machine `Idle`.
    pub async fn start(&mut self) -> ChatResult<()> {
        if self.active.is_some() {
            self.discard_active().await;
        }
        self.set_state(RecorderState::Requesting);

        let mut stream = match self.mic.open().await {
            Ok(stream) => stream,
            Err(e) => {
                self.set_state(RecorderState::Idle);
                return Err(e);
            }
        };

        let token = self.parent.child_token();
        let chunks = Arc::new(Mutex::new(Vec::new()));
        let elapsed = Arc::new(AtomicU32::new(0));
        self.set_state(RecorderState::Recording { elapsed_secs: 0 });

        let task = {
            let token = token.clone();
            let chunks = chunks.clone();
            let elapsed = elapsed.clone();
            let state = self.state.clone();
            let events = self.events.clone();
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(Duration::from_secs(1));
                // The first tick of an interval completes immediately
                ticker.tick().await;
                loop {
                    tokio::select! {
                        _ = token.cancelled() => break,
                        _ = ticker.tick() => {
                            let secs = elapsed.fetch_add(1, Ordering::SeqCst) + 1;
                            let next = RecorderState::Recording { elapsed_secs: secs };
                            let snapshot = next.snapshot();
                            *state.lock().unwrap() = next;
                            let _ = events.send(snapshot);
                        }
                        chunk = stream.next_chunk() => match chunk {
                            Some(bytes) => chunks.lock().unwrap().extend_from_slice(&bytes),
                            None => break,
                        },
                    }
                }
            })
        };

        self.active = Some(ActiveRecording {
            token,
            chunks,
            elapsed,
            task,
        });
        Ok(())
    }

    /// Stop recording. With at least one captured chunk and one elapsed
    /// second the chunks finalize into a pending preview; anything
    /// shorter is discarded silently and the machine returns to `Idle`.
    pub async fn stop(&mut self) -> ChatResult<Option<AudioPreview>> {
        let Some(active) = self.active.take() else {
            return Err(ChatError::invalid_state("stop without active recording"));
        };

        active.token.cancel();
        let _ = active.task.await;

        let duration_secs = active.elapsed.load(Ordering::SeqCst);
        let chunks = std::mem::take(&mut *active.chunks.lock().unwrap());

        if duration_secs >= MIN_RECORDING_SECS && !chunks.is_empty() {
            let preview = AudioPreview {
                data: STANDARD.encode(&chunks),
                duration_secs,
            };
            self.set_state(RecorderState::Stopped {
                preview: preview.clone(),
            });
            Ok(Some(preview))
        } else {
            self.set_state(RecorderState::Idle);
            Ok(None)
        }
    }

    /// Hand the pending preview to the caller for sending; resets to
    /// `Idle`. Valid only in `Stopped`.
    pub fn take_preview(&mut self) -> ChatResult<AudioPreview> {
        let preview = match &*self.state.lock().unwrap() {
            RecorderState::Stopped { preview } => preview.clone(),
            _ => return Err(ChatError::invalid_state("no pending preview")),
        };
        self.set_state(RecorderState::Idle);
        Ok(preview)
    }

    /// Discard the buffer or preview without creating anything. Valid
    /// mid-recording or with a pending preview.
    pub async fn cancel(&mut self) -> ChatResult<()> {
        if self.active.is_some() {
            self.discard_active().await;
            self.set_state(RecorderState::Idle);
            return Ok(());
        }
        match &*self.state.lock().unwrap() {
            RecorderState::Stopped { .. } => {}
            _ => return Err(ChatError::invalid_state("nothing to cancel")),
        }
        self.set_state(RecorderState::Idle);
        Ok(())
    }

    async fn discard_active(&mut self) {
        if let Some(active) = self.active.take() {
            active.token.cancel();
            let _ = active.task.await;
        }
    }
}
