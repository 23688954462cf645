use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// Capability to play back an opaque binary audio payload.
#[async_trait]
pub trait AudioSink: Send + Sync {
    async fn play(&self, data: Vec<u8>, duration_secs: u32);
}

/// Simulated sink: "plays" by waiting out the duration.
#[derive(Debug, Default)]
pub struct SimAudioSink {
    completed: AtomicUsize,
}

impl SimAudioSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Playbacks that ran to completion (not cancelled).
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AudioSink for SimAudioSink {
    async fn play(&self, _data: Vec<u8>, duration_secs: u32) {
        tokio::time::sleep(Duration::from_secs(duration_secs as u64)).await;
        self.completed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Single-active playback handle.
///
/// At most one playback runs system-wide; starting a new one stops any
/// prior holder before the new payload begins.
#[derive(Clone)]
pub struct PlaybackController {
    inner: Arc<PlaybackInner>,
}

struct PlaybackInner {
    sink: Arc<dyn AudioSink>,
    current: Mutex<Option<ActivePlayback>>,
    seq: AtomicU64,
}

struct ActivePlayback {
    seq: u64,
    source: String,
    token: CancellationToken,
}

impl PlaybackController {
    pub fn new(sink: Arc<dyn AudioSink>) -> Self {
        Self {
            inner: Arc::new(PlaybackInner {
                sink,
                current: Mutex::new(None),
                seq: AtomicU64::new(0),
            }),
        }
    }

    /// Start playing `data`, labeled by `source` (a message id or
    /// "preview"). Cancels whatever was playing.
    pub fn play(&self, source: impl Into<String>, data: Vec<u8>, duration_secs: u32) {
        let seq = self.inner.seq.fetch_add(1, Ordering::SeqCst);
        let token = CancellationToken::new();

        {
            let mut current = self.inner.current.lock().unwrap();
            if let Some(prev) = current.take() {
                prev.token.cancel();
            }
            *current = Some(ActivePlayback {
                seq,
                source: source.into(),
                token: token.clone(),
            });
        }

        let inner = self.inner.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = inner.sink.play(data, duration_secs) => {}
            }
            let mut current = inner.current.lock().unwrap();
            if current.as_ref().map(|a| a.seq) == Some(seq) {
                *current = None;
            }
        });
    }

    /// Stop the active playback, if any.
    pub fn stop(&self) {
        if let Some(prev) = self.inner.current.lock().unwrap().take() {
            prev.token.cancel();
        }
    }

    /// Source label of the active playback.
    pub fn playing(&self) -> Option<String> {
        self.inner
            .current
            .lock()
            .unwrap()
            .as_ref()
            .map(|a| a.source.clone())
    }
}
