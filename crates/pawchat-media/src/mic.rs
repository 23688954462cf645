use async_trait::async_trait;
use std::time::Duration;

use pawchat_types::{ChatError, ChatResult};

/// Capability to request a microphone stream.
///
/// Acquisition is asynchronous and may be denied; denial surfaces as
/// [`ChatError::PermissionDenied`] and is recoverable by retrying.
#[async_trait]
pub trait Microphone: Send + Sync {
    async fn open(&self) -> ChatResult<Box<dyn MicStream>>;
}

/// An open microphone stream yielding timed binary chunks.
#[async_trait]
pub trait MicStream: Send {
    /// Wait for the next chunk. `None` means the stream ended.
    async fn next_chunk(&mut self) -> Option<Vec<u8>>;
}

/// Simulated microphone producing a fixed chunk at a fixed cadence.
///
/// There is no real audio hardware in this system; every screen records
/// against a stand-in stream.
#[derive(Debug, Clone)]
pub struct SimMicrophone {
    chunk_interval: Duration,
    chunk_bytes: usize,
}

impl SimMicrophone {
    pub fn new() -> Self {
        Self {
            chunk_interval: Duration::from_millis(250),
            chunk_bytes: 160,
        }
    }

    pub fn with_cadence(chunk_interval: Duration, chunk_bytes: usize) -> Self {
        Self {
            chunk_interval,
            chunk_bytes,
        }
    }
}

impl Default for SimMicrophone {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Microphone for SimMicrophone {
    async fn open(&self) -> ChatResult<Box<dyn MicStream>> {
        Ok(Box::new(SimMicStream {
            chunk_interval: self.chunk_interval,
            chunk_bytes: self.chunk_bytes,
            counter: 0,
        }))
    }
}

struct SimMicStream {
    chunk_interval: Duration,
    chunk_bytes: usize,
    counter: u8,
}

#[async_trait]
impl MicStream for SimMicStream {
    async fn next_chunk(&mut self) -> Option<Vec<u8>> {
        tokio::time::sleep(self.chunk_interval).await;
        self.counter = self.counter.wrapping_add(1);
        Some(vec![self.counter; self.chunk_bytes])
    }
}

/// Microphone that always refuses access. Models the user rejecting the
/// permission prompt.
#[derive(Debug, Clone, Default)]
pub struct DeniedMicrophone;

#[async_trait]
impl Microphone for DeniedMicrophone {
    async fn open(&self) -> ChatResult<Box<dyn MicStream>> {
        Err(ChatError::PermissionDenied)
    }
}
