use std::ops::Range;
use std::sync::Arc;
use std::time::Duration;

use rand::seq::SliceRandom;
use rand::Rng;

use pawchat_types::{MessageId, DEFAULT_REPLY_DELAY_MAX_MS, DEFAULT_REPLY_DELAY_MIN_MS};

use crate::session::SessionInner;

/// Canned counterpart replies. Flavor text only; nothing downstream
/// depends on the contents.
pub fn default_reply_pool() -> Vec<String> {
    [
        "Thanks for the message! How can I help you and your pet today?",
        "Got it, give me a moment to check.",
        "Sure, that works for us!",
        "Could you share a few more details?",
        "We'll get back to you with the next steps shortly.",
        "Sounds good, see you then!",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Schedules the synthetic counterpart reply after a qualifying send.
///
/// Exactly one reply per trigger: a task sleeps a randomized delay and
/// then appends one pool message authored by the counterpart. The task
/// races the owning session's cancellation token, so a torn-down
/// session never receives it.
pub struct Responder {
    delay_ms: Range<u64>,
    pool: Vec<String>,
}

impl Responder {
    pub fn new(delay_ms: Range<u64>, pool: Vec<String>) -> Self {
        let delay_ms = if delay_ms.is_empty() {
            DEFAULT_REPLY_DELAY_MIN_MS..DEFAULT_REPLY_DELAY_MAX_MS
        } else {
            delay_ms
        };
        let pool = if pool.is_empty() {
            default_reply_pool()
        } else {
            pool
        };
        Self { delay_ms, pool }
    }

    pub(crate) fn schedule(&self, inner: &Arc<SessionInner>, trigger: MessageId) {
        let mut rng = rand::thread_rng();
        let delay = Duration::from_millis(rng.gen_range(self.delay_ms.clone()));
        let reply = self
            .pool
            .choose(&mut rng)
            .cloned()
            .unwrap_or_default();

        let token = inner.cancel.clone();
        // Weak: a reply must never keep a dropped session alive, nor
        // write into one
        let weak = Arc::downgrade(inner);
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    if let Some(inner) = weak.upgrade() {
                        inner.counterpart_reply(trigger, reply);
                    }
                }
            }
        });
    }
}
