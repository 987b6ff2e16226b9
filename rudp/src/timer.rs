//! Retransmission timer policy.
//!
//! Reliable delivery requires that unacknowledged messages are re-sent if no
//! acknowledgment arrives within a bounded time.  The policy here is a plain
//! deadline on the **oldest** held message: once it has been in flight for
//! `send_timeout` the transmission loop rewinds its cursor to the front of the
//! window and re-sends everything still held, in order (go-back-N).
//!
//! The timeout is fixed for the lifetime of a transfer; there is no RTT
//! estimation or back-off.

use std::time::Duration;

use tokio::time::Instant;

use crate::window::SendWindow;

/// `true` exactly when `window` is non-empty, its oldest message has been
/// sent, and that transmission is at least `send_timeout` old.
///
/// A message that was never sent is not overdue: the cursor reaches it in the
/// current round anyway.
pub fn should_rewind(window: &SendWindow, now: Instant, send_timeout: Duration) -> bool {
    window
        .oldest()
        .and_then(|m| m.last_sent_at)
        .is_some_and(|sent_at| now.saturating_duration_since(sent_at) >= send_timeout)
}

/// Per-transfer retransmission policy.
#[derive(Debug, Clone, Copy)]
pub struct RetransmitPolicy {
    send_timeout: Duration,
}

impl RetransmitPolicy {
    pub fn new(send_timeout: Duration) -> Self {
        Self { send_timeout }
    }

    /// See [`should_rewind`].
    pub fn should_rewind(&self, window: &SendWindow, now: Instant) -> bool {
        should_rewind(window, now, self.send_timeout)
    }
}
