//! Send window: the bounded, ordered set of in-flight messages.
//!
//! [`SendWindow`] owns every message that has been admitted from the source
//! but not yet acknowledged, plus a transmit cursor that says which one goes
//! out next.
//!
//! # Layout
//!
//! ```text
//!   oldest held                 cursor              newest admitted
//!       │                          │                       │
//!   ────┼──────────────────────────┼───────────────────────┼────▶ seq space
//!       │ <── sent, unacked ─────▶ │ <── not yet (re)sent ▶│
//!       │ <──────────────── at most `capacity` ──────────▶ │
//! ```
//!
//! Invariants:
//! - held sequence numbers are strictly increasing;
//! - at most `capacity` messages are held;
//! - `newest − oldest < capacity`, so the peer's receive window (of the same
//!   size) can always buffer anything we send.
//!
//! This module only manages state; all socket I/O is the caller's
//! responsibility.

use std::collections::{BTreeSet, VecDeque};

use tokio::time::Instant;

/// One chunk of the source stream, owned by the window until acknowledged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub seqno: u64,
    pub payload: Vec<u8>,
    /// Time of the most recent transmission; `None` until first sent.
    pub last_sent_at: Option<Instant>,
    /// Number of times this message has been transmitted.
    pub tx_count: u32,
}

impl Message {
    pub fn new(seqno: u64, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            seqno,
            payload: payload.into(),
            last_sent_at: None,
            tx_count: 0,
        }
    }
}

/// Sliding window of in-flight messages with a transmit cursor.
#[derive(Debug)]
pub struct SendWindow {
    capacity: usize,
    /// Held messages ordered by sequence number (front = oldest).
    messages: VecDeque<Message>,
    /// Index into `messages` of the next message to transmit.
    cursor: usize,
    /// Sequence number following the newest admitted message.
    next_seqno: u64,
}

impl SendWindow {
    /// Create an empty window holding at most `capacity` messages.
    ///
    /// # Panics
    ///
    /// Panics when `capacity` is zero; configuration validation rejects that
    /// before a window is ever built.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity >= 1, "window capacity must be at least 1");
        Self {
            capacity,
            messages: VecDeque::with_capacity(capacity),
            cursor: 0,
            next_seqno: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Oldest held message.
    pub fn oldest(&self) -> Option<&Message> {
        self.messages.front()
    }

    /// Held sequence numbers from oldest to newest.
    pub fn held_seqnos(&self) -> Vec<u64> {
        self.messages.iter().map(|m| m.seqno).collect()
    }

    /// `true` when a message numbered `seqno` would be admitted.
    pub fn can_admit(&self, seqno: u64) -> bool {
        if self.messages.len() >= self.capacity {
            return false;
        }
        match (self.messages.front(), self.messages.back()) {
            (Some(oldest), Some(newest)) => {
                seqno > newest.seqno && seqno - oldest.seqno < self.capacity as u64
            }
            _ => true,
        }
    }

    /// Add `message` at the back of the window.
    ///
    /// Returns `false` (and drops nothing) when the window is full, when the
    /// message is too far ahead of the oldest held one, or when its sequence
    /// number does not follow the newest held one.
    pub fn admit(&mut self, message: Message) -> bool {
        if !self.can_admit(message.seqno) {
            return false;
        }
        self.next_seqno = message.seqno + 1;
        self.messages.push_back(message);
        true
    }

    /// The message under the transmit cursor, if any.
    pub fn next_to_send(&self) -> Option<&Message> {
        self.messages.get(self.cursor)
    }

    /// Stamp message `seqno` as transmitted at `now`.
    ///
    /// When it is at or beyond the cursor, the cursor moves past it.  Returns
    /// `false` if the message is not held.
    pub fn mark_sent(&mut self, seqno: u64, now: Instant) -> bool {
        let Some(index) = self.index_of(seqno) else {
            return false;
        };
        let message = &mut self.messages[index];
        message.last_sent_at = Some(now);
        message.tx_count += 1;
        if index >= self.cursor {
            self.cursor = index + 1;
        }
        true
    }

    /// Move the cursor back to the oldest held message (go-back-N).
    pub fn rewind(&mut self) {
        self.cursor = 0;
    }

    /// Drop acknowledged messages and reposition the cursor.
    ///
    /// Removes every message with `seqno < cumulative` or `seqno` in
    /// `selective`.  The cursor then points at the first remaining message at
    /// or after the one that was about to be sent, so nothing beyond the
    /// cursor is skipped and nothing before it is resent early.  Returns the
    /// number of messages removed.
    pub fn prune(&mut self, cumulative: u64, selective: &BTreeSet<u64>) -> usize {
        let resume_at = self
            .messages
            .get(self.cursor)
            .map_or(self.next_seqno, |m| m.seqno);

        let before = self.messages.len();
        self.messages
            .retain(|m| m.seqno >= cumulative && !selective.contains(&m.seqno));

        self.cursor = self
            .messages
            .iter()
            .position(|m| m.seqno >= resume_at)
            .unwrap_or(self.messages.len());
        before - self.messages.len()
    }

    fn index_of(&self, seqno: u64) -> Option<usize> {
        self.messages.binary_search_by_key(&seqno, |m| m.seqno).ok()
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
