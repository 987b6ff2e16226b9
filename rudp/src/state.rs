//! Transmission-loop state machine types.
//!
//! The states name the phase the sender is in within a round; transitions are
//! driven by [`crate::sender::Sender::round`].
//!
//! ```text
//!   FILLING ──▶ SENDING ──▶ AWAITING ──response──▶ APPLYING ─┐
//!      ▲                       │                             │
//!      └──────── silence ──────┴─────────────────────────────┘
//!
//!   source exhausted, window non-empty:  DRAINING (send / await / apply)
//!   source exhausted, window empty:      DONE
//! ```

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransferState {
    /// Admitting new chunks from the source while the window has room.
    #[default]
    Filling,
    /// Transmitting the message under the cursor.
    Sending,
    /// Blocked (bounded) on a peer response.
    Awaiting,
    /// Applying an acknowledgment to the window.
    Applying,
    /// Source exhausted; retransmitting until the window empties.
    Draining,
    /// Source exhausted and every message acknowledged.
    Done,
}

impl TransferState {
    pub fn is_terminal(self) -> bool {
        self == TransferState::Done
    }
}

impl fmt::Display for TransferState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransferState::Filling => "FILLING",
            TransferState::Sending => "SENDING",
            TransferState::Awaiting => "AWAITING",
            TransferState::Applying => "APPLYING",
            TransferState::Draining => "DRAINING",
            TransferState::Done => "DONE",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_done_is_terminal() {
        assert!(TransferState::Done.is_terminal());
        assert!(!TransferState::Draining.is_terminal());
        assert_eq!(TransferState::default(), TransferState::Filling);
    }

    #[test]
    fn display_is_uppercase() {
        assert_eq!(TransferState::Awaiting.to_string(), "AWAITING");
    }
}
