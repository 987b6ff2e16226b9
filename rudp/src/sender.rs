//! Transmission loop: drives one outbound transfer to completion.
//!
//! [`Sender`] owns the source, the [`SendWindow`], the codec and the
//! transport.  Each call to [`Sender::round`] performs one round:
//!
//! 1. if the oldest held message is overdue, rewind the cursor to the front of
//!    the window (go-back-N); *otherwise* admit the next chunk if the window
//!    has room;
//! 2. transmit the message under the cursor, if any;
//! 3. wait up to `receive_wait` for one response and apply it.
//!
//! The timeout check strictly precedes admission, so a round never both
//! rewinds and admits.  [`Sender::run`] repeats rounds until the source is
//! exhausted and every message has been acknowledged.
//!
//! Per-frame problems (bad checksum, undecodable response) are absorbed and
//! counted; only transport faults and source read errors end a transfer early.

use std::fmt;
use std::io::{self, Read};

use thiserror::Error;
use tokio::time::Instant;

use crate::ack;
use crate::codec::{Codec, WireCodec};
use crate::config::{ConfigError, SenderConfig};
use crate::packet::PacketKind;
use crate::source::ChunkSource;
use crate::state::TransferState;
use crate::timer::RetransmitPolicy;
use crate::transport::{Transport, TransportError};
use crate::window::{Message, SendWindow};

// ---------------------------------------------------------------------------
// Errors and statistics
// ---------------------------------------------------------------------------

/// Faults that abort a transfer.
#[derive(Debug, Error)]
pub enum SendError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("reading source: {0}")]
    Source(#[from] io::Error),
}

/// Counters collected over one transfer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferStats {
    pub rounds: u64,
    /// Frames handed to the transport, first transmissions included.
    pub frames_sent: u64,
    /// Frames carrying a message that had been sent before.
    pub retransmissions: u64,
    /// Go-back-N rewinds triggered by the send timeout.
    pub rewinds: u64,
    /// Valid acknowledgments applied to the window.
    pub acks_applied: u64,
    /// Responses dropped because they failed verification or parsing.
    pub frames_discarded: u64,
}

impl fmt::Display for TransferStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "rounds={} sent={} resent={} rewinds={} acks={} discarded={}",
            self.rounds,
            self.frames_sent,
            self.retransmissions,
            self.rewinds,
            self.acks_applied,
            self.frames_discarded
        )
    }
}

// ---------------------------------------------------------------------------
// Sender
// ---------------------------------------------------------------------------

/// Sender side of one transfer.
pub struct Sender<T, R> {
    transport: T,
    source: ChunkSource<R>,
    codec: WireCodec,
    window: SendWindow,
    policy: RetransmitPolicy,
    config: SenderConfig,
    /// Sequence number for the next admitted chunk.
    next_seqno: u64,
    /// Sequence number of the last chunk, once the source is exhausted.
    final_seqno: Option<u64>,
    state: TransferState,
    stats: TransferStats,
}

impl<T: Transport, R: Read> Sender<T, R> {
    pub fn new(transport: T, source: R, config: SenderConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            transport,
            source: ChunkSource::new(source, config.chunk_size),
            codec: WireCodec::from(config.encoding),
            window: SendWindow::new(config.window_size),
            policy: RetransmitPolicy::new(config.send_timeout),
            config,
            next_seqno: 0,
            final_seqno: None,
            state: TransferState::Filling,
            stats: TransferStats::default(),
        })
    }

    pub fn window(&self) -> &SendWindow {
        &self.window
    }

    pub fn state(&self) -> TransferState {
        self.state
    }

    pub fn stats(&self) -> &TransferStats {
        &self.stats
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Give back the transport, e.g. to inspect what a test double recorded.
    pub fn into_transport(self) -> T {
        self.transport
    }

    /// `true` once the source is exhausted and the window is empty.
    pub fn is_done(&mut self) -> Result<bool, SendError> {
        Ok(self.window.is_empty() && self.source.is_exhausted()?)
    }

    /// Drive rounds until every chunk of the source has been acknowledged.
    pub async fn run(&mut self) -> Result<TransferStats, SendError> {
        log::info!(
            "[send] starting transfer: window={} chunk={}B timeout={:?} wait={:?} sack={} encoding={:?}",
            self.config.window_size,
            self.config.chunk_size,
            self.config.send_timeout,
            self.config.receive_wait,
            self.config.sack,
            self.config.encoding,
        );
        while !self.is_done()? {
            self.round().await?;
        }
        self.state = TransferState::Done;
        log::info!(
            "[send] transfer complete: {} message(s), {}",
            self.next_seqno,
            self.stats
        );
        Ok(self.stats.clone())
    }

    /// Perform one round of the transmission loop.
    pub async fn round(&mut self) -> Result<(), SendError> {
        self.stats.rounds += 1;

        // (1) Timeout strictly before admission.
        if self.policy.should_rewind(&self.window, Instant::now()) {
            log::debug!(
                "[send] timeout on seq {}, going back over {} message(s)",
                self.window.oldest().map_or(0, |m| m.seqno),
                self.window.len()
            );
            self.window.rewind();
            self.stats.rewinds += 1;
        } else if self.window.can_admit(self.next_seqno) {
            self.state = TransferState::Filling;
            self.admit_next()?;
        }

        // (2) Transmit the message under the cursor.
        self.state = if self.final_seqno.is_some() {
            TransferState::Draining
        } else {
            TransferState::Sending
        };
        self.transmit_next().await?;

        // (3) Bounded wait for one response.
        self.state = TransferState::Awaiting;
        if let Some(response) = self.transport.recv(self.config.receive_wait).await? {
            self.state = TransferState::Applying;
            self.apply_response(&response);
        }

        if self.is_done()? {
            self.state = TransferState::Done;
        }
        Ok(())
    }

    /// Move the next source chunk into the window.
    fn admit_next(&mut self) -> Result<(), SendError> {
        if let Some(chunk) = self.source.take()? {
            let seqno = self.next_seqno;
            let len = chunk.len();
            if self.window.admit(Message::new(seqno, chunk)) {
                self.next_seqno += 1;
                log::trace!("[send] admitted seq={seqno} len={len}");
            }
        }
        // Peek ahead so the chunk just admitted can be tagged `end` if it was the last.
        if self.final_seqno.is_none() && self.source.is_exhausted()? {
            self.final_seqno = self.next_seqno.checked_sub(1);
        }
        Ok(())
    }

    async fn transmit_next(&mut self) -> Result<(), SendError> {
        let final_seqno = self.final_seqno;
        let Some((seqno, kind, frame, resend)) = self.window.next_to_send().map(|m| {
            let kind = PacketKind::for_message(m.seqno, final_seqno);
            let frame = self.codec.encode_packet(kind, m.seqno, &m.payload);
            (m.seqno, kind, frame, m.last_sent_at.is_some())
        }) else {
            return Ok(());
        };

        self.transport.send(&frame).await?;
        self.window.mark_sent(seqno, Instant::now());
        self.stats.frames_sent += 1;
        if resend {
            self.stats.retransmissions += 1;
        }
        log::debug!(
            "[send] → {kind} seq={seqno} frame={}B{}",
            frame.len(),
            if resend { " (resend)" } else { "" }
        );
        Ok(())
    }

    /// Verify, parse and apply one response.  Invalid responses are dropped.
    fn apply_response(&mut self, response: &[u8]) {
        let mut ack = match ack::parse(&self.codec, response) {
            Ok(ack) => ack,
            Err(e) => {
                self.stats.frames_discarded += 1;
                log::warn!("[send] ← discarding response ({} B): {e}", response.len());
                return;
            }
        };
        if !self.config.sack {
            ack.selective.clear();
        }

        let removed = self.window.prune(ack.cumulative, &ack.selective);
        self.stats.acks_applied += 1;
        log::debug!(
            "[send] ← ack {ack} pruned={removed} held={:?}",
            self.window.held_seqnos()
        );
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::time::Duration;

    use super::*;
    use crate::ack::AckFrame;
    use crate::codec::TextCodec;
    use crate::packet::{Frame, Packet};

    /// Transport double: records sent frames, replays queued responses.
    #[derive(Default)]
    struct Scripted {
        sent: Vec<Vec<u8>>,
        responses: VecDeque<Option<Vec<u8>>>,
    }

    impl Transport for Scripted {
        async fn send(&mut self, frame: &[u8]) -> Result<(), TransportError> {
            self.sent.push(frame.to_vec());
            Ok(())
        }

        async fn recv(&mut self, wait: Duration) -> Result<Option<Vec<u8>>, TransportError> {
            match self.responses.pop_front().flatten() {
                Some(frame) => Ok(Some(frame)),
                None => {
                    tokio::time::sleep(wait).await;
                    Ok(None)
                }
            }
        }
    }

    fn sent_packets(t: &Scripted) -> Vec<Packet> {
        t.sent
            .iter()
            .map(|f| match TextCodec.decode(f).unwrap().frame {
                Frame::Packet(p) => p,
                other => panic!("sender emitted {other:?}"),
            })
            .collect()
    }

    fn config() -> SenderConfig {
        SenderConfig {
            window_size: 3,
            chunk_size: 4,
            send_timeout: Duration::from_millis(100),
            receive_wait: Duration::from_millis(10),
            ..SenderConfig::default()
        }
    }

    #[test]
    fn invalid_config_is_rejected() {
        let cfg = SenderConfig {
            window_size: 0,
            ..config()
        };
        assert!(matches!(
            Sender::new(Scripted::default(), &b""[..], cfg),
            Err(ConfigError::ZeroWindow)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn empty_source_finishes_without_sending() {
        let mut s = Sender::new(Scripted::default(), &b""[..], config()).unwrap();
        let stats = s.run().await.unwrap();
        assert_eq!(stats.rounds, 0);
        assert!(s.state().is_terminal());
        assert!(s.into_transport().sent.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn fills_window_then_stops_admitting() {
        let mut s = Sender::new(Scripted::default(), &[1u8; 40][..], config()).unwrap();
        for _ in 0..5 {
            s.round().await.unwrap();
        }
        // Window of 3: seqs 0..3 sent, nothing else admitted without acks.
        assert_eq!(s.window().held_seqnos(), vec![0, 1, 2]);
        let seqs: Vec<u64> = sent_packets(s.transport()).iter().map(|p| p.seqno).collect();
        assert_eq!(seqs, vec![0, 1, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn kinds_follow_position() {
        let mut t = Scripted::default();
        // Ack each message as soon as it is sent.
        for cum in 1..=3 {
            t.responses
                .push_back(Some(TextCodec.encode_ack(&AckFrame::cumulative(cum), false)));
        }
        let mut s = Sender::new(t, &b"aaaabbbbcc"[..], config()).unwrap();
        s.run().await.unwrap();
        let kinds: Vec<PacketKind> = sent_packets(s.transport()).iter().map(|p| p.kind).collect();
        assert_eq!(kinds, vec![PacketKind::Start, PacketKind::Data, PacketKind::End]);
    }

    #[tokio::test(start_paused = true)]
    async fn corrupt_ack_is_discarded() {
        let mut t = Scripted::default();
        let mut bad = TextCodec.encode_ack(&AckFrame::cumulative(1), false);
        let last = bad.len() - 1;
        bad[last] ^= 0x01;
        t.responses.push_back(Some(bad));
        let mut s = Sender::new(t, &b"aaaa"[..], config()).unwrap();
        s.round().await.unwrap();
        assert_eq!(s.window().held_seqnos(), vec![0]);
        assert_eq!(s.stats().frames_discarded, 1);
        assert_eq!(s.stats().acks_applied, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn sacks_ignored_without_sack_mode() {
        let mut t = Scripted::default();
        t.responses.extend([None, None]);
        t.responses.push_back(Some(
            TextCodec.encode_ack(&AckFrame::with_selective(0, [1, 2]), true),
        ));
        let mut s = Sender::new(t, &[0u8; 12][..], config()).unwrap();
        for _ in 0..3 {
            s.round().await.unwrap();
        }
        assert_eq!(s.window().held_seqnos(), vec![0, 1, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_rewinds_before_admitting() {
        let mut s = Sender::new(Scripted::default(), &[0u8; 40][..], config()).unwrap();
        for _ in 0..3 {
            s.round().await.unwrap();
        }
        // Let the oldest message go stale.
        tokio::time::advance(Duration::from_millis(200)).await;
        s.round().await.unwrap();
        assert_eq!(s.stats().rewinds, 1);
        let seqs: Vec<u64> = sent_packets(s.transport()).iter().map(|p| p.seqno).collect();
        assert_eq!(seqs, vec![0, 1, 2, 0]);
        assert_eq!(s.stats().retransmissions, 1);
    }
}
