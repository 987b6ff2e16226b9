//! Reference receiver: the peer end of a transfer.
//!
//! [`ReceiveWindow`] implements the receive side of the protocol:
//!
//! - Messages are accepted when their sequence number falls inside
//!   `[next_expected, next_expected + capacity)`; out-of-order ones are
//!   buffered until the gap before them fills.
//! - Contiguous payload is released in order and written to the output.
//! - After every valid frame (accepted or not) the peer replies with an ack
//!   whose cumulative boundary is `next_expected`; in SACK mode it also lists
//!   every buffered sequence number.
//! - Corrupted frames are dropped without reply: a damaged frame is never
//!   acknowledged.
//!
//! [`Receiver`] wraps the window with a transport and an output sink.

use std::collections::BTreeMap;
use std::io::{self, Write};

use thiserror::Error;

use crate::ack::AckFrame;
use crate::codec::{Codec, WireCodec};
use crate::config::{ConfigError, ReceiverConfig};
use crate::packet::{Frame, Packet, PacketKind};
use crate::transport::{Transport, TransportError};

// ---------------------------------------------------------------------------
// ReceiveWindow
// ---------------------------------------------------------------------------

/// What happened to one inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arrival {
    /// New message, buffered or released.
    Accepted,
    /// Already received (below the boundary or already buffered).
    Duplicate,
    /// Too far ahead of the boundary to buffer.
    OutOfWindow,
}

/// Reassembly state for one inbound stream.
#[derive(Debug)]
pub struct ReceiveWindow {
    capacity: usize,
    /// Every message below this has been released.
    next_expected: u64,
    /// Out-of-order messages waiting for the gap before them.
    buffered: BTreeMap<u64, Vec<u8>>,
    /// In-order payload not yet handed to the application.
    ready: Vec<u8>,
    /// Sequence number of the `end` message, once seen.
    end_seqno: Option<u64>,
    started: bool,
}

impl ReceiveWindow {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity >= 1, "window capacity must be at least 1");
        Self {
            capacity,
            next_expected: 0,
            buffered: BTreeMap::new(),
            ready: Vec::new(),
            end_seqno: None,
            started: false,
        }
    }

    /// Cumulative boundary: the next sequence number expected.
    pub fn next_expected(&self) -> u64 {
        self.next_expected
    }

    /// `true` once any valid message has arrived.
    pub fn has_started(&self) -> bool {
        self.started
    }

    /// `true` once the `end` message and everything before it were released.
    pub fn is_complete(&self) -> bool {
        self.end_seqno.is_some_and(|end| self.next_expected > end)
    }

    /// Process one verified data-bearing message.
    pub fn on_packet(&mut self, packet: Packet) -> Arrival {
        let Packet {
            kind,
            seqno,
            payload,
        } = packet;
        self.started = true;

        if seqno < self.next_expected || self.buffered.contains_key(&seqno) {
            return Arrival::Duplicate;
        }
        if seqno - self.next_expected >= self.capacity as u64 {
            return Arrival::OutOfWindow;
        }
        if kind == PacketKind::End {
            self.end_seqno = Some(seqno);
        }

        self.buffered.insert(seqno, payload);
        while let Some(payload) = self.buffered.remove(&self.next_expected) {
            self.ready.extend_from_slice(&payload);
            self.next_expected += 1;
        }
        Arrival::Accepted
    }

    /// Acknowledgment reflecting the current state.
    pub fn ack(&self, sack: bool) -> AckFrame {
        if sack {
            AckFrame::with_selective(self.next_expected, self.buffered.keys().copied())
        } else {
            AckFrame::cumulative(self.next_expected)
        }
    }

    /// Drain the in-order payload released so far.
    pub fn take_ready(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.ready)
    }
}

// ---------------------------------------------------------------------------
// Receiver
// ---------------------------------------------------------------------------

/// Faults that abort the receiver.
#[derive(Debug, Error)]
pub enum ReceiveError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("writing output: {0}")]
    Output(#[from] io::Error),
}

/// Counters collected by the receiver.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReceiveStats {
    pub frames_received: u64,
    pub frames_discarded: u64,
    pub duplicates: u64,
    pub out_of_window: u64,
    pub acks_sent: u64,
    pub bytes_delivered: u64,
    /// The whole stream, `end` included, was delivered.
    pub complete: bool,
    /// Cumulative boundary when the receiver stopped.
    pub final_ack: u64,
}

/// Peer end of a transfer: reassembles frames into `output`.
pub struct Receiver<T, W> {
    transport: T,
    output: W,
    codec: WireCodec,
    window: ReceiveWindow,
    config: ReceiverConfig,
    stats: ReceiveStats,
}

impl<T: Transport, W: Write> Receiver<T, W> {
    pub fn new(transport: T, output: W, config: ReceiverConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            transport,
            output,
            codec: WireCodec::from(config.encoding),
            window: ReceiveWindow::new(config.window_size),
            config,
            stats: ReceiveStats::default(),
        })
    }

    pub fn window(&self) -> &ReceiveWindow {
        &self.window
    }

    pub fn into_output(self) -> W {
        self.output
    }

    /// Serve the transfer until it completes and the link goes quiet, or
    /// until nothing arrives for `idle_timeout` once it has begun.
    ///
    /// Before the first valid frame the receiver waits for `start_timeout`,
    /// or forever when that is `None`.
    pub async fn run(&mut self) -> Result<ReceiveStats, ReceiveError> {
        loop {
            let wait = if self.window.is_complete() {
                self.config.linger
            } else if self.window.has_started() {
                self.config.idle_timeout
            } else {
                self.config.start_timeout.unwrap_or(self.config.idle_timeout)
            };
            if let Some(frame) = self.transport.recv(wait).await? {
                self.handle_frame(&frame).await?;
            } else if self.window.has_started() || self.config.start_timeout.is_some() {
                break;
            } else {
                log::trace!("[recv] still waiting for a sender");
            }
        }

        self.output.flush()?;
        self.stats.complete = self.window.is_complete();
        self.stats.final_ack = self.window.next_expected();
        if self.stats.complete {
            log::info!(
                "[recv] transfer complete: {} B delivered, final ack {}",
                self.stats.bytes_delivered,
                self.stats.final_ack
            );
        } else if self.window.has_started() {
            log::warn!(
                "[recv] link idle for {:?}; stopping at ack {}",
                self.config.idle_timeout,
                self.stats.final_ack
            );
        } else {
            log::warn!("[recv] no sender showed up within {:?}", self.config.start_timeout);
        }
        Ok(self.stats.clone())
    }

    /// Process one raw frame and reply if it was valid.
    pub async fn handle_frame(&mut self, frame: &[u8]) -> Result<(), ReceiveError> {
        self.stats.frames_received += 1;
        let packet = match self.codec.decode(frame) {
            Ok(decoded) => match decoded.frame {
                Frame::Packet(packet) => packet,
                Frame::Ack(ack) => {
                    self.stats.frames_discarded += 1;
                    log::warn!("[recv] ignoring stray ack {ack}");
                    return Ok(());
                }
            },
            Err(e) => {
                self.stats.frames_discarded += 1;
                log::debug!("[recv] dropping frame ({} B): {e}", frame.len());
                return Ok(());
            }
        };

        let (kind, seqno) = (packet.kind, packet.seqno);
        match self.window.on_packet(packet) {
            Arrival::Accepted => {}
            Arrival::Duplicate => self.stats.duplicates += 1,
            Arrival::OutOfWindow => self.stats.out_of_window += 1,
        }

        let ready = self.window.take_ready();
        if !ready.is_empty() {
            self.output.write_all(&ready)?;
            self.stats.bytes_delivered += ready.len() as u64;
        }

        let ack = self.window.ack(self.config.sack);
        self.transport
            .send(&self.codec.encode_ack(&ack, self.config.sack))
            .await?;
        self.stats.acks_sent += 1;
        log::debug!("[recv] ← {kind} seq={seqno}; → ack {ack}");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
