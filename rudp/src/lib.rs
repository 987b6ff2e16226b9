//! `rudp`: reliable, in-order byte-stream transfer over UDP.
//!
//! # Architecture
//!
//! ```text
//!  ┌──────────────┐  start/data/end  ┌────────────────┐
//!  │    Sender    │─────────────────▶│    Receiver    │
//!  │ (go-back-N + │                  │ (reassembly,   │
//!  │  SACK)       │◀─────────────────│  cum/sel acks) │
//!  └──────┬───────┘       acks       └───────┬────────┘
//!         │                                  │
//!  ┌──────▼──────────────────────────────────▼────────┐
//!  │   Codec (text | record)  ·  Transport (UDP | link) │
//!  └───────────────────────────────────────────────────┘
//! ```
//!
//! Each module has a single responsibility:
//! - [`packet`]: frame kinds, checksum, decode errors
//! - [`codec`]: the two wire encodings behind one trait
//! - [`ack`]: acknowledgment frames and their parsing
//! - [`window`]: bounded send window with transmit cursor
//! - [`timer`]: go-back-N retransmission policy
//! - [`source`]: fixed-size chunk reader with look-ahead
//! - [`sender`]: the transmission loop
//! - [`state`]: transmission-loop states
//! - [`receiver`]: reference peer (reassembly and acks)
//! - [`config`]: sender / receiver settings
//! - [`transport`]: datagram transport trait and UDP implementation
//! - [`simulator`]: impairment pipeline and in-memory link for testing

pub mod ack;
pub mod codec;
pub mod config;
pub mod packet;
pub mod receiver;
pub mod sender;
pub mod simulator;
pub mod source;
pub mod state;
pub mod timer;
pub mod transport;
pub mod window;

pub use ack::AckFrame;
pub use codec::{Codec, Encoding, RecordCodec, TextCodec, WireCodec};
pub use config::{ConfigError, ReceiverConfig, SenderConfig};
pub use receiver::{ReceiveError, ReceiveStats, Receiver};
pub use sender::{SendError, Sender, TransferStats};
pub use transport::{Transport, TransportError, UdpTransport};
