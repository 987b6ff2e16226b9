//! Wire-level types shared by every frame encoding.
//!
//! Every datagram exchanged between peers is a [`Frame`]: either a data-bearing
//! [`Packet`] (`start` / `data` / `end`) or an acknowledgment
//! ([`crate::ack::AckFrame`]).  This module is responsible for:
//! - Naming the frame kinds and their on-wire tags.
//! - The integrity checksum used by both encodings.
//! - The error type returned when a frame cannot be decoded.
//!
//! No I/O happens here; this is pure data.  The concrete byte layouts live in
//! [`crate::codec`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ack::AckFrame;

/// Field separator of the delimited-text encoding.
pub const SEPARATOR: u8 = b'|';

/// Kind tag carried by every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PacketKind {
    /// First message of a stream (sequence number 0).
    Start,
    /// Any message between the first and the last.
    Data,
    /// Final message of a finite stream.
    End,
    /// Acknowledgment from the receiving peer.
    Ack,
}

impl PacketKind {
    /// Kind of the data-bearing frame that carries message `seqno`.
    ///
    /// `final_seqno` is the sequence number of the last chunk once the source
    /// is known to be exhausted.  The last chunk is always `end`, so a
    /// single-chunk stream is one `end` frame and has no `start`.
    pub fn for_message(seqno: u64, final_seqno: Option<u64>) -> Self {
        if final_seqno == Some(seqno) {
            PacketKind::End
        } else if seqno == 0 {
            PacketKind::Start
        } else {
            PacketKind::Data
        }
    }

    /// On-wire tag.
    pub fn as_str(self) -> &'static str {
        match self {
            PacketKind::Start => "start",
            PacketKind::Data => "data",
            PacketKind::End => "end",
            PacketKind::Ack => "ack",
        }
    }
}

impl fmt::Display for PacketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PacketKind {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "start" => Ok(PacketKind::Start),
            "data" => Ok(PacketKind::Data),
            "end" => Ok(PacketKind::End),
            // Peers running in SACK mode may tag their acknowledgments `sack`.
            "ack" | "sack" => Ok(PacketKind::Ack),
            other => Err(CodecError::UnknownKind(other.to_owned())),
        }
    }
}

/// A data-bearing frame: one chunk of the transferred stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub kind: PacketKind,
    pub seqno: u64,
    pub payload: Vec<u8>,
}

impl Packet {
    pub fn new(kind: PacketKind, seqno: u64, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            kind,
            seqno,
            payload: payload.into(),
        }
    }
}

/// Any frame that can appear on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Packet(Packet),
    Ack(AckFrame),
}

/// A frame that passed checksum verification, together with the checksum it
/// carried on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoded {
    pub frame: Frame,
    pub checksum: String,
}

/// Errors that can arise when decoding a raw datagram.
///
/// Every variant is a per-frame failure: the transfer loops log and discard
/// the offending frame and carry on.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// The frame ended before all mandatory fields were present.
    #[error("frame truncated: missing {0}")]
    Truncated(&'static str),
    /// The kind tag is not one of `start`, `data`, `end`, `ack`.
    #[error("unknown frame kind {0:?}")]
    UnknownKind(String),
    /// A numeric field did not parse as an unsigned integer.
    #[error("invalid sequence number {0:?}")]
    BadNumber(String),
    /// The recomputed checksum differs from the one carried in the frame.
    #[error("checksum mismatch: computed {computed}, frame carries {reported}")]
    ChecksumMismatch { computed: String, reported: String },
    /// Structurally invalid frame (bad record, stray fields, ...).
    #[error("malformed frame: {0}")]
    Malformed(String),
}

/// CRC-32 (IEEE) of `covered`, rendered as an unsigned decimal string.
///
/// Both encodings compare checksums as strings, so the rendering is part of
/// the wire contract.
pub fn checksum(covered: &[u8]) -> String {
    crc32fast::hash(covered).to_string()
}

/// Parse an unsigned decimal field.
pub(crate) fn parse_number(raw: &[u8]) -> Result<u64, CodecError> {
    std::str::from_utf8(raw)
        .ok()
        .filter(|s| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()))
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| CodecError::BadNumber(String::from_utf8_lossy(raw).into_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_is_crc32_decimal() {
        // Well-known CRC-32 check value.
        assert_eq!(checksum(b"123456789"), "3421780262");
        assert_eq!(checksum(b""), "0");
    }

    #[test]
    fn kind_tags_roundtrip() {
        for kind in [
            PacketKind::Start,
            PacketKind::Data,
            PacketKind::End,
            PacketKind::Ack,
        ] {
            assert_eq!(kind.as_str().parse::<PacketKind>().unwrap(), kind);
        }
    }

    #[test]
    fn sack_tag_is_an_ack() {
        assert_eq!("sack".parse::<PacketKind>().unwrap(), PacketKind::Ack);
    }

    #[test]
    fn unknown_tag_rejected() {
        assert_eq!(
            "syn".parse::<PacketKind>(),
            Err(CodecError::UnknownKind("syn".into()))
        );
    }

    #[test]
    fn kind_for_message_positions() {
        assert_eq!(PacketKind::for_message(0, None), PacketKind::Start);
        assert_eq!(PacketKind::for_message(1, None), PacketKind::Data);
        assert_eq!(PacketKind::for_message(1, Some(2)), PacketKind::Data);
        assert_eq!(PacketKind::for_message(2, Some(2)), PacketKind::End);
        // A one-chunk stream is a lone `end`.
        assert_eq!(PacketKind::for_message(0, Some(0)), PacketKind::End);
    }

    #[test]
    fn parse_number_rejects_signs_and_garbage() {
        assert_eq!(parse_number(b"42"), Ok(42));
        assert!(parse_number(b"").is_err());
        assert!(parse_number(b"+1").is_err());
        assert!(parse_number(b"-1").is_err());
        assert!(parse_number(b"1 ").is_err());
        assert!(parse_number(b"99999999999999999999999").is_err());
    }
}
