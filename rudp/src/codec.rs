//! Frame encodings.
//!
//! Two interchangeable strategies implement [`Codec`]:
//!
//! - [`TextCodec`]: fields joined by `|`, checksum appended as the final
//!   field.  The checksum covers everything before it, *including* the
//!   trailing separator:
//!
//!   ```text
//!   start|0|<payload bytes>|<crc>
//!   ack|3;5,7|<crc>
//!   ```
//!
//! - [`RecordCodec`]: a self-describing record (JSON object) whose checksum
//!   field is computed over the record serialised *without* that field.
//!
//! Both use [`crate::packet::checksum`].  The encoding is chosen once per
//! transfer through [`Encoding`] / [`WireCodec`]; the transfer loops only see
//! the trait.

use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use crate::ack::AckFrame;
use crate::packet::{
    checksum, parse_number, CodecError, Decoded, Frame, Packet, PacketKind, SEPARATOR,
};

/// Capability interface shared by both encodings.
pub trait Codec {
    /// Encode a data-bearing frame.  `kind` must not be [`PacketKind::Ack`].
    fn encode_packet(&self, kind: PacketKind, seqno: u64, payload: &[u8]) -> Vec<u8>;

    /// Encode an acknowledgment.  `sack` selects the SACK ack-string form.
    fn encode_ack(&self, ack: &AckFrame, sack: bool) -> Vec<u8>;

    /// Verify and decode a frame.
    fn decode(&self, frame: &[u8]) -> Result<Decoded, CodecError>;

    /// `true` when the frame's checksum matches its contents.
    ///
    /// Never fails: malformed input is simply invalid.
    fn verify(&self, frame: &[u8]) -> bool;

    fn encode(&self, frame: &Frame, sack: bool) -> Vec<u8> {
        match frame {
            Frame::Packet(p) => self.encode_packet(p.kind, p.seqno, &p.payload),
            Frame::Ack(ack) => self.encode_ack(ack, sack),
        }
    }
}

// ---------------------------------------------------------------------------
// Delimited text
// ---------------------------------------------------------------------------

/// `|`-delimited encoding.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextCodec;

impl TextCodec {
    /// Append the checksum of `body` (which ends with a separator).
    fn seal(mut body: Vec<u8>) -> Vec<u8> {
        let crc = checksum(&body);
        body.extend_from_slice(crc.as_bytes());
        body
    }

    /// Split `frame` into the checksummed prefix (trailing separator included)
    /// and the reported checksum.
    fn split_checksum(frame: &[u8]) -> Option<(&[u8], &[u8])> {
        let pos = frame.iter().rposition(|b| *b == SEPARATOR)?;
        Some((&frame[..=pos], &frame[pos + 1..]))
    }
}

impl Codec for TextCodec {
    fn encode_packet(&self, kind: PacketKind, seqno: u64, payload: &[u8]) -> Vec<u8> {
        debug_assert_ne!(kind, PacketKind::Ack, "acks go through encode_ack");
        let seq = seqno.to_string();
        let mut body = Vec::with_capacity(kind.as_str().len() + seq.len() + payload.len() + 16);
        body.extend_from_slice(kind.as_str().as_bytes());
        body.push(SEPARATOR);
        body.extend_from_slice(seq.as_bytes());
        body.push(SEPARATOR);
        body.extend_from_slice(payload);
        body.push(SEPARATOR);
        Self::seal(body)
    }

    fn encode_ack(&self, ack: &AckFrame, sack: bool) -> Vec<u8> {
        let body = format!("{}|{}|", PacketKind::Ack, ack.to_ack_string(sack));
        Self::seal(body.into_bytes())
    }

    fn decode(&self, frame: &[u8]) -> Result<Decoded, CodecError> {
        let (covered, reported) =
            Self::split_checksum(frame).ok_or(CodecError::Truncated("checksum field"))?;
        let computed = checksum(covered);
        if computed.as_bytes() != reported {
            return Err(CodecError::ChecksumMismatch {
                computed,
                reported: String::from_utf8_lossy(reported).into_owned(),
            });
        }

        // Drop the trailing separator that the checksum covered.
        let body = &covered[..covered.len() - 1];
        let mut fields = body.splitn(3, |b| *b == SEPARATOR);
        let tag = fields.next().ok_or(CodecError::Truncated("kind"))?;
        let kind: PacketKind = std::str::from_utf8(tag)
            .map_err(|_| CodecError::UnknownKind(String::from_utf8_lossy(tag).into_owned()))?
            .parse()?;
        let second = fields.next().ok_or(CodecError::Truncated("sequence number"))?;

        let frame = match kind {
            PacketKind::Ack => {
                if fields.next().is_some() {
                    return Err(CodecError::Malformed("ack frame has extra fields".into()));
                }
                let ack_string = std::str::from_utf8(second)
                    .map_err(|_| CodecError::Malformed("ack string is not utf-8".into()))?;
                let ack = ack_string
                    .parse::<AckFrame>()
                    .map_err(|e| CodecError::Malformed(e.to_string()))?;
                Frame::Ack(ack)
            }
            _ => {
                let seqno = parse_number(second)?;
                // The payload is everything up to the checksum, separators included.
                let payload = fields.next().ok_or(CodecError::Truncated("payload"))?;
                Frame::Packet(Packet::new(kind, seqno, payload))
            }
        };

        Ok(Decoded {
            frame,
            checksum: String::from_utf8_lossy(reported).into_owned(),
        })
    }

    fn verify(&self, frame: &[u8]) -> bool {
        match Self::split_checksum(frame) {
            Some((covered, reported)) => checksum(covered).as_bytes() == reported,
            None => false,
        }
    }
}

// ---------------------------------------------------------------------------
// Self-describing record
// ---------------------------------------------------------------------------

/// JSON-record encoding.
///
/// The record's field order is fixed by [`Record`], so re-serialising a
/// decoded record reproduces the bytes the checksum was computed over.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecordCodec;

#[derive(Debug, Serialize, Deserialize)]
struct Record<'a> {
    kind: PacketKind,
    seqno: u64,
    #[serde(default, skip_serializing_if = "is_empty_bytes")]
    payload: Cow<'a, [u8]>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    sacks: Vec<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    checksum: Option<String>,
}

fn is_empty_bytes(bytes: &Cow<'_, [u8]>) -> bool {
    bytes.is_empty()
}

impl Record<'_> {
    /// Serialise without a checksum, checksum that, then serialise again with
    /// the checksum filled in.
    fn seal(mut self) -> Vec<u8> {
        self.checksum = None;
        let crc = checksum(&Self::to_bytes(&self));
        self.checksum = Some(crc);
        Self::to_bytes(&self)
    }

    /// Take the checksum out and recompute it over the remainder.
    ///
    /// Returns `(computed, reported)`.
    fn unseal(&mut self) -> Option<(String, String)> {
        let reported = self.checksum.take()?;
        Some((checksum(&Self::to_bytes(self)), reported))
    }

    fn to_bytes(record: &Record<'_>) -> Vec<u8> {
        // A struct of plain integers, strings and byte sequences always serialises.
        serde_json::to_vec(record).unwrap_or_default()
    }
}

impl Codec for RecordCodec {
    fn encode_packet(&self, kind: PacketKind, seqno: u64, payload: &[u8]) -> Vec<u8> {
        debug_assert_ne!(kind, PacketKind::Ack, "acks go through encode_ack");
        Record {
            kind,
            seqno,
            payload: Cow::Borrowed(payload),
            sacks: Vec::new(),
            checksum: None,
        }
        .seal()
    }

    fn encode_ack(&self, ack: &AckFrame, _sack: bool) -> Vec<u8> {
        Record {
            kind: PacketKind::Ack,
            seqno: ack.cumulative,
            payload: Cow::Borrowed(&[]),
            sacks: ack.selective.iter().copied().collect(),
            checksum: None,
        }
        .seal()
    }

    fn decode(&self, frame: &[u8]) -> Result<Decoded, CodecError> {
        let mut record: Record<'_> =
            serde_json::from_slice(frame).map_err(|e| CodecError::Malformed(e.to_string()))?;
        let (computed, reported) = record
            .unseal()
            .ok_or(CodecError::Truncated("checksum field"))?;
        if computed != reported {
            return Err(CodecError::ChecksumMismatch { computed, reported });
        }

        let frame = match record.kind {
            PacketKind::Ack => {
                if !record.payload.is_empty() {
                    return Err(CodecError::Malformed("ack record carries a payload".into()));
                }
                Frame::Ack(AckFrame::with_selective(record.seqno, record.sacks))
            }
            kind => {
                if !record.sacks.is_empty() {
                    return Err(CodecError::Malformed(format!("{kind} record carries sacks")));
                }
                Frame::Packet(Packet::new(kind, record.seqno, record.payload.into_owned()))
            }
        };
        Ok(Decoded {
            frame,
            checksum: reported,
        })
    }

    fn verify(&self, frame: &[u8]) -> bool {
        serde_json::from_slice::<Record<'_>>(frame)
            .ok()
            .and_then(|mut record| record.unseal())
            .is_some_and(|(computed, reported)| computed == reported)
    }
}

// ---------------------------------------------------------------------------
// Selection
// ---------------------------------------------------------------------------

/// Which wire encoding a transfer uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Encoding {
    #[default]
    Text,
    Binary,
}

/// The codec chosen for one transfer.
#[derive(Debug, Clone, Copy)]
pub enum WireCodec {
    Text(TextCodec),
    Binary(RecordCodec),
}

impl From<Encoding> for WireCodec {
    fn from(encoding: Encoding) -> Self {
        match encoding {
            Encoding::Text => WireCodec::Text(TextCodec),
            Encoding::Binary => WireCodec::Binary(RecordCodec),
        }
    }
}

impl Codec for WireCodec {
    fn encode_packet(&self, kind: PacketKind, seqno: u64, payload: &[u8]) -> Vec<u8> {
        match self {
            WireCodec::Text(c) => c.encode_packet(kind, seqno, payload),
            WireCodec::Binary(c) => c.encode_packet(kind, seqno, payload),
        }
    }

    fn encode_ack(&self, ack: &AckFrame, sack: bool) -> Vec<u8> {
        match self {
            WireCodec::Text(c) => c.encode_ack(ack, sack),
            WireCodec::Binary(c) => c.encode_ack(ack, sack),
        }
    }

    fn decode(&self, frame: &[u8]) -> Result<Decoded, CodecError> {
        match self {
            WireCodec::Text(c) => c.decode(frame),
            WireCodec::Binary(c) => c.decode(frame),
        }
    }

    fn verify(&self, frame: &[u8]) -> bool {
        match self {
            WireCodec::Text(c) => c.verify(frame),
            WireCodec::Binary(c) => c.verify(frame),
        }
    }
}
