//! Acknowledgment frames and their parsing.
//!
//! A peer acknowledges with a cumulative boundary (the next sequence number it
//! expects) and, in SACK mode, the set of sequence numbers it holds beyond that
//! boundary.  Both travel in one *ack-string*:
//!
//! ```text
//!   "3"        cumulative 3, no selective acks
//!   "3;"       same, SACK mode with nothing held
//!   "3;5,7"    cumulative 3, selectively acked {5, 7}
//! ```
//!
//! [`parse`] is the entry point used by the transmission loop: it verifies the
//! frame through the active codec before anything is extracted.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::codec::Codec;
use crate::packet::{parse_number, CodecError, Frame, PacketKind};

const SACK_SEPARATOR: char = ';';
const LIST_SEPARATOR: char = ',';

/// Parsed acknowledgment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AckFrame {
    /// Every message with a smaller sequence number has been received.
    pub cumulative: u64,
    /// Individually received sequence numbers above `cumulative`.
    pub selective: BTreeSet<u64>,
}

impl AckFrame {
    /// A plain cumulative acknowledgment.
    pub fn cumulative(cumulative: u64) -> Self {
        Self {
            cumulative,
            selective: BTreeSet::new(),
        }
    }

    /// A cumulative acknowledgment plus selective acks.
    pub fn with_selective(cumulative: u64, selective: impl IntoIterator<Item = u64>) -> Self {
        Self {
            cumulative,
            selective: selective.into_iter().collect(),
        }
    }

    /// Render the ack-string.  `sack` selects the two-field form even when
    /// the selective set is empty.
    pub fn to_ack_string(&self, sack: bool) -> String {
        if !sack && self.selective.is_empty() {
            return self.cumulative.to_string();
        }
        let list: Vec<String> = self.selective.iter().map(u64::to_string).collect();
        format!(
            "{}{SACK_SEPARATOR}{}",
            self.cumulative,
            list.join(&LIST_SEPARATOR.to_string())
        )
    }
}

impl fmt::Display for AckFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_ack_string(!self.selective.is_empty()))
    }
}

impl FromStr for AckFrame {
    type Err = AckError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (cumulative, list) = match s.split_once(SACK_SEPARATOR) {
            Some((cumulative, list)) => (cumulative, list),
            None => (s, ""),
        };
        let cumulative = parse_number(cumulative.as_bytes())
            .map_err(|_| AckError::BadAckString(s.to_owned()))?;

        let mut selective = BTreeSet::new();
        if !list.is_empty() {
            for item in list.split(LIST_SEPARATOR) {
                let seqno = parse_number(item.as_bytes())
                    .map_err(|_| AckError::BadAckString(s.to_owned()))?;
                selective.insert(seqno);
            }
        }
        Ok(Self {
            cumulative,
            selective,
        })
    }
}

/// Reasons a response frame could not be turned into an [`AckFrame`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AckError {
    /// Checksum or structural failure reported by the codec.
    #[error(transparent)]
    Codec(#[from] CodecError),
    /// The frame verified but is not an acknowledgment.
    #[error("expected an ack frame, got {0}")]
    NotAnAck(PacketKind),
    /// The ack-string is not `<n>[;<n>,<n>...]`.
    #[error("malformed ack string {0:?}")]
    BadAckString(String),
}

/// Verify `response` with `codec` and extract its acknowledgment.
///
/// A frame that fails verification is never partially applied: the caller
/// gets an error and should discard the frame.
pub fn parse<C: Codec + ?Sized>(codec: &C, response: &[u8]) -> Result<AckFrame, AckError> {
    match codec.decode(response)?.frame {
        Frame::Ack(ack) => Ok(ack),
        Frame::Packet(packet) => Err(AckError::NotAnAck(packet.kind)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{RecordCodec, TextCodec};

    #[test]
    fn parse_cumulative_only() {
        let ack: AckFrame = "3".parse().unwrap();
        assert_eq!(ack, AckFrame::cumulative(3));
    }

    #[test]
    fn parse_empty_sack_list() {
        let ack: AckFrame = "3;".parse().unwrap();
        assert_eq!(ack, AckFrame::cumulative(3));
    }

    #[test]
    fn parse_sack_list() {
        let ack: AckFrame = "3;7,5".parse().unwrap();
        assert_eq!(ack.cumulative, 3);
        assert_eq!(ack.selective, BTreeSet::from([5, 7]));
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!("".parse::<AckFrame>().is_err());
        assert!("x".parse::<AckFrame>().is_err());
        assert!("3;5,".parse::<AckFrame>().is_err());
        assert!("3;a".parse::<AckFrame>().is_err());
    }

    #[test]
    fn ack_string_forms() {
        assert_eq!(AckFrame::cumulative(4).to_ack_string(false), "4");
        assert_eq!(AckFrame::cumulative(4).to_ack_string(true), "4;");
        assert_eq!(
            AckFrame::with_selective(4, [9, 6]).to_ack_string(true),
            "4;6,9"
        );
    }

    #[test]
    fn parse_through_text_codec() {
        let frame = TextCodec.encode_ack(&AckFrame::with_selective(2, [4]), true);
        assert_eq!(
            parse(&TextCodec, &frame).unwrap(),
            AckFrame::with_selective(2, [4])
        );
    }

    #[test]
    fn parse_through_record_codec() {
        let frame = RecordCodec.encode_ack(&AckFrame::with_selective(8, [10, 12]), true);
        assert_eq!(
            parse(&RecordCodec, &frame).unwrap(),
            AckFrame::with_selective(8, [10, 12])
        );
    }

    #[test]
    fn corrupted_ack_is_rejected() {
        let mut frame = TextCodec.encode_ack(&AckFrame::cumulative(5), false);
        frame[4] = b'6'; // "ack|5|..." -> "ack|6|..."
        assert!(matches!(
            parse(&TextCodec, &frame),
            Err(AckError::Codec(CodecError::ChecksumMismatch { .. }))
        ));
    }

    #[test]
    fn data_frame_is_not_an_ack() {
        let frame = TextCodec.encode_packet(PacketKind::Data, 1, b"hello");
        assert_eq!(
            parse(&TextCodec, &frame),
            Err(AckError::NotAnAck(PacketKind::Data))
        );
    }

    #[test]
    fn handwritten_sack_frame_accepted() {
        // What a SACK-mode peer emits: `sack|<cum>;<list>|<crc>`.
        let body = b"sack|3;5,6|".to_vec();
        let mut frame = body.clone();
        frame.extend_from_slice(crate::packet::checksum(&body).as_bytes());
        assert_eq!(
            parse(&TextCodec, &frame).unwrap(),
            AckFrame::with_selective(3, [5, 6])
        );
    }
}
