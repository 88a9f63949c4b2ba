//! Frame encoding and decoding.
//!
//! Frame layout: `[kind: u8][origin: u32][payload...]`, big-endian, no
//! padding, no length prefix. Each kind has a statically known payload width
//! and decoding must consume exactly that many bytes.

use stream::{ByteReader, ByteWriter, StreamResult};

use crate::error::{CorruptReason, WireError, WireResult};
use crate::event::{Event, EventKind, Payload};
use crate::registry::EventRegistry;
use crate::types::PeerId;

/// Size of the `[kind][origin]` frame header in bytes.
pub const FRAME_HEADER_SIZE: usize = 1 + 4;

/// Decoded frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Raw kind tag (may be unknown to the local registry).
    pub tag: u8,
    pub origin: PeerId,
}

/// Encodes a full frame.
#[must_use]
pub fn encode_event(event: &Event) -> Vec<u8> {
    let mut out = Vec::with_capacity(frame_len(event.kind()));
    encode_event_into(event, &mut out);
    out
}

/// Appends a full frame to `out`.
pub fn encode_event_into(event: &Event, out: &mut Vec<u8>) {
    let mut writer = ByteWriter::with_capacity(frame_len(event.kind()));
    writer.write_u8(event.kind().tag());
    writer.write_u32(event.origin.raw());
    event.payload.write_body(&mut writer);
    writer.finish_into(out);
}

/// Encodes only the payload fields of `payload`.
#[must_use]
pub fn encode_payload(payload: &Payload) -> Vec<u8> {
    let mut writer = ByteWriter::with_capacity(payload.kind().payload_width());
    payload.write_body(&mut writer);
    writer.finish()
}

/// Total encoded frame length for `kind`.
#[must_use]
pub const fn frame_len(kind: EventKind) -> usize {
    FRAME_HEADER_SIZE + kind.payload_width()
}

/// Reads the frame header without touching the payload.
pub fn peek_header(bytes: &[u8]) -> WireResult<FrameHeader> {
    let mut reader = ByteReader::new(bytes);
    match read_header(&mut reader) {
        Ok((tag, origin)) => Ok(FrameHeader {
            tag,
            origin: PeerId::new(origin),
        }),
        Err(_) => Err(WireError::CorruptPayload {
            tag: bytes.first().copied().unwrap_or(0),
            reason: CorruptReason::MissingHeader {
                actual: bytes.len(),
            },
        }),
    }
}

fn read_header(reader: &mut ByteReader<'_>) -> StreamResult<(u8, u32)> {
    Ok((reader.read_u8()?, reader.read_u32()?))
}

/// Decodes the payload body of a known `kind`.
///
/// `body` must hold exactly `kind.payload_width()` bytes.
pub fn decode_payload(kind: EventKind, body: &[u8]) -> WireResult<Payload> {
    let mut payload = Payload::empty(kind);
    payload.read_from(body)?;
    Ok(payload)
}

/// Decodes a full frame, resolving its kind through `registry`.
pub fn decode_event(bytes: &[u8], registry: &EventRegistry) -> WireResult<Event> {
    let header = peek_header(bytes)?;
    let mut payload = registry.create(header.tag)?;
    payload.read_from(&bytes[FRAME_HEADER_SIZE..])?;
    Ok(Event {
        origin: header.origin,
        payload,
    })
}

impl Payload {
    /// Overwrites this payload's fields from `body`.
    ///
    /// Fails with [`WireError::CorruptPayload`] on any length mismatch or
    /// out-of-domain field value; on failure the payload contents are
    /// unspecified and must be discarded.
    pub fn read_from(&mut self, body: &[u8]) -> WireResult<()> {
        let kind = self.kind();
        let expected = kind.payload_width();
        if body.len() != expected {
            return Err(WireError::CorruptPayload {
                tag: kind.tag(),
                reason: CorruptReason::Length {
                    expected,
                    actual: body.len(),
                },
            });
        }
        let mut reader = ByteReader::new(body);
        self.read_body(&mut reader)
            .map_err(|err| err.into_wire(kind.tag(), expected, body.len()))?;
        debug_assert!(reader.is_empty());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{Identity, LevelPick, Ready, Score};
    use crate::types::ScoreType;

    #[test]
    fn frame_layout_is_tag_origin_payload() {
        let event = Event::new(PeerId::new(0x0102_0304), Ready { ready: true });
        let bytes = encode_event(&event);
        assert_eq!(bytes, vec![4, 0x01, 0x02, 0x03, 0x04, 1]);
    }

    #[test]
    fn score_roundtrip() {
        let registry = EventRegistry::standard();
        let event = Event::new(
            PeerId::new(1),
            Score {
                player: PeerId::new(1),
                score: ScoreType::EndTreasure,
                round: 1,
            },
        );
        let bytes = encode_event(&event);
        assert_eq!(bytes.len(), frame_len(EventKind::Score));
        assert_eq!(decode_event(&bytes, &registry).unwrap(), event);
    }

    #[test]
    fn trailing_byte_is_corrupt() {
        let registry = EventRegistry::standard();
        let mut bytes = encode_event(&Event::new(
            PeerId::new(2),
            LevelPick {
                level: 3,
                play_pressed: true,
            },
        ));
        bytes.push(0);
        let err = decode_event(&bytes, &registry).unwrap_err();
        assert_eq!(
            err,
            WireError::CorruptPayload {
                tag: EventKind::LevelPick.tag(),
                reason: CorruptReason::Length {
                    expected: 5,
                    actual: 6
                }
            }
        );
    }

    #[test]
    fn short_header_is_corrupt() {
        let registry = EventRegistry::standard();
        let err = decode_event(&[4, 0, 0], &registry).unwrap_err();
        assert!(matches!(
            err,
            WireError::CorruptPayload {
                tag: 4,
                reason: CorruptReason::MissingHeader { actual: 3 }
            }
        ));
        assert!(matches!(
            decode_event(&[], &registry),
            Err(WireError::CorruptPayload { tag: 0, .. })
        ));
    }

    #[test]
    fn unknown_tag_checked_before_payload() {
        let registry = EventRegistry::standard();
        let err = decode_event(&[0x80, 0, 0, 0, 1, 9, 9], &registry).unwrap_err();
        assert_eq!(err, WireError::UnknownEventKind { tag: 0x80 });
    }

    #[test]
    fn invalid_bool_is_corrupt() {
        let err = decode_payload(EventKind::Identity, &[2, 0, 0, 0, 0, 0]).unwrap_err();
        assert!(matches!(
            err,
            WireError::CorruptPayload {
                reason: CorruptReason::InvalidValue { field: "bool", .. },
                ..
            }
        ));
    }

    #[test]
    fn payload_only_roundtrip() {
        let payload = Payload::from(Identity {
            is_host: true,
            protocol: 0xCAFE_F00D,
            reply: false,
        });
        let body = encode_payload(&payload);
        assert_eq!(decode_payload(EventKind::Identity, &body).unwrap(), payload);
    }
}
