//! Error types for event encoding and decoding.

use std::fmt;

use stream::StreamError;

/// Result type for wire operations.
pub type WireResult<T> = Result<T, WireError>;

/// Errors surfaced while turning bytes into events.
///
/// Both variants are protocol-level: the receiver drops the single offending
/// frame and keeps going.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum WireError {
    /// The frame did not hold exactly the bytes its kind requires.
    #[error("corrupt payload for tag {tag}: {reason}")]
    CorruptPayload { tag: u8, reason: CorruptReason },

    /// The tag is not registered with the decoding registry.
    #[error("unknown event kind tag {tag}")]
    UnknownEventKind { tag: u8 },

    /// A kind was registered twice while building a registry.
    #[error("event kind tag {tag} registered twice")]
    DuplicateRegistration { tag: u8 },

    /// A factory produced a payload of a different kind than it was registered for.
    #[error("factory for tag {registered} produced a payload with tag {produced}")]
    FactoryKindMismatch { registered: u8, produced: u8 },
}

/// Why a payload was rejected as corrupt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorruptReason {
    /// Frame is shorter than the `[kind][origin]` header.
    MissingHeader { actual: usize },
    /// Body length differs from the kind's static payload width.
    Length { expected: usize, actual: usize },
    /// A field held a value outside its domain (bool byte, enum discriminant).
    InvalidValue { field: &'static str, raw: u32 },
}

impl fmt::Display for CorruptReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingHeader { actual } => {
                write!(f, "frame header needs 5 bytes, found {actual}")
            }
            Self::Length { expected, actual } => {
                write!(f, "expected {expected} payload bytes, found {actual}")
            }
            Self::InvalidValue { field, raw } => {
                write!(f, "invalid {field} value {raw}")
            }
        }
    }
}

/// Error produced by a single field read; lifted into [`WireError`] by the codec.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FieldError {
    #[error(transparent)]
    Stream(#[from] StreamError),

    #[error("invalid {field} value {raw}")]
    InvalidValue { field: &'static str, raw: u32 },
}

impl FieldError {
    pub(crate) fn into_wire(self, tag: u8, expected: usize, actual: usize) -> WireError {
        let reason = match self {
            Self::Stream(StreamError::InvalidBool { found }) => CorruptReason::InvalidValue {
                field: "bool",
                raw: u32::from(found),
            },
            Self::Stream(StreamError::UnexpectedEof { .. }) => {
                CorruptReason::Length { expected, actual }
            }
            Self::InvalidValue { field, raw } => CorruptReason::InvalidValue { field, raw },
        };
        WireError::CorruptPayload { tag, reason }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn corrupt_payload_display() {
        let err = WireError::CorruptPayload {
            tag: 6,
            reason: CorruptReason::Length {
                expected: 9,
                actual: 8,
            },
        };
        let msg = err.to_string();
        assert!(msg.contains("tag 6"));
        assert!(msg.contains("expected 9"));
        assert!(msg.contains("found 8"));
    }

    #[test]
    fn unknown_kind_display() {
        let err = WireError::UnknownEventKind { tag: 200 };
        assert!(err.to_string().contains("200"));
    }

    #[test]
    fn invalid_bool_maps_to_invalid_value() {
        let err = FieldError::Stream(StreamError::InvalidBool { found: 9 }).into_wire(4, 1, 1);
        assert_eq!(
            err,
            WireError::CorruptPayload {
                tag: 4,
                reason: CorruptReason::InvalidValue {
                    field: "bool",
                    raw: 9
                }
            }
        );
    }
}
