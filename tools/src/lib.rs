//! Inspection and decoding tools for captured hopnet frames.
//!
//! This crate provides utilities for looking at raw event frames:
//!
//! - Explain a frame's header and payload size against the registry
//! - Decode a frame into structured JSON
//! - Render a decoded frame as a short human-readable listing
//!
//! # Design Principles
//!
//! - **First-class tooling** - These tools are part of the product, not afterthoughts.
//! - **Human-readable output** - Make it easy to see what went over the wire.
//! - **Same codec** - Everything goes through `wire`, so a frame the tools accept
//!   is a frame a peer would accept.

use std::fmt::Write as _;

use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use serde_json::Value;
use wire::{decode_event, peek_header, EventKind, EventRegistry, FrameHeader, FRAME_HEADER_SIZE};

/// Structural summary of one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InspectReport {
    pub header: FrameHeader,
    /// `None` when the tag is not registered.
    pub kind: Option<EventKind>,
    pub total_bytes: usize,
    pub payload_bytes: usize,
    /// Payload width the registry expects for this tag.
    pub expected_payload_bytes: Option<usize>,
}

impl InspectReport {
    /// Returns `true` if the payload length matches the kind's width.
    #[must_use]
    pub fn length_ok(&self) -> bool {
        self.expected_payload_bytes == Some(self.payload_bytes)
    }
}

/// Reads the header of `bytes` and compares the payload length to the registry.
///
/// Only a frame too short to carry a header is an error; unknown tags and
/// length mismatches are reported.
pub fn inspect_frame(bytes: &[u8], registry: &EventRegistry) -> Result<InspectReport> {
    let header = peek_header(bytes).map_err(|err| anyhow!("inspect frame: {err}"))?;
    let kind = EventKind::from_tag(header.tag).filter(|kind| registry.contains(*kind));
    Ok(InspectReport {
        header,
        kind,
        total_bytes: bytes.len(),
        payload_bytes: bytes.len() - FRAME_HEADER_SIZE,
        expected_payload_bytes: kind.map(EventKind::payload_width),
    })
}

/// Decoded frame in a serializable shape.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecodeOutput {
    pub kind: &'static str,
    pub tag: u8,
    pub origin: u32,
    pub frame_bytes: usize,
    /// Payload fields keyed by name.
    pub fields: Value,
}

/// Decodes a full frame into a [`DecodeOutput`].
pub fn decode_frame_json(bytes: &[u8], registry: &EventRegistry) -> Result<DecodeOutput> {
    let event = decode_event(bytes, registry).map_err(|err| anyhow!("decode frame: {err}"))?;
    let kind = event.kind();
    let fields = match serde_json::to_value(event.payload).context("serialize payload")? {
        Value::Object(mut outer) => outer.remove(kind.name()).unwrap_or(Value::Null),
        other => other,
    };
    Ok(DecodeOutput {
        kind: kind.name(),
        tag: kind.tag(),
        origin: event.origin.raw(),
        frame_bytes: bytes.len(),
        fields,
    })
}

/// Renders a decoded frame as indented `name: value` lines.
#[must_use]
pub fn format_decode_pretty(output: &DecodeOutput) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "kind: {} (tag {})", output.kind, output.tag);
    let _ = writeln!(out, "origin: peer#{}", output.origin);
    let _ = writeln!(out, "frame: {} bytes", output.frame_bytes);
    match &output.fields {
        Value::Object(fields) => {
            out.push_str("fields:");
            for (name, value) in fields {
                let _ = write!(out, "\n  {name}: {}", render_value(value));
            }
        }
        other => {
            let _ = write!(out, "fields: {}", render_value(other));
        }
    }
    out
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wire::{encode_event, Event, PeerId, Ready, RegistryBuilder, Score, ScoreType};

    fn score_frame() -> Vec<u8> {
        encode_event(&Event::new(
            PeerId::new(2),
            Score {
                player: PeerId::new(2),
                score: ScoreType::EndTreasure,
                round: 3,
            },
        ))
    }

    #[test]
    fn inspect_reports_kind_and_sizes() {
        let registry = EventRegistry::standard();
        let report = inspect_frame(&score_frame(), &registry).unwrap();
        assert_eq!(report.kind, Some(EventKind::Score));
        assert_eq!(report.header.origin, PeerId::new(2));
        assert_eq!(report.total_bytes, FRAME_HEADER_SIZE + 9);
        assert!(report.length_ok());
    }

    #[test]
    fn inspect_flags_length_mismatch_without_failing() {
        let registry = EventRegistry::standard();
        let mut bytes = score_frame();
        bytes.pop();
        let report = inspect_frame(&bytes, &registry).unwrap();
        assert_eq!(report.expected_payload_bytes, Some(9));
        assert_eq!(report.payload_bytes, 8);
        assert!(!report.length_ok());
    }

    #[test]
    fn inspect_unregistered_tag_has_no_kind() {
        let mut builder = RegistryBuilder::new();
        builder
            .register(EventKind::Ready, Ready::empty_payload)
            .unwrap();
        let registry = builder.build();
        let report = inspect_frame(&score_frame(), &registry).unwrap();
        assert_eq!(report.kind, None);
        assert!(!report.length_ok());
    }

    #[test]
    fn inspect_rejects_headerless_frame() {
        let registry = EventRegistry::standard();
        assert!(inspect_frame(&[6, 0], &registry).is_err());
    }

    #[test]
    fn decode_json_names_fields() {
        let registry = EventRegistry::standard();
        let output = decode_frame_json(&score_frame(), &registry).unwrap();
        assert_eq!(output.kind, "Score");
        assert_eq!(output.tag, 6);
        assert_eq!(output.origin, 2);
        assert_eq!(output.fields["player"], 2);
        assert_eq!(output.fields["score"], "EndTreasure");
        assert_eq!(output.fields["round"], 3);

        let json = serde_json::to_value(&output).unwrap();
        assert_eq!(json["kind"], "Score");
    }

    #[test]
    fn decode_json_rejects_corrupt_frame() {
        let registry = EventRegistry::standard();
        let mut bytes = score_frame();
        bytes.push(0);
        let err = decode_frame_json(&bytes, &registry).unwrap_err();
        assert!(err.to_string().contains("corrupt payload"));
    }

    #[test]
    fn pretty_lists_fields() {
        let registry = EventRegistry::standard();
        let output = decode_frame_json(&score_frame(), &registry).unwrap();
        let text = format_decode_pretty(&output);
        assert!(text.starts_with("kind: Score (tag 6)\norigin: peer#2"));
        assert!(text.contains("\n  score: EndTreasure"));
        assert!(text.contains("\n  round: 3"));
    }
}
