//! Typed event payloads, wire codec and event registry for hopnet.
//!
//! This crate is the only part of the system that touches raw bytes. Every
//! replicated state change is an [`Event`]: a kind tag, the originating peer,
//! and a fixed-width payload. Frames are `[kind: u8][origin: u32][payload]`.
//!
//! # Design Principles
//!
//! - **One declaration per kind** - Payload layouts are declared once and the
//!   codec is generated from them, so there is no per-kind serializer to drift.
//! - **Exact decoding** - A frame must carry exactly its kind's width; short,
//!   long, or out-of-domain input is `CorruptPayload`, never a defaulted event.
//! - **Immutable registry** - The tag-to-factory table is built once at startup.
//! - **No session knowledge** - This crate knows nothing about phases or peers' state.

#[macro_use]
mod macros;

mod codec;
mod error;
mod event;
mod field;
mod registry;
mod types;

pub use codec::{
    decode_event, decode_payload, encode_event, encode_event_into, encode_payload, frame_len,
    peek_header, FrameHeader, FRAME_HEADER_SIZE,
};
pub use error::{CorruptReason, FieldError, WireError, WireResult};
pub use event::{
    AnimationTrigger, BodySync, BuildAction, ColorPick, ColorVerdict, Event, EventKind, Identity,
    LevelPick, Message, MushroomBounce, ObjectDeletion, OwnershipRelease, OwnershipRequest,
    OwnershipUpdate, Payload, PhaseChange, Ready, Score,
};
pub use field::WireField;
pub use registry::{EventRegistry, PayloadFactory, RegistryBuilder};
pub use types::{
    AnimationKind, ColorTag, EntityId, ItemKind, MessageKind, PeerId, Phase, ScoreType,
    TransitionCause,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_api_exports() {
        // Verify all expected items are exported
        let _ = FRAME_HEADER_SIZE;
        let _ = EventRegistry::standard();
        let _ = RegistryBuilder::new();
        let _ = PeerId::SYNTHETIC;
        let _ = EntityId::avatar(PeerId::new(1));
        let _ = Phase::ColorSelect;

        // Error types
        let _: WireResult<()> = Ok(());
    }

    #[test]
    fn header_size_constant_correct() {
        assert_eq!(
            FRAME_HEADER_SIZE,
            std::mem::size_of::<u8>() // kind
                + std::mem::size_of::<u32>() // origin
        );
    }

    #[test]
    fn max_frame_fits_small_datagram() {
        let max = EventKind::ALL
            .iter()
            .map(|kind| frame_len(*kind))
            .max()
            .unwrap_or(0);
        assert!(max <= 64, "frames should stay tiny, got {max}");
    }
}
