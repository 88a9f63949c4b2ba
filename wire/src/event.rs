//! Event kinds and their payload layouts.

use crate::types::{
    AnimationKind, ColorTag, EntityId, ItemKind, MessageKind, PeerId, Phase, ScoreType,
    TransitionCause,
};

define_events! {
    /// Handshake announcement; answered once with `reply = true`.
    Identity = 1 {
        is_host: bool,
        /// Registry fingerprint, see [`EventRegistry::protocol_hash`](crate::EventRegistry::protocol_hash).
        protocol: u32,
        reply: bool,
    }

    /// A peer asks the host for a colour.
    ColorPick = 2 {
        color: ColorTag,
    }

    /// Host verdict on a colour request.
    ColorVerdict = 3 {
        peer: PeerId,
        color: ColorTag,
        accepted: bool,
    }

    /// Colour-select readiness of the origin peer.
    Ready = 4 {
        ready: bool,
    }

    /// Level choice; only the host's pick with `play_pressed` starts the game.
    LevelPick = 5 {
        level: i32,
        play_pressed: bool,
    }

    Score = 6 {
        player: PeerId,
        score: ScoreType,
        round: i32,
    }

    AnimationTrigger = 7 {
        entity: EntityId,
        animation: AnimationKind,
    }

    /// An item placed during the build phase; the placer becomes its owner.
    BuildAction = 8 {
        entity: EntityId,
        item: ItemKind,
        x: f32,
        y: f32,
        round: i32,
    }

    MushroomBounce = 9 {
        mushroom: EntityId,
        target: EntityId,
        strength: f32,
    }

    ObjectDeletion = 10 {
        entity: EntityId,
    }

    /// Phase-gating acknowledgement scoped to a round.
    Message = 11 {
        message: MessageKind,
        round: i32,
    }

    /// Client asks the host to transfer ownership, quoting its latest epoch.
    OwnershipRequest = 12 {
        entity: EntityId,
        epoch: u32,
    }

    /// Owner gives an entity back, quoting its latest epoch.
    OwnershipRelease = 13 {
        entity: EntityId,
        epoch: u32,
    }

    /// Host-sequenced ownership state; `owner` 0 means free.
    OwnershipUpdate = 14 {
        entity: EntityId,
        owner: PeerId,
        epoch: u32,
    }

    /// Host-authoritative phase transition.
    PhaseChange = 15 {
        phase: Phase,
        round: i32,
        cause: TransitionCause,
    }

    /// Authoritative body state from the entity's current owner.
    BodySync = 16 {
        entity: EntityId,
        x: f32,
        y: f32,
        vx: f32,
        vy: f32,
    }
}

/// A typed, replicated state change.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Event {
    /// Peer that produced the event.
    pub origin: PeerId,
    pub payload: Payload,
}

impl Event {
    /// Creates a new event.
    #[must_use]
    pub fn new(origin: PeerId, payload: impl Into<Payload>) -> Self {
        Self {
            origin,
            payload: payload.into(),
        }
    }

    /// Returns the event kind.
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        self.payload.kind()
    }
}
