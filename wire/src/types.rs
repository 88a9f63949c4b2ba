//! Identifier and small-enum field types.

use std::fmt;

use stream::{ByteReader, ByteWriter};

use crate::error::FieldError;
use crate::field::WireField;

/// Short identifier of a session participant.
///
/// `0` is reserved for host-only synthetic events and level fixtures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PeerId(u32);

impl PeerId {
    /// Origin used by host-only synthetic events; never a real peer.
    pub const SYNTHETIC: Self = Self(0);

    /// Creates a new peer ID.
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Returns the raw peer ID value.
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Returns `true` for the reserved synthetic id.
    #[must_use]
    pub const fn is_synthetic(self) -> bool {
        self.0 == 0
    }

    /// Largest id that still fits the creator half of an [`EntityId`].
    pub const MAX_ENTITY_CREATOR: Self = Self(u16::MAX as u32);

    /// Returns `true` if entities minted by this peer keep distinct ids.
    #[must_use]
    pub const fn fits_entity_id(self) -> bool {
        self.0 <= Self::MAX_ENTITY_CREATOR.0
    }
}

impl From<u32> for PeerId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "peer#{}", self.0)
    }
}

impl WireField for PeerId {
    const WIDTH: usize = 4;

    fn write(self, writer: &mut ByteWriter) {
        writer.write_u32(self.0);
    }

    fn read(reader: &mut ByteReader<'_>) -> Result<Self, FieldError> {
        Ok(Self(reader.read_u32()?))
    }
}

/// A stable identifier for a shared simulation entity.
///
/// Ids are minted without coordination: the high 16 bits carry the peer that
/// created the entity, the low 16 bits a per-peer counter. Counter `0` is
/// reserved for that peer's avatar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EntityId(u32);

impl EntityId {
    /// Creates a new entity ID from its raw value.
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Composes an id from the creating peer and its local counter.
    ///
    /// Only peers for which [`PeerId::fits_entity_id`] holds round-trip
    /// through [`EntityId::creator`]; larger ids lose their high bits.
    #[must_use]
    pub const fn compose(peer: PeerId, local: u16) -> Self {
        Self((peer.raw() << 16) | local as u32)
    }

    /// The avatar entity controlled by `peer`.
    #[must_use]
    pub const fn avatar(peer: PeerId) -> Self {
        Self::compose(peer, 0)
    }

    /// Returns the raw entity ID value.
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// The peer that minted this id.
    #[must_use]
    pub const fn creator(self) -> PeerId {
        PeerId::new(self.0 >> 16)
    }

    /// Returns `true` if this id is some peer's avatar.
    #[must_use]
    pub const fn is_avatar(self) -> bool {
        self.0 & 0xFFFF == 0 && self.0 >> 16 != 0
    }
}

impl From<u32> for EntityId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "entity#{}:{}", self.0 >> 16, self.0 & 0xFFFF)
    }
}

impl WireField for EntityId {
    const WIDTH: usize = 4;

    fn write(self, writer: &mut ByteWriter) {
        writer.write_u32(self.0);
    }

    fn read(reader: &mut ByteReader<'_>) -> Result<Self, FieldError> {
        Ok(Self(reader.read_u32()?))
    }
}

wire_enum! {
    /// Player colour; at most one connected peer may hold each.
    ColorTag {
        #[default]
        Red = 0,
        Blue = 1,
        Green = 2,
        Yellow = 3,
    }
}

wire_enum! {
    /// Scoring outcome recorded during a move round.
    ScoreType {
        #[default]
        Finish = 0,
        EndTreasure = 1,
        TreasurePickup = 2,
        TrapKill = 3,
        Death = 4,
    }
}

impl ScoreType {
    /// Points credited to the player for this outcome.
    #[must_use]
    pub const fn points(self) -> u32 {
        match self {
            Self::Finish => 2,
            Self::EndTreasure => 3,
            Self::TrapKill => 1,
            Self::TreasurePickup | Self::Death => 0,
        }
    }

    /// Returns `true` if this outcome ends the player's movement for the round.
    #[must_use]
    pub const fn ends_movement(self) -> bool {
        matches!(self, Self::Finish | Self::EndTreasure | Self::Death)
    }
}

wire_enum! {
    /// Acknowledgement messages that gate phase transitions.
    MessageKind {
        #[default]
        BuildReady = 0,
        MovementEnded = 1,
    }
}

wire_enum! {
    /// What a simulation entity is.
    ItemKind {
        #[default]
        Avatar = 0,
        Platform = 1,
        Mushroom = 2,
        Trap = 3,
        Treasure = 4,
        Goal = 5,
    }
}

impl ItemKind {
    /// Returns `true` for items a player may place during the build phase.
    #[must_use]
    pub const fn is_placeable(self) -> bool {
        matches!(self, Self::Platform | Self::Mushroom | Self::Trap)
    }
}

wire_enum! {
    /// Cosmetic animation states replicated for the renderer.
    AnimationKind {
        #[default]
        Idle = 0,
        Run = 1,
        Jump = 2,
        Bounce = 3,
        Celebrate = 4,
        Defeat = 5,
    }
}

wire_enum! {
    /// Multiplayer round lifecycle stage.
    Phase {
        #[default]
        ColorSelect = 0,
        LevelSelect = 1,
        Build = 2,
        Move = 3,
        Scoreboard = 4,
        Victory = 5,
        Disconnected = 6,
    }
}

impl Phase {
    /// Returns `true` if no further transition can leave this phase.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Victory | Self::Disconnected)
    }
}

wire_enum! {
    /// Why a phase transition fired.
    TransitionCause {
        #[default]
        AllReady = 0,
        Countdown = 1,
        HostPick = 2,
        WinThreshold = 3,
        PeerLost = 4,
        NetError = 5,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_id_composition() {
        let peer = PeerId::new(3);
        let id = EntityId::compose(peer, 7);
        assert_eq!(id.raw(), (3 << 16) | 7);
        assert_eq!(id.creator(), peer);
        assert!(!id.is_avatar());
        assert!(EntityId::avatar(peer).is_avatar());
        assert!(!EntityId::compose(PeerId::SYNTHETIC, 0).is_avatar());
    }

    #[test]
    fn wide_peer_ids_do_not_fit_entity_ids() {
        let edge = PeerId::MAX_ENTITY_CREATOR;
        assert!(edge.fits_entity_id());
        assert_eq!(EntityId::avatar(edge).creator(), edge);

        let wide = PeerId::new(0x1_0001);
        assert!(!wide.fits_entity_id());
        assert_ne!(EntityId::avatar(wide).creator(), wide);
        assert_eq!(
            EntityId::compose(wide, 5),
            EntityId::compose(PeerId::new(1), 5)
        );
    }

    #[test]
    fn score_points() {
        assert_eq!(ScoreType::EndTreasure.points(), 3);
        assert_eq!(ScoreType::Finish.points(), 2);
        assert_eq!(ScoreType::TreasurePickup.points(), 0);
        assert!(ScoreType::Death.ends_movement());
        assert!(!ScoreType::TrapKill.ends_movement());
    }

    #[test]
    fn wire_enum_from_raw() {
        assert_eq!(ColorTag::from_raw(1), Some(ColorTag::Blue));
        assert_eq!(ColorTag::from_raw(4), None);
        assert_eq!(Phase::ALL.len(), 7);
        assert!(Phase::Disconnected.is_terminal());
        assert!(!Phase::Scoreboard.is_terminal());
    }

    #[test]
    fn wire_enum_rejects_unknown_discriminant() {
        let mut reader = ByteReader::new(&[9]);
        let err = MessageKind::read(&mut reader).unwrap_err();
        assert_eq!(
            err,
            FieldError::InvalidValue {
                field: "MessageKind",
                raw: 9
            }
        );
    }

    #[test]
    fn display_formats() {
        assert_eq!(PeerId::new(2).to_string(), "peer#2");
        assert_eq!(EntityId::compose(PeerId::new(2), 5).to_string(), "entity#2:5");
    }
}
