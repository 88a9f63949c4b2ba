//! Error types for session operations.

use thiserror::Error;
use wire::{ColorTag, EntityId, Phase, PeerId, WireError};

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;

/// Result type for peer directory operations.
pub type PeerResult<T> = Result<T, PeerError>;

/// Result type for ownership ledger operations.
pub type OwnershipResult<T> = Result<T, OwnershipError>;

/// Errors raised by the [`PeerDirectory`](crate::PeerDirectory).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PeerError {
    #[error("{peer} is already registered")]
    DuplicatePeer { peer: PeerId },

    #[error("{peer} is not registered")]
    UnknownPeer { peer: PeerId },

    /// Entity ids only carry 16 bits of creator.
    #[error("{peer} is outside the range usable in entity ids")]
    IdOutOfRange { peer: PeerId },

    /// Surfaced to the UI as a rejected selection.
    #[error("colour {color:?} is already held by {holder}")]
    ColorAlreadyTaken { color: ColorTag, holder: PeerId },
}

/// Errors raised by the [`OwnershipLedger`](crate::OwnershipLedger).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OwnershipError {
    /// The requester's view of the epoch is out of date; refresh and retry.
    #[error("stale acquire of {entity}: claimed epoch {claimed}, current {current}")]
    StaleAcquire {
        entity: EntityId,
        claimed: u32,
        current: u32,
    },

    #[error("{caller} does not own {entity} (owner: {owner:?})")]
    NotOwner {
        entity: EntityId,
        caller: PeerId,
        owner: Option<PeerId>,
    },

    #[error("{entity} is already owned by {owner}")]
    AlreadyOwned { entity: EntityId, owner: PeerId },

    #[error("{entity} has no ownership record")]
    UnknownEntity { entity: EntityId },
}

/// Top-level session error.
#[derive(Debug, Clone, PartialEq, Error)]
#[non_exhaustive]
pub enum SessionError {
    #[error(transparent)]
    Wire(#[from] WireError),

    #[error(transparent)]
    Peer(#[from] PeerError),

    #[error(transparent)]
    Ownership(#[from] OwnershipError),

    #[error("{peer} disconnected")]
    PeerDisconnected { peer: PeerId },

    #[error("transport reported a fatal error")]
    NetError,

    #[error("operation requires phase {expected:?}, session is in {actual:?}")]
    WrongPhase { expected: Phase, actual: Phase },

    #[error("operation is reserved for the host")]
    NotHost,

    #[error("{item:?} cannot be placed")]
    NotPlaceable { item: wire::ItemKind },

    #[error("local entity ids exhausted")]
    EntityIdsExhausted,

    #[error("invalid session config: {reason}")]
    InvalidConfig { reason: &'static str },
}
