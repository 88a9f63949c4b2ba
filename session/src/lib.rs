//! Replicated session core for hopnet.
//!
//! Ties the wire protocol to the game's multiplayer lifecycle: who is in the
//! session ([`PeerDirectory`]), who may write each shared entity
//! ([`OwnershipLedger`]), what the current round has scored ([`RoundState`]),
//! which phase everyone is in ([`PhaseMachine`]), and the per-tick driver
//! that moves events between them ([`SyncLoop`]).
//!
//! # Design Principles
//!
//! - **Host authority** - Phase transitions, colour assignment and ownership
//!   transfers are decided by the host and mirrored by clients.
//! - **Deterministic** - Ordered maps everywhere; score, phase and ownership
//!   depend only on the ordered event stream, never on physics floats.
//! - **Never crash on input** - Malformed or out-of-place events are dropped,
//!   counted and logged.
//! - **Seams, not engines** - Physics and transport are traits; the crate
//!   ships small deterministic implementations for tests and demos.

mod config;
mod error;
mod ownership;
mod peers;
mod phase;
mod physics;
mod round;
mod snapshot;
mod sync;
mod transport;
mod world;

pub use config::{SessionConfig, MAX_PEERS, MIN_PEERS};
pub use error::{
    OwnershipError, OwnershipResult, PeerError, PeerResult, SessionError, SessionResult,
};
pub use ownership::{OwnershipLedger, OwnershipRecord, OwnershipState};
pub use peers::{Peer, PeerDirectory};
pub use phase::{PhaseMachine, Transition};
pub use physics::{
    half_extents, BodyState, Contact, ContactPhase, KinematicWorld, Physics, GRAVITY,
};
pub use round::{RoundState, ScoreRecord};
pub use snapshot::SessionSnapshot;
pub use sync::{ColorTakenHook, SyncLoop, SyncStats, TickReport};
pub use transport::{
    ConnectionStatus, Inbound, LoopbackHub, LoopbackTransport, SentFrame, Transport,
};
pub use world::{avatar_spawn, GameWorld, LevelLayout, BOUNCE_STRENGTH, GOAL_ID, TREASURE_ID};
