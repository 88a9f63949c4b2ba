//! Read-only session view handed to the UI each tick.

use serde::Serialize;
use wire::{PeerId, Phase};

use crate::peers::Peer;
use crate::round::RoundState;

/// Copy of everything a renderer or UI needs to draw the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    pub tick: u64,
    pub local: PeerId,
    pub phase: Phase,
    pub round: RoundState,
    pub peers: Vec<Peer>,
    pub countdown: Option<u32>,
    pub winner: Option<PeerId>,
    pub selected_level: Option<i32>,
}

impl SessionSnapshot {
    #[must_use]
    pub fn peer(&self, id: PeerId) -> Option<&Peer> {
        self.peers.iter().find(|peer| peer.id == id)
    }

    #[must_use]
    pub fn total_score(&self, id: PeerId) -> u32 {
        self.peer(id).map_or(0, |peer| peer.score)
    }
}
