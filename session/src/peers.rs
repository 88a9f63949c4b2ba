//! Peer directory: who is in the session and what they have chosen.

use std::collections::BTreeMap;

use serde::Serialize;
use wire::{ColorTag, PeerId};

use crate::error::{PeerError, PeerResult};

/// One session participant.
///
/// Records outlive disconnects so that colour and score history stay
/// visible until the session ends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Peer {
    pub id: PeerId,
    pub is_host: bool,
    pub color: Option<ColorTag>,
    pub ready: bool,
    pub score: u32,
    pub connected: bool,
}

impl Peer {
    fn new(id: PeerId, is_host: bool) -> Self {
        Self {
            id,
            is_host,
            color: None,
            ready: false,
            score: 0,
            connected: true,
        }
    }
}

/// Local view of every peer in the session, keyed by id.
///
/// Mutations are local only; callers announce changes with events.
#[derive(Debug, Clone, Default)]
pub struct PeerDirectory {
    peers: BTreeMap<PeerId, Peer>,
}

impl PeerDirectory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a peer after a successful handshake.
    pub fn add_peer(&mut self, id: PeerId, is_host: bool) -> PeerResult<()> {
        if !id.fits_entity_id() {
            return Err(PeerError::IdOutOfRange { peer: id });
        }
        if self.peers.contains_key(&id) {
            return Err(PeerError::DuplicatePeer { peer: id });
        }
        self.peers.insert(id, Peer::new(id, is_host));
        Ok(())
    }

    /// Assigns `color` to `id`, releasing whatever colour `id` held before.
    ///
    /// Fails if a different connected peer already holds `color`.
    pub fn set_color(&mut self, id: PeerId, color: ColorTag) -> PeerResult<()> {
        if !self.peers.contains_key(&id) {
            return Err(PeerError::UnknownPeer { peer: id });
        }
        if let Some(holder) = self.color_holder(color) {
            if holder != id {
                return Err(PeerError::ColorAlreadyTaken { color, holder });
            }
        }
        let peer = self.peer_mut(id)?;
        peer.color = Some(color);
        Ok(())
    }

    /// The connected peer currently holding `color`, if any.
    #[must_use]
    pub fn color_holder(&self, color: ColorTag) -> Option<PeerId> {
        self.peers
            .values()
            .find(|peer| peer.connected && peer.color == Some(color))
            .map(|peer| peer.id)
    }

    pub fn set_ready(&mut self, id: PeerId, ready: bool) -> PeerResult<()> {
        self.peer_mut(id)?.ready = ready;
        Ok(())
    }

    /// Adds `delta` to the peer's running total and returns the new total.
    pub fn add_score(&mut self, id: PeerId, delta: u32) -> PeerResult<u32> {
        let peer = self.peer_mut(id)?;
        peer.score = peer.score.saturating_add(delta);
        Ok(peer.score)
    }

    /// Accumulated score for `id`; unknown peers have scored nothing.
    #[must_use]
    pub fn total_score(&self, id: PeerId) -> u32 {
        self.peers.get(&id).map_or(0, |peer| peer.score)
    }

    /// Clears every ready flag.
    pub fn reset_ready(&mut self) {
        for peer in self.peers.values_mut() {
            peer.ready = false;
        }
    }

    /// Marks `id` as gone. Returns `true` if the peer was connected before.
    pub fn mark_disconnected(&mut self, id: PeerId) -> bool {
        match self.peers.get_mut(&id) {
            Some(peer) if peer.connected => {
                peer.connected = false;
                peer.ready = false;
                true
            }
            _ => false,
        }
    }

    /// True iff exactly `expected` peers are connected and all of them are ready.
    #[must_use]
    pub fn all_ready(&self, expected: usize) -> bool {
        self.connected_count() == expected && self.connected().all(|peer| peer.ready)
    }

    #[must_use]
    pub fn connected_count(&self) -> usize {
        self.connected().count()
    }

    #[must_use]
    pub fn is_connected(&self, id: PeerId) -> bool {
        self.peers.get(&id).is_some_and(|peer| peer.connected)
    }

    #[must_use]
    pub fn get(&self, id: PeerId) -> Option<&Peer> {
        self.peers.get(&id)
    }

    /// All peers in id order, connected or not.
    pub fn iter(&self) -> impl Iterator<Item = &Peer> + '_ {
        self.peers.values()
    }

    /// Connected peers in id order.
    pub fn connected(&self) -> impl Iterator<Item = &Peer> + '_ {
        self.peers.values().filter(|peer| peer.connected)
    }

    /// The peer that announced itself as host.
    #[must_use]
    pub fn host(&self) -> Option<PeerId> {
        self.peers.values().find(|peer| peer.is_host).map(|peer| peer.id)
    }

    /// Highest total score; ties go to the lowest id.
    #[must_use]
    pub fn leader(&self) -> Option<&Peer> {
        self.peers
            .values()
            .fold(None, |best: Option<&Peer>, peer| match best {
                Some(best) if best.score >= peer.score => Some(best),
                _ => Some(peer),
            })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.peers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    fn peer_mut(&mut self, id: PeerId) -> PeerResult<&mut Peer> {
        self.peers
            .get_mut(&id)
            .ok_or(PeerError::UnknownPeer { peer: id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn directory(ids: &[u32]) -> PeerDirectory {
        let mut peers = PeerDirectory::new();
        for (idx, id) in ids.iter().enumerate() {
            peers.add_peer(PeerId::new(*id), idx == 0).unwrap();
        }
        peers
    }

    #[test]
    fn add_peer_rejects_duplicates() {
        let mut peers = directory(&[1]);
        assert_eq!(
            peers.add_peer(PeerId::new(1), false),
            Err(PeerError::DuplicatePeer {
                peer: PeerId::new(1)
            })
        );
        assert_eq!(peers.host(), Some(PeerId::new(1)));
    }

    #[test]
    fn add_peer_rejects_ids_wider_than_entity_creator() {
        let mut peers = PeerDirectory::new();
        let wide = PeerId::new(65_537);
        assert_eq!(
            peers.add_peer(wide, false),
            Err(PeerError::IdOutOfRange { peer: wide })
        );
        assert!(peers.is_empty());
        peers.add_peer(PeerId::MAX_ENTITY_CREATOR, false).unwrap();
    }

    #[test]
    fn color_conflict_and_switch() {
        let mut peers = directory(&[1, 2]);
        peers.set_color(PeerId::new(2), ColorTag::Blue).unwrap();
        assert_eq!(
            peers.set_color(PeerId::new(1), ColorTag::Blue),
            Err(PeerError::ColorAlreadyTaken {
                color: ColorTag::Blue,
                holder: PeerId::new(2)
            })
        );
        // Re-picking your own colour is fine; switching frees the old one.
        peers.set_color(PeerId::new(2), ColorTag::Blue).unwrap();
        peers.set_color(PeerId::new(2), ColorTag::Red).unwrap();
        peers.set_color(PeerId::new(1), ColorTag::Blue).unwrap();
        assert_eq!(peers.color_holder(ColorTag::Red), Some(PeerId::new(2)));
    }

    #[test]
    fn disconnected_holder_frees_color() {
        let mut peers = directory(&[1, 2]);
        peers.set_color(PeerId::new(2), ColorTag::Green).unwrap();
        assert!(peers.mark_disconnected(PeerId::new(2)));
        assert!(!peers.mark_disconnected(PeerId::new(2)));
        peers.set_color(PeerId::new(1), ColorTag::Green).unwrap();
        // Record persists.
        assert_eq!(peers.len(), 2);
        assert!(!peers.is_connected(PeerId::new(2)));
    }

    #[test]
    fn all_ready_requires_exact_connected_count() {
        let mut peers = directory(&[1, 2]);
        peers.set_ready(PeerId::new(1), true).unwrap();
        assert!(!peers.all_ready(2));
        peers.set_ready(PeerId::new(2), true).unwrap();
        assert!(peers.all_ready(2));
        assert!(!peers.all_ready(3));
        peers.reset_ready();
        assert!(!peers.all_ready(2));
    }

    #[test]
    fn scores_and_leader() {
        let mut peers = directory(&[1, 2, 3]);
        assert_eq!(peers.add_score(PeerId::new(2), 3), Ok(3));
        assert_eq!(peers.add_score(PeerId::new(3), 3), Ok(3));
        assert_eq!(peers.total_score(PeerId::new(2)), 3);
        assert_eq!(peers.total_score(PeerId::new(9)), 0);
        assert_eq!(peers.leader().map(|peer| peer.id), Some(PeerId::new(2)));
        assert!(peers.add_score(PeerId::new(9), 1).is_err());
    }
}
