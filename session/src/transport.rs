//! Transport seam and an in-memory loopback implementation.
//!
//! The sync loop never performs I/O itself. It hands finished frames to
//! [`Transport::send`] and drains whatever the transport queued since the
//! previous tick.

use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};
use std::rc::Rc;

use serde::Serialize;
use wire::PeerId;

/// Connection state reported by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum ConnectionStatus {
    #[default]
    Idle,
    Connecting,
    Connected,
    Handshake,
    InGame,
    /// Irrecoverable failure; the session ends.
    NetError,
}

impl ConnectionStatus {
    /// Returns `true` once frames can flow.
    #[must_use]
    pub const fn is_linked(self) -> bool {
        matches!(self, Self::Connected | Self::Handshake | Self::InGame)
    }
}

/// Something the transport received since the last drain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// One complete event frame.
    Frame(Vec<u8>),
    /// The transport lost its link to a peer.
    PeerLost(PeerId),
}

/// Byte transport consumed by the sync loop.
pub trait Transport {
    /// Queues one frame for delivery to every other peer.
    fn send(&mut self, frame: &[u8]);

    /// Moves everything received since the last call into `out`, in arrival order.
    fn drain_inbound(&mut self, out: &mut Vec<Inbound>);

    fn status(&self) -> ConnectionStatus;
}

/// A frame observed on the hub, for captures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentFrame {
    pub from: PeerId,
    pub bytes: Vec<u8>,
}

#[derive(Debug)]
struct Endpoint {
    queue: VecDeque<Inbound>,
    status: ConnectionStatus,
}

#[derive(Debug, Default)]
struct HubState {
    endpoints: BTreeMap<PeerId, Endpoint>,
    capture: Option<Vec<SentFrame>>,
    frames_delivered: u64,
}

/// In-memory broadcast medium linking several [`LoopbackTransport`]s.
///
/// Delivery is reliable and ordered per sender. Frames sent by a peer reach
/// every other linked peer on their next drain.
#[derive(Debug, Clone, Default)]
pub struct LoopbackHub {
    state: Rc<RefCell<HubState>>,
}

impl LoopbackHub {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records every frame sent through the hub until [`take_captured`](Self::take_captured).
    #[must_use]
    pub fn with_capture(self) -> Self {
        self.state.borrow_mut().capture = Some(Vec::new());
        self
    }

    /// Links `peer` to the hub.
    pub fn connect(&self, peer: PeerId) -> LoopbackTransport {
        self.state.borrow_mut().endpoints.insert(
            peer,
            Endpoint {
                queue: VecDeque::new(),
                status: ConnectionStatus::Connected,
            },
        );
        LoopbackTransport {
            peer,
            hub: self.clone(),
        }
    }

    /// Cuts `peer` off. Every remaining peer is told on its next drain and
    /// the dropped peer's own transport reports [`ConnectionStatus::NetError`].
    pub fn drop_peer(&self, peer: PeerId) {
        let mut state = self.state.borrow_mut();
        let was_linked = state
            .endpoints
            .get(&peer)
            .is_some_and(|endpoint| endpoint.status.is_linked());
        if let Some(endpoint) = state.endpoints.get_mut(&peer) {
            endpoint.status = ConnectionStatus::NetError;
            endpoint.queue.clear();
        }
        if !was_linked {
            return;
        }
        for (id, endpoint) in &mut state.endpoints {
            if *id != peer && endpoint.status.is_linked() {
                endpoint.queue.push_back(Inbound::PeerLost(peer));
            }
        }
    }

    /// Forces the status reported to `peer`.
    pub fn set_status(&self, peer: PeerId, status: ConnectionStatus) {
        if let Some(endpoint) = self.state.borrow_mut().endpoints.get_mut(&peer) {
            endpoint.status = status;
        }
    }

    /// Delivers raw bytes to `peer` as if another peer had sent them.
    pub fn inject(&self, peer: PeerId, bytes: Vec<u8>) {
        if let Some(endpoint) = self.state.borrow_mut().endpoints.get_mut(&peer) {
            endpoint.queue.push_back(Inbound::Frame(bytes));
        }
    }

    /// Frames captured since the last call.
    pub fn take_captured(&self) -> Vec<SentFrame> {
        self.state
            .borrow_mut()
            .capture
            .as_mut()
            .map(std::mem::take)
            .unwrap_or_default()
    }

    /// Total frame deliveries across all receivers.
    #[must_use]
    pub fn frames_delivered(&self) -> u64 {
        self.state.borrow().frames_delivered
    }

    fn broadcast(&self, from: PeerId, frame: &[u8]) {
        let mut state = self.state.borrow_mut();
        let sender_linked = state
            .endpoints
            .get(&from)
            .is_some_and(|endpoint| endpoint.status.is_linked());
        if !sender_linked {
            return;
        }
        let mut delivered = 0;
        for (id, endpoint) in &mut state.endpoints {
            if *id != from && endpoint.status.is_linked() {
                endpoint.queue.push_back(Inbound::Frame(frame.to_vec()));
                delivered += 1;
            }
        }
        state.frames_delivered += delivered;
        if let Some(capture) = state.capture.as_mut() {
            capture.push(SentFrame {
                from,
                bytes: frame.to_vec(),
            });
        }
    }
}

/// One peer's handle onto a [`LoopbackHub`].
#[derive(Debug, Clone)]
pub struct LoopbackTransport {
    peer: PeerId,
    hub: LoopbackHub,
}

impl LoopbackTransport {
    #[must_use]
    pub const fn peer(&self) -> PeerId {
        self.peer
    }
}

impl Transport for LoopbackTransport {
    fn send(&mut self, frame: &[u8]) {
        self.hub.broadcast(self.peer, frame);
    }

    fn drain_inbound(&mut self, out: &mut Vec<Inbound>) {
        let mut state = self.hub.state.borrow_mut();
        if let Some(endpoint) = state.endpoints.get_mut(&self.peer) {
            out.extend(endpoint.queue.drain(..));
        }
    }

    fn status(&self) -> ConnectionStatus {
        self.hub
            .state
            .borrow()
            .endpoints
            .get(&self.peer)
            .map_or(ConnectionStatus::Idle, |endpoint| endpoint.status)
    }
}
