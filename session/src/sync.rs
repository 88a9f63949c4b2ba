//! Per-tick synchronization loop.
//!
//! Each call to [`SyncLoop::tick`] runs, in order:
//!
//! 1. drain the transport and decode every frame,
//! 2. apply each event in arrival order,
//! 3. step physics and turn contacts into gameplay events,
//! 4. let the phase machine observe the post-apply state,
//! 5. encode and send everything queued locally.
//!
//! Locally produced events go through the same apply path as remote ones at
//! the moment they are emitted, then wait in the outbound queue until step 5.
//! The exception is a client's score, build and deletion events: those are
//! requests to the host, which validates each one and re-sends it under its
//! own id. Clients apply these kinds only from the host, so every peer sees
//! them in the host's order.

use std::fmt;
use std::mem;
use std::sync::Arc;

use log::{debug, info, warn};
use serde::Serialize;
use wire::{
    decode_event, encode_event_into, BodySync, BuildAction, ColorPick, ColorTag, ColorVerdict,
    EntityId, Event, EventRegistry, Identity, ItemKind, LevelPick, Message, MessageKind,
    MushroomBounce, ObjectDeletion, OwnershipRelease, OwnershipRequest, OwnershipUpdate, Payload,
    PeerId, Phase, PhaseChange, Ready, Score, ScoreType, TransitionCause,
};

use crate::config::SessionConfig;
use crate::error::{OwnershipError, PeerError, SessionError, SessionResult};
use crate::ownership::OwnershipLedger;
use crate::peers::PeerDirectory;
use crate::phase::{PhaseMachine, Transition};
use crate::physics::{BodyState, Contact, Physics};
use crate::round::RoundState;
use crate::snapshot::SessionSnapshot;
use crate::transport::{Inbound, Transport};
use crate::world::GameWorld;

/// UI hook fired when another peer is assigned a colour.
pub type ColorTakenHook = Box<dyn FnMut(PeerId, ColorTag)>;

/// Running counters for one loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncStats {
    pub frames_received: u64,
    pub frames_sent: u64,
    pub events_applied: u64,
    /// Frames dropped because they failed to decode.
    pub protocol_errors: u64,
    /// Well-formed events that were not valid in the current state.
    pub ignored_events: u64,
    pub refused_peers: u64,
    pub stale_acquires: u64,
    /// Local writes skipped because this peer did not own the entity.
    pub dropped_mutations: u64,
}

/// What happened during one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub tick: u64,
    pub applied: usize,
    pub dropped: usize,
    pub flushed: usize,
    pub transition: Option<Transition>,
}

/// One peer's replicated session.
pub struct SyncLoop<T, P> {
    local: PeerId,
    is_host: bool,
    protocol: u32,
    config: SessionConfig,
    registry: Arc<EventRegistry>,
    transport: T,
    physics: P,
    peers: PeerDirectory,
    ledger: OwnershipLedger,
    round: RoundState,
    phase: PhaseMachine,
    world: GameWorld,
    tick: u64,
    entered_at: u64,
    announced: bool,
    stats: SyncStats,
    inbound: Vec<Inbound>,
    outbound: Vec<Event>,
    contacts: Vec<Contact>,
    payloads: Vec<Payload>,
    frame: Vec<u8>,
    on_color_taken: Option<ColorTakenHook>,
}

impl<T: Transport, P: Physics> SyncLoop<T, P> {
    /// Creates a loop for `local`, registering it in its own directory.
    pub fn new(
        local: PeerId,
        is_host: bool,
        config: SessionConfig,
        registry: Arc<EventRegistry>,
        transport: T,
        physics: P,
    ) -> SessionResult<Self> {
        config.validate()?;
        if local.is_synthetic() {
            return Err(PeerError::UnknownPeer { peer: local }.into());
        }
        if !local.fits_entity_id() {
            return Err(PeerError::IdOutOfRange { peer: local }.into());
        }
        let mut peers = PeerDirectory::new();
        peers.add_peer(local, is_host)?;
        let protocol = registry.protocol_hash();
        Ok(Self {
            local,
            is_host,
            protocol,
            config,
            registry,
            transport,
            physics,
            peers,
            ledger: OwnershipLedger::new(),
            round: RoundState::new(),
            phase: PhaseMachine::new(),
            world: GameWorld::new(),
            tick: 0,
            entered_at: 0,
            announced: false,
            stats: SyncStats::default(),
            inbound: Vec::new(),
            outbound: Vec::new(),
            contacts: Vec::new(),
            payloads: Vec::new(),
            frame: Vec::new(),
            on_color_taken: None,
        })
    }

    /// Runs one fixed tick.
    pub fn tick(&mut self) -> TickReport {
        self.tick += 1;
        let mut report = TickReport {
            tick: self.tick,
            ..TickReport::default()
        };
        self.announce();

        let mut inbound = mem::take(&mut self.inbound);
        self.transport.drain_inbound(&mut inbound);
        for item in inbound.drain(..) {
            match item {
                Inbound::Frame(bytes) => {
                    self.stats.frames_received += 1;
                    match decode_event(&bytes, &self.registry) {
                        Ok(event) => {
                            if self.apply(event) {
                                report.applied += 1;
                            }
                        }
                        Err(err) => {
                            self.stats.protocol_errors += 1;
                            report.dropped += 1;
                            warn!(
                                "{}: dropped {}-byte frame: {err}",
                                self.local,
                                bytes.len()
                            );
                        }
                    }
                }
                Inbound::PeerLost(peer) => self.handle_peer_lost(peer),
            }
        }
        self.inbound = inbound;

        self.step_physics();
        self.resync_bodies();
        report.transition = self.advance_phase();
        report.flushed = self.flush();
        report
    }

    // ---------------------------------------------------------------------
    // Local actions
    // ---------------------------------------------------------------------

    /// Asks for `color`.
    ///
    /// The host assigns its own colour directly; a client's request is
    /// settled by the host's verdict. Either way a colour already held by
    /// another connected peer (in the local view) is rejected here.
    pub fn pick_color(&mut self, color: ColorTag) -> SessionResult<()> {
        self.require_phase(Phase::ColorSelect)?;
        if let Some(holder) = self.peers.color_holder(color) {
            if holder != self.local {
                return Err(PeerError::ColorAlreadyTaken { color, holder }.into());
            }
        }
        if self.is_host {
            self.peers.set_color(self.local, color)?;
            self.emit(ColorVerdict {
                peer: self.local,
                color,
                accepted: true,
            });
        } else {
            self.emit(ColorPick { color });
        }
        Ok(())
    }

    pub fn set_ready(&mut self, ready: bool) -> SessionResult<()> {
        self.require_phase(Phase::ColorSelect)?;
        self.emit(Ready { ready });
        Ok(())
    }

    /// Host only: chooses the level; `play_pressed` starts the first round.
    pub fn pick_level(&mut self, level: i32, play_pressed: bool) -> SessionResult<()> {
        if !self.is_host {
            return Err(SessionError::NotHost);
        }
        self.require_phase(Phase::LevelSelect)?;
        self.emit(LevelPick {
            level,
            play_pressed,
        });
        Ok(())
    }

    /// Announces that this peer finished building.
    pub fn build_ready(&mut self) -> SessionResult<()> {
        self.require_phase(Phase::Build)?;
        self.emit(Message {
            message: MessageKind::BuildReady,
            round: self.phase.round(),
        });
        Ok(())
    }

    /// Announces that this peer's movement is over for the round.
    pub fn end_movement(&mut self) -> SessionResult<()> {
        self.require_phase(Phase::Move)?;
        if !self.world.movement_over(self.local) {
            self.emit(Message {
                message: MessageKind::MovementEnded,
                round: self.phase.round(),
            });
        }
        Ok(())
    }

    /// Reports a scoring outcome for `player` in the current round.
    ///
    /// On a client this takes effect once the host has accepted it.
    pub fn report_score(&mut self, player: PeerId, score: ScoreType) -> SessionResult<()> {
        self.require_phase(Phase::Move)?;
        self.emit(Score {
            player,
            score,
            round: self.phase.round(),
        });
        Ok(())
    }

    /// Places an item during the build phase; this peer becomes its owner.
    ///
    /// A client's item appears (locally too) when the host's copy arrives; an
    /// item the host refuses, say because its build phase already ended,
    /// never appears anywhere.
    pub fn place_item(&mut self, item: ItemKind, x: f32, y: f32) -> SessionResult<EntityId> {
        self.require_phase(Phase::Build)?;
        if !item.is_placeable() {
            return Err(SessionError::NotPlaceable { item });
        }
        let entity = self
            .world
            .allocate(self.local)
            .ok_or(SessionError::EntityIdsExhausted)?;
        self.emit(BuildAction {
            entity,
            item,
            x,
            y,
            round: self.phase.round(),
        });
        Ok(entity)
    }

    /// Removes an entity this peer owns.
    pub fn delete_item(&mut self, entity: EntityId) -> SessionResult<()> {
        self.require_owned(entity)?;
        self.emit(ObjectDeletion { entity });
        Ok(())
    }

    /// Requests ownership of `entity` using the latest known epoch.
    ///
    /// On a client the request is settled by the host's `OwnershipUpdate`;
    /// a refused request simply leaves ownership unchanged and may be retried.
    pub fn request_ownership(&mut self, entity: EntityId) -> SessionResult<()> {
        let epoch = self
            .ledger
            .epoch(entity)
            .ok_or(OwnershipError::UnknownEntity { entity })?;
        if self.ledger.is_locally_writable(entity, self.local) {
            return Ok(());
        }
        if self.is_host {
            let before = self.ledger.owner(entity);
            let epoch = self.ledger.acquire(entity, self.local, epoch)?;
            self.sync_authority(entity, before);
            self.emit(OwnershipUpdate {
                entity,
                owner: self.local,
                epoch,
            });
        } else {
            self.emit(OwnershipRequest { entity, epoch });
        }
        Ok(())
    }

    /// Gives up ownership of `entity`.
    pub fn release_ownership(&mut self, entity: EntityId) -> SessionResult<()> {
        self.require_owned(entity)?;
        if self.is_host {
            let before = self.ledger.owner(entity);
            let epoch = self.ledger.release(entity, self.local)?;
            self.sync_authority(entity, before);
            self.emit(OwnershipUpdate {
                entity,
                owner: PeerId::SYNTHETIC,
                epoch,
            });
        } else {
            let epoch = self.ledger.epoch(entity).unwrap_or_default();
            self.emit(OwnershipRelease { entity, epoch });
        }
        Ok(())
    }

    /// Pushes a body this peer owns. Returns `false` (and drops the write)
    /// when the entity is owned by someone else.
    pub fn apply_impulse(&mut self, entity: EntityId, dvx: f32, dvy: f32) -> bool {
        if !self.ledger.is_locally_writable(entity, self.local) {
            self.stats.dropped_mutations += 1;
            warn!("{}: dropped impulse on {entity}: not owner", self.local);
            return false;
        }
        self.physics.apply_impulse(entity, dvx, dvy);
        true
    }

    /// Installs the colour-taken UI hook.
    pub fn on_color_taken(&mut self, hook: impl FnMut(PeerId, ColorTag) + 'static) {
        self.on_color_taken = Some(Box::new(hook));
    }

    // ---------------------------------------------------------------------
    // Views
    // ---------------------------------------------------------------------

    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            tick: self.tick,
            local: self.local,
            phase: self.phase.phase(),
            round: self.round.clone(),
            peers: self.peers.iter().cloned().collect(),
            countdown: self.phase.countdown(),
            winner: self.phase.winner(),
            selected_level: self.phase.selected_level(),
        }
    }

    #[must_use]
    pub const fn local_id(&self) -> PeerId {
        self.local
    }

    #[must_use]
    pub const fn is_host(&self) -> bool {
        self.is_host
    }

    #[must_use]
    pub const fn phase(&self) -> Phase {
        self.phase.phase()
    }

    #[must_use]
    pub const fn round(&self) -> i32 {
        self.phase.round()
    }

    #[must_use]
    pub fn total_score(&self, peer: PeerId) -> u32 {
        self.peers.total_score(peer)
    }

    #[must_use]
    pub const fn config(&self) -> &SessionConfig {
        &self.config
    }

    #[must_use]
    pub const fn peers(&self) -> &PeerDirectory {
        &self.peers
    }

    #[must_use]
    pub const fn ledger(&self) -> &OwnershipLedger {
        &self.ledger
    }

    #[must_use]
    pub const fn round_state(&self) -> &RoundState {
        &self.round
    }

    #[must_use]
    pub const fn world(&self) -> &GameWorld {
        &self.world
    }

    #[must_use]
    pub const fn stats(&self) -> SyncStats {
        self.stats
    }

    #[must_use]
    pub const fn tick_count(&self) -> u64 {
        self.tick
    }

    #[must_use]
    pub const fn physics(&self) -> &P {
        &self.physics
    }

    #[must_use]
    pub const fn transport(&self) -> &T {
        &self.transport
    }

    // ---------------------------------------------------------------------
    // Tick stages
    // ---------------------------------------------------------------------

    fn announce(&mut self) {
        if self.announced || !self.transport.status().is_linked() {
            return;
        }
        self.announced = true;
        self.emit(Identity {
            is_host: self.is_host,
            protocol: self.protocol,
            reply: false,
        });
    }

    fn step_physics(&mut self) {
        self.physics.step_fixed(self.config.tick_seconds());
        let mut contacts = mem::take(&mut self.contacts);
        self.physics.drain_contacts(&mut contacts);
        if self.phase.phase() == Phase::Move {
            let mut payloads = mem::take(&mut self.payloads);
            for contact in &contacts {
                self.world.contact_events(
                    contact,
                    self.local,
                    &self.ledger,
                    &self.round,
                    &mut payloads,
                );
                // Apply per contact so one outcome can gate the next.
                for payload in payloads.drain(..) {
                    self.emit(payload);
                }
            }
            self.payloads = payloads;
        }
        contacts.clear();
        self.contacts = contacts;
    }

    fn resync_bodies(&mut self) {
        if self.phase.phase().is_terminal()
            || self.peers.connected_count() < 2
            || self.tick % u64::from(self.config.resync_interval_ticks) != 0
        {
            return;
        }
        let owned: Vec<EntityId> = self.ledger.owned_by(self.local).collect();
        for entity in owned {
            let syncable = matches!(
                self.world.kind(entity),
                Some(ItemKind::Avatar | ItemKind::Platform)
            );
            if !syncable {
                continue;
            }
            if let Some(body) = self.physics.body(entity) {
                self.emit(BodySync {
                    entity,
                    x: body.x,
                    y: body.y,
                    vx: body.vx,
                    vy: body.vy,
                });
            }
        }
    }

    fn advance_phase(&mut self) -> Option<Transition> {
        let status = self.transport.status();
        if let Some(transition) = self
            .phase
            .check_disconnect(&self.peers, &self.config, status)
        {
            self.enter(transition);
            if self.is_host && transition.cause == TransitionCause::PeerLost {
                self.emit_phase_change(transition);
            }
            return Some(transition);
        }
        if !self.is_host {
            if self.entered_at != self.tick {
                self.phase.tick_display_countdown();
            }
            return None;
        }
        let transition = self.phase.poll(&self.peers, &self.config)?;
        self.enter(transition);
        self.emit_phase_change(transition);
        Some(transition)
    }

    fn flush(&mut self) -> usize {
        let mut outbound = mem::take(&mut self.outbound);
        let count = outbound.len();
        for event in outbound.drain(..) {
            self.frame.clear();
            encode_event_into(&event, &mut self.frame);
            self.transport.send(&self.frame);
        }
        self.outbound = outbound;
        self.stats.frames_sent += count as u64;
        count
    }

    // ---------------------------------------------------------------------
    // Apply
    // ---------------------------------------------------------------------

    fn emit(&mut self, payload: impl Into<Payload>) {
        let event = Event::new(self.local, payload);
        if self.is_host || !host_sequenced(&event.payload) {
            self.apply(event);
        }
        self.outbound.push(event);
    }

    fn apply(&mut self, event: Event) -> bool {
        let origin = event.origin;
        let applied = match event.payload {
            Payload::Identity(identity) => self.apply_identity(origin, identity),
            _ if origin != self.local && !self.peers.is_connected(origin) => {
                debug!(
                    "{}: ignoring {} from unknown or disconnected {origin}",
                    self.local,
                    event.kind().name()
                );
                false
            }
            _ if !self.is_host
                && host_sequenced(&event.payload)
                && self.peers.host() != Some(origin) =>
            {
                // Another client's request; the host's copy follows if accepted.
                false
            }
            Payload::ColorPick(pick) => self.apply_color_pick(origin, pick),
            Payload::ColorVerdict(verdict) => self.apply_color_verdict(origin, verdict),
            Payload::Ready(ready) => self.apply_ready(origin, ready),
            Payload::LevelPick(pick) => self.apply_level_pick(origin, pick),
            Payload::Score(score) => self.apply_score(score),
            Payload::AnimationTrigger(trigger) => {
                self.world.set_animation(trigger.entity, trigger.animation);
                true
            }
            Payload::BuildAction(action) => self.apply_build_action(origin, action),
            Payload::MushroomBounce(bounce) => self.apply_bounce(bounce),
            Payload::ObjectDeletion(deletion) => self.apply_deletion(origin, deletion),
            Payload::Message(message) => self.apply_message(origin, message),
            Payload::OwnershipRequest(request) => self.apply_ownership_request(origin, request),
            Payload::OwnershipRelease(release) => self.apply_ownership_release(origin, release),
            Payload::OwnershipUpdate(update) => self.apply_ownership_update(origin, update),
            Payload::PhaseChange(change) => self.apply_phase_change(origin, change),
            Payload::BodySync(sync) => self.apply_body_sync(origin, sync),
        };
        if applied {
            self.stats.events_applied += 1;
            if self.is_host && origin != self.local && host_sequenced(&event.payload) {
                self.outbound.push(Event::new(self.local, event.payload));
            }
        } else if origin != self.local {
            self.stats.ignored_events += 1;
        }
        applied
    }

    fn apply_identity(&mut self, origin: PeerId, identity: Identity) -> bool {
        if origin == self.local || origin.is_synthetic() {
            return false;
        }
        if identity.protocol != self.protocol {
            self.stats.refused_peers += 1;
            warn!(
                "{}: refusing {origin}: protocol {:#010x}, expected {:#010x}",
                self.local, identity.protocol, self.protocol
            );
            return false;
        }
        if self.peers.get(origin).is_some() {
            return false;
        }
        if !origin.fits_entity_id() {
            self.stats.refused_peers += 1;
            warn!("{}: refusing {origin}: id too wide for entity ids", self.local);
            return false;
        }
        if self.phase.phase() != Phase::ColorSelect
            || self.peers.connected_count() >= self.config.expected_peers
        {
            self.stats.refused_peers += 1;
            warn!("{}: refusing late join from {origin}", self.local);
            return false;
        }
        if identity.is_host && self.peers.host().is_some() {
            self.stats.refused_peers += 1;
            warn!("{}: refusing second host {origin}", self.local);
            return false;
        }
        if let Err(err) = self.peers.add_peer(origin, identity.is_host) {
            warn!("{}: handshake with {origin} failed: {err}", self.local);
            return false;
        }
        debug!(
            "{}: handshake with {origin} (host: {})",
            self.local, identity.is_host
        );
        if !identity.reply {
            self.emit(Identity {
                is_host: self.is_host,
                protocol: self.protocol,
                reply: true,
            });
        }
        true
    }

    fn apply_color_pick(&mut self, origin: PeerId, pick: ColorPick) -> bool {
        // Clients wait for the host's verdict.
        if !self.is_host || self.phase.phase() != Phase::ColorSelect {
            return false;
        }
        let accepted = match self.peers.set_color(origin, pick.color) {
            Ok(()) => true,
            Err(err) => {
                debug!("{}: rejecting colour pick from {origin}: {err}", self.local);
                false
            }
        };
        self.emit(ColorVerdict {
            peer: origin,
            color: pick.color,
            accepted,
        });
        true
    }

    fn apply_color_verdict(&mut self, origin: PeerId, verdict: ColorVerdict) -> bool {
        if !self.from_host(origin, "ColorVerdict") {
            return false;
        }
        if !verdict.accepted {
            if verdict.peer == self.local {
                info!("{}: colour {:?} was refused", self.local, verdict.color);
            }
            return true;
        }
        if let Err(err) = self.peers.set_color(verdict.peer, verdict.color) {
            warn!("{}: cannot mirror colour verdict: {err}", self.local);
            return false;
        }
        if verdict.peer != self.local {
            if let Some(hook) = self.on_color_taken.as_mut() {
                hook(verdict.peer, verdict.color);
            }
        }
        true
    }

    fn apply_ready(&mut self, origin: PeerId, ready: Ready) -> bool {
        self.phase.phase() == Phase::ColorSelect
            && self.peers.set_ready(origin, ready.ready).is_ok()
    }

    fn apply_level_pick(&mut self, origin: PeerId, pick: LevelPick) -> bool {
        if !self.from_host(origin, "LevelPick") || self.phase.phase() != Phase::LevelSelect {
            return false;
        }
        self.phase.note_level_pick(pick.level, pick.play_pressed);
        true
    }

    fn apply_score(&mut self, score: Score) -> bool {
        if !matches!(self.phase.phase(), Phase::Move | Phase::Scoreboard)
            || self.peers.get(score.player).is_none()
        {
            return false;
        }
        let Some(points) = self.round.record(score.player, score.score, score.round) else {
            return false;
        };
        match self.peers.add_score(score.player, points) {
            Ok(total) => {
                debug!(
                    "{}: {} scored {:?} (+{points}, total {total})",
                    self.local, score.player, score.score
                );
                true
            }
            Err(_) => false,
        }
    }

    fn apply_build_action(&mut self, origin: PeerId, action: BuildAction) -> bool {
        // The host checks authorship; clients trust the host's copy.
        let author = action.entity.creator();
        let valid = self.phase.phase() == Phase::Build
            && action.round == self.phase.round()
            && action.item.is_placeable()
            && self.peers.get(author).is_some()
            && (!self.is_host || author == origin);
        if !valid {
            return false;
        }
        if !self.world.place(
            action.entity,
            action.item,
            action.x,
            action.y,
            &mut self.physics,
        ) {
            return false;
        }
        if let Err(err) = self.ledger.assign(action.entity, author) {
            warn!("{}: placed {} without owner: {err}", self.local, action.entity);
            return true;
        }
        if author == self.local {
            self.physics.claim_local_authority(action.entity);
        }
        true
    }

    fn apply_bounce(&mut self, bounce: MushroomBounce) -> bool {
        if self.world.kind(bounce.mushroom) != Some(ItemKind::Mushroom) {
            return false;
        }
        if self.ledger.is_locally_writable(bounce.target, self.local) {
            self.physics.apply_impulse(bounce.target, 0.0, bounce.strength);
        }
        true
    }

    fn apply_deletion(&mut self, origin: PeerId, deletion: ObjectDeletion) -> bool {
        let owner = self.ledger.owner(deletion.entity);
        let allowed = if self.is_host {
            owner == Some(origin)
        } else {
            owner.is_some()
        };
        if !allowed {
            return false;
        }
        if owner == Some(self.local) {
            self.physics.release_local_authority(deletion.entity);
        }
        self.world.remove(deletion.entity, &mut self.physics);
        self.ledger.remove(deletion.entity);
        true
    }

    fn apply_message(&mut self, origin: PeerId, message: Message) -> bool {
        if message.round != self.phase.round() {
            return false;
        }
        match (message.message, self.phase.phase()) {
            (MessageKind::BuildReady, Phase::Build) => {
                self.peers.set_ready(origin, true).is_ok()
            }
            (MessageKind::MovementEnded, Phase::Move) => {
                self.world.end_movement(origin);
                self.peers.set_ready(origin, true).is_ok()
            }
            _ => false,
        }
    }

    fn apply_ownership_request(&mut self, origin: PeerId, request: OwnershipRequest) -> bool {
        if !self.is_host {
            return false;
        }
        let entity = request.entity;
        let before = self.ledger.owner(entity);
        match self.ledger.acquire(entity, origin, request.epoch) {
            Ok(epoch) => {
                self.sync_authority(entity, before);
                self.emit(OwnershipUpdate {
                    entity,
                    owner: origin,
                    epoch,
                });
                true
            }
            Err(OwnershipError::StaleAcquire { current, .. }) => {
                self.stats.stale_acquires += 1;
                debug!(
                    "{}: stale acquire of {entity} by {origin} (epoch {} < {current})",
                    self.local, request.epoch
                );
                // Re-announce the current record so the requester can refresh.
                self.emit(OwnershipUpdate {
                    entity,
                    owner: before.unwrap_or(PeerId::SYNTHETIC),
                    epoch: current,
                });
                false
            }
            Err(err) => {
                warn!("{}: ownership request from {origin}: {err}", self.local);
                false
            }
        }
    }

    fn apply_ownership_release(&mut self, origin: PeerId, release: OwnershipRelease) -> bool {
        if !self.is_host {
            return false;
        }
        let entity = release.entity;
        let before = self.ledger.owner(entity);
        match self.ledger.release(entity, origin) {
            Ok(epoch) => {
                self.sync_authority(entity, before);
                self.emit(OwnershipUpdate {
                    entity,
                    owner: PeerId::SYNTHETIC,
                    epoch,
                });
                true
            }
            Err(err) => {
                warn!("{}: release from {origin}: {err}", self.local);
                false
            }
        }
    }

    fn apply_ownership_update(&mut self, origin: PeerId, update: OwnershipUpdate) -> bool {
        if self.is_host {
            // The host's ledger is the source of these updates.
            return origin == self.local;
        }
        if !self.from_host(origin, "OwnershipUpdate") {
            return false;
        }
        let owner = (!update.owner.is_synthetic()).then_some(update.owner);
        let before = self.ledger.owner(update.entity);
        if !self.ledger.mirror(update.entity, owner, update.epoch) {
            debug!(
                "{}: discarding stale ownership update for {} (epoch {})",
                self.local, update.entity, update.epoch
            );
            return false;
        }
        self.sync_authority(update.entity, before);
        true
    }

    fn apply_phase_change(&mut self, origin: PeerId, change: PhaseChange) -> bool {
        if self.is_host {
            return origin == self.local;
        }
        if !self.from_host(origin, "PhaseChange") {
            return false;
        }
        match self
            .phase
            .mirror(change.phase, change.round, change.cause, &self.peers)
        {
            Some(transition) => {
                self.enter(transition);
                true
            }
            None => false,
        }
    }

    fn apply_body_sync(&mut self, origin: PeerId, sync: BodySync) -> bool {
        if origin == self.local {
            return true;
        }
        if self.ledger.owner(sync.entity) != Some(origin) {
            debug!(
                "{}: ignoring body sync for {} from non-owner {origin}",
                self.local, sync.entity
            );
            return false;
        }
        self.physics.set_body(
            sync.entity,
            BodyState {
                x: sync.x,
                y: sync.y,
                vx: sync.vx,
                vy: sync.vy,
            },
        );
        true
    }

    // ---------------------------------------------------------------------
    // Helpers
    // ---------------------------------------------------------------------

    fn handle_peer_lost(&mut self, peer: PeerId) {
        if self.peers.mark_disconnected(peer) {
            info!("{}: lost {peer}", self.local);
        }
    }

    fn enter(&mut self, transition: Transition) {
        info!(
            "{}: {:?} -> {:?} (round {}, {:?})",
            self.local, transition.from, transition.to, transition.round, transition.cause
        );
        self.phase.apply(transition, &self.config);
        self.peers.reset_ready();
        self.world.clear_movement();
        self.entered_at = self.tick;
        match transition.to {
            Phase::Build => {
                if self.world.level().is_none() {
                    self.load_level();
                }
                if self.round.round() != transition.round {
                    self.round.start_round(transition.round);
                }
            }
            Phase::Move => self.world.reset_avatars(&mut self.physics),
            _ => {}
        }
    }

    fn load_level(&mut self) {
        let level = self.phase.selected_level().unwrap_or_default();
        let players: Vec<PeerId> = self.peers.connected().map(|peer| peer.id).collect();
        self.world
            .load_level(level, &players, &mut self.physics, &mut self.ledger);
        let avatar = EntityId::avatar(self.local);
        if self.ledger.is_locally_writable(avatar, self.local) {
            self.physics.claim_local_authority(avatar);
        }
    }

    fn emit_phase_change(&mut self, transition: Transition) {
        self.emit(PhaseChange {
            phase: transition.to,
            round: transition.round,
            cause: transition.cause,
        });
    }

    /// Tells the physics collaborator when local authority over `entity` changed.
    fn sync_authority(&mut self, entity: EntityId, before: Option<PeerId>) {
        let after = self.ledger.owner(entity);
        if before == after {
            return;
        }
        if before == Some(self.local) {
            self.physics.release_local_authority(entity);
        }
        if after == Some(self.local) {
            self.physics.claim_local_authority(entity);
        }
    }

    fn from_host(&self, origin: PeerId, what: &str) -> bool {
        let ok = self.peers.host() == Some(origin);
        if !ok {
            warn!("{}: ignoring {what} from non-host {origin}", self.local);
        }
        ok
    }

    fn require_phase(&self, expected: Phase) -> SessionResult<()> {
        let actual = self.phase.phase();
        if actual == expected {
            Ok(())
        } else {
            Err(SessionError::WrongPhase { expected, actual })
        }
    }

    fn require_owned(&mut self, entity: EntityId) -> SessionResult<()> {
        if self.ledger.is_locally_writable(entity, self.local) {
            return Ok(());
        }
        self.stats.dropped_mutations += 1;
        let owner = self.ledger.owner(entity);
        warn!("{}: {entity} is owned by {owner:?}, not us", self.local);
        Err(OwnershipError::NotOwner {
            entity,
            caller: self.local,
            owner,
        }
        .into())
    }
}

/// Kinds the host validates and re-sends before any client applies them.
const fn host_sequenced(payload: &Payload) -> bool {
    matches!(
        payload,
        Payload::Score(_) | Payload::BuildAction(_) | Payload::ObjectDeletion(_)
    )
}

impl<T: fmt::Debug, P: fmt::Debug> fmt::Debug for SyncLoop<T, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncLoop")
            .field("local", &self.local)
            .field("is_host", &self.is_host)
            .field("tick", &self.tick)
            .field("phase", &self.phase)
            .field("peers", &self.peers)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}
