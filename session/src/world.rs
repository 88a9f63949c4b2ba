//! Gameplay glue between replicated events and the physics collaborator.
//!
//! Keeps the item catalogue (what each entity is), lays out levels, and
//! turns physics contacts of locally owned avatars into gameplay payloads.

use std::collections::{BTreeMap, BTreeSet};

use wire::{
    AnimationKind, AnimationTrigger, EntityId, ItemKind, Message, MessageKind, MushroomBounce,
    Payload, PeerId, Score, ScoreType,
};

use crate::ownership::OwnershipLedger;
use crate::physics::{BodyState, Contact, ContactPhase, Physics};
use crate::round::RoundState;

/// Upward velocity handed to an avatar by a mushroom.
pub const BOUNCE_STRENGTH: f32 = 12.0;

/// Fixture ids are minted by the synthetic peer.
pub const GOAL_ID: EntityId = EntityId::compose(PeerId::SYNTHETIC, 1);
pub const TREASURE_ID: EntityId = EntityId::compose(PeerId::SYNTHETIC, 2);

/// Level fixture positions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevelLayout {
    pub goal_x: f32,
    pub treasure_x: f32,
}

impl LevelLayout {
    /// Layout for `level`; higher levels stretch the course.
    #[must_use]
    pub fn for_level(level: i32) -> Self {
        let stretch = level.clamp(0, 10) as f32 * 4.0;
        Self {
            goal_x: 20.0 + stretch,
            treasure_x: 10.0 + stretch / 2.0,
        }
    }
}

/// Where `peer`'s avatar starts each move phase.
#[must_use]
pub fn avatar_spawn(peer: PeerId) -> BodyState {
    BodyState::at(-2.0 * peer.raw() as f32, 0.0)
}

/// Item catalogue and per-round movement bookkeeping.
#[derive(Debug, Clone)]
pub struct GameWorld {
    items: BTreeMap<EntityId, ItemKind>,
    animations: BTreeMap<EntityId, AnimationKind>,
    movement_over: BTreeSet<PeerId>,
    level: Option<i32>,
    next_local: u16,
}

impl Default for GameWorld {
    fn default() -> Self {
        Self {
            items: BTreeMap::new(),
            animations: BTreeMap::new(),
            movement_over: BTreeSet::new(),
            level: None,
            next_local: 1,
        }
    }
}

impl GameWorld {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mints the next entity id for `local`. Counter 0 is the avatar.
    pub fn allocate(&mut self, local: PeerId) -> Option<EntityId> {
        let id = EntityId::compose(local, self.next_local);
        self.next_local = self.next_local.checked_add(1)?;
        Some(id)
    }

    /// Spawns fixtures and one avatar per peer, each avatar owned by its peer.
    pub fn load_level(
        &mut self,
        level: i32,
        players: &[PeerId],
        physics: &mut dyn Physics,
        ledger: &mut OwnershipLedger,
    ) {
        let layout = LevelLayout::for_level(level);
        self.level = Some(level);
        self.insert(GOAL_ID, ItemKind::Goal, BodyState::at(layout.goal_x, 0.0), physics);
        self.insert(
            TREASURE_ID,
            ItemKind::Treasure,
            BodyState::at(layout.treasure_x, 0.0),
            physics,
        );
        for peer in players {
            let avatar = EntityId::avatar(*peer);
            self.insert(avatar, ItemKind::Avatar, avatar_spawn(*peer), physics);
            if let Err(err) = ledger.assign(avatar, *peer) {
                log::debug!("avatar {avatar} already assigned: {err}");
            }
        }
    }

    /// Adds a placed item. Returns `false` if the id is already in use.
    pub fn place(
        &mut self,
        entity: EntityId,
        item: ItemKind,
        x: f32,
        y: f32,
        physics: &mut dyn Physics,
    ) -> bool {
        if self.items.contains_key(&entity) {
            return false;
        }
        self.insert(entity, item, BodyState::at(x, y), physics);
        true
    }

    pub fn remove(&mut self, entity: EntityId, physics: &mut dyn Physics) -> Option<ItemKind> {
        let kind = self.items.remove(&entity)?;
        self.animations.remove(&entity);
        physics.despawn(entity);
        Some(kind)
    }

    /// Puts every avatar back at its start for a new move phase.
    pub fn reset_avatars(&mut self, physics: &mut dyn Physics) {
        for (entity, kind) in &self.items {
            if *kind == ItemKind::Avatar {
                physics.set_body(*entity, avatar_spawn(entity.creator()));
            }
        }
        self.movement_over.clear();
    }

    pub fn set_animation(&mut self, entity: EntityId, animation: AnimationKind) {
        if self.items.contains_key(&entity) {
            self.animations.insert(entity, animation);
        }
    }

    #[must_use]
    pub fn animation(&self, entity: EntityId) -> Option<AnimationKind> {
        self.animations.get(&entity).copied()
    }

    #[must_use]
    pub fn kind(&self, entity: EntityId) -> Option<ItemKind> {
        self.items.get(&entity).copied()
    }

    pub fn items(&self) -> impl Iterator<Item = (EntityId, ItemKind)> + '_ {
        self.items.iter().map(|(id, kind)| (*id, *kind))
    }

    #[must_use]
    pub const fn level(&self) -> Option<i32> {
        self.level
    }

    pub fn end_movement(&mut self, peer: PeerId) {
        self.movement_over.insert(peer);
    }

    #[must_use]
    pub fn movement_over(&self, peer: PeerId) -> bool {
        self.movement_over.contains(&peer)
    }

    pub fn clear_movement(&mut self) {
        self.movement_over.clear();
    }

    /// Gameplay payloads caused by `contact`, from `local`'s point of view.
    ///
    /// Only contacts involving an avatar this peer owns produce anything, so
    /// every outcome is reported exactly once, by the avatar's owner.
    pub fn contact_events(
        &self,
        contact: &Contact,
        local: PeerId,
        ledger: &OwnershipLedger,
        round: &RoundState,
        out: &mut Vec<Payload>,
    ) {
        if contact.phase != ContactPhase::Begin {
            return;
        }
        let Some((avatar, other)) = self.local_avatar(contact, local, ledger) else {
            return;
        };
        let player = avatar.creator();
        if self.movement_over(player) {
            return;
        }
        let round_no = round.round();
        match self.kind(other) {
            Some(ItemKind::Mushroom) => {
                out.push(
                    MushroomBounce {
                        mushroom: other,
                        target: avatar,
                        strength: BOUNCE_STRENGTH,
                    }
                    .into(),
                );
                out.push(animation(avatar, AnimationKind::Bounce));
            }
            Some(ItemKind::Treasure) if round.treasure_holder().is_none() => {
                out.push(score(player, ScoreType::TreasurePickup, round_no));
            }
            Some(ItemKind::Goal) => {
                let outcome = if round.treasure_holder() == Some(player) {
                    ScoreType::EndTreasure
                } else {
                    ScoreType::Finish
                };
                out.push(score(player, outcome, round_no));
                out.push(animation(avatar, AnimationKind::Celebrate));
                out.push(movement_ended(round_no));
            }
            Some(ItemKind::Trap) => {
                let trapper = ledger.owner(other).unwrap_or_else(|| other.creator());
                if trapper != player && !trapper.is_synthetic() {
                    out.push(score(trapper, ScoreType::TrapKill, round_no));
                }
                out.push(score(player, ScoreType::Death, round_no));
                out.push(animation(avatar, AnimationKind::Defeat));
                out.push(movement_ended(round_no));
            }
            _ => {}
        }
    }

    fn local_avatar(
        &self,
        contact: &Contact,
        local: PeerId,
        ledger: &OwnershipLedger,
    ) -> Option<(EntityId, EntityId)> {
        [contact.a, contact.b].into_iter().find_map(|entity| {
            let is_avatar = self.kind(entity) == Some(ItemKind::Avatar);
            (is_avatar && ledger.is_locally_writable(entity, local))
                .then(|| contact.other(entity))
                .flatten()
                .map(|other| (entity, other))
        })
    }

    fn insert(
        &mut self,
        entity: EntityId,
        kind: ItemKind,
        state: BodyState,
        physics: &mut dyn Physics,
    ) {
        self.items.insert(entity, kind);
        physics.spawn(entity, kind, state);
    }
}

fn score(player: PeerId, score: ScoreType, round: i32) -> Payload {
    Score {
        player,
        score,
        round,
    }
    .into()
}

fn animation(entity: EntityId, animation: AnimationKind) -> Payload {
    AnimationTrigger { entity, animation }.into()
}

fn movement_ended(round: i32) -> Payload {
    Message {
        message: MessageKind::MovementEnded,
        round,
    }
    .into()
}
