//! Physics seam and a small deterministic reference world.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use wire::{EntityId, ItemKind};

/// Position and velocity of one body.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct BodyState {
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
}

impl BodyState {
    #[must_use]
    pub const fn at(x: f32, y: f32) -> Self {
        Self {
            x,
            y,
            vx: 0.0,
            vy: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContactPhase {
    Begin,
    End,
}

/// A begin or end of overlap between two bodies; `a < b`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Contact {
    pub phase: ContactPhase,
    pub a: EntityId,
    pub b: EntityId,
}

impl Contact {
    /// The other side of the contact, if `entity` takes part in it.
    #[must_use]
    pub fn other(&self, entity: EntityId) -> Option<EntityId> {
        if self.a == entity {
            Some(self.b)
        } else if self.b == entity {
            Some(self.a)
        } else {
            None
        }
    }
}

/// Rigid-body collaborator driven once per tick.
pub trait Physics {
    /// Advances the simulation by exactly `dt` seconds.
    fn step_fixed(&mut self, dt: f32);

    /// Moves contacts produced since the last drain into `out`.
    fn drain_contacts(&mut self, out: &mut Vec<Contact>);

    /// This peer becomes the writer of `entity`'s body.
    fn claim_local_authority(&mut self, entity: EntityId);

    /// This peer stops writing `entity`'s body; it is now driven by resyncs.
    fn release_local_authority(&mut self, entity: EntityId);

    fn spawn(&mut self, entity: EntityId, kind: ItemKind, state: BodyState);
    fn despawn(&mut self, entity: EntityId);
    fn body(&self, entity: EntityId) -> Option<BodyState>;
    fn set_body(&mut self, entity: EntityId, state: BodyState);
    fn apply_impulse(&mut self, entity: EntityId, dvx: f32, dvy: f32);
}

/// Downward acceleration applied to dynamic bodies.
pub const GRAVITY: f32 = 20.0;

/// Half extents of a body's bounding box.
#[must_use]
pub const fn half_extents(kind: ItemKind) -> (f32, f32) {
    match kind {
        ItemKind::Avatar => (0.4, 0.5),
        ItemKind::Platform => (1.5, 0.25),
        ItemKind::Mushroom | ItemKind::Trap => (0.5, 0.5),
        ItemKind::Treasure => (0.3, 0.3),
        ItemKind::Goal => (0.5, 1.5),
    }
}

#[derive(Debug, Clone)]
struct Body {
    kind: ItemKind,
    state: BodyState,
    authority: bool,
}

impl Body {
    fn overlaps(&self, other: &Self) -> bool {
        let (aw, ah) = half_extents(self.kind);
        let (bw, bh) = half_extents(other.kind);
        (self.state.x - other.state.x).abs() < aw + bw
            && (self.state.y - other.state.y).abs() < ah + bh
    }
}

/// Axis-aligned kinematic world with gravity and a floor at `y = 0`.
///
/// Only avatars are dynamic, and only while this peer holds authority over
/// them; everything else stays where it was spawned or last resynced.
/// Iteration follows entity id order so every peer produces the same
/// contact sequence for the same inputs.
#[derive(Debug, Clone, Default)]
pub struct KinematicWorld {
    bodies: BTreeMap<EntityId, Body>,
    touching: BTreeSet<(EntityId, EntityId)>,
    contacts: Vec<Contact>,
    steps: u64,
}

impl KinematicWorld {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.bodies.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bodies.is_empty()
    }

    #[must_use]
    pub const fn steps(&self) -> u64 {
        self.steps
    }

    #[must_use]
    pub fn has_authority(&self, entity: EntityId) -> bool {
        self.bodies.get(&entity).is_some_and(|body| body.authority)
    }

    fn integrate(&mut self, dt: f32) {
        for body in self.bodies.values_mut() {
            if body.kind != ItemKind::Avatar || !body.authority {
                continue;
            }
            let state = &mut body.state;
            state.vy -= GRAVITY * dt;
            state.x += state.vx * dt;
            state.y += state.vy * dt;
            if state.y <= 0.0 {
                state.y = 0.0;
                state.vy = 0.0;
            }
        }
    }

    fn detect(&mut self) {
        let mut now = BTreeSet::new();
        let ids: Vec<EntityId> = self.bodies.keys().copied().collect();
        for (idx, a) in ids.iter().enumerate() {
            for b in &ids[idx + 1..] {
                let (Some(body_a), Some(body_b)) = (self.bodies.get(a), self.bodies.get(b)) else {
                    continue;
                };
                if body_a.kind != ItemKind::Avatar && body_b.kind != ItemKind::Avatar {
                    continue;
                }
                if body_a.overlaps(body_b) {
                    now.insert((*a, *b));
                }
            }
        }
        for &(a, b) in now.difference(&self.touching) {
            self.contacts.push(Contact {
                phase: ContactPhase::Begin,
                a,
                b,
            });
        }
        for &(a, b) in self.touching.difference(&now) {
            self.contacts.push(Contact {
                phase: ContactPhase::End,
                a,
                b,
            });
        }
        self.touching = now;
    }
}

impl Physics for KinematicWorld {
    fn step_fixed(&mut self, dt: f32) {
        self.steps += 1;
        self.integrate(dt);
        self.detect();
    }

    fn drain_contacts(&mut self, out: &mut Vec<Contact>) {
        out.append(&mut self.contacts);
    }

    fn claim_local_authority(&mut self, entity: EntityId) {
        if let Some(body) = self.bodies.get_mut(&entity) {
            body.authority = true;
        }
    }

    fn release_local_authority(&mut self, entity: EntityId) {
        if let Some(body) = self.bodies.get_mut(&entity) {
            body.authority = false;
        }
    }

    fn spawn(&mut self, entity: EntityId, kind: ItemKind, state: BodyState) {
        self.bodies.insert(
            entity,
            Body {
                kind,
                state,
                authority: false,
            },
        );
    }

    fn despawn(&mut self, entity: EntityId) {
        self.bodies.remove(&entity);
        self.touching.retain(|(a, b)| *a != entity && *b != entity);
    }

    fn body(&self, entity: EntityId) -> Option<BodyState> {
        self.bodies.get(&entity).map(|body| body.state)
    }

    fn set_body(&mut self, entity: EntityId, state: BodyState) {
        if let Some(body) = self.bodies.get_mut(&entity) {
            body.state = state;
        }
    }

    fn apply_impulse(&mut self, entity: EntityId, dvx: f32, dvy: f32) {
        if let Some(body) = self.bodies.get_mut(&entity) {
            body.state.vx += dvx;
            body.state.vy += dvy;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wire::PeerId;

    fn avatar() -> EntityId {
        EntityId::avatar(PeerId::new(1))
    }

    #[test]
    fn only_authoritative_avatars_move() {
        let mut world = KinematicWorld::new();
        world.spawn(avatar(), ItemKind::Avatar, BodyState::at(0.0, 0.0));
        world.apply_impulse(avatar(), 6.0, 0.0);
        world.step_fixed(0.5);
        assert_eq!(world.body(avatar()).map(|b| b.x), Some(0.0));

        world.claim_local_authority(avatar());
        world.step_fixed(0.5);
        let body = world.body(avatar()).unwrap();
        assert!((body.x - 3.0).abs() < 1e-6);
        assert_eq!(body.y, 0.0);
        assert_eq!(world.steps(), 2);
    }

    #[test]
    fn begin_and_end_contacts() {
        let mut world = KinematicWorld::new();
        let goal = EntityId::compose(PeerId::SYNTHETIC, 1);
        world.spawn(goal, ItemKind::Goal, BodyState::at(2.0, 0.0));
        world.spawn(avatar(), ItemKind::Avatar, BodyState::at(0.0, 0.0));
        world.claim_local_authority(avatar());
        world.apply_impulse(avatar(), 10.0, 0.0);

        let mut contacts = Vec::new();
        for _ in 0..10 {
            world.step_fixed(0.1);
            world.drain_contacts(&mut contacts);
        }
        assert_eq!(
            contacts,
            vec![
                Contact {
                    phase: ContactPhase::Begin,
                    a: goal,
                    b: avatar()
                },
                Contact {
                    phase: ContactPhase::End,
                    a: goal,
                    b: avatar()
                },
            ]
        );
        assert_eq!(contacts[0].other(avatar()), Some(goal));
    }

    #[test]
    fn static_pairs_never_touch() {
        let mut world = KinematicWorld::new();
        world.spawn(EntityId::new(1), ItemKind::Platform, BodyState::at(0.0, 0.0));
        world.spawn(EntityId::new(2), ItemKind::Trap, BodyState::at(0.0, 0.0));
        world.step_fixed(0.1);
        let mut contacts = Vec::new();
        world.drain_contacts(&mut contacts);
        assert!(contacts.is_empty());
    }
}
