//! Ownership ledger: who may write each shared simulation entity.
//!
//! Every shared entity (avatar, placed item) has one record. A record is
//! either free or owned by exactly one peer, and carries an epoch that
//! increases on every successful transfer. Requests quote the epoch they
//! last saw; a mismatch means the requester's view is stale and the request
//! is refused without touching the record.

use std::collections::BTreeMap;

use serde::Serialize;
use wire::{EntityId, PeerId};

use crate::error::{OwnershipError, OwnershipResult};

/// Ownership state of one entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum OwnershipState {
    Free { epoch: u32 },
    Owned { owner: PeerId, epoch: u32 },
}

/// One ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OwnershipRecord {
    pub entity: EntityId,
    pub owner: Option<PeerId>,
    pub epoch: u32,
}

impl OwnershipRecord {
    #[must_use]
    pub const fn state(&self) -> OwnershipState {
        match self.owner {
            Some(owner) => OwnershipState::Owned {
                owner,
                epoch: self.epoch,
            },
            None => OwnershipState::Free { epoch: self.epoch },
        }
    }
}

/// Per-entity ownership records.
#[derive(Debug, Clone, Default)]
pub struct OwnershipLedger {
    records: BTreeMap<EntityId, OwnershipRecord>,
}

impl OwnershipLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Gives `entity` to `owner` when it has no owner yet.
    ///
    /// A new record starts at epoch 0; re-assigning a freed record bumps its
    /// epoch. Returns the resulting epoch.
    pub fn assign(&mut self, entity: EntityId, owner: PeerId) -> OwnershipResult<u32> {
        match self.records.get_mut(&entity) {
            None => {
                self.records.insert(
                    entity,
                    OwnershipRecord {
                        entity,
                        owner: Some(owner),
                        epoch: 0,
                    },
                );
                Ok(0)
            }
            Some(record) => match record.owner {
                Some(current) => Err(OwnershipError::AlreadyOwned {
                    entity,
                    owner: current,
                }),
                None => {
                    record.epoch = record.epoch.wrapping_add(1);
                    record.owner = Some(owner);
                    Ok(record.epoch)
                }
            },
        }
    }

    /// Transfers `entity` to `requester` if `claimed_epoch` is current.
    ///
    /// Returns the new epoch on success.
    pub fn acquire(
        &mut self,
        entity: EntityId,
        requester: PeerId,
        claimed_epoch: u32,
    ) -> OwnershipResult<u32> {
        let record = self.record_mut(entity)?;
        if record.epoch != claimed_epoch {
            return Err(OwnershipError::StaleAcquire {
                entity,
                claimed: claimed_epoch,
                current: record.epoch,
            });
        }
        record.owner = Some(requester);
        record.epoch = record.epoch.wrapping_add(1);
        Ok(record.epoch)
    }

    /// Frees `entity`; only its current owner may do so.
    ///
    /// Returns the new epoch.
    pub fn release(&mut self, entity: EntityId, caller: PeerId) -> OwnershipResult<u32> {
        let record = self.record_mut(entity)?;
        if record.owner != Some(caller) {
            return Err(OwnershipError::NotOwner {
                entity,
                caller,
                owner: record.owner,
            });
        }
        record.owner = None;
        record.epoch = record.epoch.wrapping_add(1);
        Ok(record.epoch)
    }

    /// Adopts an authoritative record announced by the host.
    ///
    /// Applied only when `epoch` is newer than the local view (or the entity
    /// is unknown locally). Returns `true` if the record changed.
    pub fn mirror(&mut self, entity: EntityId, owner: Option<PeerId>, epoch: u32) -> bool {
        match self.records.get_mut(&entity) {
            Some(record) if record.epoch >= epoch => false,
            Some(record) => {
                record.owner = owner;
                record.epoch = epoch;
                true
            }
            None => {
                self.records.insert(
                    entity,
                    OwnershipRecord {
                        entity,
                        owner,
                        epoch,
                    },
                );
                true
            }
        }
    }

    /// Drops the record when the entity leaves the simulation.
    pub fn remove(&mut self, entity: EntityId) -> Option<OwnershipRecord> {
        self.records.remove(&entity)
    }

    /// Gate for every local mutation of `entity`.
    #[must_use]
    pub fn is_locally_writable(&self, entity: EntityId, self_id: PeerId) -> bool {
        self.owner(entity) == Some(self_id)
    }

    #[must_use]
    pub fn owner(&self, entity: EntityId) -> Option<PeerId> {
        self.records.get(&entity).and_then(|record| record.owner)
    }

    #[must_use]
    pub fn epoch(&self, entity: EntityId) -> Option<u32> {
        self.records.get(&entity).map(|record| record.epoch)
    }

    #[must_use]
    pub fn get(&self, entity: EntityId) -> Option<&OwnershipRecord> {
        self.records.get(&entity)
    }

    /// Entities currently owned by `peer`, in id order.
    pub fn owned_by(&self, peer: PeerId) -> impl Iterator<Item = EntityId> + '_ {
        self.records
            .values()
            .filter(move |record| record.owner == Some(peer))
            .map(|record| record.entity)
    }

    pub fn iter(&self) -> impl Iterator<Item = &OwnershipRecord> + '_ {
        self.records.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn record_mut(&mut self, entity: EntityId) -> OwnershipResult<&mut OwnershipRecord> {
        self.records
            .get_mut(&entity)
            .ok_or(OwnershipError::UnknownEntity { entity })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const P1: PeerId = PeerId::new(1);
    const P2: PeerId = PeerId::new(2);

    fn entity() -> EntityId {
        EntityId::avatar(P1)
    }

    #[test]
    fn assign_starts_at_epoch_zero() {
        let mut ledger = OwnershipLedger::new();
        assert_eq!(ledger.assign(entity(), P1), Ok(0));
        assert!(ledger.is_locally_writable(entity(), P1));
        assert!(!ledger.is_locally_writable(entity(), P2));
        assert_eq!(
            ledger.assign(entity(), P2),
            Err(OwnershipError::AlreadyOwned {
                entity: entity(),
                owner: P1
            })
        );
    }

    #[test]
    fn acquire_checks_epoch() {
        let mut ledger = OwnershipLedger::new();
        ledger.assign(entity(), P1).unwrap();
        assert_eq!(ledger.acquire(entity(), P2, 0), Ok(1));
        assert_eq!(ledger.owner(entity()), Some(P2));

        let err = ledger.acquire(entity(), P1, 0).unwrap_err();
        assert_eq!(
            err,
            OwnershipError::StaleAcquire {
                entity: entity(),
                claimed: 0,
                current: 1
            }
        );
        assert_eq!(ledger.owner(entity()), Some(P2));
        assert_eq!(ledger.epoch(entity()), Some(1));
    }

    #[test]
    fn release_only_by_owner() {
        let mut ledger = OwnershipLedger::new();
        ledger.assign(entity(), P1).unwrap();
        assert!(matches!(
            ledger.release(entity(), P2),
            Err(OwnershipError::NotOwner { owner: Some(p), .. }) if p == P1
        ));
        assert_eq!(ledger.release(entity(), P1), Ok(1));
        assert_eq!(
            ledger.get(entity()).map(OwnershipRecord::state),
            Some(OwnershipState::Free { epoch: 1 })
        );
        // Freed records can be reassigned; the epoch keeps moving forward.
        assert_eq!(ledger.assign(entity(), P2), Ok(2));
    }

    #[test]
    fn unknown_entity() {
        let mut ledger = OwnershipLedger::new();
        assert_eq!(
            ledger.acquire(entity(), P1, 0),
            Err(OwnershipError::UnknownEntity { entity: entity() })
        );
        assert!(ledger.release(entity(), P1).is_err());
    }

    #[test]
    fn mirror_ignores_older_updates() {
        let mut ledger = OwnershipLedger::new();
        assert!(ledger.mirror(entity(), Some(P1), 0));
        assert!(ledger.mirror(entity(), Some(P2), 2));
        assert!(!ledger.mirror(entity(), Some(P1), 1));
        assert!(!ledger.mirror(entity(), None, 2));
        assert_eq!(ledger.owner(entity()), Some(P2));
    }

    #[test]
    fn owned_by_lists_entities() {
        let mut ledger = OwnershipLedger::new();
        let a = EntityId::compose(P1, 1);
        let b = EntityId::compose(P1, 2);
        ledger.assign(a, P1).unwrap();
        ledger.assign(b, P2).unwrap();
        ledger.assign(entity(), P1).unwrap();
        let owned: Vec<_> = ledger.owned_by(P1).collect();
        assert_eq!(owned, vec![entity(), a]);
        assert!(ledger.remove(a).is_some());
        assert_eq!(ledger.len(), 2);
    }
}
