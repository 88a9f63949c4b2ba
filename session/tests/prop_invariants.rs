use std::collections::BTreeMap;

use proptest::prelude::*;
use session::{OwnershipError, OwnershipLedger, PeerDirectory};
use wire::{ColorTag, EntityId, PeerId};

#[derive(Debug, Clone)]
enum LedgerOp {
    Assign { entity: u8, peer: u8 },
    Acquire { entity: u8, peer: u8, epoch_skew: i8 },
    Release { entity: u8, peer: u8 },
}

fn ledger_op() -> impl Strategy<Value = LedgerOp> {
    prop_oneof![
        (0u8..3, 1u8..5).prop_map(|(entity, peer)| LedgerOp::Assign { entity, peer }),
        (0u8..3, 1u8..5, -2i8..=1).prop_map(|(entity, peer, epoch_skew)| LedgerOp::Acquire {
            entity,
            peer,
            epoch_skew
        }),
        (0u8..3, 1u8..5).prop_map(|(entity, peer)| LedgerOp::Release { entity, peer }),
    ]
}

fn entity(raw: u8) -> EntityId {
    EntityId::compose(PeerId::new(1), u16::from(raw) + 1)
}

proptest! {
    #[test]
    fn prop_ownership_exclusive_per_epoch(ops in prop::collection::vec(ledger_op(), 1..80)) {
        let mut ledger = OwnershipLedger::new();
        // (entity, epoch) -> owner observed at that epoch
        let mut seen: BTreeMap<(EntityId, u32), Option<PeerId>> = BTreeMap::new();

        for op in ops {
            match op {
                LedgerOp::Assign { entity: e, peer } => {
                    let _ = ledger.assign(entity(e), PeerId::new(u32::from(peer)));
                }
                LedgerOp::Acquire { entity: e, peer, epoch_skew } => {
                    let id = entity(e);
                    let Some(current) = ledger.epoch(id) else {
                        prop_assert!(ledger.acquire(id, PeerId::new(1), 0).is_err());
                        continue;
                    };
                    let claimed = current.wrapping_add_signed(i32::from(epoch_skew));
                    let owner_before = ledger.owner(id);
                    match ledger.acquire(id, PeerId::new(u32::from(peer)), claimed) {
                        Ok(epoch) => {
                            prop_assert_eq!(claimed, current);
                            prop_assert!(epoch > current);
                        }
                        Err(OwnershipError::StaleAcquire { current: reported, .. }) => {
                            prop_assert_ne!(claimed, current);
                            prop_assert_eq!(reported, current);
                            prop_assert_eq!(ledger.epoch(id), Some(current));
                            prop_assert_eq!(ledger.owner(id), owner_before);
                        }
                        Err(other) => prop_assert!(false, "unexpected error {:?}", other),
                    }
                }
                LedgerOp::Release { entity: e, peer } => {
                    let id = entity(e);
                    let caller = PeerId::new(u32::from(peer));
                    let owner_before = ledger.owner(id);
                    let epoch_before = ledger.epoch(id);
                    match ledger.release(id, caller) {
                        Ok(epoch) => {
                            prop_assert_eq!(owner_before, Some(caller));
                            prop_assert!(epoch_before.is_some_and(|before| epoch > before));
                        }
                        Err(_) => {
                            prop_assert_eq!(ledger.owner(id), owner_before);
                            prop_assert_eq!(ledger.epoch(id), epoch_before);
                        }
                    }
                }
            }

            for record in ledger.iter() {
                let key = (record.entity, record.epoch);
                match seen.get(&key) {
                    Some(owner) => prop_assert_eq!(*owner, record.owner),
                    None => {
                        seen.insert(key, record.owner);
                    }
                }
            }
        }
    }

    #[test]
    fn prop_mirror_never_moves_backwards(updates in prop::collection::vec((0u32..20, 0u32..5), 1..40)) {
        let mut ledger = OwnershipLedger::new();
        let id = entity(0);
        let mut high = None;
        for (epoch, owner) in updates {
            let owner = (owner != 0).then(|| PeerId::new(owner));
            let applied = ledger.mirror(id, owner, epoch);
            prop_assert_eq!(applied, high.map_or(true, |h| epoch > h));
            if applied {
                high = Some(epoch);
            }
            prop_assert_eq!(ledger.epoch(id), high);
        }
    }

    #[test]
    fn prop_color_unique_among_connected(
        ops in prop::collection::vec((1u32..5, 0u8..4, prop::bool::weighted(0.1)), 1..60)
    ) {
        let mut peers = PeerDirectory::new();
        for id in 1..5 {
            peers.add_peer(PeerId::new(id), id == 1).unwrap();
        }
        for (peer, color, disconnect) in ops {
            let peer = PeerId::new(peer);
            if disconnect {
                peers.mark_disconnected(peer);
            } else if let Some(color) = ColorTag::from_raw(color) {
                let _ = peers.set_color(peer, color);
            }
            for color in ColorTag::ALL {
                let holders = peers
                    .connected()
                    .filter(|p| p.color == Some(*color))
                    .count();
                prop_assert!(holders <= 1, "{:?} held by {} peers", color, holders);
            }
        }
    }
}
