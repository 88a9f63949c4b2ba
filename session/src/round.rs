//! Per-round scoring state.

use std::collections::BTreeMap;

use serde::Serialize;
use wire::{PeerId, ScoreType};

/// Outcomes one player collected this round.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScoreRecord {
    pub entries: Vec<ScoreType>,
    pub points: u32,
}

impl ScoreRecord {
    #[must_use]
    pub fn contains(&self, score: ScoreType) -> bool {
        self.entries.contains(&score)
    }
}

/// Scoring state for the round in progress.
///
/// Reset whenever a build phase begins. Each `(player, score type)` pair
/// counts at most once per round, so a duplicated or re-delivered score
/// event cannot inflate totals.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RoundState {
    round: i32,
    per_player: BTreeMap<PeerId, ScoreRecord>,
    treasure_holder: Option<PeerId>,
}

impl RoundState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Clears all scores and starts `round`.
    pub fn start_round(&mut self, round: i32) {
        self.round = round;
        self.per_player.clear();
        self.treasure_holder = None;
    }

    /// Records `score` for `player`.
    ///
    /// Returns the points to credit, or `None` if the event belongs to another
    /// round, the pair was already recorded, or the treasure is already held.
    pub fn record(&mut self, player: PeerId, score: ScoreType, round: i32) -> Option<u32> {
        if round != self.round {
            return None;
        }
        if score == ScoreType::TreasurePickup && self.treasure_holder.is_some() {
            return None;
        }
        let entry = self.per_player.entry(player).or_default();
        if entry.contains(score) {
            return None;
        }
        let points = score.points();
        entry.entries.push(score);
        entry.points += points;
        match score {
            ScoreType::TreasurePickup => self.treasure_holder = Some(player),
            ScoreType::EndTreasure | ScoreType::Death if self.treasure_holder == Some(player) => {
                self.treasure_holder = None;
            }
            _ => {}
        }
        Some(points)
    }

    #[must_use]
    pub const fn round(&self) -> i32 {
        self.round
    }

    #[must_use]
    pub const fn treasure_holder(&self) -> Option<PeerId> {
        self.treasure_holder
    }

    #[must_use]
    pub fn record_for(&self, player: PeerId) -> Option<&ScoreRecord> {
        self.per_player.get(&player)
    }

    /// Points `player` earned this round.
    #[must_use]
    pub fn round_points(&self, player: PeerId) -> u32 {
        self.per_player.get(&player).map_or(0, |record| record.points)
    }

    pub fn per_player(&self) -> impl Iterator<Item = (PeerId, &ScoreRecord)> + '_ {
        self.per_player.iter().map(|(id, record)| (*id, record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const P1: PeerId = PeerId::new(1);
    const P2: PeerId = PeerId::new(2);

    #[test]
    fn record_once_per_pair() {
        let mut round = RoundState::new();
        round.start_round(1);
        assert_eq!(round.record(P1, ScoreType::EndTreasure, 1), Some(3));
        assert_eq!(round.record(P1, ScoreType::EndTreasure, 1), None);
        assert_eq!(round.record(P1, ScoreType::TrapKill, 1), Some(1));
        assert_eq!(round.round_points(P1), 4);
        assert_eq!(round.round_points(P2), 0);
    }

    #[test]
    fn stale_round_ignored() {
        let mut round = RoundState::new();
        round.start_round(2);
        assert_eq!(round.record(P1, ScoreType::Finish, 1), None);
        assert!(round.record_for(P1).is_none());
    }

    #[test]
    fn treasure_holder_tracking() {
        let mut round = RoundState::new();
        round.start_round(1);
        assert_eq!(round.record(P2, ScoreType::TreasurePickup, 1), Some(0));
        assert_eq!(round.treasure_holder(), Some(P2));
        round.record(P2, ScoreType::Death, 1);
        assert_eq!(round.treasure_holder(), None);
    }

    #[test]
    fn second_pickup_refused_while_held() {
        let mut round = RoundState::new();
        round.start_round(1);
        assert_eq!(round.record(P1, ScoreType::TreasurePickup, 1), Some(0));
        assert_eq!(round.record(P2, ScoreType::TreasurePickup, 1), None);
        assert_eq!(round.treasure_holder(), Some(P1));
        assert!(round.record_for(P2).is_none());
    }

    #[test]
    fn start_round_resets() {
        let mut round = RoundState::new();
        round.start_round(1);
        round.record(P1, ScoreType::TreasurePickup, 1);
        round.start_round(2);
        assert_eq!(round.round(), 2);
        assert_eq!(round.treasure_holder(), None);
        assert_eq!(round.per_player().count(), 0);
    }
}
