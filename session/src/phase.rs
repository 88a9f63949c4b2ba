//! Host-authoritative phase state machine.
//!
//! The host polls the machine once per tick after inbound events have been
//! applied. Clients never decide transitions; they mirror the host's
//! `PhaseChange` events. Loss of a peer or of the transport is detected
//! locally by every peer.

use serde::Serialize;
use wire::{PeerId, Phase, TransitionCause};

use crate::config::SessionConfig;
use crate::peers::PeerDirectory;
use crate::transport::ConnectionStatus;

/// A phase change, as decided by the host or mirrored from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Transition {
    pub from: Phase,
    pub to: Phase,
    pub round: i32,
    pub cause: TransitionCause,
}

/// Current phase plus the bookkeeping needed to leave it.
#[derive(Debug, Clone, Default)]
pub struct PhaseMachine {
    phase: Phase,
    round: i32,
    countdown: Option<u32>,
    selected_level: Option<i32>,
    play_requested: bool,
    winner: Option<PeerId>,
    session_started: bool,
}

impl PhaseMachine {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn phase(&self) -> Phase {
        self.phase
    }

    #[must_use]
    pub const fn round(&self) -> i32 {
        self.round
    }

    /// Ticks left before the current phase's fallback fires.
    #[must_use]
    pub const fn countdown(&self) -> Option<u32> {
        self.countdown
    }

    #[must_use]
    pub const fn selected_level(&self) -> Option<i32> {
        self.selected_level
    }

    #[must_use]
    pub const fn winner(&self) -> Option<PeerId> {
        self.winner
    }

    /// Whether every expected peer has been seen connected at once.
    #[must_use]
    pub const fn session_started(&self) -> bool {
        self.session_started
    }

    /// Records the host's level choice.
    pub fn note_level_pick(&mut self, level: i32, play_pressed: bool) {
        if self.phase != Phase::LevelSelect {
            return;
        }
        self.selected_level = Some(level);
        self.play_requested |= play_pressed;
    }

    /// Local loss detection, run by every peer each tick.
    pub fn check_disconnect(
        &mut self,
        peers: &PeerDirectory,
        config: &SessionConfig,
        status: ConnectionStatus,
    ) -> Option<Transition> {
        if self.phase.is_terminal() {
            return None;
        }
        let connected = peers.connected_count();
        if connected >= config.expected_peers {
            self.session_started = true;
        }
        let cause = if status == ConnectionStatus::NetError {
            TransitionCause::NetError
        } else if self.session_started && connected < config.expected_peers {
            TransitionCause::PeerLost
        } else {
            return None;
        };
        Some(self.transition(Phase::Disconnected, self.round, cause))
    }

    /// Host decision for this tick, evaluated on post-apply state.
    ///
    /// All-ready conditions are checked before countdowns, so when both hold
    /// in the same tick the transition is recorded as `AllReady`.
    pub fn poll(&mut self, peers: &PeerDirectory, config: &SessionConfig) -> Option<Transition> {
        let expected = config.expected_peers;
        match self.phase {
            Phase::ColorSelect => peers
                .all_ready(expected)
                .then(|| self.transition(Phase::LevelSelect, self.round, TransitionCause::AllReady)),
            Phase::LevelSelect => self
                .play_requested
                .then(|| self.transition(Phase::Build, self.round + 1, TransitionCause::HostPick)),
            Phase::Build => self.ready_or_countdown(peers, expected, Phase::Move),
            Phase::Move => self.ready_or_countdown(peers, expected, Phase::Scoreboard),
            Phase::Scoreboard => {
                // Checked every tick: late scores can still cross the line.
                let winner = peers
                    .leader()
                    .filter(|leader| leader.score >= config.win_score);
                if let Some(leader) = winner {
                    self.winner = Some(leader.id);
                    return Some(self.transition(
                        Phase::Victory,
                        self.round,
                        TransitionCause::WinThreshold,
                    ));
                }
                self.count_down().then(|| {
                    self.transition(Phase::Build, self.round + 1, TransitionCause::Countdown)
                })
            }
            Phase::Victory | Phase::Disconnected => None,
        }
    }

    /// Client-side countdown, for display only.
    pub fn tick_display_countdown(&mut self) {
        if let Some(left) = self.countdown.as_mut() {
            *left = left.saturating_sub(1);
        }
    }

    /// Adopts a transition announced by the host.
    ///
    /// Returns `None` if this peer already reached a terminal phase or the
    /// announcement names the phase and round it is already in.
    pub fn mirror(
        &mut self,
        phase: Phase,
        round: i32,
        cause: TransitionCause,
        peers: &PeerDirectory,
    ) -> Option<Transition> {
        if self.phase.is_terminal() || (self.phase == phase && self.round == round) {
            return None;
        }
        if phase == Phase::Victory {
            self.winner = peers.leader().map(|leader| leader.id);
        }
        Some(self.transition(phase, round, cause))
    }

    /// Enters `transition.to` and arms its countdown.
    pub fn apply(&mut self, transition: Transition, config: &SessionConfig) {
        self.phase = transition.to;
        self.round = transition.round;
        self.countdown = match transition.to {
            Phase::Build => Some(config.build_countdown_ticks),
            Phase::Move => Some(config.move_cap_ticks),
            Phase::Scoreboard => Some(config.scoreboard_ticks),
            _ => None,
        };
        if transition.to != Phase::LevelSelect {
            self.play_requested = false;
        }
    }

    fn ready_or_countdown(
        &mut self,
        peers: &PeerDirectory,
        expected: usize,
        next: Phase,
    ) -> Option<Transition> {
        if peers.all_ready(expected) {
            return Some(self.transition(next, self.round, TransitionCause::AllReady));
        }
        self.count_down()
            .then(|| self.transition(next, self.round, TransitionCause::Countdown))
    }

    /// Decrements the countdown; returns `true` once it has run out.
    fn count_down(&mut self) -> bool {
        match self.countdown.as_mut() {
            Some(left) => {
                *left = left.saturating_sub(1);
                *left == 0
            }
            None => false,
        }
    }

    const fn transition(&self, to: Phase, round: i32, cause: TransitionCause) -> Transition {
        Transition {
            from: self.phase,
            to,
            round,
            cause,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const P1: PeerId = PeerId::new(1);
    const P2: PeerId = PeerId::new(2);

    fn peers() -> PeerDirectory {
        let mut peers = PeerDirectory::new();
        peers.add_peer(P1, true).unwrap();
        peers.add_peer(P2, false).unwrap();
        peers
    }

    fn step(
        machine: &mut PhaseMachine,
        peers: &mut PeerDirectory,
        config: &SessionConfig,
    ) -> Option<Transition> {
        let transition = machine.poll(peers, config)?;
        machine.apply(transition, config);
        peers.reset_ready();
        Some(transition)
    }

    fn all_ready(peers: &mut PeerDirectory) {
        peers.set_ready(P1, true).unwrap();
        peers.set_ready(P2, true).unwrap();
    }

    fn to_build(machine: &mut PhaseMachine, peers: &mut PeerDirectory, config: &SessionConfig) {
        all_ready(peers);
        step(machine, peers, config).unwrap();
        machine.note_level_pick(2, true);
        let transition = step(machine, peers, config).unwrap();
        assert_eq!(transition.to, Phase::Build);
        assert_eq!(transition.cause, TransitionCause::HostPick);
    }

    #[test]
    fn color_select_waits_for_everyone() {
        let config = SessionConfig::for_testing();
        let mut machine = PhaseMachine::new();
        let mut peers = peers();
        peers.set_ready(P1, true).unwrap();
        assert_eq!(step(&mut machine, &mut peers, &config), None);
        peers.set_ready(P2, true).unwrap();
        let transition = step(&mut machine, &mut peers, &config).unwrap();
        assert_eq!(transition.to, Phase::LevelSelect);
        assert_eq!(transition.cause, TransitionCause::AllReady);
        assert!(!peers.all_ready(2));
    }

    #[test]
    fn level_pick_without_play_does_not_start() {
        let config = SessionConfig::for_testing();
        let mut machine = PhaseMachine::new();
        let mut peers = peers();
        all_ready(&mut peers);
        step(&mut machine, &mut peers, &config).unwrap();
        machine.note_level_pick(4, false);
        assert_eq!(step(&mut machine, &mut peers, &config), None);
        assert_eq!(machine.selected_level(), Some(4));
        machine.note_level_pick(4, true);
        let transition = step(&mut machine, &mut peers, &config).unwrap();
        assert_eq!(transition.round, 1);
        assert_eq!(machine.countdown(), Some(config.build_countdown_ticks));
    }

    #[test]
    fn build_countdown_forces_move() {
        let config = SessionConfig::for_testing();
        let mut machine = PhaseMachine::new();
        let mut peers = peers();
        to_build(&mut machine, &mut peers, &config);
        peers.set_ready(P1, true).unwrap();
        for _ in 1..config.build_countdown_ticks {
            assert_eq!(step(&mut machine, &mut peers, &config), None);
            peers.set_ready(P1, true).unwrap();
        }
        let transition = step(&mut machine, &mut peers, &config).unwrap();
        assert_eq!(transition.to, Phase::Move);
        assert_eq!(transition.cause, TransitionCause::Countdown);
    }

    #[test]
    fn all_ready_wins_over_expiring_countdown() {
        let config = SessionConfig {
            build_countdown_ticks: 1,
            ..SessionConfig::for_testing()
        };
        let mut machine = PhaseMachine::new();
        let mut peers = peers();
        to_build(&mut machine, &mut peers, &config);
        all_ready(&mut peers);
        let transition = step(&mut machine, &mut peers, &config).unwrap();
        assert_eq!(transition.cause, TransitionCause::AllReady);
    }

    #[test]
    fn scoreboard_loops_to_build_or_victory() {
        let config = SessionConfig::for_testing();
        let mut machine = PhaseMachine::new();
        let mut peers = peers();
        to_build(&mut machine, &mut peers, &config);
        all_ready(&mut peers);
        step(&mut machine, &mut peers, &config).unwrap();
        all_ready(&mut peers);
        assert_eq!(
            step(&mut machine, &mut peers, &config).map(|t| t.to),
            Some(Phase::Scoreboard)
        );
        for _ in 1..config.scoreboard_ticks {
            assert_eq!(step(&mut machine, &mut peers, &config), None);
        }
        let next = step(&mut machine, &mut peers, &config).unwrap();
        assert_eq!((next.to, next.round), (Phase::Build, 2));

        all_ready(&mut peers);
        step(&mut machine, &mut peers, &config).unwrap();
        all_ready(&mut peers);
        assert_eq!(
            step(&mut machine, &mut peers, &config).map(|t| t.to),
            Some(Phase::Scoreboard)
        );
        assert_eq!(step(&mut machine, &mut peers, &config), None);
        assert_eq!(machine.countdown(), Some(config.scoreboard_ticks - 1));

        // Crossing the threshold ends the session without waiting out the countdown.
        peers.add_score(P2, config.win_score).unwrap();
        let last = step(&mut machine, &mut peers, &config).unwrap();
        assert_eq!(last.to, Phase::Victory);
        assert_eq!(last.cause, TransitionCause::WinThreshold);
        assert_eq!(machine.winner(), Some(P2));
        assert_eq!(step(&mut machine, &mut peers, &config), None);
    }

    #[test]
    fn disconnect_only_after_session_started() {
        let config = SessionConfig::for_testing();
        let mut machine = PhaseMachine::new();
        let mut peers = PeerDirectory::new();
        peers.add_peer(P1, true).unwrap();
        let status = ConnectionStatus::Connected;
        assert_eq!(machine.check_disconnect(&peers, &config, status), None);

        peers.add_peer(P2, false).unwrap();
        assert_eq!(machine.check_disconnect(&peers, &config, status), None);
        assert!(machine.session_started());

        peers.mark_disconnected(P2);
        let transition = machine.check_disconnect(&peers, &config, status).unwrap();
        assert_eq!(transition.to, Phase::Disconnected);
        assert_eq!(transition.cause, TransitionCause::PeerLost);
        machine.apply(transition, &config);
        assert_eq!(machine.check_disconnect(&peers, &config, status), None);
    }

    #[test]
    fn net_error_is_immediate() {
        let config = SessionConfig::for_testing();
        let mut machine = PhaseMachine::new();
        let peers = PeerDirectory::new();
        let transition = machine
            .check_disconnect(&peers, &config, ConnectionStatus::NetError)
            .unwrap();
        assert_eq!(transition.cause, TransitionCause::NetError);
    }

    #[test]
    fn mirror_ignores_repeats_and_terminal() {
        let config = SessionConfig::for_testing();
        let peers = peers();
        let mut machine = PhaseMachine::new();
        let t = machine
            .mirror(Phase::Build, 1, TransitionCause::HostPick, &peers)
            .unwrap();
        machine.apply(t, &config);
        assert_eq!(
            machine.mirror(Phase::Build, 1, TransitionCause::HostPick, &peers),
            None
        );
        let t = machine
            .mirror(Phase::Disconnected, 1, TransitionCause::PeerLost, &peers)
            .unwrap();
        machine.apply(t, &config);
        assert_eq!(
            machine.mirror(Phase::Move, 1, TransitionCause::AllReady, &peers),
            None
        );
    }
}
