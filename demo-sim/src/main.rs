use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use log::{debug, info};
use serde::Serialize;
use session::{
    KinematicWorld, LevelLayout, LoopbackHub, LoopbackTransport, SentFrame, SessionConfig,
    SessionSnapshot, SyncLoop, SyncStats, MAX_PEERS, MIN_PEERS,
};
use tools::decode_frame_json;
use wire::{decode_event, encode_event, ColorTag, EntityId, EventRegistry, ItemKind, PeerId, Phase};

type Session = SyncLoop<LoopbackTransport, KinematicWorld>;

#[derive(Parser)]
#[command(
    name = "demo-sim",
    version,
    about = "Deterministic loopback session capture generator"
)]
struct Cli {
    /// Number of simulated peers (peer 1 hosts).
    #[arg(long, default_value_t = 2)]
    peers: usize,
    /// Stop after this many rounds even without a winner.
    #[arg(long, default_value_t = 12)]
    rounds_cap: i32,
    /// RNG seed for deterministic results.
    #[arg(long, default_value_t = 1)]
    seed: u64,
    /// Output directory for captures.
    #[arg(long, default_value = "captures")]
    out_dir: PathBuf,
    /// Optional session config JSON; `--peers` overrides its peer count.
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    if !(MIN_PEERS..=MAX_PEERS).contains(&cli.peers) {
        anyhow::bail!(
            "--peers must be between {MIN_PEERS} and {MAX_PEERS}, got {}",
            cli.peers
        );
    }
    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => SessionConfig::default(),
    };
    config.expected_peers = cli.peers;
    config
        .validate()
        .map_err(|err| anyhow::anyhow!("invalid session config: {err}"))?;

    fs::create_dir_all(&cli.out_dir)
        .with_context(|| format!("create output dir {}", cli.out_dir.display()))?;

    let registry = Arc::new(EventRegistry::standard());
    let hub = LoopbackHub::new().with_capture();
    let mut sessions = Vec::with_capacity(cli.peers);
    let mut bots = Vec::with_capacity(cli.peers);
    for idx in 0..cli.peers {
        let peer = PeerId::new(idx as u32 + 1);
        let session = SyncLoop::new(
            peer,
            idx == 0,
            config.clone(),
            Arc::clone(&registry),
            hub.connect(peer),
            KinematicWorld::new(),
        )
        .with_context(|| format!("create session for {peer}"))?;
        sessions.push(session);
        bots.push(Bot::new(peer, ColorTag::ALL[idx % ColorTag::ALL.len()]));
    }

    let mut rng = Rng::new(cli.seed);
    let mut summary = Summary::new(&cli);
    let max_ticks = tick_cap(&config, cli.rounds_cap);

    for tick in 1..=max_ticks {
        for (bot, session) in bots.iter_mut().zip(sessions.iter_mut()) {
            bot.act(session, &mut rng, &config)?;
            session.tick();
        }
        let frames = hub.take_captured();
        write_frames(&cli.out_dir, tick, &frames, &registry, &mut summary)?;
        summary.ticks = tick;

        let host = &sessions[0];
        if host.phase().is_terminal() {
            info!("session ended in {:?} at tick {tick}", host.phase());
            break;
        }
        if host.round() > cli.rounds_cap {
            info!("round cap {} reached at tick {tick}", cli.rounds_cap);
            break;
        }
    }

    summary.finish(&sessions);
    write_summary_json(&cli.out_dir, &summary)?;
    info!(
        "{} frames ({} bytes) over {} ticks, final phase {:?}, winner {:?}",
        summary.frames, summary.frame_bytes_total, summary.ticks, summary.final_phase,
        summary.winner
    );
    Ok(())
}

fn load_config(path: &Path) -> Result<SessionConfig> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read config {}", path.display()))?;
    serde_json::from_str(&contents).context("parse config json")
}

/// Upper bound on ticks for `rounds` full rounds plus setup slack.
fn tick_cap(config: &SessionConfig, rounds: i32) -> u64 {
    let per_round = u64::from(config.build_countdown_ticks)
        + u64::from(config.move_cap_ticks)
        + u64::from(config.scoreboard_ticks);
    let rounds = u64::try_from(rounds.max(1)).unwrap_or(1);
    per_round * (rounds + 1) + u64::from(config.tick_hz) * 10
}

fn write_frames(
    out_dir: &Path,
    tick: u64,
    frames: &[SentFrame],
    registry: &EventRegistry,
    summary: &mut Summary,
) -> Result<()> {
    let mut per_peer: BTreeMap<PeerId, usize> = BTreeMap::new();
    for frame in frames {
        let seq = per_peer.entry(frame.from).or_default();
        let path = out_dir.join(format!(
            "tick_{tick:06}_peer_{}_{seq:03}.bin",
            frame.from.raw()
        ));
        *seq += 1;
        validate_frame(&frame.bytes, registry)
            .with_context(|| format!("validate {}", path.display()))?;
        write_frame(&path, &frame.bytes)?;
        summary.push_frame(&frame.bytes, registry);
    }
    Ok(())
}

fn write_frame(path: &Path, bytes: &[u8]) -> Result<()> {
    fs::write(path, bytes).with_context(|| format!("write {}", path.display()))
}

fn write_summary_json(out_dir: &Path, summary: &Summary) -> Result<()> {
    let path = out_dir.join("summary.json");
    let contents = serde_json::to_string_pretty(summary).context("serialize summary")?;
    fs::write(&path, contents).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

fn validate_frame(bytes: &[u8], registry: &EventRegistry) -> Result<()> {
    let event = decode_event(bytes, registry).context("decode frame")?;
    if encode_event(&event) != bytes {
        anyhow::bail!("re-encoded {} frame differs from capture", event.kind().name());
    }
    let _ = decode_frame_json(bytes, registry).context("tools decode")?;
    Ok(())
}

/// Scripted player driving one session.
struct Bot {
    peer: PeerId,
    color: ColorTag,
    color_requested_at: Option<u64>,
    ready_sent: bool,
    level_sent: bool,
    built_round: i32,
    launched_round: i32,
    move_started_at: u64,
    ended_round: i32,
}

impl Bot {
    fn new(peer: PeerId, color: ColorTag) -> Self {
        Self {
            peer,
            color,
            color_requested_at: None,
            ready_sent: false,
            level_sent: false,
            built_round: 0,
            launched_round: 0,
            move_started_at: 0,
            ended_round: 0,
        }
    }

    fn act(&mut self, session: &mut Session, rng: &mut Rng, config: &SessionConfig) -> Result<()> {
        if session.peers().connected_count() < config.expected_peers {
            return Ok(());
        }
        let now = session.tick_count();
        let round = session.round();
        match session.phase() {
            Phase::ColorSelect => {
                let assigned = session
                    .peers()
                    .get(self.peer)
                    .and_then(|peer| peer.color)
                    .is_some();
                if !assigned {
                    let retry = self
                        .color_requested_at
                        .map_or(true, |at| now >= at + u64::from(config.tick_hz));
                    if retry {
                        session
                            .pick_color(self.color)
                            .with_context(|| format!("{} pick colour", self.peer))?;
                        self.color_requested_at = Some(now);
                    }
                } else if !self.ready_sent {
                    session.set_ready(true).context("ready up")?;
                    self.ready_sent = true;
                }
            }
            Phase::LevelSelect => {
                if session.is_host() && !self.level_sent {
                    let level = rng.range_i32(1, 3);
                    debug!("{} picks level {level}", self.peer);
                    session.pick_level(level, true).context("pick level")?;
                    self.level_sent = true;
                }
            }
            Phase::Build => {
                if self.built_round < round {
                    let (item, x, y) = self.choose_placement(session, rng);
                    session
                        .place_item(item, x, y)
                        .with_context(|| format!("{} place {item:?}", self.peer))?;
                    session.build_ready().context("build ready")?;
                    self.built_round = round;
                }
            }
            Phase::Move => {
                let avatar = EntityId::avatar(self.peer);
                if self.launched_round < round {
                    let speed = rng.range_f32(8.0, 24.0);
                    session.apply_impulse(avatar, speed, 0.0);
                    self.launched_round = round;
                    self.move_started_at = now;
                } else if self.ended_round < round
                    && !session.world().movement_over(self.peer)
                    && now >= self.move_started_at + u64::from(config.tick_hz) * 4
                {
                    session.end_movement().context("end movement")?;
                    self.ended_round = round;
                }
            }
            Phase::Scoreboard | Phase::Victory | Phase::Disconnected => {}
        }
        Ok(())
    }

    /// Mostly decor well above the course; now and then a trap on the path.
    fn choose_placement(&self, session: &Session, rng: &mut Rng) -> (ItemKind, f32, f32) {
        let goal_x = session
            .world()
            .level()
            .map_or(20.0, |level| LevelLayout::for_level(level).goal_x);
        if rng.chance(5) {
            return (ItemKind::Trap, rng.range_f32(2.0, goal_x - 2.0), 0.0);
        }
        let item = if rng.chance(2) {
            ItemKind::Platform
        } else {
            ItemKind::Mushroom
        };
        let y = 8.0 + self.peer.raw() as f32 * 2.0;
        (item, rng.range_f32(0.0, goal_x), y)
    }
}

struct Rng {
    state: u64,
}

impl Rng {
    fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    fn next_u32(&mut self) -> u32 {
        self.state = self
            .state
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1);
        (self.state >> 32) as u32
    }

    fn range_i32(&mut self, min: i32, max: i32) -> i32 {
        let span = (max - min).unsigned_abs().max(1) + 1;
        min + (self.next_u32() % span) as i32
    }

    fn range_f32(&mut self, min: f32, max: f32) -> f32 {
        let unit = (self.next_u32() >> 8) as f32 / (1u32 << 24) as f32;
        min + (max - min) * unit
    }

    /// One-in-`n` chance.
    fn chance(&mut self, n: u32) -> bool {
        self.next_u32() % n.max(1) == 0
    }
}

#[derive(Debug, Serialize)]
struct PeerSummary {
    peer: PeerId,
    is_host: bool,
    stats: SyncStats,
    snapshot: SessionSnapshot,
}

#[derive(Debug, Serialize)]
struct Summary {
    peers: usize,
    rounds_cap: i32,
    seed: u64,
    ticks: u64,
    frames: u64,
    frame_bytes_total: u64,
    frames_by_kind: BTreeMap<&'static str, u64>,
    final_phase: Phase,
    rounds_played: i32,
    winner: Option<PeerId>,
    sessions: Vec<PeerSummary>,
}

impl Summary {
    fn new(cli: &Cli) -> Self {
        Self {
            peers: cli.peers,
            rounds_cap: cli.rounds_cap,
            seed: cli.seed,
            ticks: 0,
            frames: 0,
            frame_bytes_total: 0,
            frames_by_kind: BTreeMap::new(),
            final_phase: Phase::ColorSelect,
            rounds_played: 0,
            winner: None,
            sessions: Vec::new(),
        }
    }

    fn push_frame(&mut self, bytes: &[u8], registry: &EventRegistry) {
        self.frames += 1;
        self.frame_bytes_total += bytes.len() as u64;
        if let Ok(event) = decode_event(bytes, registry) {
            *self.frames_by_kind.entry(event.kind().name()).or_default() += 1;
        }
    }

    fn finish(&mut self, sessions: &[Session]) {
        if let Some(host) = sessions.first() {
            let snapshot = host.snapshot();
            self.final_phase = snapshot.phase;
            self.rounds_played = snapshot.round.round();
            self.winner = snapshot.winner;
        }
        self.sessions = sessions
            .iter()
            .map(|session| PeerSummary {
                peer: session.local_id(),
                is_host: session.is_host(),
                stats: session.stats(),
                snapshot: session.snapshot(),
            })
            .collect();
    }
}
