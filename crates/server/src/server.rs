mod handlers;

use std::collections::{BTreeMap, VecDeque};
use std::fs::File;
use std::io::{self, BufWriter};
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use crossbeam_channel::{Receiver, Sender};

use strata::net::codec::CodecError;
use strata::net::{
    LeaveReason, MessageType, NetworkStats, Origin, PeerId, SimulatedTransport, TeamAction,
    UdpListener, rand_u64,
};
use strata::setup::StartPosType;
use strata::simulation::LocalLag;
use strata::{
    ConnectionChannel, DemoError, DemoHeader, DemoTrailer, DemoWriter, GAME_SPEED, GameData,
    GameSetup, LoopbackTransport, MAX_PLAYERS, NETWORK_VERSION, NetMessage, RawPacket,
    SERVER_PLAYER, ServerPacer, SetupError, Transport,
};

use crate::admin::{AdminCommand, PlayerRef};
use crate::config::ServerConfig;
use crate::events::ServerEvent;
use crate::participant::{AiSlot, MAX_AIS, Participant, ParticipantState, TeamState};
use crate::playback::{DemoPlayback, PlayerNumberMap};
use crate::speed::{SpeedGovernor, SpeedSample};
use crate::sync::{SyncLedger, SyncPeer, SyncWarning};

/// PLAYERINFO ping value meaning "still computing paths".
const PATHING_FLAG: u32 = u32::MAX;

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error(transparent)]
    Setup(#[from] SetupError),
    #[error(transparent)]
    Demo(#[from] DemoError),
    #[error("failed to encode game data: {0}")]
    Codec(#[from] CodecError),
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GamePhase {
    Lobby,
    Countdown,
    Running,
    Over,
}

impl GamePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            GamePhase::Lobby => "Lobby",
            GamePhase::Countdown => "Starting",
            GamePhase::Running => "Running",
            GamePhase::Over => "Game over",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerStats {
    pub local_addr: Option<SocketAddr>,
    pub phase: GamePhase,
    pub frame: i32,
    pub game_time: f32,
    pub mod_game_time: f32,
    pub user_speed: f32,
    pub internal_speed: f32,
    pub paused: bool,
    pub playback: bool,
    pub recording: bool,
    pub players: usize,
    pub linked: usize,
    pub outstanding_sync_frames: usize,
    pub cached_packets: usize,
    pub network: NetworkStats,
}

#[derive(Debug, Clone)]
pub struct ParticipantInfo {
    pub player: u8,
    pub name: String,
    pub state: ParticipantState,
    pub team: u8,
    pub spectator: bool,
    pub is_local: bool,
    pub peer: Option<String>,
    pub cpu_usage: f32,
    pub ping_frames: i32,
    pub rtt_ms: f32,
    pub desynced: bool,
    pub muted_chat: bool,
    pub muted_draw: bool,
}

/// Handle to a server running on its own thread.
pub struct ServerHandle {
    running: Arc<AtomicBool>,
    admin: Sender<AdminCommand>,
    thread: JoinHandle<GameServer>,
}

impl ServerHandle {
    pub fn admin(&self) -> Sender<AdminCommand> {
        self.admin.clone()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst) && !self.thread.is_finished()
    }

    /// Asks the server to shut down and waits for it.
    pub fn stop(self) -> Option<GameServer> {
        self.running.store(false, Ordering::SeqCst);
        self.thread.join().ok()
    }

    pub fn join(self) -> Option<GameServer> {
        self.thread.join().ok()
    }
}

/// How a connection attempt maps onto the roster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    /// Unlinked slot reserved for this name.
    Fresh(u8),
    /// Replaces a link that went quiet.
    TakeOver(u8),
    /// Moves a live link onto the new transport.
    Relink(u8),
    Additional,
}

/// The authoritative frame source. Accepts player links, relays their
/// messages in one total order, paces frames by wall-clock time and records
/// or replays the resulting stream.
pub struct GameServer {
    config: ServerConfig,
    setup: GameSetup,
    setup_script: String,
    game_data: RawPacket,
    random_seed: u32,
    game_id: [u8; 16],

    listener: Option<UdpListener>,
    pending_local: Vec<LoopbackTransport>,
    players: Vec<Participant>,
    teams: Vec<TeamState>,
    ais: BTreeMap<u8, AiSlot>,
    packet_cache: Vec<RawPacket>,

    recorder: Option<DemoWriter<BufWriter<File>>>,
    playback: Option<DemoPlayback>,
    player_map: PlayerNumberMap,
    demo_player_count: usize,
    demo_time: f32,
    demo_over: bool,

    sync: SyncLedger,
    speed: SpeedGovernor,
    pacer: ServerPacer,

    frame: i32,
    started: bool,
    paused: bool,
    pausable: bool,
    cheating: bool,
    no_helper_ais: bool,
    allow_spec_draw: bool,
    ready_time: Option<Instant>,
    winning_ally_teams: Vec<u8>,
    game_over_at: Option<Instant>,

    game_time: f32,
    mod_game_time: f32,
    created_at: Instant,
    last_update: Instant,
    last_player_info: Instant,
    last_frame: Instant,

    running: Arc<AtomicBool>,
    admin_tx: Sender<AdminCommand>,
    admin_rx: Receiver<AdminCommand>,
    pending_events: VecDeque<ServerEvent>,
}

fn new_game_id() -> [u8; 16] {
    let mut id = [0u8; 16];
    id[..8].copy_from_slice(&rand_u64().to_le_bytes());
    id[8..].copy_from_slice(&rand_u64().to_le_bytes());
    id
}

fn unix_time() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs())
}

/// First handshake waiting on a fresh local link.
fn first_handshake(transport: &mut dyn Transport) -> io::Result<Option<RawPacket>> {
    while let Some(datagram) = transport.recv_datagram()? {
        if let Some(packet) = ConnectionChannel::handshake_payload(&datagram) {
            return Ok(Some(packet));
        }
    }
    Ok(None)
}

impl GameServer {
    /// A server for a new game. It accepts local links right away; call
    /// [`listen`](Self::listen) to take remote players too.
    pub fn new(setup: GameSetup, config: ServerConfig) -> Result<Self, ServerError> {
        setup.validate()?;
        let random_seed = match setup.random_seed {
            0 => rand_u64() as u32,
            seed => seed,
        };
        let game_data = GameData::from_setup(&setup, random_seed)?;
        let mut server = Self::build(setup, game_data, new_game_id(), config, None)?;
        if let Some(path) = server.config.record_demo.clone() {
            server.start_recording(&path)?;
        }
        Ok(server)
    }

    /// A server replaying a recorded game to whoever connects.
    pub fn playback(path: impl AsRef<Path>, config: ServerConfig) -> Result<Self, ServerError> {
        Self::from_demo(DemoPlayback::open(path)?, config)
    }

    pub fn from_demo(playback: DemoPlayback, config: ServerConfig) -> Result<Self, ServerError> {
        let header = playback.header().clone();
        let setup = GameSetup::from_json(&header.setup_script)?;
        let game_data = GameData::new(
            header.setup_script,
            header.map_checksum,
            header.mod_checksum,
            header.random_seed,
        )?;
        let mut server = Self::build(setup, game_data, header.game_id, config, Some(playback))?;
        for player in &mut server.players {
            player.is_from_demo = true;
        }
        server.demo_player_count = server.players.len();
        server.rebuild_player_map();
        Ok(server)
    }

    fn build(
        setup: GameSetup,
        game_data: GameData,
        game_id: [u8; 16],
        config: ServerConfig,
        playback: Option<DemoPlayback>,
    ) -> Result<Self, ServerError> {
        let now = Instant::now();
        let (admin_tx, admin_rx) = crossbeam_channel::unbounded();
        let speed = SpeedGovernor::new(
            config.speed_control,
            setup.min_speed,
            setup.max_speed,
            setup.user_speed,
        );

        let mut players: Vec<Participant> =
            setup.players.iter().map(Participant::from_setup).collect();
        let mut teams: Vec<TeamState> = setup.teams.iter().map(TeamState::from_setup).collect();
        let mut ais = BTreeMap::new();
        for (id, ai) in setup.ais.iter().take(MAX_AIS).enumerate() {
            let id = id as u8;
            if let Some(host) = players.get_mut(ai.host_player as usize) {
                host.ais.insert(id);
            }
            if let Some(team) = teams.get_mut(ai.team as usize) {
                team.active = true;
            }
            ais.insert(id, AiSlot::from_setup(ai));
        }

        Ok(Self {
            setup_script: game_data.setup_script().to_string(),
            random_seed: game_data.random_seed,
            game_data: game_data.pack()?,
            game_id,
            listener: None,
            pending_local: Vec::new(),
            players,
            teams,
            ais,
            packet_cache: Vec::new(),
            recorder: None,
            playback,
            player_map: PlayerNumberMap::default(),
            demo_player_count: 0,
            demo_time: 0.0,
            demo_over: false,
            sync: SyncLedger::new(config.sync_check_timeout, config.sync_msg_timeout),
            pacer: ServerPacer::new(speed.internal_speed()),
            speed,
            frame: 0,
            started: false,
            paused: false,
            pausable: true,
            cheating: setup.cheating,
            no_helper_ais: false,
            allow_spec_draw: setup.allow_spec_draw,
            ready_time: None,
            winning_ally_teams: Vec::new(),
            game_over_at: None,
            game_time: 0.0,
            mod_game_time: 0.0,
            created_at: now,
            last_update: now,
            last_player_info: now,
            last_frame: now,
            running: Arc::new(AtomicBool::new(true)),
            admin_tx,
            admin_rx,
            pending_events: VecDeque::new(),
            setup,
            config,
        })
    }

    fn start_recording(&mut self, path: &Path) -> Result<(), ServerError> {
        let header = DemoHeader {
            setup_script: self.setup_script.clone(),
            map_checksum: self.setup.map_checksum,
            mod_checksum: self.setup.mod_checksum,
            random_seed: self.random_seed,
            game_id: self.game_id,
            start_time: unix_time(),
        };
        self.recorder = Some(DemoWriter::create(path, &header)?);
        log::info!("recording demo to {}", path.display());
        Ok(())
    }

    /// Binds the UDP listener remote players connect to.
    pub fn listen<A: ToSocketAddrs + std::fmt::Display>(
        &mut self,
        addr: A,
    ) -> Result<SocketAddr, ServerError> {
        let listener = UdpListener::bind(&addr).map_err(|source| ServerError::Bind {
            addr: addr.to_string(),
            source,
        })?;
        let local = listener.local_addr();
        log::info!("listening on {local}");
        self.listener = Some(listener);
        Ok(local)
    }

    /// Link for a client in this process. The server adopts it once the
    /// client's connection attempt arrives; that client is the local host.
    pub fn connect_local(&mut self) -> LoopbackTransport {
        let (client, server) = LoopbackTransport::pair();
        self.pending_local.push(server);
        client
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.as_ref().map(|l| l.local_addr())
    }

    pub fn running(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    pub fn admin(&self) -> Sender<AdminCommand> {
        self.admin_tx.clone()
    }

    pub fn drain_events(&mut self) -> impl Iterator<Item = ServerEvent> + '_ {
        self.pending_events.drain(..)
    }

    pub fn frame(&self) -> i32 {
        self.frame
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn game_id(&self) -> [u8; 16] {
        self.game_id
    }

    pub fn random_seed(&self) -> u32 {
        self.random_seed
    }

    pub fn participants(&self) -> &[Participant] {
        &self.players
    }

    pub fn teams(&self) -> &[TeamState] {
        &self.teams
    }

    pub fn phase(&self) -> GamePhase {
        if self.game_over_at.is_some() {
            GamePhase::Over
        } else if self.started {
            GamePhase::Running
        } else if self.ready_time.is_some() {
            GamePhase::Countdown
        } else {
            GamePhase::Lobby
        }
    }

    pub fn stats(&self) -> ServerStats {
        let mut network = self
            .listener
            .as_ref()
            .map(|l| l.stats().clone())
            .unwrap_or_default();
        for link in self.players.iter().filter_map(|p| p.link()) {
            let stats = link.stats();
            network.packets_sent += stats.packets_sent;
            network.packets_resent += stats.packets_resent;
            network.bytes_sent += stats.bytes_sent;
        }
        ServerStats {
            local_addr: self.local_addr(),
            phase: self.phase(),
            frame: self.frame,
            game_time: self.game_time,
            mod_game_time: self.mod_game_time,
            user_speed: self.speed.user_speed(),
            internal_speed: self.speed.internal_speed(),
            paused: self.paused,
            playback: self.playback.is_some(),
            recording: self.recorder.is_some(),
            players: self.players.len(),
            linked: self.players.iter().filter(|p| p.is_linked()).count(),
            outstanding_sync_frames: self.sync.outstanding(),
            cached_packets: self.packet_cache.len(),
            network,
        }
    }

    pub fn participant_infos(&self) -> Vec<ParticipantInfo> {
        self.players
            .iter()
            .enumerate()
            .map(|(i, p)| ParticipantInfo {
                player: i as u8,
                name: p.name.clone(),
                state: p.state,
                team: p.team,
                spectator: p.spectator,
                is_local: p.is_local,
                peer: p.peer().map(|peer| peer.to_string()),
                cpu_usage: p.cpu_usage,
                ping_frames: (self.frame - p.last_frame_response).max(0),
                rtt_ms: p.link().map_or(0.0, |l| l.rtt().as_secs_f32() * 1000.0),
                desynced: p.desynced,
                muted_chat: p.muted_chat,
                muted_draw: p.muted_draw,
            })
            .collect()
    }

    pub fn run(&mut self) {
        while self.running.load(Ordering::SeqCst) {
            self.tick_once();
            std::thread::sleep(self.config.poll_interval);
        }
        self.shutdown();
    }

    /// Runs the server on its own thread.
    pub fn spawn(self) -> ServerHandle {
        let running = self.running();
        let admin = self.admin();
        let thread = std::thread::spawn(move || {
            let mut server = self;
            server.run();
            server
        });
        ServerHandle {
            running,
            admin,
            thread,
        }
    }

    pub fn tick_once(&mut self) {
        let now = Instant::now();
        let elapsed = now.saturating_duration_since(self.last_update);
        self.last_update = now;

        while let Ok(command) = self.admin_rx.try_recv() {
            self.execute(command);
        }
        self.accept_connections(now);
        self.read_net(now);
        self.update(elapsed, now);
        self.flush_links(now);
    }

    /// Says goodbye to every link and closes the demo being recorded.
    pub fn shutdown(&mut self) {
        let now = Instant::now();
        let mut peers = Vec::new();
        for player in &mut self.players {
            peers.extend(player.kill("Server shutdown", now));
        }
        for peer in peers {
            self.forget_peer(peer);
        }
        self.finish_recording();
        self.running.store(false, Ordering::SeqCst);
    }

    fn quit(&mut self) {
        self.running.store(false, Ordering::SeqCst);
    }

    fn finish_recording(&mut self) {
        if let Some(mut recorder) = self.recorder.take() {
            let trailer = DemoTrailer {
                final_frame: self.frame,
                game_time: self.mod_game_time,
                winning_ally_teams: self.winning_ally_teams.clone(),
            };
            match recorder.finish(&trailer) {
                Ok(()) => log::info!(
                    "demo closed after {} records",
                    recorder.records_written()
                ),
                Err(e) => log::error!("failed to finish demo: {e}"),
            }
        }
    }

    fn update(&mut self, elapsed: Duration, now: Instant) {
        let dt = elapsed.as_secs_f32();
        self.game_time += dt;
        if self.started && !self.paused && !self.local_lags_behind() {
            self.mod_game_time += dt * self.speed.internal_speed();
        }

        if now.saturating_duration_since(self.last_player_info) >= self.config.player_info_interval
        {
            self.last_player_info = now;
            self.lag_protection();
        }

        if !self.started {
            self.check_for_game_start(now, false);
        } else if self.frame > 0 || self.playback.is_some() {
            self.create_new_frames(now, false);
        }

        let linked = self.players.iter().any(|p| p.is_linked());
        let pregame_over =
            now.saturating_duration_since(self.created_at) > self.config.pregame_timeout;
        if !linked && (self.started || pregame_over) {
            self.message("No clients connected, shutting down");
            self.quit();
        }
        if let Some(over) = self.game_over_at
            && now.saturating_duration_since(over) > self.config.game_over_linger
        {
            self.message("Game over, shutting down");
            self.quit();
        }
    }

    /// During playback the local viewer may hold the demo back.
    fn local_lags_behind(&self) -> bool {
        self.playback.is_some()
            && self
                .local_player()
                .is_some_and(|p| self.frame - p.last_frame_response >= GAME_SPEED)
    }

    fn local_player(&self) -> Option<&Participant> {
        self.players.iter().find(|p| p.is_local && p.is_linked())
    }

    fn flush_links(&mut self, now: Instant) {
        for player in &mut self.players {
            if let Some(link) = player.link_mut()
                && let Err(e) = link.flush(now)
            {
                log::debug!("flush to {} failed: {e}", player.name);
            }
        }
    }

    fn forget_peer(&mut self, peer: PeerId) {
        if let (PeerId::Udp { remote, .. }, Some(listener)) = (peer, self.listener.as_mut()) {
            listener.forget(&remote);
        }
    }

    // --- outbound ---

    /// Sends to every link. Everything broadcast before the start is cached
    /// for late joiners, and recorded when a demo is being written.
    fn broadcast(&mut self, packet: RawPacket) {
        for player in &mut self.players {
            player.send(&packet);
        }
        if self.config.allow_reconnect || self.setup.allow_additional_players || !self.started {
            self.packet_cache.push(packet.clone());
        }
        let mut failed = false;
        if let Some(recorder) = self.recorder.as_mut()
            && let Err(e) = recorder.record(self.mod_game_time, &packet)
        {
            log::error!("demo recording failed, stopping: {e}");
            failed = true;
        }
        if failed {
            self.recorder = None;
        }
    }

    fn broadcast_message(&mut self, message: &NetMessage) {
        match message.encode() {
            Ok(packet) => self.broadcast(packet),
            Err(e) => log::error!("failed to encode {:?}: {e}", message.kind()),
        }
    }

    fn send_to(&mut self, player: u8, message: &NetMessage) {
        let Some(participant) = self.players.get_mut(player as usize) else {
            return;
        };
        match message.encode() {
            Ok(packet) => participant.send(&packet),
            Err(e) => log::error!("failed to encode {:?}: {e}", message.kind()),
        }
    }

    /// Bypasses the cache and the demo.
    fn send_to_all(&mut self, message: &NetMessage) {
        match message.encode() {
            Ok(packet) => {
                for player in &mut self.players {
                    player.send(&packet);
                }
            }
            Err(e) => log::error!("failed to encode {:?}: {e}", message.kind()),
        }
    }

    fn message(&mut self, text: impl Into<String>) {
        let text = text.into();
        log::info!("{text}");
        self.pending_events
            .push_back(ServerEvent::Message { text: text.clone() });
        self.broadcast_message(&NetMessage::SystemMsg {
            player: SERVER_PLAYER,
            text,
        });
    }

    fn private_message(&mut self, player: u8, text: impl Into<String>) {
        let text = text.into();
        log::info!("to player {player}: {text}");
        self.send_to(
            player,
            &NetMessage::SystemMsg {
                player: SERVER_PLAYER,
                text,
            },
        );
    }

    fn describe(&self, player: u8) -> String {
        match self.players.get(player as usize) {
            Some(p) => format!("{} {}", p.player_type(), p.name),
            None => format!("Player {player}"),
        }
    }

    fn name_of(&self, player: u8) -> String {
        self.players
            .get(player as usize)
            .map_or_else(|| format!("#{player}"), |p| p.name.clone())
    }

    // --- connections ---

    fn accept_connections(&mut self, now: Instant) {
        for mut transport in std::mem::take(&mut self.pending_local) {
            match first_handshake(&mut transport) {
                Ok(Some(packet)) => self.handle_attempt(Box::new(transport), packet, true, now),
                Ok(None) => self.pending_local.push(transport),
                Err(e) => log::warn!("dropping local link: {e}"),
            }
        }

        let Some(listener) = self.listener.as_mut() else {
            return;
        };
        if let Err(e) = listener.poll() {
            self.pending_events.push_back(ServerEvent::Error {
                message: format!("Network error: {e}"),
            });
        }
        let pending: Vec<_> = std::iter::from_fn(|| listener.next_pending()).collect();
        for attempt in pending {
            let Some(packet) = ConnectionChannel::handshake_payload(&attempt.datagram) else {
                log::debug!("ignoring stray datagram from {}", attempt.addr);
                continue;
            };
            let Some(listener) = self.listener.as_mut() else {
                return;
            };
            let udp = listener.accept(attempt.addr);
            let transport: Box<dyn Transport> = match &self.config.packet_loss {
                Some(loss) if loss.enabled => {
                    Box::new(SimulatedTransport::new(udp, loss.clone(), rand_u64()))
                }
                _ => Box::new(udp),
            };
            self.handle_attempt(transport, packet, false, now);
        }
    }

    fn handle_attempt(
        &mut self,
        transport: Box<dyn Transport>,
        packet: RawPacket,
        is_local: bool,
        now: Instant,
    ) {
        let peer = transport.peer();
        let attempt = match NetMessage::decode(&packet) {
            Ok(NetMessage::AttemptConnect {
                version,
                name,
                password,
                reconnect,
                netloss,
                ..
            }) => (version, name, password, reconnect, netloss),
            Ok(other) => {
                let reason = format!("expected a connection attempt, got {:?}", other.kind());
                self.reject(transport, reason, now);
                return;
            }
            Err(e) => {
                self.reject(transport, format!("invalid connection attempt: {e}"), now);
                return;
            }
        };
        let (version, name, password, reconnect, netloss) = attempt;
        log::info!("connection attempt from {peer}: {name} (reconnect: {reconnect}, netloss: {netloss})");
        self.pending_events.push_back(ServerEvent::ConnectionAttempt {
            name: name.clone(),
            peer: peer.to_string(),
            reconnect,
        });

        if version != NETWORK_VERSION {
            let reason = format!("Wrong network version: {version}, server is {NETWORK_VERSION}");
            self.reject(transport, reason, now);
            return;
        }

        match self.resolve_slot(&name, &password, is_local, reconnect, peer, now) {
            Ok(slot) => self.bind_connection(transport, slot, &name, &password, is_local, now),
            Err(reason) => self.reject(transport, reason, now),
        }
    }

    fn reject(&mut self, transport: Box<dyn Transport>, reason: String, now: Instant) {
        let peer = transport.peer();
        log::warn!("rejected connection from {peer}: {reason}");
        let mut channel = ConnectionChannel::from_boxed(transport, self.config.channel.clone());
        match (NetMessage::Quit {
            reason: format!("Connection rejected: {reason}"),
        })
        .encode()
        {
            Ok(quit) => {
                let _ = channel.send(&quit);
                let _ = channel.flush(now);
            }
            Err(e) => log::error!("failed to encode rejection: {e}"),
        }
        channel.close();
        self.forget_peer(peer);
        self.pending_events.push_back(ServerEvent::ConnectionDenied {
            peer: peer.to_string(),
            reason,
        });
    }

    fn resolve_slot(
        &self,
        name: &str,
        password: &str,
        is_local: bool,
        reconnect: bool,
        peer: PeerId,
        now: Instant,
    ) -> Result<Slot, String> {
        let Some(index) = self.players.iter().position(|p| p.name == name) else {
            if self.playback.is_none() && !self.setup.allow_additional_players {
                return Err("User name not authorized to connect".into());
            }
            if self.players.len() >= MAX_PLAYERS {
                return Err("Server is full".into());
            }
            return Ok(Slot::Additional);
        };
        let player = &self.players[index];
        let number = index as u8;
        if player.is_from_demo {
            return Err("User name duplicated in the demo".into());
        }

        let slot = match player.link() {
            None if reconnect => return Err("User is not ingame".into()),
            None if self.config.allow_reconnect || !self.started => Slot::Fresh(number),
            None => return Err("Game has already started".into()),
            Some(link) => {
                let allowed = self.config.allow_reconnect
                    && now.saturating_duration_since(link.last_receive())
                        > self.config.reconnect_window;
                if !reconnect && allowed {
                    Slot::TakeOver(number)
                } else if reconnect && allowed && link.peer() != peer {
                    Slot::Relink(number)
                } else {
                    return Err("User is already ingame".into());
                }
            }
        };

        if !is_local && !player.password.is_empty() && player.password != password {
            return Err("Incorrect password".into());
        }
        Ok(slot)
    }

    fn bind_connection(
        &mut self,
        transport: Box<dyn Transport>,
        slot: Slot,
        name: &str,
        password: &str,
        is_local: bool,
        now: Instant,
    ) {
        let peer = transport.peer();
        let player = match slot {
            Slot::Additional => self.add_additional_user(name, password, true, 0, false),
            Slot::TakeOver(n) => {
                self.message(format!(
                    "{} left the game: terminating existing connection",
                    self.describe(n)
                ));
                self.broadcast_message(&NetMessage::PlayerLeft {
                    player: n,
                    reason: LeaveReason::Timeout,
                });
                if let Some(mut old) = self.players[n as usize].detach() {
                    old.close();
                    self.forget_peer(old.peer());
                }
                n
            }
            Slot::Fresh(n) | Slot::Relink(n) => n,
        };
        let index = player as usize;
        self.players[index].is_reconnecting = self.started;

        if let Slot::Relink(n) = slot {
            let mut replaced = None;
            if let Some(link) = self.players[index].link_mut() {
                let old = link.peer();
                if link.rebind(transport) {
                    replaced = Some(old);
                }
            }
            if let Some(old) = replaced {
                self.forget_peer(old);
            }
            log::info!("{} reconnected from {peer}", self.describe(n));
            self.pending_events.push_back(ServerEvent::PlayerConnected {
                player,
                name: name.to_string(),
                reconnect: true,
            });
            return;
        }

        let mut channel = ConnectionChannel::from_boxed(transport, self.config.channel.clone());
        channel.set_in_game(self.started);
        let game_data = self.game_data.clone();
        let participant = &mut self.players[index];
        participant.attach(channel, is_local, now);
        participant.send(&game_data);
        let announce = [
            Some(NetMessage::SetPlayerNum { player }),
            participant.is_midgame_join.then(|| NetMessage::CreateNewPlayer {
                player,
                spectator: participant.spectator,
                team: participant.team,
                name: participant.name.clone(),
            }),
        ];
        for message in announce.iter().flatten() {
            match message.encode() {
                Ok(packet) => participant.send(&packet),
                Err(e) => log::error!("failed to encode {:?}: {e}", message.kind()),
            }
        }
        for packet in &self.packet_cache {
            participant.send(packet);
        }

        let spectator = participant.spectator;
        let team = participant.team;
        if self.playback.is_none() && !spectator {
            if self.setup.start_pos_type != StartPosType::ChooseInGame {
                self.players[index].ready_to_start = true;
            }
            if let Some(state) = self.teams.get_mut(team as usize) {
                state.active = true;
                if state.leader.is_none() {
                    state.leader = Some(player);
                }
            }
            self.broadcast_message(&NetMessage::Team {
                player,
                action: TeamAction::JoinTeam { team },
            });
        }

        log::info!(
            "{} connected from {peer} as player {player}{}",
            self.describe(player),
            if is_local { " (local)" } else { "" }
        );
        self.pending_events.push_back(ServerEvent::PlayerConnected {
            player,
            name: name.to_string(),
            reconnect: self.started,
        });
    }

    fn add_additional_user(
        &mut self,
        name: &str,
        password: &str,
        spectator: bool,
        team: u8,
        from_demo: bool,
    ) -> u8 {
        let player = self.players.len() as u8;
        let mut participant = Participant::new(name, password, team, spectator);
        participant.is_midgame_join = true;
        participant.is_from_demo = from_demo;
        self.players.push(participant);
        if self.playback.is_some() {
            self.rebuild_player_map();
        }
        if !from_demo {
            self.broadcast_message(&NetMessage::CreateNewPlayer {
                player,
                spectator,
                team,
                name: name.to_string(),
            });
        }
        player
    }

    fn rebuild_player_map(&mut self) {
        let from_demo: Vec<bool> = self.players.iter().map(|p| p.is_from_demo).collect();
        self.player_map.rebuild(&from_demo);
    }

    fn read_net(&mut self, now: Instant) {
        for index in 0..self.players.len() {
            let player = index as u8;
            let Some(link) = self.players[index].link_mut() else {
                continue;
            };
            if link.check_timeout(now) {
                self.message(format!("{} left the game: timeout", self.describe(player)));
                self.drop_player(player, LeaveReason::Timeout, "User timeout", now);
                continue;
            }
            let packets: Vec<RawPacket> = std::iter::from_fn(|| link.receive()).collect();
            for packet in packets {
                if !self.players[index].is_linked() {
                    break;
                }
                if self.screen_packet(player, &packet) {
                    self.process_packet(player, packet, now);
                }
            }
        }
    }

    /// Drops messages a client may not send, or that claim to come from
    /// someone else.
    fn screen_packet(&mut self, player: u8, packet: &RawPacket) -> bool {
        let Some(kind) = packet.message_type() else {
            log::warn!(
                "{} sent unknown message type {:?}",
                self.name_of(player),
                packet.type_code()
            );
            return false;
        };
        if kind.origin() == Origin::Server {
            log::warn!("{} sent server-only message {kind:?}", self.name_of(player));
            return false;
        }
        if let Some(offset) = kind.player_offset() {
            let claimed = packet.get(offset).copied();
            if claimed != Some(player) {
                let claimed = claimed.map_or_else(|| "nobody".to_string(), |c| c.to_string());
                self.message(format!(
                    "Invalid {kind:?} message from player {player} claiming to be player {claimed}"
                ));
                return false;
            }
        }
        if matches!(
            kind,
            MessageType::AiCommand
                | MessageType::AiCommands
                | MessageType::AiShare
                | MessageType::AiCommandTracked
        ) {
            let ai = packet.get(4).copied();
            let hosted = ai.is_some_and(|ai| self.players[player as usize].ais.contains(&ai));
            if !hosted {
                self.message(format!(
                    "Player {} sent a command for an invalid AI ID {}",
                    self.name_of(player),
                    ai.map_or(-1, i32::from)
                ));
                return false;
            }
        }
        true
    }

    /// Broadcasts the departure and hands the player's teams to someone else.
    fn drop_player(&mut self, player: u8, reason: LeaveReason, quit_reason: &str, now: Instant) {
        self.broadcast_message(&NetMessage::PlayerLeft { player, reason });
        if let Some(peer) = self.players[player as usize].kill(quit_reason, now) {
            self.forget_peer(peer);
        }
        self.reassign_team_leaders(player);
        self.pending_events
            .push_back(ServerEvent::PlayerLeft { player, reason });
    }

    fn reassign_team_leaders(&mut self, leaving: u8) {
        for team in 0..self.teams.len() {
            if self.teams[team].leader != Some(leaving) {
                continue;
            }
            let candidates: Vec<(usize, bool)> = self
                .players
                .iter()
                .enumerate()
                .filter(|(i, p)| *i != leaving as usize && !p.spectator && p.team as usize == team)
                .map(|(i, p)| (i, p.is_linked()))
                .collect();
            let human = candidates
                .iter()
                .find(|(_, linked)| *linked)
                .or(candidates.first())
                .map(|(i, _)| *i as u8);
            let ai_host = self
                .ais
                .values()
                .find(|ai| ai.team as usize == team)
                .map(|ai| ai.host_player);

            let state = &mut self.teams[team];
            match human.or(ai_host) {
                Some(leader) => state.leader = Some(leader),
                None => {
                    state.leader = None;
                    state.active = false;
                }
            }
        }
    }

    // --- game flow ---

    fn check_for_game_start(&mut self, now: Instant, forced: bool) {
        let waited = now.saturating_duration_since(self.created_at);
        let mut all_ready = true;
        let mut anyone = false;
        for player in &self.players[self.demo_player_count..] {
            if player.state == ParticipantState::Unconnected && waited > self.config.autostart_after
            {
                continue;
            }
            if player.state < ParticipantState::InGame {
                all_ready = false;
                break;
            }
            anyone |= player.state == ParticipantState::InGame;
            let team_active = self
                .teams
                .get(player.team as usize)
                .is_some_and(|t| t.active);
            if self.playback.is_none() && !player.spectator && team_active && !player.ready_to_start
            {
                all_ready = false;
                break;
            }
        }

        if ((all_ready && anyone) || forced) && self.ready_time.is_none() {
            self.ready_time = Some(now);
            let delay_ms = self.setup.game_start_delay_secs.saturating_mul(1000).max(1);
            log::info!("all players ready, starting in {delay_ms} ms");
            self.broadcast_message(&NetMessage::StartPlaying {
                countdown: delay_ms,
            });
        }
        let delay = Duration::from_secs(self.setup.game_start_delay_secs as u64);
        if let Some(ready) = self.ready_time
            && now.saturating_duration_since(ready) >= delay
        {
            self.start_game(now);
        }
    }

    fn start_game(&mut self, now: Instant) {
        self.started = true;
        if !self.config.allow_reconnect && !self.setup.allow_additional_players {
            self.packet_cache.clear();
        }
        for player in &mut self.players {
            if let Some(link) = player.link_mut() {
                link.set_in_game(true);
            }
        }
        self.user_speed_change(self.speed.user_speed(), SERVER_PLAYER);
        self.pending_events.push_back(ServerEvent::GameStarted);
        self.last_frame = now;

        if let Some(playback) = &self.playback {
            let header = playback.header();
            let (id, seed) = (header.game_id, header.random_seed);
            self.message("Starting demo playback");
            self.broadcast_message(&NetMessage::GameId { id });
            self.broadcast_message(&NetMessage::RandSeed { seed });
            return;
        }

        let mut covered = vec![false; self.teams.len()];
        let starts: Vec<NetMessage> = self
            .players
            .iter()
            .enumerate()
            .filter(|(_, p)| !p.spectator)
            .filter_map(|(i, p)| {
                let team = self.teams.get(p.team as usize)?;
                covered[p.team as usize] = true;
                Some(NetMessage::StartPos {
                    player: i as u8,
                    team: p.team,
                    ready: u8::from(p.ready_to_start),
                    pos: team.start_pos,
                })
            })
            .collect();
        for message in &starts {
            self.broadcast_message(message);
        }
        for (team, done) in covered.iter().enumerate() {
            if !done {
                let pos = self.teams[team].start_pos;
                self.broadcast_message(&NetMessage::StartPos {
                    player: SERVER_PLAYER,
                    team: team as u8,
                    ready: 1,
                    pos,
                });
            }
        }

        self.broadcast_message(&NetMessage::GameId { id: self.game_id });
        self.broadcast_message(&NetMessage::RandSeed {
            seed: self.random_seed,
        });
        self.broadcast_message(&NetMessage::StartPlaying { countdown: 0 });
        log::info!("game started");
        self.create_new_frames(now, true);
    }

    /// Emits the frames due since the last call. `forced` emits exactly one.
    fn create_new_frames(&mut self, now: Instant, forced: bool) {
        self.check_sync();
        if self.playback.is_some() {
            self.send_demo_data(None);
            return;
        }

        let frames = if forced {
            1
        } else {
            let elapsed = now.saturating_duration_since(self.last_frame);
            let local_lag = self.local_player().map(|p| LocalLag {
                frames_behind: (self.frame - p.last_frame_response).max(0) as u32,
                sim_fps: GAME_SPEED as f32 * self.speed.internal_speed(),
            });
            self.pacer.update(elapsed, local_lag)
        };
        self.last_frame = now;

        let keyframes = self.config.keyframe_interval.max(1);
        let progress = self.config.game_progress_interval.max(1);
        for _ in 0..frames {
            self.frame += 1;
            let frame = self.frame;
            if frame % keyframes == 0 {
                self.broadcast_message(&NetMessage::KeyFrame { frame });
            } else {
                self.broadcast_message(&NetMessage::NewFrame);
            }
            if frame % progress == 0 {
                self.send_to_all(&NetMessage::GameFrameProgress { frame });
            }
            self.sync.push_frame(frame);
        }
    }

    fn check_sync(&mut self) {
        let grouped_all = self.playback.is_some();
        let peers: Vec<SyncPeer> = self
            .players
            .iter()
            .enumerate()
            .filter(|(_, p)| p.is_linked())
            .map(|(i, p)| SyncPeer {
                player: i as u8,
                is_local: p.is_local,
                grouped: grouped_all || !p.spectator,
                is_from_demo: p.is_from_demo,
                last_frame_response: p.last_frame_response,
            })
            .collect();
        let report = self.sync.check(self.frame, &peers);

        for player in &report.desynced {
            self.players[*player as usize].desynced = true;
        }
        for player in &report.in_sync {
            self.players[*player as usize].desynced = false;
        }
        for warning in report.warnings {
            match warning {
                SyncWarning::NoResponse { frame, players } => {
                    let names = self.names(&players);
                    self.message(format!("No sync response from {names} in frame {frame}"));
                }
                SyncWarning::Desync {
                    frame,
                    correct,
                    groups,
                } => {
                    let mut everyone = Vec::new();
                    for (checksum, players) in groups {
                        let names = self.names(&players);
                        self.message(format!(
                            "Sync error for {names} in frame {frame} (got {checksum:x}, correct is {correct:x})"
                        ));
                        everyone.extend(players);
                    }
                    self.pending_events.push_back(ServerEvent::Desync {
                        frame,
                        players: everyone,
                    });
                }
                SyncWarning::SpectatorDesync {
                    frame,
                    player,
                    checksum,
                    correct,
                } => {
                    let name = self.name_of(player);
                    self.private_message(
                        player,
                        format!(
                            "Sync error for {name} in frame {frame} (got {checksum:x}, correct is {correct:x})"
                        ),
                    );
                }
            }
        }
    }

    fn names(&self, players: &[u8]) -> String {
        players
            .iter()
            .map(|p| self.name_of(*p))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn lag_protection(&mut self) {
        if !self.started {
            let infos: Vec<NetMessage> = self
                .players
                .iter()
                .enumerate()
                .filter(|(_, p)| !p.is_from_demo && p.is_linked())
                .map(|(i, p)| {
                    let player = i as u8;
                    if p.state == ParticipantState::Connected && p.cpu_usage > 0.0 {
                        NetMessage::PlayerInfo {
                            player,
                            cpu_usage: p.cpu_usage,
                            ping: PATHING_FLAG,
                        }
                    } else {
                        NetMessage::PlayerInfo {
                            player,
                            cpu_usage: 0.0,
                            ping: 0,
                        }
                    }
                })
                .collect();
            for info in &infos {
                self.broadcast_message(info);
            }
            return;
        }

        let playback = self.playback.is_some();
        let frame = self.frame;
        let mut samples = Vec::new();
        let mut infos = Vec::new();
        for (i, p) in self.players.iter_mut().enumerate() {
            if p.state != ParticipantState::InGame {
                continue;
            }
            let ping = (frame - p.last_frame_response).max(0);
            infos.push(NetMessage::PlayerInfo {
                player: i as u8,
                cpu_usage: p.cpu_usage,
                ping: ping as u32,
            });
            if p.is_reconnecting && ping < 2 * GAME_SPEED {
                p.is_reconnecting = false;
            }
            let counts = p.is_local || if playback { !p.is_from_demo } else { !p.spectator };
            if counts {
                samples.push(SpeedSample {
                    player: i as u8,
                    cpu: p.cpu_usage.clamp(0.0, 1.0),
                    ping,
                    is_local: p.is_local,
                    reconnecting: p.is_reconnecting,
                });
            }
        }
        for info in &infos {
            self.broadcast_message(info);
        }
        if let Some(speed) = self.speed.lag_protection(&samples, self.paused) {
            self.internal_speed_change(speed);
        }
    }

    fn internal_speed_change(&mut self, speed: f32) {
        log::debug!("internal speed {:.2} -> {speed:.2}", self.pacer.internal_speed());
        self.broadcast_message(&NetMessage::InternalSpeed { speed });
        self.speed.set_internal_speed(speed);
        self.pacer.set_internal_speed(speed);
    }

    fn user_speed_change(&mut self, speed: f32, player: u8) {
        if player != SERVER_PLAYER
            && !self.paused
            && let Some(p) = self.players.get(player as usize)
            && !p.is_local
            && self.speed.vote_rejected(
                p.cpu_usage,
                self.frame - p.last_frame_response,
                p.spectator,
            )
        {
            self.private_message(player, "Speed change rejected (cpu load or ping is too high)");
            return;
        }
        if let Some(change) = self.speed.request_user_speed(speed) {
            if let Some(internal) = change.internal_speed {
                self.internal_speed_change(internal);
            }
            self.broadcast_message(&NetMessage::UserSpeed {
                player,
                speed: change.user_speed,
            });
        }
    }

    fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
        self.pacer.set_paused(paused);
    }

    fn game_over(&mut self, winning_ally_teams: Vec<u8>) {
        if self.game_over_at.is_none() {
            self.game_over_at = Some(Instant::now());
        }
        self.winning_ally_teams = winning_ally_teams.clone();
        self.pending_events
            .push_back(ServerEvent::GameOver { winning_ally_teams });
    }

    // --- demo playback ---

    /// Replays records up to the game clock, or up to frame `target` while
    /// skipping.
    fn send_demo_data(&mut self, target: Option<i32>) {
        loop {
            if target.is_some_and(|t| self.frame >= t) {
                break;
            }
            let Some(playback) = self.playback.as_mut() else {
                return;
            };
            let record = match target {
                Some(_) => playback.next_any(),
                None => playback.next_due(self.mod_game_time),
            };
            match record {
                Ok(Some(record)) => {
                    self.demo_time = record.game_time;
                    for part in record.messages() {
                        match part {
                            Ok(message) => {
                                self.replay(RawPacket::from_slice(message), target.is_some())
                            }
                            Err(e) => log::warn!("skipping unframeable demo bytes: {e}"),
                        }
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    self.pending_events.push_back(ServerEvent::Error {
                        message: format!("Demo playback failed: {e}"),
                    });
                    self.end_of_demo();
                    return;
                }
            }
        }
        if target.is_some() {
            self.mod_game_time = self.mod_game_time.max(self.demo_time);
        }
        if self.playback.as_ref().is_some_and(|p| p.is_finished()) {
            self.end_of_demo();
        }
    }

    fn end_of_demo(&mut self) {
        if self.demo_over {
            return;
        }
        self.demo_over = true;
        self.message("End of demo");
        self.game_over(Vec::new());
    }

    fn replay(&mut self, packet: RawPacket, skipping: bool) {
        let Some(kind) = packet.message_type() else {
            log::warn!("skipping unknown demo record {:?}", packet.type_code());
            return;
        };
        match kind {
            MessageType::NewFrame | MessageType::KeyFrame => {
                self.frame += 1;
                if !skipping {
                    self.sync.push_frame(self.frame);
                }
                self.check_sync();
                self.broadcast(packet);
            }
            MessageType::GameData
            | MessageType::SetPlayerNum
            | MessageType::UserSpeed
            | MessageType::InternalSpeed
            | MessageType::GameId
            | MessageType::RandSeed => {}
            MessageType::CreateNewPlayer => {
                let adjusted = packet.with_byte(3, self.players.len() as u8);
                match NetMessage::decode(&adjusted) {
                    Ok(NetMessage::CreateNewPlayer {
                        spectator,
                        team,
                        name,
                        ..
                    }) => {
                        self.add_additional_user(&name, "", spectator, team, true);
                        self.broadcast(adjusted);
                    }
                    Ok(_) => {}
                    Err(e) => log::warn!("skipping malformed recorded player: {e}"),
                }
            }
            MessageType::CCommand => {
                if let Ok(NetMessage::CCommand { command, extra }) = NetMessage::decode(&packet)
                    && command == "cheat"
                {
                    self.cheating = match extra.trim().parse::<i32>() {
                        Ok(v) => v != 0,
                        Err(_) => !self.cheating,
                    };
                }
                self.broadcast(packet);
            }
            _ => match self.player_map.remap(&packet, self.players.len()) {
                Ok(packet) => self.broadcast(packet),
                Err(e) => log::warn!("Discarding packet with invalid player number: {e}"),
            },
        }
    }

    fn skip_to(&mut self, target: i32) {
        if target <= self.frame {
            self.message(format!(
                "Cannot skip backwards to frame {target}, now at {}",
                self.frame
            ));
            return;
        }
        let was_paused = self.paused;
        self.broadcast_message(&NetMessage::CCommand {
            command: "skip".into(),
            extra: format!("start {target}"),
        });
        self.set_paused(false);
        self.send_demo_data(Some(target));
        self.broadcast_message(&NetMessage::CCommand {
            command: "skip".into(),
            extra: "end".into(),
        });
        self.set_paused(was_paused);
    }

    // --- admin ---

    fn matching(&self, target: &PlayerRef) -> Vec<u8> {
        self.players
            .iter()
            .enumerate()
            .filter(|(i, p)| target.matches(*i, &p.name))
            .map(|(i, _)| i as u8)
            .collect()
    }

    /// Runs a server action on behalf of the host or the console.
    pub fn execute(&mut self, command: AdminCommand) {
        let now = Instant::now();
        match command {
            AdminCommand::Kick(target) => {
                let by_name = matches!(target, PlayerRef::Name(_));
                for player in self.matching(&target) {
                    if by_name && self.players[player as usize].is_local {
                        continue;
                    }
                    self.kick_player(player, now);
                }
            }
            AdminCommand::Mute { player, chat, draw } => {
                if let Some(&first) = self.matching(&player).first() {
                    self.mute_player(first, chat, draw);
                }
            }
            AdminCommand::Spectate(target) => {
                for player in self.matching(&target) {
                    self.spec_player(player);
                }
            }
            AdminCommand::SetPausable(value) => {
                self.pausable = value.unwrap_or(!self.pausable);
            }
            AdminCommand::NoHelperAis(value) => {
                self.no_helper_ais = value.unwrap_or(!self.no_helper_ais);
                self.broadcast_message(&NetMessage::CCommand {
                    command: "nohelp".into(),
                    extra: u8::from(self.no_helper_ais).to_string(),
                });
            }
            AdminCommand::AllowSpecDraw(value) => {
                self.allow_spec_draw = value.unwrap_or(!self.allow_spec_draw);
                self.broadcast_message(&NetMessage::CCommand {
                    command: "nospecdraw".into(),
                    extra: u8::from(!self.allow_spec_draw).to_string(),
                });
            }
            AdminCommand::Cheat(value) => {
                self.cheating = value.unwrap_or(!self.cheating);
                self.broadcast_message(&NetMessage::CCommand {
                    command: "cheat".into(),
                    extra: u8::from(self.cheating).to_string(),
                });
            }
            AdminCommand::SetMinSpeed(speed) => {
                self.speed.set_min_speed(speed);
                self.user_speed_change(self.speed.user_speed(), SERVER_PLAYER);
            }
            AdminCommand::SetMaxSpeed(speed) => {
                if speed.max(self.speed.min_speed()) > 0.2 {
                    self.speed.set_max_speed(speed);
                    self.user_speed_change(self.speed.user_speed(), SERVER_PLAYER);
                }
            }
            AdminCommand::SetUserSpeed(speed) => self.user_speed_change(speed, SERVER_PLAYER),
            AdminCommand::ForceStart => {
                if !self.started {
                    self.check_for_game_start(now, true);
                }
            }
            AdminCommand::Skip(target) => {
                if self.playback.is_some() {
                    self.skip_to(target.frame(self.frame));
                } else {
                    self.message("Skipping only works during demo playback");
                }
            }
            AdminCommand::SingleStep => {
                if self.paused && self.started {
                    if self.playback.is_some() {
                        self.send_demo_data(Some(self.frame + 1));
                    } else {
                        self.create_new_frames(now, true);
                    }
                }
            }
            AdminCommand::AddUser {
                name,
                password,
                spectator,
                team,
            } => match self.players.iter().position(|p| p.name == name) {
                Some(existing) => {
                    self.players[existing].password = password;
                    log::info!("changed password of {name}");
                }
                None if self.players.len() < MAX_PLAYERS => {
                    self.add_additional_user(&name, &password, spectator, team, false);
                    log::info!("added {name} to team {team}");
                }
                None => log::warn!("cannot add {name}: server is full"),
            },
            AdminCommand::Pause(paused) => {
                if paused != self.paused {
                    self.set_paused(paused);
                    if !paused {
                        self.sync.reset_error_frame();
                    }
                    self.broadcast_message(&NetMessage::Pause {
                        player: SERVER_PLAYER,
                        paused,
                    });
                }
            }
            AdminCommand::Message(text) => self.message(text),
            AdminCommand::Relay {
                command,
                extra,
                needs_cheats,
            } => {
                if needs_cheats && !self.cheating {
                    self.message(format!("Cheating must be enabled to use {command}"));
                } else {
                    self.broadcast_message(&NetMessage::CCommand { command, extra });
                }
            }
            AdminCommand::Quit => {
                self.message("Server shutting down");
                self.quit();
            }
        }
    }

    fn kick_player(&mut self, player: u8, now: Instant) {
        let linked = self
            .players
            .get(player as usize)
            .is_some_and(|p| p.is_linked());
        if !linked {
            self.message(format!(
                "Attempt to kick user {player} who is not connected"
            ));
            return;
        }
        self.message(format!("Kicking {}", self.describe(player)));
        self.drop_player(player, LeaveReason::Kicked, "Kicked from the battle", now);
    }

    fn mute_player(&mut self, player: u8, chat: bool, draw: bool) {
        let Some(p) = self.players.get_mut(player as usize) else {
            return;
        };
        p.muted_chat = chat;
        p.muted_draw = draw;
        let name = p.name.clone();
        self.message(format!(
            "{name} chat {} and drawing {}",
            if chat { "muted" } else { "unmuted" },
            if draw { "muted" } else { "unmuted" }
        ));
    }

    fn spec_player(&mut self, player: u8) {
        let Some(p) = self.players.get(player as usize) else {
            return;
        };
        if !p.is_linked() {
            self.message(format!(
                "Attempt to spec user {player} who is not connected"
            ));
        } else if p.spectator {
            self.message(format!(
                "Attempt to spec user {player} who is spectating already"
            ));
        } else {
            self.message(format!("{} forced spec", self.describe(player)));
            self.resign_player(player);
        }
    }

    fn resign_player(&mut self, player: u8) {
        self.broadcast_message(&NetMessage::Team {
            player,
            action: TeamAction::Resign,
        });
        self.players[player as usize].spectator = true;
        self.reassign_team_leaders(player);
    }
}
