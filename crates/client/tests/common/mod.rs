#![allow(dead_code)]

use std::thread;
use std::time::{Duration, Instant};

use strata::{
    ChannelConfig, ChecksumSimulation, ConnectionChannel, GameData, GameSetup, LoopbackTransport,
    NetMessage,
};
use strata_client::{ClientConfig, ClientEvent, ClientSession, ClientSimLoop};
use strata_server::{GameServer, ServerConfig};

pub const SEED: u32 = 1234;
pub const TICK: Duration = Duration::from_millis(100);

/// Two players on opposing teams and one spectator.
pub fn duel() -> GameSetup {
    let mut setup = GameSetup::new("Testing Ground", "Basic")
        .with_player("alice", 0, false)
        .with_player("bob", 1, false)
        .with_team(0, 0)
        .with_team(1, 1);
    setup.game_start_delay_secs = 0;
    setup.random_seed = SEED;
    setup
}

pub fn solo() -> GameSetup {
    let mut setup = GameSetup::new("Testing Ground", "Basic")
        .with_player("alice", 0, false)
        .with_team(0, 0);
    setup.game_start_delay_secs = 0;
    setup.random_seed = SEED;
    setup
}

pub fn server_config() -> ServerConfig {
    ServerConfig {
        poll_interval: Duration::from_millis(1),
        ..Default::default()
    }
}

/// A client plus the events it reported so far.
pub struct Peer {
    pub sim: ClientSimLoop<ChecksumSimulation>,
    pub events: Vec<ClientEvent>,
}

impl Peer {
    pub fn over(transport: LoopbackTransport, config: ClientConfig) -> Self {
        let session = ClientSession::new(transport, config).unwrap();
        Self {
            sim: ClientSimLoop::reference(session).with_checksum_log(),
            events: Vec::new(),
        }
    }

    pub fn local(server: &mut GameServer, name: &str) -> Self {
        Self::over(server.connect_local(), ClientConfig::new(name))
    }

    pub fn tick(&mut self, now: Instant) -> u32 {
        let steps = self.sim.update(now).unwrap();
        self.events.extend(self.sim.session_mut().drain_events());
        steps
    }

    pub fn chat_lines(&self) -> Vec<&str> {
        self.events
            .iter()
            .filter_map(|e| match e {
                ClientEvent::Chat { text, .. } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn system_messages(&self) -> Vec<&str> {
        self.events
            .iter()
            .filter_map(|e| match e {
                ClientEvent::SystemMessage { text } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }
}

/// The server end of a loopback link, scripted by the test.
pub struct FakeServer {
    pub channel: ConnectionChannel,
    pub inbox: Vec<NetMessage>,
}

impl FakeServer {
    pub fn send(&mut self, message: NetMessage) {
        self.channel.send(&message.encode().unwrap()).unwrap();
    }

    pub fn send_all(&mut self, messages: impl IntoIterator<Item = NetMessage>) {
        for message in messages {
            self.send(message);
        }
        self.flush();
    }

    pub fn flush(&mut self) {
        self.channel.flush(Instant::now()).unwrap();
    }

    pub fn pump(&mut self) {
        while let Some(packet) = self.channel.receive() {
            self.inbox.push(NetMessage::decode(packet.bytes()).unwrap());
        }
    }

    /// Sends what a real server sends before the first frame.
    pub fn start_game(&mut self, setup: &GameSetup, player: u8) {
        let data = GameData::from_setup(setup, SEED).unwrap();
        self.send_all([
            NetMessage::GameData(data),
            NetMessage::SetPlayerNum { player },
            NetMessage::RandSeed { seed: SEED },
            NetMessage::StartPlaying { countdown: 0 },
        ]);
    }

    /// The server's frame message for `frame`.
    pub fn frame(frame: i32) -> NetMessage {
        if frame % 16 == 0 {
            NetMessage::KeyFrame { frame }
        } else {
            NetMessage::NewFrame
        }
    }
}

pub fn scripted(name: &str) -> (FakeServer, Peer) {
    let (client, server) = LoopbackTransport::pair();
    let fake = FakeServer {
        channel: ConnectionChannel::new(server, ChannelConfig::default()),
        inbox: Vec::new(),
    };
    (fake, Peer::over(client, ClientConfig::new(name)))
}

/// Ticks `peer` on a clock advancing by [`TICK`] until `done` holds.
pub fn tick_until(
    peer: &mut Peer,
    now: &mut Instant,
    max_ticks: usize,
    mut done: impl FnMut(&Peer) -> bool,
) -> bool {
    for _ in 0..max_ticks {
        *now += TICK;
        peer.tick(*now);
        if done(peer) {
            return true;
        }
    }
    false
}

/// Ticks the server and every peer in real time until `done` holds or the
/// time runs out.
pub fn run_until(
    server: &mut GameServer,
    peers: &mut [&mut Peer],
    timeout: Duration,
    mut done: impl FnMut(&GameServer, &[&mut Peer]) -> bool,
) -> bool {
    let start = Instant::now();
    while start.elapsed() < timeout {
        server.tick_once();
        for peer in peers.iter_mut() {
            peer.tick(Instant::now());
        }
        if done(server, peers) {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    false
}
