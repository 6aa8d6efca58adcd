#![allow(dead_code)]

use std::thread;
use std::time::{Duration, Instant};

use strata::{
    ChannelConfig, ConnectionChannel, GameSetup, NETWORK_VERSION, NetMessage, RawPacket, Transport,
};
use strata_server::{GameServer, ServerConfig};

pub fn attempt(name: &str, password: &str, reconnect: bool) -> RawPacket {
    NetMessage::AttemptConnect {
        version: NETWORK_VERSION,
        name: name.into(),
        password: password.into(),
        engine_version: env!("CARGO_PKG_VERSION").into(),
        reconnect,
        netloss: 0,
    }
    .encode()
    .unwrap()
}

/// Two players on opposing teams, starting as soon as both are in.
pub fn duel() -> GameSetup {
    let mut setup = GameSetup::new("Testing Ground", "Basic")
        .with_player("alice", 0, false)
        .with_player("bob", 1, false)
        .with_team(0, 0)
        .with_team(1, 1);
    setup.game_start_delay_secs = 0;
    setup.random_seed = 1234;
    setup
}

pub fn solo() -> GameSetup {
    let mut setup = GameSetup::new("Testing Ground", "Basic")
        .with_player("alice", 0, false)
        .with_team(0, 0);
    setup.game_start_delay_secs = 0;
    setup.random_seed = 1234;
    setup
}

pub fn config() -> ServerConfig {
    ServerConfig {
        poll_interval: Duration::from_millis(1),
        ..Default::default()
    }
}

/// A scripted client: records every message and answers frames with
/// `frame ^ sync_salt` when a salt is set.
pub struct TestClient {
    pub name: String,
    pub channel: ConnectionChannel,
    pub player: Option<u8>,
    pub frame: i32,
    pub inbox: Vec<NetMessage>,
    pub sync_salt: Option<u32>,
}

impl TestClient {
    pub fn over(transport: impl Transport + 'static, name: &str, hello: &RawPacket) -> Self {
        let mut channel = ConnectionChannel::new(transport, ChannelConfig::default());
        channel.send_handshake(hello).unwrap();
        Self {
            name: name.to_string(),
            channel,
            player: None,
            frame: 0,
            inbox: Vec::new(),
            sync_salt: Some(0),
        }
    }

    pub fn local(server: &mut GameServer, name: &str) -> Self {
        Self::over(server.connect_local(), name, &attempt(name, "", false))
    }

    pub fn send(&mut self, message: NetMessage) {
        self.channel.send(&message.encode().unwrap()).unwrap();
        self.channel.flush(Instant::now()).unwrap();
    }

    /// Reports having loaded, which makes the player ingame.
    pub fn join(&mut self) {
        let player = self.player.expect("no player number yet");
        let name = self.name.clone();
        self.send(NetMessage::PlayerName { player, name });
    }

    pub fn pump(&mut self) {
        while let Some(packet) = self.channel.receive() {
            let message = NetMessage::decode(&packet).unwrap();
            match &message {
                NetMessage::SetPlayerNum { player } => self.player = Some(*player),
                NetMessage::NewFrame | NetMessage::KeyFrame { .. } => {
                    self.frame += 1;
                    if let (Some(salt), Some(player)) = (self.sync_salt, self.player) {
                        let response = NetMessage::SyncResponse {
                            player,
                            frame: self.frame,
                            checksum: self.frame as u32 ^ salt,
                        };
                        self.channel.send(&response.encode().unwrap()).unwrap();
                    }
                }
                _ => {}
            }
            self.inbox.push(message);
        }
        let _ = self.channel.flush(Instant::now());
    }

    pub fn frames(&self) -> Vec<&NetMessage> {
        self.inbox
            .iter()
            .filter(|m| matches!(m, NetMessage::NewFrame | NetMessage::KeyFrame { .. }))
            .collect()
    }

    pub fn system_messages(&self) -> Vec<&str> {
        self.inbox
            .iter()
            .filter_map(|m| match m {
                NetMessage::SystemMsg { text, .. } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn quit_reason(&self) -> Option<&str> {
        self.inbox.iter().find_map(|m| match m {
            NetMessage::Quit { reason } => Some(reason.as_str()),
            _ => None,
        })
    }
}

/// Ticks the server and pumps every client until `done` holds or the time
/// runs out.
pub fn run_until(
    server: &mut GameServer,
    clients: &mut [&mut TestClient],
    timeout: Duration,
    mut done: impl FnMut(&GameServer, &[&mut TestClient]) -> bool,
) -> bool {
    let start = Instant::now();
    while start.elapsed() < timeout {
        server.tick_once();
        for client in clients.iter_mut() {
            client.pump();
        }
        if done(server, clients) {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    false
}

pub fn run_for(server: &mut GameServer, clients: &mut [&mut TestClient], duration: Duration) {
    run_until(server, clients, duration, |_, _| false);
}
