use std::collections::VecDeque;
use std::io;
use std::net::ToSocketAddrs;
use std::time::Instant;

use strata::net::codec::CodecError;
use strata::net::{ChatDestination, ChatMessage, NetworkStats, PeerId, UdpTransport};
use strata::{
    ChannelError, Command, ConnectionChannel, GameData, GameSetup, NETWORK_VERSION, NetMessage,
    ProtocolError, SERVER_PLAYER, Transport,
};

use crate::config::ClientConfig;
use crate::events::ClientEvent;
use crate::roster::Roster;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("failed to reach server: {0}")]
    Io(#[from] io::Error),
    #[error(transparent)]
    Channel(#[from] ChannelError),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error("failed to encode message: {0}")]
    Codec(#[from] CodecError),
    #[error("no player number assigned yet")]
    NotConnected,
    #[error(transparent)]
    Server(#[from] strata_server::ServerError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Connecting and loading, before the game has started.
    PreGame,
    Playing,
    Paused,
    Ended,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::PreGame => "pregame",
            SessionState::Playing => "playing",
            SessionState::Paused => "paused",
            SessionState::Ended => "ended",
        }
    }
}

/// A client's link to the server and everything it learned through it:
/// player number, game setup, roster and game state. Frame messages are
/// left to [`crate::ClientSimLoop`].
pub struct ClientSession {
    config: ClientConfig,
    channel: ConnectionChannel,
    state: SessionState,
    player: Option<u8>,
    game_data: Option<GameData>,
    setup: Option<GameSetup>,
    random_seed: Option<u32>,
    game_id: Option<[u8; 16]>,
    roster: Roster,
    end_reason: Option<String>,
    /// Set while a connection attempt is unanswered; holds its reconnect flag.
    unanswered_attempt: Option<bool>,
    received_at_attempt: u64,
    last_attempt: Instant,
    server_frame: i32,
    events: VecDeque<ClientEvent>,
}

impl ClientSession {
    pub fn new(transport: impl Transport + 'static, config: ClientConfig) -> Result<Self, ClientError> {
        Self::from_boxed(Box::new(transport), config)
    }

    pub fn connect<A: ToSocketAddrs>(addr: A, config: ClientConfig) -> Result<Self, ClientError> {
        let transport = UdpTransport::connect(addr)?;
        log::info!(
            "connecting to {} from {}",
            transport.remote_addr(),
            transport.local_addr()
        );
        Self::new(transport, config)
    }

    pub fn from_boxed(transport: Box<dyn Transport>, config: ClientConfig) -> Result<Self, ClientError> {
        let channel = ConnectionChannel::from_boxed(transport, config.channel.clone());
        let mut session = Self {
            config,
            channel,
            state: SessionState::PreGame,
            player: None,
            game_data: None,
            setup: None,
            random_seed: None,
            game_id: None,
            roster: Roster::default(),
            end_reason: None,
            unanswered_attempt: Some(false),
            received_at_attempt: 0,
            last_attempt: Instant::now(),
            server_frame: 0,
            events: VecDeque::new(),
        };
        session.send_attempt(false)?;
        Ok(session)
    }

    fn send_attempt(&mut self, reconnect: bool) -> Result<(), ClientError> {
        let packet = NetMessage::AttemptConnect {
            version: NETWORK_VERSION,
            name: self.config.name.clone(),
            password: self.config.password.clone(),
            engine_version: env!("CARGO_PKG_VERSION").into(),
            reconnect,
            netloss: self.config.netloss,
        }
        .encode()?;
        self.channel.send_handshake(&packet)?;
        self.last_attempt = Instant::now();
        Ok(())
    }

    /// Moves the session onto a new link and asks the server to take it
    /// over. Messages not yet acknowledged are replayed, so neither side
    /// loses or reorders anything.
    pub fn reconnect(&mut self, transport: Box<dyn Transport>) -> Result<bool, ClientError> {
        if !self.channel.rebind(transport) {
            return Ok(false);
        }
        log::info!("reconnecting to {}", self.channel.peer());
        self.unanswered_attempt = Some(true);
        self.received_at_attempt = self.channel.stats().packets_received;
        self.send_attempt(true)?;
        Ok(true)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn player(&self) -> Option<u8> {
        self.player
    }

    pub fn setup(&self) -> Option<&GameSetup> {
        self.setup.as_ref()
    }

    pub fn game_data(&self) -> Option<&GameData> {
        self.game_data.as_ref()
    }

    /// Seed for the simulation: the game's RANDSEED, else the one in
    /// GAMEDATA.
    pub fn random_seed(&self) -> Option<u32> {
        self.random_seed
            .or_else(|| self.game_data.as_ref().map(|d| d.random_seed))
    }

    pub fn game_id(&self) -> Option<[u8; 16]> {
        self.game_id
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    pub fn end_reason(&self) -> Option<&str> {
        self.end_reason.as_deref()
    }

    /// Latest frame the server reported having generated.
    pub fn server_frame(&self) -> i32 {
        self.server_frame
    }

    pub fn network_stats(&self) -> NetworkStats {
        self.channel.stats()
    }

    /// The link currently carrying the session.
    pub fn peer(&self) -> PeerId {
        self.channel.peer()
    }

    pub fn is_ended(&self) -> bool {
        self.state == SessionState::Ended
    }

    pub fn drain_events(&mut self) -> impl Iterator<Item = ClientEvent> + '_ {
        self.events.drain(..)
    }

    pub(crate) fn channel_mut(&mut self) -> &mut ConnectionChannel {
        &mut self.channel
    }

    pub(crate) fn push_event(&mut self, event: ClientEvent) {
        self.events.push_back(event);
    }

    pub(crate) fn set_state(&mut self, state: SessionState) {
        if self.state != SessionState::Ended && self.state != state {
            log::debug!("session {} -> {}", self.state.as_str(), state.as_str());
            self.state = state;
        }
    }

    pub(crate) fn note_server_frame(&mut self, frame: i32) {
        self.server_frame = self.server_frame.max(frame);
    }

    pub(crate) fn end(&mut self, reason: impl Into<String>) {
        if self.state == SessionState::Ended {
            return;
        }
        let reason = reason.into();
        log::info!("session ended: {reason}");
        self.state = SessionState::Ended;
        self.end_reason = Some(reason.clone());
        self.channel.close();
        self.events.push_back(ClientEvent::Ended { reason });
    }

    pub fn send(&mut self, message: &NetMessage) -> Result<(), ClientError> {
        self.channel.send(&message.encode()?)?;
        Ok(())
    }

    fn own_number(&self) -> Result<u8, ClientError> {
        self.player.ok_or(ClientError::NotConnected)
    }

    /// Orders the current selection.
    pub fn send_command(&mut self, command: Command) -> Result<(), ClientError> {
        let player = self.own_number()?;
        self.send(&NetMessage::Command { player, command })
    }

    pub fn select(&mut self, units: &[i16]) -> Result<(), ClientError> {
        let player = self.own_number()?;
        self.send(&NetMessage::Select {
            player,
            units: units.to_vec(),
        })
    }

    pub fn send_chat(
        &mut self,
        destination: impl Into<ChatDestination>,
        text: impl Into<String>,
    ) -> Result<(), ClientError> {
        let player = self.own_number()?;
        self.send(&NetMessage::Chat(ChatMessage::new(player, destination, text)))
    }

    pub fn pause(&mut self, paused: bool) -> Result<(), ClientError> {
        let player = self.own_number()?;
        self.send(&NetMessage::Pause { player, paused })
    }

    pub fn set_speed(&mut self, speed: f32) -> Result<(), ClientError> {
        let player = self.own_number()?;
        self.send(&NetMessage::UserSpeed { player, speed })
    }

    /// Runs a server command such as `kickbynum 2`. Only the host may.
    pub fn server_command(&mut self, command: &str, extra: &str) -> Result<(), ClientError> {
        self.send(&NetMessage::CCommand {
            command: command.into(),
            extra: extra.into(),
        })
    }

    /// Tells the server we leave and ends the session.
    pub fn quit(&mut self) -> Result<(), ClientError> {
        if self.state == SessionState::Ended {
            return Ok(());
        }
        self.send(&NetMessage::Quit {
            reason: "user exited".into(),
        })?;
        self.channel.flush(Instant::now())?;
        self.end("user exited");
        Ok(())
    }

    /// Resends the latest connection attempt until the server has answered
    /// on the current link.
    pub(crate) fn retry_handshake(&mut self, now: Instant) -> Result<(), ClientError> {
        let Some(reconnect) = self.unanswered_attempt else {
            return Ok(());
        };
        if self.state == SessionState::Ended {
            return Ok(());
        }
        if self.channel.stats().packets_received > self.received_at_attempt {
            self.unanswered_attempt = None;
            return Ok(());
        }
        if now.saturating_duration_since(self.last_attempt) >= self.config.handshake_retry {
            log::debug!("resending connection attempt to {}", self.channel.peer());
            self.send_attempt(reconnect)?;
        }
        Ok(())
    }

    pub(crate) fn flush(&mut self, now: Instant) -> Result<(), ClientError> {
        if self.channel.is_closed() {
            return Ok(());
        }
        self.channel.flush(now)?;
        if self.channel.check_timeout(now) {
            self.end("Server connection timeout");
        }
        Ok(())
    }

    /// Handles everything except frame advances and simulation input.
    pub(crate) fn handle(&mut self, message: NetMessage) {
        if self.roster.apply(&message) {
            match &message {
                NetMessage::PlayerName { player, name } => {
                    self.events.push_back(ClientEvent::PlayerJoined {
                        player: *player,
                        name: name.clone(),
                    });
                }
                NetMessage::PlayerLeft { player, reason } => {
                    log::info!("player {player} {}", reason.as_str());
                    self.events.push_back(ClientEvent::PlayerLeft {
                        player: *player,
                        reason: *reason,
                    });
                }
                _ => {}
            }
            return;
        }

        match message {
            NetMessage::GameData(data) => self.handle_game_data(data),
            NetMessage::SetPlayerNum { player } => {
                log::info!("server assigned player number {player}");
                self.player = Some(player);
                let name = self.config.name.clone();
                if let Err(e) = self.send(&NetMessage::PlayerName { player, name }) {
                    log::warn!("failed to announce player name: {e}");
                }
                self.events.push_back(ClientEvent::Connected { player });
            }
            NetMessage::RejectConnect { reason } => {
                log::warn!("server rejected connection: {reason}");
                self.events.push_back(ClientEvent::Rejected {
                    reason: reason.clone(),
                });
                self.end(reason);
            }
            NetMessage::Quit { reason } => self.end(reason),
            NetMessage::RandSeed { seed } => self.random_seed = Some(seed),
            NetMessage::GameId { id } => self.game_id = Some(id),
            NetMessage::Chat(chat) => self.handle_chat(chat),
            NetMessage::SystemMsg { text, .. } => {
                log::info!("{text}");
                self.events.push_back(ClientEvent::SystemMessage { text });
            }
            NetMessage::GameOver {
                winning_ally_teams, ..
            } => {
                log::info!("game over, winners: {winning_ally_teams:?}");
                self.events
                    .push_back(ClientEvent::GameOver { winning_ally_teams });
            }
            NetMessage::GameFrameProgress { frame } => self.note_server_frame(frame),
            other => log::trace!("ignoring {:?}", other.kind()),
        }
    }

    fn handle_game_data(&mut self, data: GameData) {
        match data.setup() {
            Ok(setup) => {
                log::info!(
                    "game data received: map {} mod {} ({} players)",
                    setup.map_name,
                    setup.mod_name,
                    setup.players.len()
                );
                self.roster = Roster::from_setup(&setup);
                self.setup = Some(setup);
            }
            Err(e) => {
                log::error!("unusable setup script in game data: {e}");
                self.end(format!("Invalid game data: {e}"));
            }
        }
        self.game_data = Some(data);
    }

    fn handle_chat(&mut self, chat: ChatMessage) {
        if chat.from != SERVER_PLAYER
            && let Some(me) = self.player.and_then(|p| self.roster.chat_party(p))
            && let Some(sender) = self.roster.chat_party(chat.from)
            && !chat.is_visible_to(&sender, &me)
        {
            log::debug!("hiding chat from player {} to {:?}", chat.from, chat.destination);
            return;
        }
        log::info!("<{}> {}", self.sender_name(chat.from), chat.text);
        self.events.push_back(ClientEvent::Chat {
            from: chat.from,
            destination: chat.destination,
            text: chat.text,
        });
    }

    fn sender_name(&self, player: u8) -> String {
        if player == SERVER_PLAYER {
            return "server".into();
        }
        self.roster
            .get(player)
            .map_or_else(|| format!("player {player}"), |p| p.name.clone())
    }
}
