use std::collections::BTreeSet;
use std::time::Instant;

use glam::Vec3;
use strata::net::{AiState, PeerId};
use strata::setup::{AiSetup, PlayerSetup, TeamSetup};
use strata::{ConnectionChannel, NetMessage, RawPacket};

/// AI ids are a byte; the last value means "no free slot".
pub const MAX_AIS: usize = 255;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ParticipantState {
    Unconnected,
    Connected,
    InGame,
    Disconnected,
}

impl ParticipantState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParticipantState::Unconnected => "Unconnected",
            ParticipantState::Connected => "Connected",
            ParticipantState::InGame => "In game",
            ParticipantState::Disconnected => "Disconnected",
        }
    }
}

/// One roster slot. Slots are never removed so player numbers stay stable.
pub struct Participant {
    pub name: String,
    pub(crate) password: String,
    pub team: u8,
    pub spectator: bool,
    pub state: ParticipantState,
    pub is_local: bool,
    /// Slot replayed from a demo rather than a live connection.
    pub is_from_demo: bool,
    pub is_midgame_join: bool,
    /// Rejoined a running game and is still catching up.
    pub is_reconnecting: bool,
    pub ready_to_start: bool,
    pub desynced: bool,
    pub muted_chat: bool,
    pub muted_draw: bool,
    pub cpu_usage: f32,
    pub last_frame_response: i32,
    /// AI ids hosted by this player.
    pub ais: BTreeSet<u8>,
    pub connected_at: Option<Instant>,
    link: Option<ConnectionChannel>,
}

impl Participant {
    pub fn from_setup(setup: &PlayerSetup) -> Self {
        Self::new(&setup.name, &setup.password, setup.team, setup.spectator)
    }

    pub fn new(name: &str, password: &str, team: u8, spectator: bool) -> Self {
        Self {
            name: name.to_string(),
            password: password.to_string(),
            team,
            spectator,
            state: ParticipantState::Unconnected,
            is_local: false,
            is_from_demo: false,
            is_midgame_join: false,
            is_reconnecting: false,
            ready_to_start: false,
            desynced: false,
            muted_chat: false,
            muted_draw: false,
            cpu_usage: 0.0,
            last_frame_response: 0,
            ais: BTreeSet::new(),
            connected_at: None,
            link: None,
        }
    }

    pub fn player_type(&self) -> &'static str {
        if self.spectator { "Spectator" } else { "Player" }
    }

    pub fn is_linked(&self) -> bool {
        self.link.is_some()
    }

    pub fn link(&self) -> Option<&ConnectionChannel> {
        self.link.as_ref()
    }

    pub(crate) fn link_mut(&mut self) -> Option<&mut ConnectionChannel> {
        self.link.as_mut()
    }

    pub fn peer(&self) -> Option<PeerId> {
        self.link.as_ref().map(|l| l.peer())
    }

    pub(crate) fn attach(&mut self, channel: ConnectionChannel, is_local: bool, now: Instant) {
        self.link = Some(channel);
        self.is_local = is_local;
        self.state = ParticipantState::Connected;
        self.connected_at = Some(now);
        self.cpu_usage = 0.0;
    }

    /// Drops the link without telling the peer.
    pub(crate) fn detach(&mut self) -> Option<ConnectionChannel> {
        self.state = ParticipantState::Disconnected;
        self.link.take()
    }

    pub(crate) fn send(&mut self, packet: &RawPacket) {
        if let Some(link) = self.link.as_mut()
            && let Err(e) = link.send(packet)
        {
            log::debug!("send to {} failed: {e}", self.name);
        }
    }

    /// Sends QUIT with `reason`, flushes and closes. Returns the old peer.
    pub(crate) fn kill(&mut self, reason: &str, now: Instant) -> Option<PeerId> {
        let mut link = self.detach()?;
        let peer = link.peer();
        match (NetMessage::Quit {
            reason: reason.to_string(),
        })
        .encode()
        {
            Ok(quit) => {
                let _ = link.send(&quit);
            }
            Err(e) => log::error!("failed to encode quit: {e}"),
        }
        if let Err(e) = link.flush(now) {
            log::debug!("final flush to {} failed: {e}", self.name);
        }
        link.close();
        Some(peer)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TeamState {
    pub leader: Option<u8>,
    pub ally_team: u8,
    /// Some player or AI controls the team.
    pub active: bool,
    pub start_pos: Vec3,
}

impl TeamState {
    pub fn from_setup(setup: &TeamSetup) -> Self {
        Self {
            leader: Some(setup.leader),
            ally_team: setup.ally_team,
            active: false,
            start_pos: setup.start_pos,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AiSlot {
    pub name: String,
    pub team: u8,
    pub host_player: u8,
    pub state: AiState,
}

impl AiSlot {
    pub fn from_setup(setup: &AiSetup) -> Self {
        Self {
            name: setup.name.clone(),
            team: setup.team,
            host_player: setup.host_player,
            state: AiState::Constructed,
        }
    }
}

/// Lowest id not in use, or `None` when every id is taken.
pub fn reserve_ai_id(used: impl IntoIterator<Item = u8>) -> Option<u8> {
    let used: BTreeSet<u8> = used.into_iter().collect();
    (0..MAX_AIS as u16)
        .map(|id| id as u8)
        .find(|id| !used.contains(id))
}
