use std::io;
use std::path::Path;

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::net::codec::{CodecError, CodecResult, PackPacket, UnpackPacket};
use crate::net::{MessageType, RawPacket};

const COMPRESSION_LEVEL: i32 = 3;
const MAX_SETUP_SIZE: usize = 1 << 20;

#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    #[error("failed to read setup: {0}")]
    Io(#[from] io::Error),
    #[error("invalid setup document: {0}")]
    Json(#[from] serde_json::Error),
    #[error("setup script compression failed: {0}")]
    Compression(#[source] io::Error),
    #[error("setup script is not valid utf-8")]
    InvalidScript,
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error("invalid setup: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StartPosType {
    #[default]
    Fixed,
    Random,
    ChooseInGame,
    ChooseBeforeGame,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerSetup {
    pub name: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub team: u8,
    #[serde(default)]
    pub spectator: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamSetup {
    pub leader: u8,
    pub ally_team: u8,
    #[serde(default)]
    pub start_pos: Vec3,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiSetup {
    pub name: String,
    pub team: u8,
    pub host_player: u8,
}

fn default_min_speed() -> f32 {
    0.3
}

fn default_max_speed() -> f32 {
    3.0
}

fn default_user_speed() -> f32 {
    1.0
}

fn default_start_delay() -> u32 {
    4
}

fn default_true() -> bool {
    true
}

/// The game-setup document every participant agrees on before the first
/// frame. Loaded from JSON by the host and shipped inside GAMEDATA.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameSetup {
    pub map_name: String,
    pub mod_name: String,
    #[serde(default)]
    pub players: Vec<PlayerSetup>,
    #[serde(default)]
    pub teams: Vec<TeamSetup>,
    #[serde(default)]
    pub ais: Vec<AiSetup>,
    #[serde(default)]
    pub start_pos_type: StartPosType,
    #[serde(default = "default_true")]
    pub fixed_allies: bool,
    #[serde(default)]
    pub allow_spec_draw: bool,
    /// Accept connections from names that are not in `players`.
    #[serde(default)]
    pub allow_additional_players: bool,
    #[serde(default)]
    pub cheating: bool,
    #[serde(default = "default_min_speed")]
    pub min_speed: f32,
    #[serde(default = "default_max_speed")]
    pub max_speed: f32,
    #[serde(default = "default_user_speed")]
    pub user_speed: f32,
    /// Zero lets the host pick one.
    #[serde(default)]
    pub random_seed: u32,
    #[serde(default = "default_start_delay")]
    pub game_start_delay_secs: u32,
    #[serde(default)]
    pub map_checksum: u32,
    #[serde(default)]
    pub mod_checksum: u32,
}

impl GameSetup {
    pub fn new(map_name: impl Into<String>, mod_name: impl Into<String>) -> Self {
        Self {
            map_name: map_name.into(),
            mod_name: mod_name.into(),
            players: Vec::new(),
            teams: Vec::new(),
            ais: Vec::new(),
            start_pos_type: StartPosType::default(),
            fixed_allies: true,
            allow_spec_draw: false,
            allow_additional_players: false,
            cheating: false,
            min_speed: default_min_speed(),
            max_speed: default_max_speed(),
            user_speed: default_user_speed(),
            random_seed: 0,
            game_start_delay_secs: default_start_delay(),
            map_checksum: 0,
            mod_checksum: 0,
        }
    }

    pub fn with_player(mut self, name: impl Into<String>, team: u8, spectator: bool) -> Self {
        self.players.push(PlayerSetup {
            name: name.into(),
            password: String::new(),
            team,
            spectator,
        });
        self
    }

    pub fn with_team(mut self, leader: u8, ally_team: u8) -> Self {
        self.teams.push(TeamSetup {
            leader,
            ally_team,
            start_pos: Vec3::ZERO,
        });
        self
    }

    pub fn from_json(text: &str) -> Result<Self, SetupError> {
        let setup: GameSetup = serde_json::from_str(text)?;
        setup.validate()?;
        Ok(setup)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, SetupError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn to_script(&self) -> Result<String, SetupError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn validate(&self) -> Result<(), SetupError> {
        if self.players.len() >= crate::MAX_PLAYERS {
            return Err(SetupError::Invalid(format!(
                "{} players, at most {} allowed",
                self.players.len(),
                crate::MAX_PLAYERS - 1
            )));
        }
        for (index, player) in self.players.iter().enumerate() {
            if !player.spectator && player.team as usize >= self.teams.len() {
                return Err(SetupError::Invalid(format!(
                    "player {index} ({}) is on missing team {}",
                    player.name, player.team
                )));
            }
        }
        for (index, team) in self.teams.iter().enumerate() {
            if team.leader as usize >= self.players.len() {
                return Err(SetupError::Invalid(format!(
                    "team {index} is led by missing player {}",
                    team.leader
                )));
            }
        }
        for ai in &self.ais {
            if ai.team as usize >= self.teams.len() || ai.host_player as usize >= self.players.len()
            {
                return Err(SetupError::Invalid(format!(
                    "ai {} references a missing team or host",
                    ai.name
                )));
            }
        }
        if !(self.min_speed > 0.0 && self.min_speed <= self.max_speed) {
            return Err(SetupError::Invalid(format!(
                "speed range [{}, {}] is empty",
                self.min_speed, self.max_speed
            )));
        }
        Ok(())
    }

    pub fn ally_team_of(&self, team: u8) -> Option<u8> {
        self.teams.get(team as usize).map(|t| t.ally_team)
    }
}

/// The GAMEDATA payload: compressed setup script plus the checksums and seed
/// every client must agree on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameData {
    setup_script: String,
    compressed: Vec<u8>,
    pub map_checksum: u32,
    pub mod_checksum: u32,
    pub random_seed: u32,
}

impl GameData {
    pub fn new(
        setup_script: impl Into<String>,
        map_checksum: u32,
        mod_checksum: u32,
        random_seed: u32,
    ) -> Result<Self, SetupError> {
        let setup_script = setup_script.into();
        let compressed = zstd::bulk::compress(setup_script.as_bytes(), COMPRESSION_LEVEL)
            .map_err(SetupError::Compression)?;
        Ok(Self {
            setup_script,
            compressed,
            map_checksum,
            mod_checksum,
            random_seed,
        })
    }

    pub fn from_setup(setup: &GameSetup, random_seed: u32) -> Result<Self, SetupError> {
        Self::new(
            setup.to_script()?,
            setup.map_checksum,
            setup.mod_checksum,
            random_seed,
        )
    }

    pub fn setup_script(&self) -> &str {
        &self.setup_script
    }

    pub fn setup(&self) -> Result<GameSetup, SetupError> {
        GameSetup::from_json(&self.setup_script)
    }

    pub fn pack(&self) -> CodecResult<RawPacket> {
        let compressed_len = u16::try_from(self.compressed.len()).map_err(|_| CodecError::Oversize {
            size: self.compressed.len(),
            limit: u16::MAX as usize,
        })?;
        let mut packet = PackPacket::sized_u16(MessageType::GameData.code());
        packet
            .write(compressed_len)
            .write_bytes(&self.compressed)
            .write(self.map_checksum)
            .write(self.mod_checksum)
            .write(self.random_seed);
        packet.finish()
    }

    pub fn unpack(data: &[u8]) -> Result<Self, SetupError> {
        let mut reader = UnpackPacket::new(data, 3);
        let compressed_len = reader.read::<u16>()? as usize;
        let compressed = reader.read_bytes(compressed_len)?.to_vec();
        let map_checksum = reader.read()?;
        let mod_checksum = reader.read()?;
        let random_seed = reader.read()?;

        let script = zstd::bulk::decompress(&compressed, MAX_SETUP_SIZE)
            .map_err(SetupError::Compression)?;
        let setup_script = String::from_utf8(script).map_err(|_| SetupError::InvalidScript)?;

        Ok(Self {
            setup_script,
            compressed,
            map_checksum,
            mod_checksum,
            random_seed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_player_setup() -> GameSetup {
        GameSetup::new("Comet Catcher", "Balanced Annihilation")
            .with_player("alice", 0, false)
            .with_player("bob", 1, false)
            .with_team(0, 0)
            .with_team(1, 1)
    }

    #[test]
    fn json_defaults_fill_in() {
        let setup = GameSetup::from_json(
            r#"{
                "map_name": "Tabula",
                "mod_name": "BA",
                "players": [{ "name": "alice" }],
                "teams": [{ "leader": 0, "ally_team": 0 }]
            }"#,
        )
        .unwrap();
        assert_eq!(setup.players[0].team, 0);
        assert!(setup.fixed_allies);
        assert_eq!(setup.max_speed, 3.0);
        assert_eq!(setup.start_pos_type, StartPosType::Fixed);
    }

    #[test]
    fn validation_rejects_dangling_team() {
        let setup = GameSetup::new("m", "g").with_player("alice", 2, false).with_team(0, 0);
        assert!(matches!(setup.validate(), Err(SetupError::Invalid(_))));
    }

    #[test]
    fn game_data_packet_carries_setup() {
        let setup = two_player_setup();
        let data = GameData::from_setup(&setup, 1234).unwrap();
        let raw = data.pack().unwrap();

        assert_eq!(raw[0], MessageType::GameData.code());
        assert_eq!(u16::from_le_bytes([raw[1], raw[2]]) as usize, raw.len());

        let decoded = GameData::unpack(&raw).unwrap();
        assert_eq!(decoded.random_seed, 1234);
        assert_eq!(decoded.setup().unwrap(), setup);
    }
}
