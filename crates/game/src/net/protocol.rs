use glam::Vec3;

use crate::command::{Command, CommandOptions};
use crate::setup::{GameData, SetupError};

use super::chat::ChatMessage;
use super::codec::{CodecError, CodecResult, PackPacket, UnpackPacket};
use super::message::{FrameError, LengthRule, MessageType, message_length};
use super::packet::RawPacket;

pub const NETWORK_VERSION: u16 = 5;
pub const GAME_SPEED: i32 = 30;
pub const SERVER_PLAYER: u8 = 255;
pub const DEFAULT_PORT: u16 = 8452;

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Setup(#[from] SetupError),
    #[error("invalid {field} value {value} in {kind:?}")]
    InvalidField {
        kind: MessageType,
        field: &'static str,
        value: i64,
    },
    #[error("invalid player number {player} in {kind:?}")]
    InvalidPlayerNumber { kind: MessageType, player: u8 },
    #[error("invalid team number {team} in {kind:?}")]
    InvalidTeamNumber { kind: MessageType, team: u8 },
    #[error("invalid unit id {unit} in {kind:?}")]
    InvalidUnitId { kind: MessageType, unit: i16 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaveReason {
    Timeout,
    Quit,
    Kicked,
}

impl LeaveReason {
    pub fn code(self) -> u8 {
        match self {
            LeaveReason::Timeout => 0,
            LeaveReason::Quit => 1,
            LeaveReason::Kicked => 2,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(LeaveReason::Timeout),
            1 => Some(LeaveReason::Quit),
            2 => Some(LeaveReason::Kicked),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LeaveReason::Timeout => "timed out",
            LeaveReason::Quit => "left",
            LeaveReason::Kicked => "was kicked",
        }
    }
}

const TEAMMSG_GIVEAWAY: u8 = 2;
const TEAMMSG_RESIGN: u8 = 3;
const TEAMMSG_TEAM_DIED: u8 = 4;
const TEAMMSG_JOIN_TEAM: u8 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeamAction {
    GiveAway { to_team: u8, from_team: u8 },
    Resign,
    TeamDied { team: u8 },
    JoinTeam { team: u8 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AiState {
    Constructed,
    Initializing,
    Alive,
    Dying,
    Dead,
    Reloading,
}

impl AiState {
    pub fn code(self) -> u8 {
        match self {
            AiState::Constructed => 0,
            AiState::Initializing => 1,
            AiState::Alive => 2,
            AiState::Dying => 3,
            AiState::Dead => 4,
            AiState::Reloading => 5,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            0 => AiState::Constructed,
            1 => AiState::Initializing,
            2 => AiState::Alive,
            3 => AiState::Dying,
            4 => AiState::Dead,
            5 => AiState::Reloading,
            _ => return None,
        })
    }
}

const MAPDRAW_POINT: u8 = 0;
const MAPDRAW_ERASE: u8 = 1;
const MAPDRAW_LINE: u8 = 2;

#[derive(Debug, Clone, PartialEq)]
pub enum MapDraw {
    Point {
        x: i16,
        z: i16,
        label: String,
        from_lua: bool,
    },
    Erase {
        x: i16,
        z: i16,
    },
    Line {
        from: (i16, i16),
        to: (i16, i16),
        from_lua: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PlayerStatistics {
    pub mouse_pixels: i32,
    pub mouse_clicks: i32,
    pub key_presses: i32,
    pub num_commands: i32,
    pub unit_commands: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NetMessage {
    KeyFrame { frame: i32 },
    NewFrame,
    Quit { reason: String },
    StartPlaying { countdown: u32 },
    SetPlayerNum { player: u8 },
    PlayerName { player: u8, name: String },
    Chat(ChatMessage),
    RandSeed { seed: u32 },
    GameId { id: [u8; 16] },
    PathChecksum { player: u8, checksum: u32 },
    Command { player: u8, command: Command },
    Select { player: u8, units: Vec<i16> },
    Pause { player: u8, paused: bool },
    /// Sent as AICOMMAND_TRACKED when `command.tag` is set.
    AiCommand { player: u8, ai: u8, unit: i16, command: Command },
    AiCommands {
        player: u8,
        ai: u8,
        pairwise: bool,
        units: Vec<i16>,
        commands: Vec<Command>,
    },
    AiShare {
        player: u8,
        ai: u8,
        source_team: u8,
        dest_team: u8,
        metal: f32,
        energy: f32,
        units: Vec<i16>,
    },
    UserSpeed { player: u8, speed: f32 },
    InternalSpeed { speed: f32 },
    CpuUsage { usage: f32 },
    DirectControl { player: u8 },
    DcUpdate { player: u8, status: u8, heading: i16, pitch: i16 },
    Share {
        player: u8,
        team: u8,
        share_units: bool,
        metal: f32,
        energy: f32,
    },
    SetShare {
        player: u8,
        team: u8,
        metal_share: f32,
        energy_share: f32,
    },
    PlayerStat { player: u8, stats: PlayerStatistics },
    GameOver { player: u8, winning_ally_teams: Vec<u8> },
    MapDraw { player: u8, draw: MapDraw },
    SyncResponse { player: u8, frame: i32, checksum: u32 },
    SystemMsg { player: u8, text: String },
    StartPos { player: u8, team: u8, ready: u8, pos: Vec3 },
    PlayerInfo { player: u8, cpu_usage: f32, ping: u32 },
    PlayerLeft { player: u8, reason: LeaveReason },
    LogMsg { player: u8, text: String },
    LuaMsg { player: u8, script: u16, mode: u8, data: Vec<u8> },
    Team { player: u8, action: TeamAction },
    GameData(GameData),
    Alliance { player: u8, ally_team: u8, allied: bool },
    CCommand { command: String, extra: String },
    ClientData { player: u8, data: Vec<u8> },
    AttemptConnect {
        version: u16,
        name: String,
        password: String,
        engine_version: String,
        reconnect: bool,
        netloss: u8,
    },
    RejectConnect { reason: String },
    AiCreated { player: u8, ai: u8, team: u8, name: String },
    AiStateChanged { player: u8, ai: u8, state: AiState },
    CreateNewPlayer { player: u8, spectator: bool, team: u8, name: String },
    GameFrameProgress { frame: i32 },
}

fn same_value<T: PartialEq + Copy>(mut values: impl Iterator<Item = T>) -> Option<T> {
    let first = values.next()?;
    values.all(|v| v == first).then_some(first)
}

impl NetMessage {
    pub fn kind(&self) -> MessageType {
        match self {
            NetMessage::KeyFrame { .. } => MessageType::KeyFrame,
            NetMessage::NewFrame => MessageType::NewFrame,
            NetMessage::Quit { .. } => MessageType::Quit,
            NetMessage::StartPlaying { .. } => MessageType::StartPlaying,
            NetMessage::SetPlayerNum { .. } => MessageType::SetPlayerNum,
            NetMessage::PlayerName { .. } => MessageType::PlayerName,
            NetMessage::Chat(_) => MessageType::Chat,
            NetMessage::RandSeed { .. } => MessageType::RandSeed,
            NetMessage::GameId { .. } => MessageType::GameId,
            NetMessage::PathChecksum { .. } => MessageType::PathChecksum,
            NetMessage::Command { .. } => MessageType::Command,
            NetMessage::Select { .. } => MessageType::Select,
            NetMessage::Pause { .. } => MessageType::Pause,
            NetMessage::AiCommand { command, .. } => {
                if command.tag.is_some() {
                    MessageType::AiCommandTracked
                } else {
                    MessageType::AiCommand
                }
            }
            NetMessage::AiCommands { .. } => MessageType::AiCommands,
            NetMessage::AiShare { .. } => MessageType::AiShare,
            NetMessage::UserSpeed { .. } => MessageType::UserSpeed,
            NetMessage::InternalSpeed { .. } => MessageType::InternalSpeed,
            NetMessage::CpuUsage { .. } => MessageType::CpuUsage,
            NetMessage::DirectControl { .. } => MessageType::DirectControl,
            NetMessage::DcUpdate { .. } => MessageType::DcUpdate,
            NetMessage::Share { .. } => MessageType::Share,
            NetMessage::SetShare { .. } => MessageType::SetShare,
            NetMessage::PlayerStat { .. } => MessageType::PlayerStat,
            NetMessage::GameOver { .. } => MessageType::GameOver,
            NetMessage::MapDraw { .. } => MessageType::MapDraw,
            NetMessage::SyncResponse { .. } => MessageType::SyncResponse,
            NetMessage::SystemMsg { .. } => MessageType::SystemMsg,
            NetMessage::StartPos { .. } => MessageType::StartPos,
            NetMessage::PlayerInfo { .. } => MessageType::PlayerInfo,
            NetMessage::PlayerLeft { .. } => MessageType::PlayerLeft,
            NetMessage::LogMsg { .. } => MessageType::LogMsg,
            NetMessage::LuaMsg { .. } => MessageType::LuaMsg,
            NetMessage::Team { .. } => MessageType::Team,
            NetMessage::GameData(_) => MessageType::GameData,
            NetMessage::Alliance { .. } => MessageType::Alliance,
            NetMessage::CCommand { .. } => MessageType::CCommand,
            NetMessage::ClientData { .. } => MessageType::ClientData,
            NetMessage::AttemptConnect { .. } => MessageType::AttemptConnect,
            NetMessage::RejectConnect { .. } => MessageType::RejectConnect,
            NetMessage::AiCreated { .. } => MessageType::AiCreated,
            NetMessage::AiStateChanged { .. } => MessageType::AiStateChanged,
            NetMessage::CreateNewPlayer { .. } => MessageType::CreateNewPlayer,
            NetMessage::GameFrameProgress { .. } => MessageType::GameFrameProgress,
        }
    }

    pub fn encode(&self) -> CodecResult<RawPacket> {
        let code = self.kind().code();
        match self {
            NetMessage::KeyFrame { frame } | NetMessage::GameFrameProgress { frame } => {
                let mut p = PackPacket::fixed(code);
                p.write(*frame);
                p.finish()
            }
            NetMessage::NewFrame => PackPacket::fixed(code).finish(),
            NetMessage::Quit { reason } | NetMessage::RejectConnect { reason } => {
                let mut p = PackPacket::sized_u16(code);
                p.write_str(reason)?;
                p.finish()
            }
            NetMessage::StartPlaying { countdown } => {
                let mut p = PackPacket::fixed(code);
                p.write(*countdown);
                p.finish()
            }
            NetMessage::SetPlayerNum { player } | NetMessage::DirectControl { player } => {
                let mut p = PackPacket::fixed(code);
                p.write(*player);
                p.finish()
            }
            NetMessage::PlayerName { player, name } => {
                let mut p = PackPacket::sized_u8(code);
                p.write(*player).write_str(name)?;
                p.finish()
            }
            NetMessage::Chat(chat) => chat.pack(),
            NetMessage::RandSeed { seed } => {
                let mut p = PackPacket::fixed(code);
                p.write(*seed);
                p.finish()
            }
            NetMessage::GameId { id } => {
                let mut p = PackPacket::fixed(code);
                p.write_bytes(id);
                p.finish()
            }
            NetMessage::PathChecksum { player, checksum } => {
                let mut p = PackPacket::fixed(code);
                p.write(*player).write(*checksum);
                p.finish()
            }
            NetMessage::Command { player, command } => {
                let mut p = PackPacket::sized_u16(code);
                p.write(*player)
                    .write(command.id)
                    .write(command.options.bits())
                    .write_slice(&command.params);
                p.finish()
            }
            NetMessage::Select { player, units } => {
                let mut p = PackPacket::sized_u16(code);
                p.write(*player).write_slice(units);
                p.finish()
            }
            NetMessage::Pause { player, paused } => {
                let mut p = PackPacket::fixed(code);
                p.write(*player).write(*paused);
                p.finish()
            }
            NetMessage::AiCommand {
                player,
                ai,
                unit,
                command,
            } => {
                let mut p = PackPacket::sized_u16(code);
                p.write(*player)
                    .write(*ai)
                    .write(*unit)
                    .write(command.id)
                    .write(command.options.bits());
                if let Some(tag) = command.tag {
                    p.write(tag);
                }
                p.write_slice(&command.params);
                p.finish()
            }
            NetMessage::AiCommands {
                player,
                ai,
                pairwise,
                units,
                commands,
            } => {
                let same_id = same_value(commands.iter().map(|c| c.id)).unwrap_or(0);
                let same_opt = same_value(commands.iter().map(|c| c.options.bits()))
                    .filter(|&opt| opt != 0xFF)
                    .unwrap_or(0xFF);
                let same_params = same_value(commands.iter().map(|c| c.params.len()))
                    .filter(|&len| len < 0xFFFF)
                    .map_or(0xFFFF, |len| len as u16);

                let mut p = PackPacket::sized_u16(code);
                p.write(*player)
                    .write(*ai)
                    .write(*pairwise)
                    .write(same_id as u32)
                    .write(same_opt)
                    .write(same_params)
                    .write(units.len() as i16)
                    .write_slice(units)
                    .write(commands.len() as i16);
                for command in commands {
                    if same_id == 0 {
                        p.write(command.id);
                    }
                    if same_opt == 0xFF {
                        p.write(command.options.bits());
                    }
                    if same_params == 0xFFFF {
                        p.write(command.params.len() as i16);
                    }
                    p.write_slice(&command.params);
                }
                p.finish()
            }
            NetMessage::AiShare {
                player,
                ai,
                source_team,
                dest_team,
                metal,
                energy,
                units,
            } => {
                let mut p = PackPacket::sized_u16(code);
                p.write(*player)
                    .write(*ai)
                    .write(*source_team)
                    .write(*dest_team)
                    .write(*metal)
                    .write(*energy)
                    .write_slice(units);
                p.finish()
            }
            NetMessage::UserSpeed { player, speed } => {
                let mut p = PackPacket::fixed(code);
                p.write(*player).write(*speed);
                p.finish()
            }
            NetMessage::InternalSpeed { speed } => {
                let mut p = PackPacket::fixed(code);
                p.write(*speed);
                p.finish()
            }
            NetMessage::CpuUsage { usage } => {
                let mut p = PackPacket::fixed(code);
                p.write(*usage);
                p.finish()
            }
            NetMessage::DcUpdate {
                player,
                status,
                heading,
                pitch,
            } => {
                let mut p = PackPacket::fixed(code);
                p.write(*player).write(*status).write(*heading).write(*pitch);
                p.finish()
            }
            NetMessage::Share {
                player,
                team,
                share_units,
                metal,
                energy,
            } => {
                let mut p = PackPacket::fixed(code);
                p.write(*player)
                    .write(*team)
                    .write(*share_units)
                    .write(*metal)
                    .write(*energy);
                p.finish()
            }
            NetMessage::SetShare {
                player,
                team,
                metal_share,
                energy_share,
            } => {
                let mut p = PackPacket::fixed(code);
                p.write(*player)
                    .write(*team)
                    .write(*metal_share)
                    .write(*energy_share);
                p.finish()
            }
            NetMessage::PlayerStat { player, stats } => {
                let mut p = PackPacket::fixed(code);
                p.write(*player)
                    .write(stats.mouse_pixels)
                    .write(stats.mouse_clicks)
                    .write(stats.key_presses)
                    .write(stats.num_commands)
                    .write(stats.unit_commands);
                p.finish()
            }
            NetMessage::GameOver {
                player,
                winning_ally_teams,
            } => {
                let mut p = PackPacket::sized_u8(code);
                p.write(*player).write_slice(winning_ally_teams);
                p.finish()
            }
            NetMessage::MapDraw { player, draw } => {
                let mut p = PackPacket::sized_u8(code);
                p.write(*player);
                match draw {
                    MapDraw::Point {
                        x,
                        z,
                        label,
                        from_lua,
                    } => {
                        p.write(MAPDRAW_POINT).write(*x).write(*z).write(*from_lua);
                        p.write_str(label)?;
                    }
                    MapDraw::Erase { x, z } => {
                        p.write(MAPDRAW_ERASE).write(*x).write(*z);
                    }
                    MapDraw::Line { from, to, from_lua } => {
                        p.write(MAPDRAW_LINE)
                            .write(from.0)
                            .write(from.1)
                            .write(to.0)
                            .write(to.1)
                            .write(*from_lua);
                    }
                }
                p.finish()
            }
            NetMessage::SyncResponse {
                player,
                frame,
                checksum,
            } => {
                let mut p = PackPacket::fixed(code);
                p.write(*player).write(*frame).write(*checksum);
                p.finish()
            }
            NetMessage::SystemMsg { player, text } | NetMessage::LogMsg { player, text } => {
                let mut p = PackPacket::sized_u16(code);
                p.write(*player).write_str(text)?;
                p.finish()
            }
            NetMessage::StartPos {
                player,
                team,
                ready,
                pos,
            } => {
                let mut p = PackPacket::fixed(code);
                p.write(*player)
                    .write(*team)
                    .write(*ready)
                    .write(pos.x)
                    .write(pos.y)
                    .write(pos.z);
                p.finish()
            }
            NetMessage::PlayerInfo {
                player,
                cpu_usage,
                ping,
            } => {
                let mut p = PackPacket::fixed(code);
                p.write(*player).write(*cpu_usage).write(*ping);
                p.finish()
            }
            NetMessage::PlayerLeft { player, reason } => {
                let mut p = PackPacket::fixed(code);
                p.write(*player).write(reason.code());
                p.finish()
            }
            NetMessage::LuaMsg {
                player,
                script,
                mode,
                data,
            } => {
                let mut p = PackPacket::sized_u16(code);
                p.write(*player).write(*script).write(*mode).write_bytes(data);
                p.finish()
            }
            NetMessage::Team { player, action } => {
                let (action_code, a, b) = match *action {
                    TeamAction::GiveAway { to_team, from_team } => {
                        (TEAMMSG_GIVEAWAY, to_team, from_team)
                    }
                    TeamAction::Resign => (TEAMMSG_RESIGN, 0, 0),
                    TeamAction::TeamDied { team } => (TEAMMSG_TEAM_DIED, team, 0),
                    TeamAction::JoinTeam { team } => (TEAMMSG_JOIN_TEAM, team, 0),
                };
                let mut p = PackPacket::fixed(code);
                p.write(*player).write(action_code).write(a).write(b);
                p.finish()
            }
            NetMessage::GameData(data) => data.pack(),
            NetMessage::Alliance {
                player,
                ally_team,
                allied,
            } => {
                let mut p = PackPacket::fixed(code);
                p.write(*player).write(*ally_team).write(*allied);
                p.finish()
            }
            NetMessage::CCommand { command, extra } => {
                let mut p = PackPacket::sized_u16(code);
                p.write_str(command)?.write_str(extra)?;
                p.finish()
            }
            NetMessage::ClientData { player, data } => {
                let mut p = PackPacket::sized_u16(code);
                p.write(*player).write_bytes(data);
                p.finish()
            }
            NetMessage::AttemptConnect {
                version,
                name,
                password,
                engine_version,
                reconnect,
                netloss,
            } => {
                let mut p = PackPacket::sized_u16(code);
                p.write(*version);
                p.write_str(name)?.write_str(password)?.write_str(engine_version)?;
                p.write(*reconnect).write(*netloss);
                p.finish()
            }
            NetMessage::AiCreated {
                player,
                ai,
                team,
                name,
            } => {
                let mut p = PackPacket::sized_u8(code);
                p.write(*player).write(*ai).write(*team).write_str(name)?;
                p.finish()
            }
            NetMessage::AiStateChanged { player, ai, state } => {
                let mut p = PackPacket::fixed(code);
                p.write(*player).write(*ai).write(state.code());
                p.finish()
            }
            NetMessage::CreateNewPlayer {
                player,
                spectator,
                team,
                name,
            } => {
                let mut p = PackPacket::sized_u16(code);
                p.write(*player).write(*spectator).write(*team).write_str(name)?;
                p.finish()
            }
        }
    }

    /// Decodes the single message at the start of `data`.
    pub fn decode(data: &[u8]) -> Result<NetMessage, ProtocolError> {
        let len = message_length(data)?;
        let data = &data[..len];
        let kind = MessageType::try_from(data[0]).map_err(FrameError::UnknownType)?;
        let start = match kind.length_rule() {
            LengthRule::Fixed(_) => 1,
            rule => rule.header_len(),
        };
        let mut r = UnpackPacket::new(data, start);

        let invalid = |field: &'static str, value: i64| ProtocolError::InvalidField {
            kind,
            field,
            value,
        };

        let msg = match kind {
            MessageType::KeyFrame => NetMessage::KeyFrame { frame: r.read()? },
            MessageType::NewFrame => NetMessage::NewFrame,
            MessageType::Quit => NetMessage::Quit {
                reason: r.read_string()?,
            },
            MessageType::StartPlaying => NetMessage::StartPlaying {
                countdown: r.read()?,
            },
            MessageType::SetPlayerNum => NetMessage::SetPlayerNum { player: r.read()? },
            MessageType::PlayerName => NetMessage::PlayerName {
                player: r.read()?,
                name: r.read_string()?,
            },
            MessageType::Chat => NetMessage::Chat(ChatMessage::unpack(data)?),
            MessageType::RandSeed => NetMessage::RandSeed { seed: r.read()? },
            MessageType::GameId => {
                let mut id = [0u8; 16];
                id.copy_from_slice(r.read_bytes(16)?);
                NetMessage::GameId { id }
            }
            MessageType::PathChecksum => NetMessage::PathChecksum {
                player: r.read()?,
                checksum: r.read()?,
            },
            MessageType::Command => {
                let player = r.read()?;
                let mut command = Command::new(r.read()?);
                command.options = CommandOptions::from_bits_retain(r.read()?);
                command.params = r.read_remaining()?;
                NetMessage::Command { player, command }
            }
            MessageType::Select => NetMessage::Select {
                player: r.read()?,
                units: r.read_remaining()?,
            },
            MessageType::Pause => NetMessage::Pause {
                player: r.read()?,
                paused: r.read()?,
            },
            MessageType::AiCommand | MessageType::AiCommandTracked => {
                let player = r.read()?;
                let ai = r.read()?;
                let unit = r.read()?;
                let mut command = Command::new(r.read()?);
                command.options = CommandOptions::from_bits_retain(r.read()?);
                if kind == MessageType::AiCommandTracked {
                    command.tag = Some(r.read()?);
                }
                command.params = r.read_remaining()?;
                NetMessage::AiCommand {
                    player,
                    ai,
                    unit,
                    command,
                }
            }
            MessageType::AiCommands => {
                let player = r.read()?;
                let ai = r.read()?;
                let pairwise = r.read()?;
                let same_id = r.read::<u32>()?;
                let same_opt = r.read::<u8>()?;
                let same_params = r.read::<u16>()?;

                let unit_count = r.read::<i16>()?;
                if unit_count < 0 {
                    return Err(invalid("unit count", unit_count.into()));
                }
                let units = r.read_vec(unit_count as usize)?;

                let command_count = r.read::<i16>()?;
                if command_count < 0 {
                    return Err(invalid("command count", command_count.into()));
                }
                let mut commands = Vec::with_capacity(command_count as usize);
                for _ in 0..command_count {
                    let id = if same_id == 0 { r.read()? } else { same_id as i32 };
                    let opt = if same_opt == 0xFF { r.read()? } else { same_opt };
                    let param_count = if same_params == 0xFFFF {
                        let count = r.read::<i16>()?;
                        if count < 0 {
                            return Err(invalid("param count", count.into()));
                        }
                        count as usize
                    } else {
                        same_params as usize
                    };
                    let mut command =
                        Command::with_options(id, CommandOptions::from_bits_retain(opt));
                    command.params = r.read_vec(param_count)?;
                    commands.push(command);
                }
                NetMessage::AiCommands {
                    player,
                    ai,
                    pairwise,
                    units,
                    commands,
                }
            }
            MessageType::AiShare => NetMessage::AiShare {
                player: r.read()?,
                ai: r.read()?,
                source_team: r.read()?,
                dest_team: r.read()?,
                metal: r.read()?,
                energy: r.read()?,
                units: r.read_remaining()?,
            },
            MessageType::UserSpeed => NetMessage::UserSpeed {
                player: r.read()?,
                speed: r.read()?,
            },
            MessageType::InternalSpeed => NetMessage::InternalSpeed { speed: r.read()? },
            MessageType::CpuUsage => NetMessage::CpuUsage { usage: r.read()? },
            MessageType::DirectControl => NetMessage::DirectControl { player: r.read()? },
            MessageType::DcUpdate => NetMessage::DcUpdate {
                player: r.read()?,
                status: r.read()?,
                heading: r.read()?,
                pitch: r.read()?,
            },
            MessageType::Share => NetMessage::Share {
                player: r.read()?,
                team: r.read()?,
                share_units: r.read()?,
                metal: r.read()?,
                energy: r.read()?,
            },
            MessageType::SetShare => NetMessage::SetShare {
                player: r.read()?,
                team: r.read()?,
                metal_share: r.read()?,
                energy_share: r.read()?,
            },
            MessageType::PlayerStat => NetMessage::PlayerStat {
                player: r.read()?,
                stats: PlayerStatistics {
                    mouse_pixels: r.read()?,
                    mouse_clicks: r.read()?,
                    key_presses: r.read()?,
                    num_commands: r.read()?,
                    unit_commands: r.read()?,
                },
            },
            MessageType::GameOver => NetMessage::GameOver {
                player: r.read()?,
                winning_ally_teams: r.read_rest().to_vec(),
            },
            MessageType::MapDraw => {
                let player = r.read()?;
                let draw = match r.read::<u8>()? {
                    MAPDRAW_POINT => {
                        let x = r.read()?;
                        let z = r.read()?;
                        let from_lua = r.read()?;
                        MapDraw::Point {
                            x,
                            z,
                            from_lua,
                            label: r.read_string()?,
                        }
                    }
                    MAPDRAW_ERASE => MapDraw::Erase {
                        x: r.read()?,
                        z: r.read()?,
                    },
                    MAPDRAW_LINE => MapDraw::Line {
                        from: (r.read()?, r.read()?),
                        to: (r.read()?, r.read()?),
                        from_lua: r.read()?,
                    },
                    other => return Err(invalid("draw type", other.into())),
                };
                NetMessage::MapDraw { player, draw }
            }
            MessageType::SyncResponse => NetMessage::SyncResponse {
                player: r.read()?,
                frame: r.read()?,
                checksum: r.read()?,
            },
            MessageType::SystemMsg => NetMessage::SystemMsg {
                player: r.read()?,
                text: r.read_string()?,
            },
            MessageType::StartPos => {
                let player = r.read()?;
                let team = r.read()?;
                let ready = r.read()?;
                let pos = Vec3::new(r.read()?, r.read()?, r.read()?);
                NetMessage::StartPos {
                    player,
                    team,
                    ready,
                    pos,
                }
            }
            MessageType::PlayerInfo => NetMessage::PlayerInfo {
                player: r.read()?,
                cpu_usage: r.read()?,
                ping: r.read()?,
            },
            MessageType::PlayerLeft => {
                let player = r.read()?;
                let code = r.read::<u8>()?;
                let reason =
                    LeaveReason::from_code(code).ok_or_else(|| invalid("leave reason", code.into()))?;
                NetMessage::PlayerLeft { player, reason }
            }
            MessageType::LogMsg => NetMessage::LogMsg {
                player: r.read()?,
                text: r.read_string()?,
            },
            MessageType::LuaMsg => NetMessage::LuaMsg {
                player: r.read()?,
                script: r.read()?,
                mode: r.read()?,
                data: r.read_rest().to_vec(),
            },
            MessageType::Team => {
                let player = r.read()?;
                let action_code = r.read::<u8>()?;
                let a = r.read::<u8>()?;
                let b = r.read::<u8>()?;
                let action = match action_code {
                    TEAMMSG_GIVEAWAY => TeamAction::GiveAway {
                        to_team: a,
                        from_team: b,
                    },
                    TEAMMSG_RESIGN => TeamAction::Resign,
                    TEAMMSG_TEAM_DIED => TeamAction::TeamDied { team: a },
                    TEAMMSG_JOIN_TEAM => TeamAction::JoinTeam { team: a },
                    other => return Err(invalid("team action", other.into())),
                };
                NetMessage::Team { player, action }
            }
            MessageType::GameData => NetMessage::GameData(GameData::unpack(data)?),
            MessageType::Alliance => NetMessage::Alliance {
                player: r.read()?,
                ally_team: r.read()?,
                allied: r.read()?,
            },
            MessageType::CCommand => NetMessage::CCommand {
                command: r.read_string()?,
                extra: r.read_string()?,
            },
            MessageType::ClientData => NetMessage::ClientData {
                player: r.read()?,
                data: r.read_rest().to_vec(),
            },
            MessageType::AttemptConnect => NetMessage::AttemptConnect {
                version: r.read()?,
                name: r.read_string()?,
                password: r.read_string()?,
                engine_version: r.read_string()?,
                reconnect: r.read()?,
                netloss: r.read()?,
            },
            MessageType::RejectConnect => NetMessage::RejectConnect {
                reason: r.read_string()?,
            },
            MessageType::AiCreated => NetMessage::AiCreated {
                player: r.read()?,
                ai: r.read()?,
                team: r.read()?,
                name: r.read_string()?,
            },
            MessageType::AiStateChanged => {
                let player = r.read()?;
                let ai = r.read()?;
                let code = r.read::<u8>()?;
                let state = AiState::from_code(code).ok_or_else(|| invalid("ai state", code.into()))?;
                NetMessage::AiStateChanged { player, ai, state }
            }
            MessageType::CreateNewPlayer => NetMessage::CreateNewPlayer {
                player: r.read()?,
                spectator: r.read()?,
                team: r.read()?,
                name: r.read_string()?,
            },
            MessageType::GameFrameProgress => NetMessage::GameFrameProgress { frame: r.read()? },
        };
        Ok(msg)
    }
}
