use std::path::PathBuf;
use std::time::Duration;

use strata::net::PacketLossSimulation;
use strata::{ChannelConfig, GAME_SPEED};

/// Commands a client may not broadcast through CCOMMAND. The host may still
/// run them as server actions.
pub const DEFAULT_COMMAND_BLACKLIST: &[&str] = &[
    "kick",
    "kickbynum",
    "mute",
    "mutebynum",
    "setminspeed",
    "setmaxspeed",
    "nopause",
    "nohelp",
    "cheat",
    "godmode",
    "globallos",
    "nocost",
    "forcestart",
    "nospectatorchat",
    "nospecdraw",
    "skip",
    "reloadcob",
    "reloadcegs",
    "devlua",
    "editdefs",
    "singlestep",
    "spec",
    "specbynum",
];

/// How the server picks the reference CPU load it slows the game down for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SpeedControl {
    /// The busiest player.
    #[default]
    MaxCpu,
    /// The median player. Speed votes from players far above it are refused.
    MedianCpu,
    /// Whatever the player hosting the server reports.
    Host,
}

impl SpeedControl {
    pub fn from_mode(mode: u8) -> Option<Self> {
        match mode {
            0 => Some(SpeedControl::MaxCpu),
            1 => Some(SpeedControl::MedianCpu),
            2 => Some(SpeedControl::Host),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SpeedControl::MaxCpu => "Maximum CPU",
            SpeedControl::MedianCpu => "Average CPU",
            SpeedControl::Host => "Host CPU",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Every n-th frame is a KEYFRAME carrying its number.
    pub keyframe_interval: i32,
    /// Frames between GAME_FRAME_PROGRESS notices.
    pub game_progress_interval: i32,
    pub player_info_interval: Duration,
    /// Sleep between two iterations of the server loop.
    pub poll_interval: Duration,
    pub speed_control: SpeedControl,
    /// Keep the packet cache after the start so players can rejoin.
    pub allow_reconnect: bool,
    /// Silence after which a live link may be taken over by a reconnect.
    pub reconnect_window: Duration,
    /// Frames after which a missing sync response stops holding a frame.
    pub sync_check_timeout: i32,
    /// Frames between two sync warnings of the same kind.
    pub sync_msg_timeout: i32,
    /// The server quits when nobody is connected this long after startup.
    pub pregame_timeout: Duration,
    /// Players that never connected stop blocking the start after this.
    pub autostart_after: Duration,
    pub game_over_linger: Duration,
    pub command_blacklist: Vec<String>,
    pub channel: ChannelConfig,
    pub record_demo: Option<PathBuf>,
    /// Applied to every accepted UDP link. For testing under bad networks.
    pub packet_loss: Option<PacketLossSimulation>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            keyframe_interval: 16,
            game_progress_interval: GAME_SPEED * 10,
            player_info_interval: Duration::from_secs(2),
            poll_interval: Duration::from_millis(10),
            speed_control: SpeedControl::default(),
            allow_reconnect: false,
            reconnect_window: Duration::from_secs(15),
            sync_check_timeout: 300,
            sync_msg_timeout: 400,
            pregame_timeout: Duration::from_secs(30),
            autostart_after: Duration::from_secs(30),
            game_over_linger: Duration::from_secs(180),
            command_blacklist: DEFAULT_COMMAND_BLACKLIST
                .iter()
                .map(|s| s.to_string())
                .collect(),
            channel: ChannelConfig::default(),
            record_demo: None,
            packet_loss: None,
        }
    }
}
