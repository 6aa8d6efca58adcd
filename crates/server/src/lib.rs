pub mod admin;
pub mod config;
pub mod events;
pub mod participant;
pub mod playback;
mod server;
pub mod speed;
pub mod sync;
pub mod tui;

pub use admin::{AdminCommand, PlayerRef};
pub use config::{ServerConfig, SpeedControl};
pub use events::ServerEvent;
pub use server::{GamePhase, GameServer, ParticipantInfo, ServerError, ServerHandle, ServerStats};
