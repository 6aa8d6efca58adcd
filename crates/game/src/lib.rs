pub mod ai;
pub mod command;
pub mod demo;
pub mod net;
pub mod setup;
pub mod simulation;

/// Player slots 0..MAX_PLAYERS; 255 is reserved for the server itself.
pub const MAX_PLAYERS: usize = 251;

pub use command::{Command, CommandOptions};
pub use demo::{DemoError, DemoHeader, DemoReader, DemoRecord, DemoTrailer, DemoWriter};
pub use net::{
    ChannelConfig, ChannelError, ConnectionChannel, GAME_SPEED, LoopbackTransport, MessageType,
    NETWORK_VERSION, NetMessage, ProtocolError, RawPacket, SERVER_PLAYER, Transport,
};
pub use setup::{GameData, GameSetup, SetupError};
pub use simulation::{ChecksumSimulation, ClientPacer, ServerPacer, Simulation};
