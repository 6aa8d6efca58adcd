mod channel;
mod chat;
pub mod codec;
mod listener;
mod message;
mod packet;
mod protocol;
mod simulator;
mod stats;
mod tracking;
mod transport;

pub use channel::{ChannelConfig, ChannelError, ConnectionChannel, HANDSHAKE_SEQ, MAX_CHUNK_PAYLOAD};
pub use chat::{ChatDestination, ChatMessage, ChatParty, TO_ALLIES, TO_EVERYONE, TO_SPECTATORS};
pub use listener::{PendingConnection, UdpListener};
pub use message::{FrameError, LengthRule, MessageSplitter, MessageType, Origin, message_length};
pub use packet::RawPacket;
pub use protocol::{
    AiState, DEFAULT_PORT, GAME_SPEED, LeaveReason, MapDraw, NETWORK_VERSION, NetMessage,
    PlayerStatistics, ProtocolError, SERVER_PLAYER, TeamAction,
};
pub use simulator::SimulatedTransport;
pub use stats::{NetworkStats, PacketLossSimulation, SimRng, rand_u64};
pub use tracking::{Received, ReorderBuffer, RttEstimator};
pub use transport::{LoopbackTransport, MAX_DATAGRAM_SIZE, PeerId, Transport, UdpTransport};
