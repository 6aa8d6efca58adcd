pub mod config;
pub mod events;
pub mod host;
pub mod roster;
pub mod session;
pub mod sim_loop;

pub use config::ClientConfig;
pub use events::ClientEvent;
pub use host::{LocalHost, host_game};
pub use roster::{Roster, RosterEntry};
pub use session::{ClientError, ClientSession, SessionState};
pub use sim_loop::{ClientSimLoop, SimulationFactory};
