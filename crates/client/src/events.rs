use strata::net::{ChatDestination, LeaveReason};

/// Things the client reports to whoever drives it.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    Connected {
        player: u8,
    },
    Rejected {
        reason: String,
    },
    Countdown {
        millis: u32,
    },
    GameStarted,
    Chat {
        from: u8,
        destination: ChatDestination,
        text: String,
    },
    SystemMessage {
        text: String,
    },
    PlayerJoined {
        player: u8,
        name: String,
    },
    PlayerLeft {
        player: u8,
        reason: LeaveReason,
    },
    Paused {
        by: u8,
        paused: bool,
    },
    SpeedChanged {
        speed: f32,
    },
    GameOver {
        winning_ally_teams: Vec<u8>,
    },
    Ended {
        reason: String,
    },
}
