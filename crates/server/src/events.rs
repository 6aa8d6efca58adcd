use strata::net::LeaveReason;

/// Things the server reports to whoever drives it (TUI, logs, tests).
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    ConnectionAttempt {
        name: String,
        peer: String,
        reconnect: bool,
    },
    PlayerConnected {
        player: u8,
        name: String,
        reconnect: bool,
    },
    PlayerJoined {
        player: u8,
        name: String,
    },
    PlayerLeft {
        player: u8,
        reason: LeaveReason,
    },
    ConnectionDenied {
        peer: String,
        reason: String,
    },
    GameStarted,
    GameOver {
        winning_ally_teams: Vec<u8>,
    },
    Desync {
        frame: i32,
        players: Vec<u8>,
    },
    Message {
        text: String,
    },
    Error {
        message: String,
    },
}
