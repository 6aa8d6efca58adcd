use std::time::Duration;

use strata::{ChannelConfig, GAME_SPEED};

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub name: String,
    pub password: String,
    /// Queued messages inspected per tick when counting buffered frames.
    pub peek_limit: usize,
    /// Cap on frames simulated in one tick while catching up.
    pub max_frames_per_tick: u32,
    /// Resend interval for the connection attempt until the server answers.
    pub handshake_retry: Duration,
    pub cpu_report_interval: Duration,
    /// Percent of outgoing packets the server should drop for us, for
    /// testing bad links.
    pub netloss: u8,
    pub channel: ChannelConfig,
}

impl ClientConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = password.into();
        self
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            name: "player".into(),
            password: String::new(),
            peek_limit: 5 * GAME_SPEED as usize,
            max_frames_per_tick: 2 * GAME_SPEED as u32,
            handshake_retry: Duration::from_secs(1),
            cpu_report_interval: Duration::from_secs(1),
            netloss: 0,
            channel: ChannelConfig::default(),
        }
    }
}
