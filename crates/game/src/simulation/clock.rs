use std::time::Duration;

use crate::net::GAME_SPEED;

const MAX_SERVER_ELAPSED: Duration = Duration::from_millis(200);
const BACKLOG_MIX: f32 = 0.1;

fn mix(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

/// Client side frame pacing. Turns elapsed time and the number of buffered
/// frame-advance messages into how many frames to simulate this tick.
#[derive(Debug, Clone)]
pub struct ClientPacer {
    speed: f32,
    paused: bool,
    time_left: f32,
    smoothed_backlog: f32,
    max_frames_per_tick: u32,
    empty_reset: f32,
}

impl ClientPacer {
    pub fn new(max_frames_per_tick: u32) -> Self {
        Self {
            speed: 1.0,
            paused: false,
            time_left: 0.0,
            smoothed_backlog: 0.0,
            max_frames_per_tick: max_frames_per_tick.max(1),
            empty_reset: -1.0,
        }
    }

    /// Accumulator value, in frames, after a tick that found no frames
    /// buffered. Must be negative.
    pub fn with_empty_reset(mut self, frames: f32) -> Self {
        self.empty_reset = -frames.abs();
        self
    }

    pub fn speed(&self) -> f32 {
        self.speed
    }

    pub fn set_speed(&mut self, speed: f32) {
        self.speed = speed.max(0.0);
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
    }

    pub fn max_frames_per_tick(&self) -> u32 {
        self.max_frames_per_tick
    }

    /// Frames per second the client currently consumes. Grows with the
    /// smoothed backlog so a burst drains over several ticks.
    pub fn consume_speed(&self) -> f32 {
        GAME_SPEED as f32 * self.speed + self.smoothed_backlog - 2.0 * self.speed
    }

    /// Returns how many buffered frames to advance now; never more than
    /// `backlog` nor the per-tick cap.
    pub fn update(&mut self, elapsed: Duration, backlog: usize) -> u32 {
        let queued = backlog as f32;
        if queued < self.smoothed_backlog {
            self.smoothed_backlog = queued;
        } else {
            self.smoothed_backlog = mix(self.smoothed_backlog, queued, BACKLOG_MIX);
        }

        if self.paused {
            return 0;
        }
        if backlog == 0 {
            self.time_left = self.empty_reset;
            return 0;
        }

        self.time_left += self.consume_speed().max(0.0) * elapsed.as_secs_f32();
        let cap = self.max_frames_per_tick as f32;
        let allowed = self.time_left.floor().clamp(0.0, cap) as u32;
        let frames = allowed.min(backlog.min(u32::MAX as usize) as u32);
        self.time_left = (self.time_left - frames as f32).min(cap);
        frames
    }
}

impl Default for ClientPacer {
    fn default() -> Self {
        Self::new(2 * GAME_SPEED as u32)
    }
}

/// How far a client running in the server's process trails the server.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocalLag {
    pub frames_behind: u32,
    pub sim_fps: f32,
}

/// Server side frame generation, driven only by wall-clock time.
#[derive(Debug, Clone)]
pub struct ServerPacer {
    internal_speed: f32,
    paused: bool,
    time_left: f32,
}

impl ServerPacer {
    pub fn new(internal_speed: f32) -> Self {
        Self {
            internal_speed,
            paused: false,
            time_left: 0.0,
        }
    }

    pub fn internal_speed(&self) -> f32 {
        self.internal_speed
    }

    pub fn set_internal_speed(&mut self, speed: f32) {
        self.internal_speed = speed.max(0.0);
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Pausing discards time banked so far; resuming does not catch up.
    pub fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
        if paused {
            self.time_left = 0.0;
        }
    }

    /// Frames to generate for `elapsed` wall-clock time.
    pub fn update(&mut self, elapsed: Duration, local_lag: Option<LocalLag>) -> u32 {
        if self.paused {
            return 0;
        }
        let secs = elapsed.min(MAX_SERVER_ELAPSED).as_secs_f32();
        self.time_left += GAME_SPEED as f32 * self.internal_speed * secs;
        self.time_left = self.time_left.min(GAME_SPEED as f32);

        let mut new_frames = self.time_left.ceil().max(0.0) as u32;
        if let Some(lag) = local_lag {
            let behind = (lag.frames_behind as f32 / GAME_SPEED as f32).min(1.0);
            let max_frames = mix(lag.sim_fps.max(GAME_SPEED as f32), 0.0, behind);
            new_frames = new_frames.min(max_frames as u32);
        }
        self.time_left -= new_frames as f32;
        new_frames
    }
}
