use strata::GAME_SPEED;

use crate::config::SpeedControl;

/// Lowest speed lag protection may slow the game to.
const MIN_INTERNAL_SPEED: f32 = 0.1;

/// One player's contribution to lag protection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpeedSample {
    pub player: u8,
    pub cpu: f32,
    /// Frames the player trails the server by.
    pub ping: i32,
    pub is_local: bool,
    pub reconnecting: bool,
}

/// Tracks the speed players asked for (`user`) and the speed the server
/// actually runs at (`internal`), which lag protection lowers below `user`
/// when the reference CPU load is too high.
#[derive(Debug, Clone)]
pub struct SpeedGovernor {
    mode: SpeedControl,
    min_speed: f32,
    max_speed: f32,
    user_speed: f32,
    internal_speed: f32,
    median_cpu: f32,
    median_ping: i32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UserSpeedChange {
    pub user_speed: f32,
    /// Set when the internal speed has to follow.
    pub internal_speed: Option<f32>,
}

impl SpeedGovernor {
    pub fn new(mode: SpeedControl, min_speed: f32, max_speed: f32, user_speed: f32) -> Self {
        let user_speed = user_speed.clamp(min_speed, max_speed);
        Self {
            mode,
            min_speed,
            max_speed,
            user_speed,
            internal_speed: user_speed,
            median_cpu: 0.0,
            median_ping: 0,
        }
    }

    pub fn mode(&self) -> SpeedControl {
        self.mode
    }

    pub fn set_mode(&mut self, mode: SpeedControl) {
        self.mode = mode;
    }

    pub fn user_speed(&self) -> f32 {
        self.user_speed
    }

    pub fn internal_speed(&self) -> f32 {
        self.internal_speed
    }

    pub fn set_internal_speed(&mut self, speed: f32) {
        self.internal_speed = speed;
    }

    pub fn min_speed(&self) -> f32 {
        self.min_speed
    }

    pub fn max_speed(&self) -> f32 {
        self.max_speed
    }

    pub fn set_min_speed(&mut self, speed: f32) {
        self.min_speed = speed.clamp(0.01, self.max_speed);
    }

    pub fn set_max_speed(&mut self, speed: f32) {
        self.max_speed = speed.max(self.min_speed);
    }

    pub fn median_cpu(&self) -> f32 {
        self.median_cpu
    }

    pub fn median_ping(&self) -> i32 {
        self.median_ping
    }

    /// Recomputes the internal speed from the reference set. Returns the new
    /// speed when it changed.
    pub fn lag_protection(&mut self, samples: &[SpeedSample], paused: bool) -> Option<f32> {
        let counted: Vec<&SpeedSample> = samples.iter().filter(|s| !s.reconnecting).collect();
        let max_cpu = counted.iter().map(|s| s.cpu).fold(0.0f32, f32::max);

        let reference = match self.mode {
            SpeedControl::MaxCpu => max_cpu,
            SpeedControl::MedianCpu => {
                let mut cpu: Vec<f32> = counted.iter().map(|s| s.cpu).collect();
                let mut ping: Vec<i32> = counted.iter().map(|s| s.ping).collect();
                cpu.sort_by(f32::total_cmp);
                ping.sort_unstable();
                self.median_cpu = median_f32(&cpu);
                self.median_ping = median_i32(&ping);
                self.median_cpu
            }
            SpeedControl::Host => counted
                .iter()
                .find(|s| s.is_local)
                .map_or(max_cpu, |s| s.cpu),
        };

        if reference <= 0.0 || paused {
            return None;
        }

        let median = self.mode == SpeedControl::MedianCpu;
        let wanted = if median { 0.60 } else { 0.75 }
            + (1.0 - self.internal_speed / self.user_speed) * 0.5;
        let mut speed = ((self.internal_speed * wanted / reference) + self.internal_speed) / 2.0;
        speed = speed.clamp(MIN_INTERNAL_SPEED, self.user_speed.max(MIN_INTERNAL_SPEED));
        if self.user_speed <= 2.0 {
            let floor = self.user_speed * if median { 0.8 } else { 0.5 };
            speed = speed.max(floor);
        }

        if speed != self.internal_speed {
            self.internal_speed = speed;
            Some(speed)
        } else {
            None
        }
    }

    /// In median mode a player far above the median load or ping does not
    /// get to vote on the speed.
    pub fn vote_rejected(&self, cpu: f32, ping: i32, spectator: bool) -> bool {
        if self.mode != SpeedControl::MedianCpu {
            return false;
        }
        let cpu_slack = (0.8 - self.median_cpu).max(0.0).min(0.2);
        let ping_slack = (self.internal_speed * GAME_SPEED as f32 / 2.0) as i32;
        spectator || cpu - self.median_cpu > cpu_slack || ping - self.median_ping > ping_slack
    }

    pub fn request_user_speed(&mut self, speed: f32) -> Option<UserSpeedChange> {
        let speed = speed.clamp(self.min_speed, self.max_speed);
        if speed == self.user_speed {
            return None;
        }
        let internal_speed = (self.internal_speed > speed
            || self.internal_speed == self.user_speed)
            .then_some(speed);
        if let Some(internal) = internal_speed {
            self.internal_speed = internal;
        }
        self.user_speed = speed;
        Some(UserSpeedChange {
            user_speed: speed,
            internal_speed,
        })
    }
}

fn median_f32(sorted: &[f32]) -> f32 {
    match sorted.len() {
        0 => 0.0,
        n if n % 2 == 1 => sorted[n / 2],
        n => (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0,
    }
}

fn median_i32(sorted: &[i32]) -> i32 {
    match sorted.len() {
        0 => 0,
        n if n % 2 == 1 => sorted[n / 2],
        n => (sorted[n / 2 - 1] + sorted[n / 2]) / 2,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sample(player: u8, cpu: f32) -> SpeedSample {
        SpeedSample {
            player,
            cpu,
            ping: 0,
            is_local: false,
            reconnecting: false,
        }
    }

    #[test]
    fn overloaded_player_slows_the_game() {
        let mut speed = SpeedGovernor::new(SpeedControl::MaxCpu, 0.3, 3.0, 1.0);
        let new = speed
            .lag_protection(&[sample(0, 0.2), sample(1, 1.5)], false)
            .unwrap();
        assert!(new < 1.0);
        assert!(new >= 0.5);
        assert_eq!(speed.internal_speed(), new);
    }

    #[test]
    fn idle_players_keep_full_speed() {
        let mut speed = SpeedGovernor::new(SpeedControl::MaxCpu, 0.3, 3.0, 1.0);
        assert_eq!(speed.lag_protection(&[sample(0, 0.1)], false), None);
        assert_eq!(speed.internal_speed(), 1.0);
    }

    #[test]
    fn nothing_changes_while_paused() {
        let mut speed = SpeedGovernor::new(SpeedControl::MaxCpu, 0.3, 3.0, 1.0);
        assert_eq!(speed.lag_protection(&[sample(0, 5.0)], true), None);
    }

    #[test]
    fn reconnecting_players_do_not_count() {
        let mut speed = SpeedGovernor::new(SpeedControl::MaxCpu, 0.3, 3.0, 1.0);
        let busy = SpeedSample {
            reconnecting: true,
            ..sample(1, 1.0)
        };
        assert_eq!(speed.lag_protection(&[sample(0, 0.1), busy], false), None);
    }

    #[test]
    fn median_of_even_count_averages_middle_pair() {
        let mut speed = SpeedGovernor::new(SpeedControl::MedianCpu, 0.3, 3.0, 1.0);
        let samples = [
            SpeedSample { ping: 10, ..sample(0, 0.1) },
            SpeedSample { ping: 20, ..sample(1, 0.3) },
            SpeedSample { ping: 40, ..sample(2, 0.5) },
            SpeedSample { ping: 90, ..sample(3, 0.9) },
        ];
        speed.lag_protection(&samples, false);
        assert!((speed.median_cpu() - 0.4).abs() < 1e-6);
        assert_eq!(speed.median_ping(), 30);
    }

    #[test]
    fn host_mode_follows_local_cpu() {
        let mut speed = SpeedGovernor::new(SpeedControl::Host, 0.3, 3.0, 1.0);
        let host = SpeedSample {
            is_local: true,
            ..sample(0, 0.1)
        };
        assert_eq!(speed.lag_protection(&[host, sample(1, 3.0)], false), None);
    }

    #[test]
    fn median_mode_rejects_outliers() {
        let mut speed = SpeedGovernor::new(SpeedControl::MedianCpu, 0.3, 3.0, 1.0);
        speed.lag_protection(&[sample(0, 0.3), sample(1, 0.3), sample(2, 0.3)], false);
        assert!(!speed.vote_rejected(0.4, 0, false));
        assert!(speed.vote_rejected(0.6, 0, false));
        assert!(speed.vote_rejected(0.3, 0, true));
        assert!(speed.vote_rejected(0.3, GAME_SPEED, false));

        let max = SpeedGovernor::new(SpeedControl::MaxCpu, 0.3, 3.0, 1.0);
        assert!(!max.vote_rejected(5.0, 1000, true));
    }

    #[test]
    fn user_speed_is_clamped_and_drags_internal() {
        let mut speed = SpeedGovernor::new(SpeedControl::MaxCpu, 0.3, 3.0, 1.0);
        let change = speed.request_user_speed(10.0).unwrap();
        assert_eq!(change.user_speed, 3.0);
        assert_eq!(change.internal_speed, Some(3.0));
        assert_eq!(speed.request_user_speed(4.0), None);

        speed.set_internal_speed(1.0);
        let change = speed.request_user_speed(2.0).unwrap();
        assert_eq!(change.internal_speed, None);
        assert_eq!(speed.internal_speed(), 1.0);

        let change = speed.request_user_speed(0.5).unwrap();
        assert_eq!(change.internal_speed, Some(0.5));
    }

    proptest! {
        #[test]
        fn internal_speed_stays_between_floor_and_user(
            mode in prop_oneof![
                Just(SpeedControl::MaxCpu),
                Just(SpeedControl::MedianCpu),
                Just(SpeedControl::Host),
            ],
            user in 0.3f32..3.0,
            rounds in prop::collection::vec(prop::collection::vec(0.0f32..4.0, 0..6), 1..10),
        ) {
            let mut speed = SpeedGovernor::new(mode, 0.3, 3.0, user);
            for cpus in rounds {
                let samples: Vec<SpeedSample> = cpus
                    .iter()
                    .enumerate()
                    .map(|(i, &cpu)| sample(i as u8, cpu))
                    .collect();
                speed.lag_protection(&samples, false);
                prop_assert!(speed.internal_speed() >= MIN_INTERNAL_SPEED);
                prop_assert!(speed.internal_speed() <= speed.user_speed());
            }
        }
    }
}
