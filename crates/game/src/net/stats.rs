#[derive(Debug, Clone, Default, PartialEq)]
pub struct NetworkStats {
    pub packets_sent: u64,
    pub packets_received: u64,
    pub packets_resent: u64,
    pub duplicates_dropped: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub rtt_ms: f32,
    pub rtt_variance: f32,
}

impl NetworkStats {
    pub fn resend_percent(&self) -> f32 {
        if self.packets_sent == 0 {
            return 0.0;
        }
        self.packets_resent as f32 * 100.0 / self.packets_sent as f32
    }
}

#[derive(Debug, Clone, Default)]
pub struct PacketLossSimulation {
    pub enabled: bool,
    pub loss_percent: f32,
    pub duplicate_percent: f32,
    pub min_latency_ms: u32,
    pub max_latency_ms: u32,
    pub jitter_ms: u32,
}

impl PacketLossSimulation {
    pub fn lossy(loss_percent: f32) -> Self {
        Self {
            enabled: true,
            loss_percent,
            ..Default::default()
        }
    }

    pub fn should_drop(&self, rng: &mut SimRng) -> bool {
        if !self.enabled || self.loss_percent <= 0.0 {
            return false;
        }
        rng.percent() < self.loss_percent
    }

    pub fn should_duplicate(&self, rng: &mut SimRng) -> bool {
        self.enabled && self.duplicate_percent > 0.0 && rng.percent() < self.duplicate_percent
    }

    pub fn delay_ms(&self, rng: &mut SimRng) -> u32 {
        if !self.enabled || self.max_latency_ms == 0 {
            return 0;
        }
        let base = self.min_latency_ms;
        let range = self.max_latency_ms.saturating_sub(self.min_latency_ms);
        let jitter = if self.jitter_ms > 0 {
            (rng.unit() * self.jitter_ms as f32) as u32
        } else {
            0
        };
        base + (rng.unit() * range as f32) as u32 + jitter
    }
}

/// Small xorshift generator so simulated loss can be replayed from a seed.
#[derive(Debug, Clone)]
pub struct SimRng(u64);

impl SimRng {
    pub fn new(seed: u64) -> Self {
        Self(seed.max(1))
    }

    pub fn from_entropy() -> Self {
        Self::new(rand_u64())
    }

    pub fn next_u64(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.0 = x;
        x
    }

    pub fn unit(&mut self) -> f32 {
        (self.next_u64() >> 40) as f32 / (1u64 << 24) as f32
    }

    pub fn percent(&mut self) -> f32 {
        self.unit() * 100.0
    }
}

pub fn rand_u64() -> u64 {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};
    use std::time::{Instant, SystemTime};

    let mut hasher = DefaultHasher::new();
    Instant::now().hash(&mut hasher);
    SystemTime::now().hash(&mut hasher);
    std::thread::current().id().hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_rng_is_reproducible() {
        let mut a = SimRng::new(7);
        let mut b = SimRng::new(7);
        for _ in 0..100 {
            assert_eq!(a.next_u64(), b.next_u64());
        }
        let u = a.unit();
        assert!((0.0..1.0).contains(&u));
    }

    #[test]
    fn disabled_simulation_never_drops() {
        let sim = PacketLossSimulation {
            loss_percent: 100.0,
            ..Default::default()
        };
        let mut rng = SimRng::new(1);
        assert!(!sim.should_drop(&mut rng));
        assert!(PacketLossSimulation::lossy(100.0).should_drop(&mut rng));
    }
}
