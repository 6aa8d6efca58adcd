use std::collections::BTreeMap;
use std::time::Duration;

use super::packet::RawPacket;

const MIN_RTO_MS: f32 = 30.0;
const MAX_RTO_MS: f32 = 2000.0;

/// Smoothed round-trip estimate, fed with samples from chunks that were
/// acked after a single transmission.
#[derive(Debug, Clone)]
pub struct RttEstimator {
    srtt: f32,
    rtt_var: f32,
    samples: u64,
}

impl Default for RttEstimator {
    fn default() -> Self {
        Self::new()
    }
}

impl RttEstimator {
    pub fn new() -> Self {
        Self {
            srtt: 100.0,
            rtt_var: 50.0,
            samples: 0,
        }
    }

    pub fn sample(&mut self, rtt_ms: f32) {
        const ALPHA: f32 = 0.125;
        const BETA: f32 = 0.25;

        if self.samples == 0 {
            self.srtt = rtt_ms;
            self.rtt_var = rtt_ms / 2.0;
        } else {
            let diff = (rtt_ms - self.srtt).abs();
            self.rtt_var = (1.0 - BETA) * self.rtt_var + BETA * diff;
            self.srtt = (1.0 - ALPHA) * self.srtt + ALPHA * rtt_ms;
        }
        self.samples += 1;
    }

    pub fn srtt(&self) -> f32 {
        self.srtt
    }

    pub fn rtt_var(&self) -> f32 {
        self.rtt_var
    }

    /// Retransmission timeout.
    pub fn rto(&self) -> Duration {
        let ms = (self.srtt + 4.0 * self.rtt_var).clamp(MIN_RTO_MS, MAX_RTO_MS);
        Duration::from_secs_f32(ms / 1000.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Received {
    Accepted,
    Duplicate,
    OutOfWindow,
}

/// Holds chunks that arrived ahead of a gap until the gap is filled.
#[derive(Debug)]
pub struct ReorderBuffer {
    next_expected: u32,
    pending: BTreeMap<u32, RawPacket>,
    window: u32,
}

impl ReorderBuffer {
    pub fn new(window: u32) -> Self {
        Self {
            next_expected: 0,
            pending: BTreeMap::new(),
            window,
        }
    }

    /// Cumulative ack: every chunk below this has been delivered.
    pub fn next_expected(&self) -> u32 {
        self.next_expected
    }

    pub fn buffered(&self) -> usize {
        self.pending.len()
    }

    pub fn insert(&mut self, seq: u32, chunk: RawPacket) -> Received {
        if seq < self.next_expected || self.pending.contains_key(&seq) {
            return Received::Duplicate;
        }
        if seq - self.next_expected >= self.window {
            return Received::OutOfWindow;
        }
        self.pending.insert(seq, chunk);
        Received::Accepted
    }

    pub fn pop_ready(&mut self) -> Option<RawPacket> {
        let chunk = self.pending.remove(&self.next_expected)?;
        self.next_expected += 1;
        Some(chunk)
    }
}
