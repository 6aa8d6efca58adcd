use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::io;
use std::time::{Duration, Instant};

use super::stats::{PacketLossSimulation, SimRng};
use super::transport::{PeerId, Transport};

#[derive(Debug)]
struct DelayedDatagram {
    release_time: Instant,
    order: u64,
    bytes: Vec<u8>,
}

impl PartialEq for DelayedDatagram {
    fn eq(&self, other: &Self) -> bool {
        self.release_time == other.release_time && self.order == other.order
    }
}

impl Eq for DelayedDatagram {}

impl PartialOrd for DelayedDatagram {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DelayedDatagram {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse order for min-heap
        other
            .release_time
            .cmp(&self.release_time)
            .then_with(|| other.order.cmp(&self.order))
    }
}

/// Wraps a transport with seeded loss, duplication and latency on the
/// outbound side.
#[derive(Debug)]
pub struct SimulatedTransport<T: Transport> {
    inner: T,
    config: PacketLossSimulation,
    rng: SimRng,
    outbound: BinaryHeap<DelayedDatagram>,
    next_order: u64,
    dropped: u64,
}

impl<T: Transport> SimulatedTransport<T> {
    pub fn new(inner: T, config: PacketLossSimulation, seed: u64) -> Self {
        Self {
            inner,
            config,
            rng: SimRng::new(seed),
            outbound: BinaryHeap::new(),
            next_order: 0,
            dropped: 0,
        }
    }

    pub fn set_config(&mut self, config: PacketLossSimulation) {
        self.config = config;
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn in_flight(&self) -> usize {
        self.outbound.len()
    }

    fn enqueue(&mut self, bytes: Vec<u8>) {
        let delay = Duration::from_millis(u64::from(self.config.delay_ms(&mut self.rng)));
        self.outbound.push(DelayedDatagram {
            release_time: Instant::now() + delay,
            order: self.next_order,
            bytes,
        });
        self.next_order += 1;
    }

    /// Hands every datagram whose delay has elapsed to the inner transport.
    pub fn release_due(&mut self) -> io::Result<()> {
        let now = Instant::now();
        while self
            .outbound
            .peek()
            .is_some_and(|delayed| delayed.release_time <= now)
        {
            if let Some(delayed) = self.outbound.pop() {
                self.inner.send_datagram(&delayed.bytes)?;
            }
        }
        Ok(())
    }
}

impl<T: Transport> Transport for SimulatedTransport<T> {
    fn send_datagram(&mut self, bytes: &[u8]) -> io::Result<()> {
        if self.config.should_drop(&mut self.rng) {
            self.dropped += 1;
            return self.release_due();
        }
        if self.config.should_duplicate(&mut self.rng) {
            self.enqueue(bytes.to_vec());
        }
        self.enqueue(bytes.to_vec());
        self.release_due()
    }

    fn recv_datagram(&mut self) -> io::Result<Option<Vec<u8>>> {
        self.release_due()?;
        self.inner.recv_datagram()
    }

    fn peer(&self) -> PeerId {
        self.inner.peer()
    }
}
