//! Reliable, ordered message stream to one peer over an unreliable
//! [`Transport`].
//!
//! Outbound messages are appended to a byte stream that is cut into numbered
//! chunks. Every datagram carries a cumulative ack, so a chunk is resent until
//! the peer reports it received. The receiver restores chunk order, glues the
//! payloads back together and splits complete messages off the front. A
//! message may therefore span several datagrams.
//!
//! Datagram layout (little-endian):
//!
//! ```text
//! u32 first_chunk | u32 ack | u8 chunk_count | { u16 len, [u8; len] } * chunk_count
//! ```
//!
//! `first_chunk == HANDSHAKE_SEQ` marks an out-of-band handshake datagram. Its
//! single chunk holds one whole message and never enters the stream.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use super::codec::{CodecResult, UnpackPacket};
use super::message::{MessageSplitter, message_length};
use super::packet::RawPacket;
use super::stats::NetworkStats;
use super::tracking::{Received, ReorderBuffer, RttEstimator};
use super::transport::{MAX_DATAGRAM_SIZE, PeerId, Transport};

pub const DATAGRAM_HEADER_LEN: usize = 9;
pub const CHUNK_HEADER_LEN: usize = 2;
pub const MAX_CHUNK_PAYLOAD: usize = MAX_DATAGRAM_SIZE - DATAGRAM_HEADER_LEN - CHUNK_HEADER_LEN;
pub const HANDSHAKE_SEQ: u32 = u32::MAX;

const MAX_BACKOFF_SHIFT: u32 = 4;

#[derive(Debug, Clone)]
pub struct ChannelConfig {
    pub timeout_in_game: Duration,
    pub timeout_pregame: Duration,
    pub keepalive_interval: Duration,
    /// Largest chunk payload; at most [`MAX_CHUNK_PAYLOAD`].
    pub chunk_size: usize,
    /// Chunks the receiver buffers ahead of a gap, and the sender keeps in
    /// flight.
    pub reorder_window: u32,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            timeout_in_game: Duration::from_secs(30),
            timeout_pregame: Duration::from_secs(600),
            keepalive_interval: Duration::from_secs(1),
            chunk_size: MAX_CHUNK_PAYLOAD,
            reorder_window: 4096,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("channel to {0} is closed")]
    Closed(PeerId),
    #[error("transport error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug)]
struct OutboundChunk {
    seq: u32,
    payload: Vec<u8>,
    last_sent: Option<Instant>,
    transmissions: u32,
}

/// Header fields of a parsed datagram.
#[derive(Debug)]
struct Datagram<'a> {
    first_chunk: u32,
    ack: u32,
    chunks: Vec<&'a [u8]>,
}

fn parse_datagram(bytes: &[u8]) -> CodecResult<Datagram<'_>> {
    let mut reader = UnpackPacket::new(bytes, 0);
    let first_chunk = reader.read::<u32>()?;
    let ack = reader.read::<u32>()?;
    let count = reader.read::<u8>()?;
    let mut chunks = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let len = reader.read::<u16>()? as usize;
        chunks.push(reader.read_bytes(len)?);
    }
    Ok(Datagram {
        first_chunk,
        ack,
        chunks,
    })
}

fn write_header(out: &mut Vec<u8>, first_chunk: u32, ack: u32, count: u8) {
    out.extend_from_slice(&first_chunk.to_le_bytes());
    out.extend_from_slice(&ack.to_le_bytes());
    out.push(count);
}

pub struct ConnectionChannel {
    transport: Box<dyn Transport>,
    config: ChannelConfig,
    peer: PeerId,

    outbound_stream: Vec<u8>,
    unacked: VecDeque<OutboundChunk>,
    next_send_seq: u32,

    reorder: ReorderBuffer,
    assembly: Vec<u8>,
    inbound: VecDeque<RawPacket>,
    ack_pending: bool,

    rtt: RttEstimator,
    stats: NetworkStats,
    last_receive: Instant,
    last_send: Instant,
    in_game: bool,
    closed: bool,
}

impl ConnectionChannel {
    pub fn new(transport: impl Transport + 'static, config: ChannelConfig) -> Self {
        Self::from_boxed(Box::new(transport), config)
    }

    pub fn from_boxed(transport: Box<dyn Transport>, mut config: ChannelConfig) -> Self {
        config.chunk_size = config.chunk_size.clamp(1, MAX_CHUNK_PAYLOAD);
        let now = Instant::now();
        let peer = transport.peer();
        Self {
            transport,
            reorder: ReorderBuffer::new(config.reorder_window),
            config,
            peer,
            outbound_stream: Vec::new(),
            unacked: VecDeque::new(),
            next_send_seq: 0,
            assembly: Vec::new(),
            inbound: VecDeque::new(),
            ack_pending: false,
            rtt: RttEstimator::new(),
            stats: NetworkStats::default(),
            last_receive: now,
            last_send: now,
            in_game: false,
            closed: false,
        }
    }

    pub fn peer(&self) -> PeerId {
        self.peer
    }

    /// Switches between the pregame and in-game liveness windows.
    pub fn set_in_game(&mut self, in_game: bool) {
        self.in_game = in_game;
    }

    /// Queues a message. It is sent on the next [`flush`](Self::flush) and
    /// retried until acknowledged.
    pub fn send(&mut self, packet: &RawPacket) -> Result<(), ChannelError> {
        if self.closed {
            return Err(ChannelError::Closed(self.peer));
        }
        self.outbound_stream.extend_from_slice(packet.bytes());
        Ok(())
    }

    /// Sends `packet` once, outside the ordered stream.
    pub fn send_handshake(&mut self, packet: &RawPacket) -> Result<(), ChannelError> {
        if self.closed {
            return Err(ChannelError::Closed(self.peer));
        }
        let mut datagram = Vec::with_capacity(DATAGRAM_HEADER_LEN + CHUNK_HEADER_LEN + packet.len());
        write_header(&mut datagram, HANDSHAKE_SEQ, self.reorder.next_expected(), 1);
        datagram.extend_from_slice(&(packet.len() as u16).to_le_bytes());
        datagram.extend_from_slice(packet.bytes());
        self.transport.send_datagram(&datagram)?;
        self.stats.packets_sent += 1;
        self.stats.bytes_sent += datagram.len() as u64;
        Ok(())
    }

    /// The handshake message carried by a datagram, if it is one.
    pub fn handshake_payload(datagram: &[u8]) -> Option<RawPacket> {
        let parsed = parse_datagram(datagram).ok()?;
        if parsed.first_chunk != HANDSHAKE_SEQ {
            return None;
        }
        let chunk = *parsed.chunks.first()?;
        let len = message_length(chunk).ok()?;
        Some(RawPacket::from_slice(&chunk[..len]))
    }

    /// Next message in the order the peer sent it.
    pub fn receive(&mut self) -> Option<RawPacket> {
        self.pump();
        self.inbound.pop_front()
    }

    /// Looks at the `n`th queued message without consuming it.
    pub fn peek(&mut self, n: usize) -> Option<&RawPacket> {
        self.pump();
        self.inbound.get(n)
    }

    /// Removes the `n`th queued message, leaving the others in order.
    pub fn delete_at(&mut self, n: usize) -> Option<RawPacket> {
        self.inbound.remove(n)
    }

    pub fn queued(&self) -> usize {
        self.inbound.len()
    }

    /// True once nothing, keep-alives included, arrived for the liveness
    /// window.
    pub fn check_timeout(&self, now: Instant) -> bool {
        let window = if self.in_game {
            self.config.timeout_in_game
        } else {
            self.config.timeout_pregame
        };
        now.saturating_duration_since(self.last_receive) > window
    }

    pub fn last_receive(&self) -> Instant {
        self.last_receive
    }

    /// Moves the channel onto a new transport. Unacknowledged chunks are
    /// replayed ahead of anything queued later. Returns `false` when the
    /// transport reaches the peer already bound.
    pub fn rebind(&mut self, transport: Box<dyn Transport>) -> bool {
        let peer = transport.peer();
        if peer == self.peer {
            log::debug!("ignoring rebind of {peer} to itself");
            return false;
        }
        log::info!(
            "rebinding channel {} -> {peer}, replaying {} chunks",
            self.peer,
            self.unacked.len()
        );
        self.transport = transport;
        self.peer = peer;
        for chunk in &mut self.unacked {
            chunk.last_sent = None;
        }
        self.ack_pending = true;
        self.last_receive = Instant::now();
        self.closed = false;
        true
    }

    /// Feeds a datagram that arrived before this channel owned the
    /// transport.
    pub fn inject(&mut self, datagram: &[u8]) {
        self.handle_datagram(datagram, Instant::now());
    }

    /// Sends new chunks, due retransmissions and keep-alives.
    pub fn flush(&mut self, now: Instant) -> Result<(), ChannelError> {
        if self.closed {
            return Ok(());
        }
        self.cut_chunks();

        let rto = self.rtt.rto();
        let ack = self.reorder.next_expected();
        let window_end = self
            .unacked
            .front()
            .map_or(self.next_send_seq, |c| c.seq)
            .saturating_add(self.config.reorder_window);

        let mut datagrams: Vec<Vec<u8>> = Vec::new();
        let mut current: Vec<u8> = Vec::new();
        let mut count: u8 = 0;
        let mut last_seq: Option<u32> = None;

        for chunk in self.unacked.iter_mut() {
            if chunk.seq >= window_end {
                break;
            }
            let due = match chunk.last_sent {
                None => true,
                Some(sent) => {
                    let shift = chunk.transmissions.saturating_sub(1).min(MAX_BACKOFF_SHIFT);
                    now.saturating_duration_since(sent) >= rto * (1u32 << shift)
                }
            };
            if !due {
                continue;
            }

            let contiguous = last_seq.is_some_and(|seq| seq.wrapping_add(1) == chunk.seq);
            let fits = current.len() + CHUNK_HEADER_LEN + chunk.payload.len() <= MAX_DATAGRAM_SIZE;
            if count > 0 && (!contiguous || !fits || count == u8::MAX) {
                current[8] = count;
                datagrams.push(std::mem::take(&mut current));
                count = 0;
            }
            if count == 0 {
                write_header(&mut current, chunk.seq, ack, 0);
            }
            current.extend_from_slice(&(chunk.payload.len() as u16).to_le_bytes());
            current.extend_from_slice(&chunk.payload);
            count += 1;
            last_seq = Some(chunk.seq);

            if chunk.transmissions > 0 {
                self.stats.packets_resent += 1;
            }
            chunk.transmissions += 1;
            chunk.last_sent = Some(now);
        }
        if count > 0 {
            current[8] = count;
            datagrams.push(current);
        }

        if datagrams.is_empty() {
            if self.ack_pending
                || now.saturating_duration_since(self.last_send) >= self.config.keepalive_interval
            {
                let mut keepalive = Vec::with_capacity(DATAGRAM_HEADER_LEN);
                write_header(&mut keepalive, self.next_send_seq, ack, 0);
                datagrams.push(keepalive);
            } else {
                return Ok(());
            }
        }

        for datagram in &datagrams {
            self.emit(datagram)?;
        }
        self.ack_pending = false;
        self.last_send = now;
        Ok(())
    }

    /// Stops sending. Queued messages stay readable.
    pub fn close(&mut self) {
        self.closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Chunks sent but not yet acknowledged, plus bytes not cut yet.
    pub fn unacked_chunks(&self) -> usize {
        self.unacked.len() + usize::from(!self.outbound_stream.is_empty())
    }

    pub fn rtt(&self) -> Duration {
        Duration::from_secs_f32(self.rtt.srtt().max(0.0) / 1000.0)
    }

    pub fn stats(&self) -> NetworkStats {
        NetworkStats {
            rtt_ms: self.rtt.srtt(),
            rtt_variance: self.rtt.rtt_var(),
            ..self.stats.clone()
        }
    }

    fn emit(&mut self, datagram: &[u8]) -> Result<(), ChannelError> {
        self.transport.send_datagram(datagram)?;
        self.stats.packets_sent += 1;
        self.stats.bytes_sent += datagram.len() as u64;
        Ok(())
    }

    fn cut_chunks(&mut self) {
        if self.outbound_stream.is_empty() {
            return;
        }
        for piece in self.outbound_stream.chunks(self.config.chunk_size) {
            self.unacked.push_back(OutboundChunk {
                seq: self.next_send_seq,
                payload: piece.to_vec(),
                last_sent: None,
                transmissions: 0,
            });
            self.next_send_seq = self.next_send_seq.wrapping_add(1);
        }
        self.outbound_stream.clear();
    }

    fn pump(&mut self) {
        loop {
            match self.transport.recv_datagram() {
                Ok(Some(datagram)) => self.handle_datagram(&datagram, Instant::now()),
                Ok(None) => break,
                Err(err) => {
                    log::debug!("receive from {} failed: {err}", self.peer);
                    break;
                }
            }
        }
    }

    fn handle_datagram(&mut self, bytes: &[u8], now: Instant) {
        let datagram = match parse_datagram(bytes) {
            Ok(datagram) => datagram,
            Err(err) => {
                log::debug!("dropping malformed datagram from {}: {err}", self.peer);
                return;
            }
        };
        self.stats.packets_received += 1;
        self.stats.bytes_received += bytes.len() as u64;
        self.last_receive = now;

        if datagram.first_chunk == HANDSHAKE_SEQ {
            return;
        }

        while let Some(front) = self.unacked.front() {
            if front.seq >= datagram.ack {
                break;
            }
            if let Some(chunk) = self.unacked.pop_front()
                && chunk.transmissions == 1
                && let Some(sent) = chunk.last_sent
            {
                self.rtt
                    .sample(now.saturating_duration_since(sent).as_secs_f32() * 1000.0);
            }
        }

        for (offset, payload) in datagram.chunks.iter().enumerate() {
            let seq = datagram.first_chunk.wrapping_add(offset as u32);
            match self.reorder.insert(seq, RawPacket::from_slice(payload)) {
                Received::Accepted => {}
                Received::Duplicate => self.stats.duplicates_dropped += 1,
                Received::OutOfWindow => {
                    log::debug!("chunk {seq} from {} is outside the receive window", self.peer);
                }
            }
            self.ack_pending = true;
        }

        while let Some(chunk) = self.reorder.pop_ready() {
            self.assembly.extend_from_slice(chunk.bytes());
        }
        self.split_assembly();
    }

    fn split_assembly(&mut self) {
        let mut splitter = MessageSplitter::streaming(&self.assembly);
        for part in splitter.by_ref() {
            match part {
                Ok(message) => self.inbound.push_back(RawPacket::from_slice(message)),
                Err(err) => log::warn!("dropping unframeable bytes from {}: {err}", self.peer),
            }
        }
        let consumed = splitter.position();
        self.assembly.drain(..consumed);
    }
}

impl std::fmt::Debug for ConnectionChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionChannel")
            .field("peer", &self.peer)
            .field("unacked", &self.unacked.len())
            .field("inbound", &self.inbound.len())
            .field("closed", &self.closed)
            .finish()
    }
}
