use std::collections::{HashMap, VecDeque};
use std::io;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::sync::Arc;

use crossbeam_channel::Sender;

use super::channel::ConnectionChannel;
use super::stats::NetworkStats;
use super::transport::{MAX_DATAGRAM_SIZE, UdpTransport};

const MAX_PENDING_CONNECTIONS: usize = 64;

/// First contact from an address the listener has not routed yet. Holds the
/// first handshake datagram seen from it, or the first datagram of any kind
/// until a handshake arrives.
#[derive(Debug, Clone)]
pub struct PendingConnection {
    pub addr: SocketAddr,
    pub datagram: Vec<u8>,
}

/// Server-side UDP socket. Demultiplexes datagrams by source address into
/// one [`UdpTransport`] per accepted peer.
pub struct UdpListener {
    socket: Arc<UdpSocket>,
    local_addr: SocketAddr,
    routes: HashMap<SocketAddr, Sender<Vec<u8>>>,
    pending: VecDeque<PendingConnection>,
    recv_buffer: Box<[u8]>,
    stats: NetworkStats,
}

impl UdpListener {
    pub fn bind<A: ToSocketAddrs>(addr: A) -> io::Result<Self> {
        let socket = UdpSocket::bind(addr)?;
        socket.set_nonblocking(true)?;
        let local_addr = socket.local_addr()?;

        Ok(Self {
            socket: Arc::new(socket),
            local_addr,
            routes: HashMap::new(),
            pending: VecDeque::new(),
            recv_buffer: vec![0u8; MAX_DATAGRAM_SIZE * 2].into_boxed_slice(),
            stats: NetworkStats::default(),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn stats(&self) -> &NetworkStats {
        &self.stats
    }

    /// Drains the socket, routing known peers and queueing first contact
    /// from unknown ones.
    pub fn poll(&mut self) -> io::Result<()> {
        loop {
            match self.socket.recv_from(&mut self.recv_buffer) {
                Ok((size, addr)) => {
                    self.stats.packets_received += 1;
                    self.stats.bytes_received += size as u64;
                    let datagram = self.recv_buffer[..size].to_vec();

                    if let Some(route) = self.routes.get(&addr) {
                        if route.send(datagram).is_err() {
                            self.routes.remove(&addr);
                        }
                        continue;
                    }

                    if let Some(existing) = self.pending.iter_mut().find(|p| p.addr == addr) {
                        if !is_handshake(&existing.datagram) && is_handshake(&datagram) {
                            existing.datagram = datagram;
                        }
                        continue;
                    }
                    if self.pending.len() >= MAX_PENDING_CONNECTIONS {
                        log::warn!("dropping connection attempt from {addr}: too many pending");
                        continue;
                    }
                    self.pending.push_back(PendingConnection { addr, datagram });
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(ref e) if e.kind() == io::ErrorKind::ConnectionReset => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    pub fn next_pending(&mut self) -> Option<PendingConnection> {
        self.pending.pop_front()
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Routes all further datagrams from `addr` into the returned transport.
    pub fn accept(&mut self, addr: SocketAddr) -> UdpTransport {
        let (tx, rx) = crossbeam_channel::unbounded();
        self.routes.insert(addr, tx);
        UdpTransport::routed(Arc::clone(&self.socket), self.local_addr, addr, rx)
    }

    /// Unroutes a peer whose link was torn down.
    pub fn forget(&mut self, addr: &SocketAddr) {
        self.routes.remove(addr);
    }

    pub fn routed_count(&self) -> usize {
        self.routes.len()
    }
}

fn is_handshake(datagram: &[u8]) -> bool {
    ConnectionChannel::handshake_payload(datagram).is_some()
}
