use std::fmt;
use std::io;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_channel::{Receiver, Sender, TryRecvError};

pub const MAX_DATAGRAM_SIZE: usize = 1400;

static NEXT_LOOPBACK_PAIR: AtomicU64 = AtomicU64::new(1);

/// Identity of a transport's link. Rebinding to a transport with the same
/// peer is a no-op. A UDP link is keyed by both ends, so a fresh socket to the
/// same server is a different peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PeerId {
    Loopback { pair: u64, end: u8 },
    Udp { local: SocketAddr, remote: SocketAddr },
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeerId::Loopback { pair, end } => write!(f, "loopback#{pair}.{end}"),
            PeerId::Udp { remote, .. } => write!(f, "{remote}"),
        }
    }
}

/// Unreliable, unordered datagram pipe to one peer. Never blocks.
pub trait Transport: Send {
    fn send_datagram(&mut self, bytes: &[u8]) -> io::Result<()>;

    fn recv_datagram(&mut self) -> io::Result<Option<Vec<u8>>>;

    fn peer(&self) -> PeerId;
}

impl Transport for Box<dyn Transport> {
    fn send_datagram(&mut self, bytes: &[u8]) -> io::Result<()> {
        (**self).send_datagram(bytes)
    }

    fn recv_datagram(&mut self) -> io::Result<Option<Vec<u8>>> {
        (**self).recv_datagram()
    }

    fn peer(&self) -> PeerId {
        (**self).peer()
    }
}

/// In-process transport used when the host plays on the machine running the
/// server, and by tests.
#[derive(Debug)]
pub struct LoopbackTransport {
    tx: Sender<Vec<u8>>,
    rx: Receiver<Vec<u8>>,
    peer: PeerId,
}

impl LoopbackTransport {
    pub fn pair() -> (LoopbackTransport, LoopbackTransport) {
        let pair = NEXT_LOOPBACK_PAIR.fetch_add(1, Ordering::Relaxed);
        let (a_tx, b_rx) = crossbeam_channel::unbounded();
        let (b_tx, a_rx) = crossbeam_channel::unbounded();
        (
            LoopbackTransport {
                tx: a_tx,
                rx: a_rx,
                peer: PeerId::Loopback { pair, end: 1 },
            },
            LoopbackTransport {
                tx: b_tx,
                rx: b_rx,
                peer: PeerId::Loopback { pair, end: 0 },
            },
        )
    }
}

impl Transport for LoopbackTransport {
    fn send_datagram(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.tx
            .send(bytes.to_vec())
            .map_err(|_| io::Error::new(io::ErrorKind::NotConnected, "loopback peer dropped"))
    }

    fn recv_datagram(&mut self) -> io::Result<Option<Vec<u8>>> {
        match self.rx.try_recv() {
            Ok(bytes) => Ok(Some(bytes)),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => Ok(None),
        }
    }

    fn peer(&self) -> PeerId {
        self.peer
    }
}

#[derive(Debug)]
enum Inbox {
    /// The socket belongs to this transport alone.
    Socket(Box<[u8]>),
    /// A listener owns the socket and forwards this peer's datagrams.
    Routed(Receiver<Vec<u8>>),
}

#[derive(Debug)]
pub struct UdpTransport {
    socket: Arc<UdpSocket>,
    local: SocketAddr,
    remote: SocketAddr,
    inbox: Inbox,
}

impl UdpTransport {
    /// Client side: a private socket talking to one server.
    pub fn connect<A: ToSocketAddrs>(remote: A) -> io::Result<Self> {
        let remote = remote
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "no address"))?;
        let bind_addr: SocketAddr = if remote.is_ipv4() {
            ([0, 0, 0, 0], 0).into()
        } else {
            ([0u16; 8], 0).into()
        };
        let socket = UdpSocket::bind(bind_addr)?;
        socket.set_nonblocking(true)?;
        let local = socket.local_addr()?;
        Ok(Self {
            socket: Arc::new(socket),
            local,
            remote,
            inbox: Inbox::Socket(vec![0u8; MAX_DATAGRAM_SIZE * 2].into_boxed_slice()),
        })
    }

    pub(crate) fn routed(
        socket: Arc<UdpSocket>,
        local: SocketAddr,
        remote: SocketAddr,
        rx: Receiver<Vec<u8>>,
    ) -> Self {
        Self {
            socket,
            local,
            remote,
            inbox: Inbox::Routed(rx),
        }
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.remote
    }
}

impl Transport for UdpTransport {
    fn send_datagram(&mut self, bytes: &[u8]) -> io::Result<()> {
        if bytes.len() > MAX_DATAGRAM_SIZE {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "datagram exceeds MTU",
            ));
        }
        match self.socket.send_to(bytes, self.remote) {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn recv_datagram(&mut self) -> io::Result<Option<Vec<u8>>> {
        match &mut self.inbox {
            Inbox::Routed(rx) => match rx.try_recv() {
                Ok(bytes) => Ok(Some(bytes)),
                Err(_) => Ok(None),
            },
            Inbox::Socket(buf) => loop {
                match self.socket.recv_from(buf) {
                    Ok((size, from)) if from == self.remote => {
                        return Ok(Some(buf[..size].to_vec()));
                    }
                    Ok(_) => continue,
                    Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(None),
                    // ICMP port unreachable surfaces here on some platforms
                    Err(ref e) if e.kind() == io::ErrorKind::ConnectionReset => return Ok(None),
                    Err(e) => return Err(e),
                }
            },
        }
    }

    fn peer(&self) -> PeerId {
        PeerId::Udp {
            local: self.local,
            remote: self.remote,
        }
    }
}
