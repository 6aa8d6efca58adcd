use std::net::SocketAddr;

use strata::{ChecksumSimulation, GameSetup, LoopbackTransport};
use strata_server::{AdminCommand, GameServer, ServerConfig, ServerHandle};

use crate::config::ClientConfig;
use crate::session::{ClientError, ClientSession};
use crate::sim_loop::ClientSimLoop;

/// A server running on a thread of this process, with a loopback link
/// reserved for the local player. The local player talks to it through the
/// same channel code as everyone else.
pub struct LocalHost {
    handle: Option<ServerHandle>,
    addr: Option<SocketAddr>,
}

impl LocalHost {
    /// Starts the server, listening on `listen` for remote players when
    /// given. Returns the host and the local player's end of the loopback.
    pub fn start(
        setup: GameSetup,
        config: ServerConfig,
        listen: Option<&str>,
    ) -> Result<(Self, LoopbackTransport), ClientError> {
        let mut server = GameServer::new(setup, config)?;
        let addr = match listen {
            Some(bind) => Some(server.listen(bind)?),
            None => None,
        };
        let transport = server.connect_local();
        let handle = server.spawn();
        log::info!("hosting game{}", addr.map_or(String::new(), |a| format!(" on {a}")));
        Ok((
            Self {
                handle: Some(handle),
                addr,
            },
            transport,
        ))
    }

    pub fn addr(&self) -> Option<SocketAddr> {
        self.addr
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(ServerHandle::is_running)
    }

    pub fn execute(&self, command: AdminCommand) {
        if let Some(handle) = &self.handle
            && handle.admin().send(command).is_err()
        {
            log::warn!("server thread is gone, admin command dropped");
        }
    }

    /// Shuts the server down and hands it back.
    pub fn stop(mut self) -> Option<GameServer> {
        self.handle.take()?.stop()
    }
}

impl Drop for LocalHost {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.stop();
        }
    }
}

/// Hosts `setup` and joins it as the local player with the reference
/// simulation.
pub fn host_game(
    setup: GameSetup,
    server_config: ServerConfig,
    listen: Option<&str>,
    client_config: ClientConfig,
) -> Result<(LocalHost, ClientSimLoop<ChecksumSimulation>), ClientError> {
    let (host, transport) = LocalHost::start(setup, server_config, listen)?;
    let session = ClientSession::new(transport, client_config)?;
    Ok((host, ClientSimLoop::reference(session)))
}
