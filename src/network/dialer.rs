use std::io::ErrorKind;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use super::handle::SocketHandle;
use super::{resolve, BinarySocketAddress, Connection, NetError, NetResult, SocketAddress, SocketOp};
use crate::provider::{system_provider, SocketProvider};

/// Opens outbound connections.
#[derive(Debug, Clone)]
pub struct Dialer {
    provider: Arc<dyn SocketProvider>,
    timeout: Option<Duration>,
}

impl Default for Dialer {
    fn default() -> Self {
        Dialer::new(system_provider())
    }
}

/// Connects to `address` using the OS socket stack.
pub fn dial(network: &str, address: &str) -> NetResult<Connection> {
    Dialer::default().dial(network, address)
}

impl Dialer {
    pub fn new(provider: Arc<dyn SocketProvider>) -> Self {
        Dialer {
            provider,
            timeout: None,
        }
    }

    /// Gives up on connect attempts that take longer than `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn dial(&self, network: &str, address: &str) -> NetResult<Connection> {
        let remote = resolve(network, address)?;
        self.dial_addr(&remote)
    }

    pub fn dial_addr(&self, remote: &SocketAddress) -> NetResult<Connection> {
        let handle = SocketHandle::open_stream(self.provider.clone())?;
        let fd = handle.fd()?;
        let provider = handle.provider();

        let target = BinarySocketAddress::encode(remote);
        let connected = match self.timeout.filter(|t| !t.is_zero()) {
            Some(timeout) => provider.connect_timeout(fd, &target, timeout),
            None => provider.connect(fd, &target),
        };
        connected.map_err(|err| match err.kind() {
            ErrorKind::WouldBlock | ErrorKind::TimedOut => NetError::Timeout(SocketOp::Connect),
            _ => NetError::Socket {
                op: SocketOp::Connect,
                source: err,
            },
        })?;

        let local = provider
            .local_address(fd)
            .map_err(NetError::socket(SocketOp::LocalAddress))?
            .decode();
        debug!(local = %local, remote = %remote, "connected");
        Ok(Connection::new(handle, local, remote.clone()))
    }
}
