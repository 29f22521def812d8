use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tracing::{debug, info};

use super::handle::SocketHandle;
use super::{
    resolve, BinarySocketAddress, Connection, NetError, NetResult, SocketAddress, SocketOp,
};
use crate::provider::{system_provider, SocketProvider};

/// Pending connections the provider queues before `accept` picks them up.
pub const LISTEN_BACKLOG: i32 = 5;

/// A bound, listening stream socket.
///
/// `accept` takes `&self`, so one listener can be shared behind an `Arc` and
/// accepted from several threads, or closed from another thread to wake up a
/// blocked accept.
#[derive(Debug)]
pub struct Listener {
    handle: SocketHandle,
    addr: SocketAddress,
    deadline: Mutex<(Option<Instant>, bool)>,
}

/// Listens on `address` using the OS socket stack.
pub fn listen(network: &str, address: &str) -> NetResult<Listener> {
    listen_with(system_provider(), network, address)
}

pub fn listen_with(
    provider: Arc<dyn SocketProvider>,
    network: &str,
    address: &str,
) -> NetResult<Listener> {
    let addr = resolve(network, address)?;
    Listener::bind(provider, &addr)
}

impl Listener {
    /// Creates a stream socket, binds it to `addr` and starts listening.
    ///
    /// Any provider failure aborts the sequence; the half-built socket is
    /// freed before the error is returned. When `addr` carries port 0 the
    /// listener reports the port the provider actually assigned; otherwise
    /// it reports `addr` as given, original text included.
    pub fn bind(provider: Arc<dyn SocketProvider>, addr: &SocketAddress) -> NetResult<Listener> {
        let handle = SocketHandle::open_stream(provider)?;
        let fd = handle.fd()?;
        let provider = handle.provider();

        provider
            .bind(fd, &BinarySocketAddress::encode(addr))
            .map_err(NetError::socket(SocketOp::Bind))?;
        provider
            .listen(fd, LISTEN_BACKLOG)
            .map_err(NetError::socket(SocketOp::Listen))?;
        let assigned = provider
            .local_address(fd)
            .map_err(NetError::socket(SocketOp::LocalAddress))?
            .decode();
        // keep the caller's text unless the provider picked the port
        let bound = if addr.port() == 0 {
            assigned
        } else {
            addr.clone()
        };

        info!("listening on {}", bound);
        Ok(Listener {
            handle,
            addr: bound,
            deadline: Mutex::new((None, false)),
        })
    }

    /// Blocks until a peer connects and wraps it in a [`Connection`].
    pub fn accept(&self) -> NetResult<Connection> {
        let fd = self.handle.fd()?;
        self.arm()?;
        let (client_fd, peer) = self
            .handle
            .provider()
            .accept(fd)
            .map_err(|err| match err.kind() {
                std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut => {
                    NetError::Timeout(SocketOp::Accept)
                }
                _ => NetError::Socket {
                    op: SocketOp::Accept,
                    source: err,
                },
            })?;
        let remote = peer.decode();
        debug!(local = %self.addr, remote = %remote, "accepted connection");

        let handle = SocketHandle::adopt(self.handle.provider_arc(), client_fd);
        Ok(Connection::new(handle, self.addr.clone(), remote))
    }

    /// Stops listening and releases the socket. A second call returns
    /// [`NetError::Closed`].
    pub fn close(&self) -> NetResult<()> {
        debug!(local = %self.addr, "closing listener");
        self.handle.release()
    }

    pub fn is_closed(&self) -> bool {
        self.handle.is_closed()
    }

    pub fn address(&self) -> &SocketAddress {
        &self.addr
    }

    /// Bounds subsequent `accept` calls. `None` waits forever.
    pub fn set_deadline(&self, deadline: Option<Instant>) {
        self.deadline.lock().0 = deadline;
    }

    fn arm(&self) -> NetResult<()> {
        let mut deadline = self.deadline.lock();
        let timeout = match deadline.0 {
            Some(at) => {
                let remaining = at.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    return Err(NetError::Timeout(SocketOp::Accept));
                }
                Some(remaining)
            }
            None if deadline.1 => None,
            None => return Ok(()),
        };
        self.handle
            .provider()
            .set_read_timeout(self.handle.fd()?, timeout)
            .map_err(NetError::socket(SocketOp::SetTimeout))?;
        deadline.1 = timeout.is_some();
        Ok(())
    }
}
