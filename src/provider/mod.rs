//! Raw socket primitive provider.
//!
//! The network layer never talks to the OS socket stack directly. Everything
//! goes through [`SocketProvider`], a narrow capability set modelled on the
//! BSD calls: create, bind, listen, accept, connect, send, recv, shutdown.
//! Descriptors are plain integers owned by the provider; the network layer
//! wraps each one in an owned handle before handing it to callers.
//!
//! [`SystemProvider`] implements the capability set over `socket2`.

use std::fmt::Debug;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::Lazy;

use crate::network::BinarySocketAddress;

pub use system::SystemProvider;

mod system;
#[cfg(test)]
pub(crate) mod testing;

/// Provider-issued socket descriptor.
pub type RawSocket = i32;

pub const AF_INET: u16 = 2;
pub const PF_INET: u16 = AF_INET;
pub const SOCK_STREAM: i32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownDirection {
    Read,
    Write,
    Both,
}

impl From<ShutdownDirection> for std::net::Shutdown {
    fn from(direction: ShutdownDirection) -> Self {
        match direction {
            ShutdownDirection::Read => std::net::Shutdown::Read,
            ShutdownDirection::Write => std::net::Shutdown::Write,
            ShutdownDirection::Both => std::net::Shutdown::Both,
        }
    }
}

/// The capability set the network layer is built on.
///
/// Calls block with the provider's own semantics. `recv` returning `Ok(0)`
/// means the peer closed its end.
pub trait SocketProvider: Send + Sync + Debug {
    fn socket(&self, family: u16, socket_type: i32, protocol: i32) -> io::Result<RawSocket>;

    fn bind(&self, fd: RawSocket, addr: &BinarySocketAddress) -> io::Result<()>;

    fn listen(&self, fd: RawSocket, backlog: i32) -> io::Result<()>;

    /// Waits for an inbound connection and returns its descriptor together
    /// with the peer address.
    fn accept(&self, fd: RawSocket) -> io::Result<(RawSocket, BinarySocketAddress)>;

    fn connect(&self, fd: RawSocket, addr: &BinarySocketAddress) -> io::Result<()>;

    /// Like `connect`, but gives up after `timeout` with `ErrorKind::TimedOut`.
    fn connect_timeout(
        &self,
        fd: RawSocket,
        addr: &BinarySocketAddress,
        timeout: Duration,
    ) -> io::Result<()>;

    fn send(&self, fd: RawSocket, buf: &[u8], flags: i32) -> io::Result<usize>;

    fn recv(&self, fd: RawSocket, buf: &mut [u8], flags: i32) -> io::Result<usize>;

    fn shutdown(&self, fd: RawSocket, direction: ShutdownDirection) -> io::Result<()>;

    /// Frees the descriptor. The descriptor is invalid afterwards.
    fn close(&self, fd: RawSocket) -> io::Result<()>;

    fn local_address(&self, fd: RawSocket) -> io::Result<BinarySocketAddress>;

    /// Bounds blocking `recv` and `accept` calls. `None` blocks forever.
    fn set_read_timeout(&self, fd: RawSocket, timeout: Option<Duration>) -> io::Result<()>;

    /// Bounds blocking `send` calls. `None` blocks forever.
    fn set_write_timeout(&self, fd: RawSocket, timeout: Option<Duration>) -> io::Result<()>;
}

pub fn host_to_network_short(value: u16) -> u16 {
    value.to_be()
}

pub fn network_to_host_short(value: u16) -> u16 {
    u16::from_be(value)
}

static SYSTEM_PROVIDER: Lazy<Arc<SystemProvider>> = Lazy::new(|| Arc::new(SystemProvider::new()));

/// The process-wide provider backed by the OS socket stack.
pub fn system_provider() -> Arc<dyn SocketProvider> {
    SYSTEM_PROVIDER.clone()
}
