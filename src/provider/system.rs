use std::io::{self, ErrorKind, Read};
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use tracing::trace;

use super::{RawSocket, ShutdownDirection, SocketProvider, AF_INET, SOCK_STREAM};
use crate::network::BinarySocketAddress;

/// Provider backed by the OS socket stack through `socket2`.
///
/// Descriptors handed out are table ids, not OS file descriptors. Each entry
/// is reference counted so a blocking call keeps its socket alive while
/// another thread closes the descriptor; the OS socket is released once the
/// last in-flight call returns.
#[derive(Debug)]
pub struct SystemProvider {
    sockets: DashMap<RawSocket, Arc<Socket>>,
    next_fd: AtomicI32,
}

impl Default for SystemProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemProvider {
    pub fn new() -> Self {
        SystemProvider {
            sockets: DashMap::new(),
            next_fd: AtomicI32::new(3),
        }
    }

    /// Number of descriptors currently held open.
    pub fn open_sockets(&self) -> usize {
        self.sockets.len()
    }

    fn get(&self, fd: RawSocket) -> io::Result<Arc<Socket>> {
        self.sockets
            .get(&fd)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| {
                io::Error::new(ErrorKind::InvalidInput, format!("bad descriptor {}", fd))
            })
    }

    fn register(&self, socket: Socket) -> RawSocket {
        let fd = self.next_fd.fetch_add(1, Ordering::Relaxed);
        self.sockets.insert(fd, Arc::new(socket));
        fd
    }
}

fn to_sock_addr(addr: &BinarySocketAddress) -> SockAddr {
    SockAddr::from(addr.to_socket_addr())
}

fn from_sock_addr(addr: SockAddr) -> io::Result<BinarySocketAddress> {
    addr.as_socket_ipv4()
        .map(BinarySocketAddress::from)
        .ok_or_else(|| io::Error::new(ErrorKind::Unsupported, "peer is not an IPv4 endpoint"))
}

impl SocketProvider for SystemProvider {
    fn socket(&self, family: u16, socket_type: i32, protocol: i32) -> io::Result<RawSocket> {
        if family != AF_INET {
            return Err(io::Error::new(
                ErrorKind::Unsupported,
                format!("address family {} not supported", family),
            ));
        }
        if socket_type != SOCK_STREAM {
            return Err(io::Error::new(
                ErrorKind::Unsupported,
                format!("socket type {} not supported", socket_type),
            ));
        }
        let protocol = match protocol {
            0 => None,
            other => Some(Protocol::from(other)),
        };
        let socket = Socket::new(Domain::IPV4, Type::STREAM, protocol)?;
        let fd = self.register(socket);
        trace!(fd, "socket created");
        Ok(fd)
    }

    fn bind(&self, fd: RawSocket, addr: &BinarySocketAddress) -> io::Result<()> {
        self.get(fd)?.bind(&to_sock_addr(addr))
    }

    fn listen(&self, fd: RawSocket, backlog: i32) -> io::Result<()> {
        self.get(fd)?.listen(backlog)
    }

    fn accept(&self, fd: RawSocket) -> io::Result<(RawSocket, BinarySocketAddress)> {
        let listener = self.get(fd)?;
        let (socket, peer) = listener.accept()?;
        let peer = from_sock_addr(peer)?;
        let client_fd = self.register(socket);
        trace!(fd, client_fd, "socket accepted");
        Ok((client_fd, peer))
    }

    fn connect(&self, fd: RawSocket, addr: &BinarySocketAddress) -> io::Result<()> {
        self.get(fd)?.connect(&to_sock_addr(addr))
    }

    fn connect_timeout(
        &self,
        fd: RawSocket,
        addr: &BinarySocketAddress,
        timeout: Duration,
    ) -> io::Result<()> {
        self.get(fd)?.connect_timeout(&to_sock_addr(addr), timeout)
    }

    fn send(&self, fd: RawSocket, buf: &[u8], flags: i32) -> io::Result<usize> {
        self.get(fd)?.send_with_flags(buf, flags)
    }

    fn recv(&self, fd: RawSocket, buf: &mut [u8], flags: i32) -> io::Result<usize> {
        if flags != 0 {
            return Err(io::Error::new(
                ErrorKind::Unsupported,
                "recv flags are not supported",
            ));
        }
        let socket = self.get(fd)?;
        let mut reader: &Socket = &socket;
        reader.read(buf)
    }

    fn shutdown(&self, fd: RawSocket, direction: ShutdownDirection) -> io::Result<()> {
        self.get(fd)?.shutdown(direction.into())
    }

    fn close(&self, fd: RawSocket) -> io::Result<()> {
        match self.sockets.remove(&fd) {
            Some(_) => {
                trace!(fd, "socket released");
                Ok(())
            }
            None => Err(io::Error::new(
                ErrorKind::InvalidInput,
                format!("bad descriptor {}", fd),
            )),
        }
    }

    fn local_address(&self, fd: RawSocket) -> io::Result<BinarySocketAddress> {
        from_sock_addr(self.get(fd)?.local_addr()?)
    }

    fn set_read_timeout(&self, fd: RawSocket, timeout: Option<Duration>) -> io::Result<()> {
        self.get(fd)?.set_read_timeout(timeout)
    }

    fn set_write_timeout(&self, fd: RawSocket, timeout: Option<Duration>) -> io::Result<()> {
        self.get(fd)?.set_write_timeout(timeout)
    }
}
