use std::io::{self, ErrorKind};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, trace};

use super::handle::SocketHandle;
use super::{NetError, NetResult, SocketAddress, SocketOp};
use crate::provider::RawSocket;

/// One deadline slot plus whether a timeout is currently armed on the
/// provider for it.
#[derive(Debug, Default, Clone, Copy)]
struct Deadline {
    at: Option<Instant>,
    armed: bool,
}

#[derive(Debug, Default)]
struct Deadlines {
    read: Deadline,
    write: Deadline,
}

#[derive(Debug, Clone, Copy)]
enum Direction {
    Read,
    Write,
}

/// Represents an established stream between two endpoints.
///
/// Owns one connected socket handle. Reads and writes go straight to the
/// provider; nothing is buffered here. A zero-byte transfer is reported as
/// [`NetError::Disconnected`], never as an empty success. The connection does
/// not close itself on disconnect, callers are expected to call
/// [`Connection::close`].
#[derive(Debug)]
pub struct Connection {
    handle: SocketHandle,
    local: SocketAddress,
    remote: SocketAddress,
    deadlines: Mutex<Deadlines>,
}

impl Connection {
    pub(crate) fn new(handle: SocketHandle, local: SocketAddress, remote: SocketAddress) -> Self {
        Connection {
            handle,
            local,
            remote,
            deadlines: Mutex::new(Deadlines::default()),
        }
    }

    /// Reads up to `buf.len()` bytes.
    ///
    /// Blocks until data arrives, the peer closes, or the read deadline
    /// passes. Returns the number of bytes actually read; only `buf[..n]` is
    /// meaningful afterwards.
    pub fn read(&self, buf: &mut [u8]) -> NetResult<usize> {
        if buf.is_empty() {
            return Err(NetError::Socket {
                op: SocketOp::Recv,
                source: io::Error::new(ErrorKind::InvalidInput, "empty read buffer"),
            });
        }
        let fd = self.handle.fd()?;
        self.arm(fd, Direction::Read)?;
        let n = self
            .handle
            .provider()
            .recv(fd, buf, 0)
            .map_err(|err| self.transfer_error(SocketOp::Recv, err))?;
        if n == 0 {
            if self.handle.is_closed() {
                return Err(NetError::Closed);
            }
            debug!(remote = %self.remote, "zero-byte read, peer disconnected");
            return Err(NetError::Disconnected);
        }
        trace!(remote = %self.remote, n, "read");
        Ok(n)
    }

    /// Writes `buf` with a single provider send, returning how much of it was
    /// accepted. Use [`Connection::write_all`] to push the whole buffer.
    pub fn write(&self, buf: &[u8]) -> NetResult<usize> {
        let fd = self.handle.fd()?;
        self.arm(fd, Direction::Write)?;
        let n = self
            .handle
            .provider()
            .send(fd, buf, 0)
            .map_err(|err| self.transfer_error(SocketOp::Send, err))?;
        if n == 0 {
            if self.handle.is_closed() {
                return Err(NetError::Closed);
            }
            debug!(remote = %self.remote, "zero-byte write, peer disconnected");
            return Err(NetError::Disconnected);
        }
        trace!(remote = %self.remote, n, "write");
        Ok(n)
    }

    pub fn write_all(&self, mut buf: &[u8]) -> NetResult<()> {
        while !buf.is_empty() {
            let n = self.write(buf)?;
            buf = &buf[n..];
        }
        Ok(())
    }

    /// Shuts down both directions and releases the socket.
    ///
    /// Calling it again returns [`NetError::Closed`].
    pub fn close(&self) -> NetResult<()> {
        debug!(local = %self.local, remote = %self.remote, "closing connection");
        self.handle.release()
    }

    pub fn is_closed(&self) -> bool {
        self.handle.is_closed()
    }

    pub fn local_address(&self) -> &SocketAddress {
        &self.local
    }

    pub fn remote_address(&self) -> &SocketAddress {
        &self.remote
    }

    /// Sets both the read and the write deadline. `None` removes them.
    pub fn set_deadline(&self, deadline: Option<Instant>) {
        let mut deadlines = self.deadlines.lock();
        deadlines.read.at = deadline;
        deadlines.write.at = deadline;
    }

    pub fn set_read_deadline(&self, deadline: Option<Instant>) {
        self.deadlines.lock().read.at = deadline;
    }

    pub fn set_write_deadline(&self, deadline: Option<Instant>) {
        self.deadlines.lock().write.at = deadline;
    }

    // a close from another thread can land after the descriptor was checked
    fn transfer_error(&self, op: SocketOp, err: io::Error) -> NetError {
        if self.handle.is_closed() {
            NetError::Closed
        } else {
            NetError::transfer(op, err)
        }
    }

    /// Pushes the time left before the deadline down to the provider so the
    /// next blocking call gives up in time.
    fn arm(&self, fd: RawSocket, direction: Direction) -> NetResult<()> {
        let mut deadlines = self.deadlines.lock();
        let (slot, op) = match direction {
            Direction::Read => (&mut deadlines.read, SocketOp::Recv),
            Direction::Write => (&mut deadlines.write, SocketOp::Send),
        };
        let timeout = match slot.at {
            Some(at) => {
                let remaining = at.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    return Err(NetError::Timeout(op));
                }
                Some(remaining)
            }
            None if slot.armed => None,
            None => return Ok(()),
        };
        let provider = self.handle.provider();
        let armed = match direction {
            Direction::Read => provider.set_read_timeout(fd, timeout),
            Direction::Write => provider.set_write_timeout(fd, timeout),
        };
        armed.map_err(NetError::socket(SocketOp::SetTimeout))?;
        slot.armed = timeout.is_some();
        Ok(())
    }
}

/// Adapts a connection to `std::io`. A disconnect reads as end of stream.
impl io::Read for &Connection {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        match Connection::read(*self, buf) {
            Ok(n) => Ok(n),
            Err(NetError::Disconnected) => Ok(0),
            Err(err) => Err(err.into()),
        }
    }
}

impl io::Write for &Connection {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        match Connection::write(*self, buf) {
            Ok(n) => Ok(n),
            Err(NetError::Disconnected) => Err(io::Error::new(
                ErrorKind::WriteZero,
                NetError::Disconnected,
            )),
            Err(err) => Err(err.into()),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Deadline helper for callers that think in timeouts.
pub fn deadline_after(timeout: Duration) -> Option<Instant> {
    Instant::now().checked_add(timeout)
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};
    use std::sync::Arc;

    use super::*;
    use crate::provider::testing::ScriptedProvider;
    use crate::provider::SocketProvider;

    fn connection(provider: &Arc<ScriptedProvider>) -> Connection {
        let fd = provider.socket(2, 1, 0).unwrap();
        let handle = SocketHandle::adopt(provider.clone(), fd);
        Connection::new(
            handle,
            SocketAddress::new([127, 0, 0, 1], 1234),
            SocketAddress::new([127, 0, 0, 1], 50000),
        )
    }

    #[test]
    fn read_returns_actual_count() {
        let provider = Arc::new(ScriptedProvider::new());
        let conn = connection(&provider);
        provider.push_inbound(b"hello world");

        let mut buf = [0u8; 1024];
        let n = conn.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"hello world");
    }

    #[test]
    fn zero_byte_read_is_disconnect() {
        let provider = Arc::new(ScriptedProvider::new());
        let conn = connection(&provider);
        let mut buf = [0u8; 16];
        assert!(conn.read(&mut buf).unwrap_err().is_disconnect());
        // the connection stays open until the caller closes it
        assert!(!conn.is_closed());
        conn.close().unwrap();
    }

    #[test]
    fn reset_is_disconnect() {
        let provider = Arc::new(ScriptedProvider::new());
        let conn = connection(&provider);
        provider.push_recv_error(ErrorKind::ConnectionReset);
        provider.push_send_result(Err(ErrorKind::BrokenPipe.into()));

        let mut buf = [0u8; 16];
        assert!(conn.read(&mut buf).unwrap_err().is_disconnect());
        assert!(conn.write(b"x").unwrap_err().is_disconnect());
    }

    #[test]
    fn zero_byte_write_is_disconnect() {
        let provider = Arc::new(ScriptedProvider::new());
        let conn = connection(&provider);
        provider.push_send_result(Ok(0));
        assert!(conn.write(b"ping").unwrap_err().is_disconnect());
    }

    #[test]
    fn write_all_retries_partial_writes() {
        let provider = Arc::new(ScriptedProvider::new());
        let conn = connection(&provider);
        provider.push_send_result(Ok(3));
        provider.push_send_result(Ok(2));

        conn.write_all(b"You've sent").unwrap();
        assert_eq!(provider.sent(), b"You've sent");
        let sends = provider
            .calls()
            .iter()
            .filter(|c| c.starts_with("send"))
            .count();
        assert_eq!(sends, 3);
    }

    #[test]
    fn io_after_close_is_rejected() {
        let provider = Arc::new(ScriptedProvider::new());
        let conn = connection(&provider);
        conn.close().unwrap();

        let mut buf = [0u8; 4];
        assert!(matches!(conn.read(&mut buf), Err(NetError::Closed)));
        assert!(matches!(conn.write(b"late"), Err(NetError::Closed)));
        assert!(matches!(conn.close(), Err(NetError::Closed)));
    }

    #[test]
    fn provider_error_after_close_is_closed() {
        let provider = Arc::new(ScriptedProvider::new());
        let conn = connection(&provider);
        let bad_descriptor = || io::Error::new(ErrorKind::InvalidInput, "bad descriptor 3");

        assert!(matches!(
            conn.transfer_error(SocketOp::Recv, bad_descriptor()),
            NetError::Socket { .. }
        ));
        conn.close().unwrap();
        assert!(matches!(
            conn.transfer_error(SocketOp::Recv, bad_descriptor()),
            NetError::Closed
        ));
        assert!(matches!(
            conn.transfer_error(SocketOp::Send, ErrorKind::BrokenPipe.into()),
            NetError::Closed
        ));
    }

    #[test]
    fn expired_deadline_skips_provider() {
        let provider = Arc::new(ScriptedProvider::new());
        let conn = connection(&provider);
        provider.push_inbound(b"late");
        conn.set_read_deadline(Some(Instant::now() - Duration::from_millis(1)));

        let mut buf = [0u8; 4];
        let err = conn.read(&mut buf).unwrap_err();
        assert!(matches!(err, NetError::Timeout(SocketOp::Recv)));
        assert!(!provider.calls().iter().any(|c| c.starts_with("recv")));

        // nothing was armed, so clearing needs no provider call
        conn.set_read_deadline(None);
        assert_eq!(conn.read(&mut buf).unwrap(), 4);
        assert!(provider.read_timeouts().is_empty());
    }

    #[test]
    fn deadline_is_armed_then_cleared() {
        let provider = Arc::new(ScriptedProvider::new());
        let conn = connection(&provider);
        provider.push_inbound(b"a");
        provider.push_inbound(b"b");
        provider.push_inbound(b"c");

        conn.set_deadline(deadline_after(Duration::from_secs(30)));
        let mut buf = [0u8; 1];
        conn.read(&mut buf).unwrap();
        conn.set_deadline(None);
        conn.read(&mut buf).unwrap();
        conn.read(&mut buf).unwrap();

        let timeouts = provider.read_timeouts();
        assert_eq!(timeouts.len(), 2);
        assert!(timeouts[0].is_some_and(|t| t <= Duration::from_secs(30)));
        assert_eq!(timeouts[1], None);

        conn.write(b"x").unwrap();
        assert!(provider.write_timeouts().is_empty());
    }

    #[test]
    fn std_io_adapters() {
        let provider = Arc::new(ScriptedProvider::new());
        let conn = connection(&provider);
        provider.push_inbound(b"abc");

        let mut out = Vec::new();
        (&conn).read_to_end(&mut out).unwrap();
        assert_eq!(out, b"abc");

        let mut writer = &conn;
        Write::write_all(&mut writer, b"reply").unwrap();
        assert_eq!(provider.sent(), b"reply");
        provider.push_send_result(Ok(0));
        let err = Write::write(&mut writer, b"gone").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::WriteZero);
    }
}
