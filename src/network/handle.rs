use std::fmt;
use std::io::ErrorKind;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, warn};

use super::{NetError, NetResult, SocketOp};
use crate::provider::{RawSocket, ShutdownDirection, SocketProvider, PF_INET, SOCK_STREAM};

/// Exclusive owner of one provider descriptor.
///
/// The descriptor is released exactly once. `release` marks the handle closed
/// before touching the provider, so a second release, or any call made after
/// it, sees [`NetError::Closed`] without reaching the provider. A call already
/// inside the provider when the close lands gets whatever the provider
/// reports; `Connection` checks the tombstone and turns that into `Closed`
/// too. A handle dropped while still open frees its descriptor.
pub(crate) struct SocketHandle {
    fd: RawSocket,
    provider: Arc<dyn SocketProvider>,
    closed: AtomicBool,
}

impl SocketHandle {
    /// Creates a fresh IPv4 stream socket.
    pub(crate) fn open_stream(provider: Arc<dyn SocketProvider>) -> NetResult<Self> {
        let fd = provider
            .socket(PF_INET, SOCK_STREAM, 0)
            .map_err(NetError::socket(SocketOp::Socket))?;
        Ok(SocketHandle::adopt(provider, fd))
    }

    /// Takes ownership of a descriptor the provider already handed out.
    pub(crate) fn adopt(provider: Arc<dyn SocketProvider>, fd: RawSocket) -> Self {
        SocketHandle {
            fd,
            provider,
            closed: AtomicBool::new(false),
        }
    }

    pub(crate) fn provider(&self) -> &dyn SocketProvider {
        self.provider.as_ref()
    }

    pub(crate) fn provider_arc(&self) -> Arc<dyn SocketProvider> {
        self.provider.clone()
    }

    /// The descriptor, or `Closed` once the handle has been released.
    pub(crate) fn fd(&self) -> NetResult<RawSocket> {
        if self.closed.load(Ordering::Acquire) {
            Err(NetError::Closed)
        } else {
            Ok(self.fd)
        }
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Shuts down both directions and frees the descriptor.
    ///
    /// A shutdown error is reported to the caller but the descriptor is freed
    /// regardless. `NotConnected` from shutdown is ignored: the peer is already
    /// gone and there is nothing left to shut down.
    pub(crate) fn release(&self) -> NetResult<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Err(NetError::Closed);
        }
        let shutdown = match self.provider.shutdown(self.fd, ShutdownDirection::Both) {
            Err(err) if err.kind() == ErrorKind::NotConnected => Ok(()),
            other => other,
        };
        let close = self.provider.close(self.fd);
        debug!(fd = self.fd, "socket handle released");
        shutdown.map_err(NetError::socket(SocketOp::Shutdown))?;
        close.map_err(NetError::socket(SocketOp::Close))
    }
}

impl Drop for SocketHandle {
    fn drop(&mut self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            if let Err(err) = self.provider.close(self.fd) {
                warn!(fd = self.fd, "failed to free dropped socket handle: {}", err);
            }
        }
    }
}

impl fmt::Debug for SocketHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SocketHandle")
            .field("fd", &self.fd)
            .field("closed", &self.is_closed())
            .finish()
    }
}
