use std::fmt;
use std::io::{self, ErrorKind};

use super::AddressParseError;

pub type NetResult<T> = Result<T, NetError>;

/// The provider call an error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketOp {
    Socket,
    Bind,
    Listen,
    Accept,
    Connect,
    Send,
    Recv,
    Shutdown,
    Close,
    LocalAddress,
    SetTimeout,
}

impl fmt::Display for SocketOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SocketOp::Socket => "socket",
            SocketOp::Bind => "bind",
            SocketOp::Listen => "listen",
            SocketOp::Accept => "accept",
            SocketOp::Connect => "connect",
            SocketOp::Send => "send",
            SocketOp::Recv => "recv",
            SocketOp::Shutdown => "shutdown",
            SocketOp::Close => "close",
            SocketOp::LocalAddress => "getsockname",
            SocketOp::SetTimeout => "set timeout",
        };
        f.write_str(name)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum NetError {
    #[error(transparent)]
    AddressParse(#[from] AddressParseError),

    #[error("{op} failed: {source}")]
    Socket {
        op: SocketOp,
        #[source]
        source: io::Error,
    },

    /// The peer closed its end; a zero-byte read or write.
    #[error("client disconnected")]
    Disconnected,

    #[error("{0} deadline exceeded")]
    Timeout(SocketOp),

    #[error("socket already closed")]
    Closed,

    #[error("malformed socket address: {0}")]
    MalformedAddress(String),
}

impl NetError {
    pub(crate) fn socket(op: SocketOp) -> impl FnOnce(io::Error) -> NetError {
        move |source| NetError::Socket { op, source }
    }

    /// Classifies a failed send/recv. A provider error that means nothing can
    /// be transferred anymore is a disconnect, not a socket fault.
    pub(crate) fn transfer(op: SocketOp, source: io::Error) -> NetError {
        match source.kind() {
            ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::BrokenPipe
            | ErrorKind::NotConnected
            | ErrorKind::UnexpectedEof => NetError::Disconnected,
            ErrorKind::WouldBlock | ErrorKind::TimedOut => NetError::Timeout(op),
            _ => NetError::Socket { op, source },
        }
    }

    pub fn is_disconnect(&self) -> bool {
        matches!(self, NetError::Disconnected)
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, NetError::Timeout(_))
    }
}

impl From<NetError> for io::Error {
    fn from(err: NetError) -> Self {
        match err {
            NetError::Socket { source, .. } => source,
            NetError::Disconnected => io::Error::new(ErrorKind::ConnectionReset, err),
            NetError::Timeout(_) => io::Error::new(ErrorKind::TimedOut, err),
            NetError::Closed => io::Error::new(ErrorKind::NotConnected, err),
            NetError::AddressParse(_) | NetError::MalformedAddress(_) => {
                io::Error::new(ErrorKind::InvalidInput, err)
            }
        }
    }
}
