use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::BytesMut;
use dashmap::DashMap;
use tokio::sync::{broadcast, mpsc, Semaphore};
use tracing::{debug, error, info, warn};

use crate::network::{Connection, Listener, NetError, SocketAddress};
use crate::AppError;
use crate::AppResult;

use super::config::{Framing, NetworkConfig};
use super::frame::EchoFrame;
use super::Shutdown;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Prefix of every echo reply.
pub const RESPONSE_PREFIX: &[u8] = b"You've sent: ";

/// Builds the reply for one received message. Only the bytes actually
/// received are echoed.
pub fn echo_response(message: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(RESPONSE_PREFIX.len() + message.len());
    out.extend_from_slice(RESPONSE_PREFIX);
    out.extend_from_slice(message);
    out
}

/// Both a peer disconnect and a close from the server side end the stream.
fn is_end_of_stream(err: &NetError) -> bool {
    err.is_disconnect() || matches!(err, NetError::Closed)
}

type ConnectionRegistry = Arc<DashMap<u64, Arc<Connection>>>;

// handler for each connection, runs on a blocking thread
struct ConnectionHandler {
    _shutdown_complete_tx: mpsc::Sender<()>,
    connection_id: u64,
    connection: Arc<Connection>,
    connections: ConnectionRegistry,
    config: Arc<NetworkConfig>,
}

impl ConnectionHandler {
    fn handle_connection(&mut self) -> AppResult<()> {
        match self.config.framing {
            Framing::Raw => self.serve_raw(),
            Framing::LengthPrefixed => self.serve_framed(),
        }
    }

    fn serve_raw(&self) -> AppResult<()> {
        let mut buf = vec![0u8; self.config.conn_read_buffer_size];
        loop {
            let n = match self.connection.read(&mut buf) {
                Ok(n) => n,
                Err(err) if is_end_of_stream(&err) => return Ok(()),
                Err(err) => return Err(err.into()),
            };
            match self.connection.write_all(&echo_response(&buf[..n])) {
                Ok(()) => {}
                Err(err) if is_end_of_stream(&err) => return Ok(()),
                Err(err) => return Err(err.into()),
            }
        }
    }

    fn serve_framed(&self) -> AppResult<()> {
        let mut buffer = BytesMut::with_capacity(self.config.conn_read_buffer_size);
        let mut scratch = vec![0u8; self.config.conn_read_buffer_size];
        loop {
            let frame = match self.read_frame(&mut buffer, &mut scratch)? {
                Some(frame) => frame,
                // client close the connection gracefully
                None => return Ok(()),
            };
            let response = EchoFrame::new(echo_response(&frame.body));
            match self.connection.write_all(&response.encode()) {
                Ok(()) => {}
                Err(err) if is_end_of_stream(&err) => return Ok(()),
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// Reads a length-prefixed frame from the connection.
    ///
    /// Keeps reading into `buffer` until a complete frame can be parsed. A
    /// malformed or oversized header is an error and the connection should be
    /// closed. If the client closes the connection between frames, `None` is
    /// returned; closing in the middle of a frame is an error.
    fn read_frame(
        &self,
        buffer: &mut BytesMut,
        scratch: &mut [u8],
    ) -> AppResult<Option<EchoFrame>> {
        loop {
            if let Some(frame) = EchoFrame::parse(buffer, self.config.max_package_size)? {
                return Ok(Some(frame));
            }
            match self.connection.read(scratch) {
                Ok(n) => buffer.extend_from_slice(&scratch[..n]),
                Err(err) if is_end_of_stream(&err) => {
                    return if buffer.is_empty() {
                        Ok(None)
                    } else {
                        Err(AppError::MalformedProtocol(format!(
                            "connection closed with {} bytes of an unfinished frame",
                            buffer.len()
                        )))
                    };
                }
                Err(err) => return Err(err.into()),
            }
        }
    }
}

impl Drop for ConnectionHandler {
    fn drop(&mut self) {
        self.connections.remove(&self.connection_id);
        match self.connection.close() {
            Ok(()) | Err(NetError::Closed) => {}
            Err(err) => warn!("could not close connection {}: {}", self.connection_id, err),
        }
        debug!("connection handler {} dropped", self.connection_id);
    }
}

/// Accepts connections and echoes what each client sends.
///
/// At most `max_connection` connections are served at once; further clients
/// wait in the listen backlog until a handler finishes. Every handler runs on
/// its own blocking thread.
#[derive(Debug)]
pub struct EchoServer {
    listener: Arc<Listener>,
    config: Arc<NetworkConfig>,
    limit_connections: Arc<Semaphore>,
    connections: ConnectionRegistry,
    notify_shutdown: broadcast::Sender<()>,
    shutdown_complete_tx: mpsc::Sender<()>,
}

impl EchoServer {
    pub fn new(
        listener: Listener,
        config: NetworkConfig,
        notify_shutdown: broadcast::Sender<()>,
        shutdown_complete_tx: mpsc::Sender<()>,
    ) -> Self {
        EchoServer {
            listener: Arc::new(listener),
            limit_connections: Arc::new(Semaphore::new(config.max_connection)),
            config: Arc::new(config),
            connections: Arc::new(DashMap::new()),
            notify_shutdown,
            shutdown_complete_tx,
        }
    }

    pub fn local_address(&self) -> &SocketAddress {
        self.listener.address()
    }

    /// Connections currently being served.
    pub fn live_connections(&self) -> usize {
        self.connections.len()
    }

    /// Accepts connections until shutdown is signalled or accepting fails.
    ///
    /// A permit is taken before each accept, so the server stops accepting
    /// while `max_connection` handlers are busy. A failed accept ends the
    /// loop with an error; the caller treats it as fatal.
    ///
    /// On shutdown the listener and every live connection are closed, which
    /// wakes handlers blocked in a read. Handlers hold a clone of
    /// `shutdown_complete_tx`, so the owner can wait for all of them by
    /// waiting for the channel to close.
    #[tracing::instrument(skip(self), fields(addr = %self.listener.address()))]
    pub async fn run(&self) -> AppResult<()> {
        let mut shutdown = Shutdown::new(self.notify_shutdown.subscribe());
        loop {
            let permit = tokio::select! {
                permit = self.limit_connections.clone().acquire_owned() => permit.map_err(|err| {
                    AppError::IllegalStateError(format!("connection limiter closed: {}", err))
                })?,
                _ = shutdown.recv() => break,
            };

            let connection = tokio::select! {
                res = self.accept() => res?,
                _ = shutdown.recv() => break,
            };

            let connection_id = NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed);
            info!(
                "client {} connected from {}",
                connection_id,
                connection.remote_address()
            );
            let connection = Arc::new(connection);
            self.connections.insert(connection_id, connection.clone());

            let mut handler = ConnectionHandler {
                _shutdown_complete_tx: self.shutdown_complete_tx.clone(),
                connection_id,
                connection,
                connections: self.connections.clone(),
                config: self.config.clone(),
            };

            tokio::task::spawn_blocking(move || {
                if let Err(err) = handler.handle_connection() {
                    error!("connection {} error: {}", connection_id, err);
                }
                info!("client {} disconnected", connection_id);
                // unregister before the permit frees a slot for the next client
                drop(handler);
                drop(permit);
            });
        }
        debug!("echo server exit accept loop");
        self.close();
        Ok(())
    }

    async fn accept(&self) -> AppResult<Connection> {
        let listener = self.listener.clone();
        let connection = tokio::task::spawn_blocking(move || listener.accept()).await??;
        Ok(connection)
    }

    /// Closes the listener and every live connection. Safe to call more
    /// than once.
    pub fn close(&self) {
        match self.listener.close() {
            Ok(()) | Err(NetError::Closed) => {}
            Err(err) => warn!("could not close listener: {}", err),
        }
        for entry in self.connections.iter() {
            match entry.value().close() {
                Ok(()) | Err(NetError::Closed) => {}
                Err(err) => warn!("could not close connection {}: {}", entry.key(), err),
            }
        }
    }
}

impl Drop for EchoServer {
    fn drop(&mut self) {
        debug!("echo server dropped");
    }
}
