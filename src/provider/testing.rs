//! In-memory provider for exercising the network layer without the OS.

use std::collections::{HashMap, HashSet, VecDeque};
use std::io::{self, ErrorKind};
use std::time::Duration;

use parking_lot::{Mutex, MutexGuard};

use super::{RawSocket, ShutdownDirection, SocketProvider};
use crate::network::{BinarySocketAddress, SocketAddress};

#[derive(Debug, Default)]
struct State {
    next_fd: RawSocket,
    open: HashSet<RawSocket>,
    bound: HashMap<RawSocket, BinarySocketAddress>,
    failures: HashMap<&'static str, ErrorKind>,
    pending_peers: VecDeque<SocketAddress>,
    inbound: VecDeque<io::Result<Vec<u8>>>,
    send_results: VecDeque<io::Result<usize>>,
    sent: Vec<u8>,
    calls: Vec<String>,
    read_timeouts: Vec<Option<Duration>>,
    write_timeouts: Vec<Option<Duration>>,
    connect_timeouts: Vec<Duration>,
}

#[derive(Debug, Default)]
pub(crate) struct ScriptedProvider {
    state: Mutex<State>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        let provider = ScriptedProvider::default();
        provider.state.lock().next_fd = 3;
        provider
    }

    /// Makes every later call to `op` fail with `kind`.
    pub fn fail(&self, op: &'static str, kind: ErrorKind) {
        self.state.lock().failures.insert(op, kind);
    }

    pub fn push_peer(&self, peer: SocketAddress) {
        self.state.lock().pending_peers.push_back(peer);
    }

    pub fn push_inbound(&self, chunk: &[u8]) {
        self.state.lock().inbound.push_back(Ok(chunk.to_vec()));
    }

    pub fn push_recv_error(&self, kind: ErrorKind) {
        self.state.lock().inbound.push_back(Err(kind.into()));
    }

    pub fn push_send_result(&self, result: io::Result<usize>) {
        self.state.lock().send_results.push_back(result);
    }

    pub fn sent(&self) -> Vec<u8> {
        self.state.lock().sent.clone()
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().calls.clone()
    }

    pub fn open_sockets(&self) -> usize {
        self.state.lock().open.len()
    }

    pub fn read_timeouts(&self) -> Vec<Option<Duration>> {
        self.state.lock().read_timeouts.clone()
    }

    pub fn write_timeouts(&self) -> Vec<Option<Duration>> {
        self.state.lock().write_timeouts.clone()
    }

    pub fn connect_timeouts(&self) -> Vec<Duration> {
        self.state.lock().connect_timeouts.clone()
    }

    fn enter(
        &self,
        op: &'static str,
        fd: Option<RawSocket>,
    ) -> io::Result<MutexGuard<'_, State>> {
        let mut state = self.state.lock();
        match fd {
            Some(fd) => state.calls.push(format!("{}({})", op, fd)),
            None => state.calls.push(op.to_string()),
        }
        if let Some(kind) = state.failures.get(op) {
            return Err(io::Error::new(*kind, format!("scripted {} failure", op)));
        }
        if let Some(fd) = fd {
            if !state.open.contains(&fd) {
                return Err(io::Error::new(
                    ErrorKind::InvalidInput,
                    format!("bad descriptor {}", fd),
                ));
            }
        }
        Ok(state)
    }

    // loopback dials get a fixed ephemeral endpoint
    fn connected(state: &mut State, fd: RawSocket, addr: &BinarySocketAddress) {
        if addr.decode().ip() == [127, 0, 0, 1] {
            let local = SocketAddress::new([127, 0, 0, 1], 50000);
            state.bound.insert(fd, BinarySocketAddress::encode(&local));
        }
    }

    fn allocate(state: &mut State) -> RawSocket {
        let fd = state.next_fd;
        state.next_fd += 1;
        state.open.insert(fd);
        fd
    }
}

impl SocketProvider for ScriptedProvider {
    fn socket(&self, _family: u16, _socket_type: i32, _protocol: i32) -> io::Result<RawSocket> {
        let mut state = self.enter("socket", None)?;
        Ok(Self::allocate(&mut state))
    }

    fn bind(&self, fd: RawSocket, addr: &BinarySocketAddress) -> io::Result<()> {
        let mut state = self.enter("bind", Some(fd))?;
        let mut addr = *addr;
        if addr.decode().port() == 0 {
            let ip = addr.decode().ip();
            addr = BinarySocketAddress::encode(&SocketAddress::new(ip, 40000));
        }
        state.bound.insert(fd, addr);
        Ok(())
    }

    fn listen(&self, fd: RawSocket, _backlog: i32) -> io::Result<()> {
        self.enter("listen", Some(fd)).map(|_| ())
    }

    fn accept(&self, fd: RawSocket) -> io::Result<(RawSocket, BinarySocketAddress)> {
        let mut state = self.enter("accept", Some(fd))?;
        let peer = state
            .pending_peers
            .pop_front()
            .ok_or_else(|| io::Error::new(ErrorKind::WouldBlock, "no pending connection"))?;
        let client_fd = Self::allocate(&mut state);
        Ok((client_fd, BinarySocketAddress::encode(&peer)))
    }

    fn connect(&self, fd: RawSocket, addr: &BinarySocketAddress) -> io::Result<()> {
        let mut state = self.enter("connect", Some(fd))?;
        Self::connected(&mut state, fd, addr);
        Ok(())
    }

    fn connect_timeout(
        &self,
        fd: RawSocket,
        addr: &BinarySocketAddress,
        timeout: Duration,
    ) -> io::Result<()> {
        let mut state = self.enter("connect_timeout", Some(fd))?;
        state.connect_timeouts.push(timeout);
        Self::connected(&mut state, fd, addr);
        Ok(())
    }

    fn send(&self, fd: RawSocket, buf: &[u8], _flags: i32) -> io::Result<usize> {
        let mut state = self.enter("send", Some(fd))?;
        let written = match state.send_results.pop_front() {
            Some(result) => result?,
            None => buf.len(),
        };
        let written = written.min(buf.len());
        state.sent.extend_from_slice(&buf[..written]);
        Ok(written)
    }

    fn recv(&self, fd: RawSocket, buf: &mut [u8], _flags: i32) -> io::Result<usize> {
        let mut state = self.enter("recv", Some(fd))?;
        match state.inbound.pop_front() {
            Some(Ok(mut chunk)) => {
                let n = chunk.len().min(buf.len());
                buf[..n].copy_from_slice(&chunk[..n]);
                if n < chunk.len() {
                    state.inbound.push_front(Ok(chunk.split_off(n)));
                }
                Ok(n)
            }
            Some(Err(err)) => Err(err),
            None => Ok(0),
        }
    }

    fn shutdown(&self, fd: RawSocket, _direction: ShutdownDirection) -> io::Result<()> {
        self.enter("shutdown", Some(fd)).map(|_| ())
    }

    fn close(&self, fd: RawSocket) -> io::Result<()> {
        let mut state = self.enter("close", Some(fd))?;
        state.open.remove(&fd);
        state.bound.remove(&fd);
        Ok(())
    }

    fn local_address(&self, fd: RawSocket) -> io::Result<BinarySocketAddress> {
        let state = self.enter("local_address", Some(fd))?;
        state
            .bound
            .get(&fd)
            .copied()
            .ok_or_else(|| io::Error::new(ErrorKind::InvalidInput, "socket not bound"))
    }

    fn set_read_timeout(&self, fd: RawSocket, timeout: Option<Duration>) -> io::Result<()> {
        let mut state = self.enter("set_read_timeout", Some(fd))?;
        state.read_timeouts.push(timeout);
        Ok(())
    }

    fn set_write_timeout(&self, fd: RawSocket, timeout: Option<Duration>) -> io::Result<()> {
        let mut state = self.enter("set_write_timeout", Some(fd))?;
        state.write_timeouts.push(timeout);
        Ok(())
    }
}
