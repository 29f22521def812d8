pub mod network;
pub mod provider;
pub mod service;

pub use network::{
    dial, listen, resolve, AddressParseError, BinarySocketAddress, Connection, Dialer, Listener,
    NetError, NetResult, SocketAddress,
};
pub use provider::{system_provider, SocketProvider, SystemProvider};
pub use service::{
    global_config, setup_local_tracing, setup_tracing, AppError, AppResult, EchoConfig,
    EchoServer, EchoService, Shutdown, GLOBAL_CONFIG,
};
