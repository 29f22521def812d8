use tokio::sync::broadcast;
use tokio::sync::mpsc::{self, Sender};
use tokio::{runtime, signal};
use tracing::{error, info, trace};

use super::config::NetworkConfig;
use super::server::EchoServer;
use crate::network::listen;
use crate::{global_config, AppError, AppResult};

/// The echo service: one listener, one server, graceful shutdown on ctrl-c.
#[derive(Debug, Default)]
pub struct EchoService;

impl EchoService {
    pub fn new() -> Self {
        EchoService
    }

    /// Runs until ctrl-c or a fatal accept error, then waits for every
    /// connection handler to finish.
    pub fn start(&self, rt: &runtime::Runtime) -> AppResult<()> {
        let (notify_shutdown, _) = broadcast::channel(1);
        let (shutdown_complete_tx, mut shutdown_complete_rx) = mpsc::channel::<()>(1);

        let network_conf = global_config().network.clone();
        let result = rt.block_on(Self::run_tcp_server(
            network_conf,
            notify_shutdown,
            shutdown_complete_tx,
        ));

        // wait for shutdown complete
        trace!("waiting for shutdown complete...");
        rt.block_on(shutdown_complete_rx.recv());
        info!("echo service shutdown complete");
        result
    }

    async fn run_tcp_server(
        network_conf: NetworkConfig,
        notify_shutdown: broadcast::Sender<()>,
        shutdown_complete_tx: Sender<()>,
    ) -> AppResult<()> {
        let listen_address = network_conf.listen_address();
        let listener = listen("tcp", &listen_address).map_err(|err| {
            let error_msg = format!(
                "Failed to bind server to address: {} - Error: {}",
                listen_address, err
            );
            error!("{}", error_msg);
            AppError::IllegalStateError(error_msg)
        })?;
        info!("Listening on {}", listener.address());

        let server = EchoServer::new(
            listener,
            network_conf,
            notify_shutdown.clone(),
            shutdown_complete_tx,
        );
        let result = tokio::select! {
            res = server.run() => {
                if let Err(err) = &res {
                    error!(cause = %err, "failed to accept");
                }
                res
            }
            _ = signal::ctrl_c() => {
                info!("get shutdown signal");
                Ok(())
            }
        };

        // no receivers is fine, the run loop may already be gone
        let _ = notify_shutdown.send(());
        server.close();
        result
    }
}
