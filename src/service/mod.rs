pub use app_error::{AppError, AppResult};
pub use config::{global_config, EchoConfig, Framing, LogConfig, NetworkConfig, GLOBAL_CONFIG};
pub use echo::EchoService;
pub use frame::{EchoFrame, FRAME_HEADER_LEN};
pub use server::{echo_response, EchoServer, RESPONSE_PREFIX};
pub use shutdown::Shutdown;
pub use tracing_config::{setup_local_tracing, setup_tracing};

mod app_error;
mod config;
mod echo;
mod frame;
mod server;
mod shutdown;
mod tracing_config;
