use std::path::Path;

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;

use super::{AppError, AppResult};

pub static GLOBAL_CONFIG: OnceCell<EchoConfig> = OnceCell::new();
pub fn global_config() -> &'static EchoConfig {
    GLOBAL_CONFIG
        .get()
        .expect("global config read before it was set")
}

/// How the echo server delimits messages on a connection.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Framing {
    /// Whatever one read returns is one message.
    #[default]
    Raw,
    /// Big-endian i32 length followed by that many bytes.
    LengthPrefixed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub ip: String,
    pub port: u16,
    /// Upper bound on connections served at the same time.
    pub max_connection: usize,
    pub conn_read_buffer_size: usize,
    pub max_package_size: usize,
    pub framing: Framing,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        NetworkConfig {
            ip: "127.0.0.1".to_string(),
            port: 1234,
            max_connection: 1024,
            conn_read_buffer_size: 1024,
            max_package_size: 1024 * 1024,
            framing: Framing::Raw,
        }
    }
}

impl NetworkConfig {
    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.ip, self.port)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub dir: String,
    pub file_prefix: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            dir: "logs".to_string(),
            file_prefix: "tinynet.log".to_string(),
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EchoConfig {
    pub network: NetworkConfig,
    pub log: LogConfig,
}

impl EchoConfig {
    /// Loads the configuration from `path` (optional, any format the
    /// `config` crate understands) and `TINYNET__SECTION__KEY` environment
    /// variables, on top of the built-in defaults.
    pub fn set_up_config<P: AsRef<Path>>(path: P) -> AppResult<EchoConfig> {
        let path_str = path
            .as_ref()
            .to_str()
            .ok_or(AppError::InvalidValue(format!(
                "config file path: {}",
                path.as_ref().to_string_lossy()
            )))?;
        let config = config::Config::builder()
            .add_source(config::File::with_name(path_str).required(false))
            .add_source(
                config::Environment::with_prefix("TINYNET")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let echo_config: EchoConfig = config.try_deserialize()?;
        echo_config.validate()?;

        Ok(echo_config)
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.network.max_connection == 0 {
            return Err(AppError::InvalidValue(
                "network.max_connection must be at least 1".into(),
            ));
        }
        if self.network.max_connection > Semaphore::MAX_PERMITS {
            return Err(AppError::InvalidValue(format!(
                "network.max_connection {} exceeds {}",
                self.network.max_connection,
                Semaphore::MAX_PERMITS
            )));
        }
        if self.network.conn_read_buffer_size == 0 {
            return Err(AppError::InvalidValue(
                "network.conn_read_buffer_size must be at least 1".into(),
            ));
        }
        if self.network.max_package_size > i32::MAX as usize {
            return Err(AppError::InvalidValue(format!(
                "network.max_package_size {} does not fit a frame header",
                self.network.max_package_size
            )));
        }
        Ok(())
    }
}
