// Copyright 2025 jonefeewang@gmail.com
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::network::NetError;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// general errors
    #[error("illegal state: {0}")]
    IllegalStateError(String),

    #[error("invalid value: {0}")]
    InvalidValue(String),

    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("network error: {0}")]
    Net(#[from] NetError),

    #[error("config file error: {0}")]
    ConfigFileError(#[from] config::ConfigError),

    #[error("task join error: {0}")]
    JoinError(#[from] tokio::task::JoinError),

    /// marker error, the frame buffer needs more bytes
    #[error("incomplete frame")]
    Incomplete,

    /// echo protocol errors
    #[error("malformed protocol: {0}")]
    MalformedProtocol(String),

    #[error("message too large: {0}")]
    MessageTooLarge(String),
}
