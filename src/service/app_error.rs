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

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// caller misuse: unsupported strategies, unknown partitions, manual assignment
    /// on a non-manual consumer, ...
    #[error("illegal state: {0}")]
    IllegalStateError(String),

    #[error("duplicate consumer: {0}")]
    DuplicateConsumer(String),

    #[error("invalid value: {0} = {1}")]
    InvalidValue(&'static str, String),

    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("config file error: {0}")]
    ConfigFileError(#[from] config::ConfigError),

    #[error("tracing setup error: {0}")]
    TracingError(String),
}

impl From<tracing_subscriber::util::TryInitError> for AppError {
    fn from(value: tracing_subscriber::util::TryInitError) -> Self {
        AppError::TracingError(value.to_string())
    }
}
