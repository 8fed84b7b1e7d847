// Copyright 2025 coScene
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

// Error taxonomy shared by every storage backend

use std::error::Error as StdError;

/// Boxed native error kept as the cause of a [`StorageError`]
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Result type for storage operations
pub type Result<T> = std::result::Result<T, StorageError>;

/// Message used whenever a destination holds no records
pub const EMPTY_DATA: &str = "empty data file";

/// Errors raised by the storage core.
///
/// Backends translate their native errors (I/O, SQLite, HTTP, parsing) into one of
/// these variants and keep the original error as the source. Nothing is retried here.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Unsupported storage type, bad field map, wrong destination shape or missing credential
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Cannot open a file or reach a server
    #[error("Connection error: {message}")]
    Connection {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// Required table, measurement or database is absent or does not match the field map
    #[error("Schema error: {0}")]
    Schema(String),

    /// Empty store, malformed record or missing field
    #[error("Data error: {message}")]
    Data {
        message: String,
        #[source]
        source: Option<BoxError>,
    },
}

impl StorageError {
    pub fn config(message: impl Into<String>) -> Self {
        StorageError::Configuration(message.into())
    }

    pub fn schema(message: impl Into<String>) -> Self {
        StorageError::Schema(message.into())
    }

    pub fn connection(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        StorageError::Connection {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    pub fn unreachable(message: impl Into<String>) -> Self {
        StorageError::Connection {
            message: message.into(),
            source: None,
        }
    }

    pub fn data(message: impl Into<String>) -> Self {
        StorageError::Data {
            message: message.into(),
            source: None,
        }
    }

    pub fn malformed(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        StorageError::Data {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// The "no records at this destination" error
    pub fn empty() -> Self {
        Self::data(EMPTY_DATA)
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, StorageError::Configuration(_))
    }

    pub fn is_connection(&self) -> bool {
        matches!(self, StorageError::Connection { .. })
    }

    pub fn is_schema(&self) -> bool {
        matches!(self, StorageError::Schema(_))
    }

    pub fn is_data(&self) -> bool {
        matches!(self, StorageError::Data { .. })
    }

    /// True for the empty-destination flavour of [`StorageError::Data`]
    pub fn is_empty_data(&self) -> bool {
        matches!(self, StorageError::Data { message, .. } if message == EMPTY_DATA)
    }
}
