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

// Configuration types for ntwk-datastore

use crate::record::FieldMap;
use crate::storage::{
    Destination, FileDestination, InfluxV1Destination, InfluxV2Destination, SqliteDestination,
    Window, WindowUnit,
};
use serde::{Deserialize, Serialize};

/// Main configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatastoreConfig {
    pub storage: StorageConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Storage configuration with backend selection
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    /// Storage type: "csv", "json", "sqlite", "timeseries-v1", "timeseries-v2"
    pub backend: String,

    /// Destination for the selected backend
    #[serde(flatten)]
    pub backend_config: BackendConfig,

    /// Fields to persist and retrieve, in order
    pub fields: FieldMap,
}

impl StorageConfig {
    pub fn destination(&self) -> Destination {
        self.backend_config.clone().into_destination()
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum BackendConfig {
    File {
        #[serde(rename = "file")]
        file: FileDestination,
    },
    Sqlite {
        #[serde(rename = "sqlite")]
        sqlite: SqliteDestination,
    },
    InfluxV1 {
        #[serde(rename = "influxdb")]
        influxdb: InfluxV1Destination,
    },
    InfluxV2 {
        #[serde(rename = "influxdb2")]
        influxdb2: InfluxV2Destination,
    },
}

impl BackendConfig {
    pub fn into_destination(self) -> Destination {
        match self {
            BackendConfig::File { file } => Destination::File(file),
            BackendConfig::Sqlite { sqlite } => Destination::Sqlite(sqlite),
            BackendConfig::InfluxV1 { influxdb } => Destination::InfluxV1(influxdb),
            BackendConfig::InfluxV2 { influxdb2 } => Destination::InfluxV2(influxdb2),
        }
    }

    pub fn as_influx_v1_mut(&mut self) -> Option<&mut InfluxV1Destination> {
        match self {
            BackendConfig::InfluxV1 { influxdb } => Some(influxdb),
            _ => None,
        }
    }

    pub fn as_influx_v2_mut(&mut self) -> Option<&mut InfluxV2Destination> {
        match self {
            BackendConfig::InfluxV2 { influxdb2 } => Some(influxdb2),
            _ => None,
        }
    }
}

/// Default window used by `get`
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetrievalConfig {
    #[serde(default = "default_count")]
    pub count: usize,

    /// Earliest records instead of latest
    #[serde(default)]
    pub first: bool,

    /// Trailing range for backends that count in hours; falls back to `count`
    #[serde(default)]
    pub hours: Option<u32>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            count: default_count(),
            first: false,
            hours: None,
        }
    }
}

impl RetrievalConfig {
    /// Window expressed in the unit the backend counts in
    pub fn window(&self, unit: WindowUnit) -> Window {
        match unit {
            WindowUnit::Records => Window::records(self.count, self.first),
            WindowUnit::Hours => Window::hours(
                self.hours
                    .unwrap_or_else(|| u32::try_from(self.count).unwrap_or(u32::MAX)),
            ),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String, // "trace", "debug", "info", "warn", "error"

    #[serde(default = "default_log_format")]
    pub format: String, // "text", "json"
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

// Default value functions
fn default_count() -> usize { 10 }
fn default_log_level() -> String { "info".to_string() }
fn default_log_format() -> String { "text".to_string() }
