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

// Backend factory for creating storage backends from a storage type

use super::backend::StorageBackend;
use super::csv_file::CsvBackend;
use super::destination::Destination;
use super::influx_v1::InfluxV1Backend;
use super::influx_v2::InfluxV2Backend;
use super::json_file::JsonBackend;
use super::sqlite::SqliteBackend;
use crate::error::{Result, StorageError};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Closed set of supported backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    Csv,
    Json,
    Sqlite,
    TimeSeriesV1,
    TimeSeriesV2,
}

impl BackendKind {
    pub const ALL: [BackendKind; 5] = [
        BackendKind::Csv,
        BackendKind::Json,
        BackendKind::Sqlite,
        BackendKind::TimeSeriesV1,
        BackendKind::TimeSeriesV2,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Csv => "csv",
            BackendKind::Json => "json",
            BackendKind::Sqlite => "sqlite",
            BackendKind::TimeSeriesV1 => "timeseries-v1",
            BackendKind::TimeSeriesV2 => "timeseries-v2",
        }
    }

    /// Whether this backend can address the destination
    pub fn accepts(&self, destination: &Destination) -> bool {
        matches!(
            (self, destination),
            (BackendKind::Csv | BackendKind::Json, Destination::File(_))
                | (BackendKind::Sqlite, Destination::Sqlite(_))
                | (BackendKind::TimeSeriesV1, Destination::InfluxV1(_))
                | (BackendKind::TimeSeriesV2, Destination::InfluxV2(_))
        )
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "csv" => Ok(BackendKind::Csv),
            "json" => Ok(BackendKind::Json),
            "sqlite" => Ok(BackendKind::Sqlite),
            "timeseries-v1" | "influxdb" | "influx1x" => Ok(BackendKind::TimeSeriesV1),
            "timeseries-v2" | "influxdb2" | "influx2x" => Ok(BackendKind::TimeSeriesV2),
            _ => Err(StorageError::config(format!(
                "Data storage type '{}' is not supported. Supported: {}",
                s,
                BackendKind::ALL.map(|k| k.as_str()).join(", ")
            ))),
        }
    }
}

pub struct BackendFactory;

impl BackendFactory {
    /// Create the storage backend for a kind
    pub fn create(kind: BackendKind) -> Arc<dyn StorageBackend> {
        match kind {
            BackendKind::Csv => Arc::new(CsvBackend::new()),
            BackendKind::Json => Arc::new(JsonBackend::new()),
            BackendKind::Sqlite => Arc::new(SqliteBackend::new()),
            BackendKind::TimeSeriesV1 => Arc::new(InfluxV1Backend::new()),
            BackendKind::TimeSeriesV2 => Arc::new(InfluxV2Backend::new()),
        }
    }

    /// Create a storage backend from a storage type identifier
    pub fn from_name(name: &str) -> Result<Arc<dyn StorageBackend>> {
        Ok(Self::create(name.parse()?))
    }
}
