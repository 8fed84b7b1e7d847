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

// Destinations: where a backend reads and writes

use crate::error::{Result, StorageError};
use crate::record::is_identifier;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Addressing of one store, shaped after the backend's native model
#[derive(Debug, Clone, PartialEq)]
pub enum Destination {
    /// CSV or JSON file
    File(FileDestination),
    /// SQLite database file and table
    Sqlite(SqliteDestination),
    /// InfluxDB 1.x database, retention policy and measurement
    InfluxV1(InfluxV1Destination),
    /// InfluxDB 2.x bucket, organization and measurement
    InfluxV2(InfluxV2Destination),
}

impl Destination {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Destination::File(FileDestination { path: path.into() })
    }

    pub fn sqlite(path: impl Into<PathBuf>, table: impl Into<String>) -> Self {
        Destination::Sqlite(SqliteDestination {
            path: path.into(),
            table: table.into(),
        })
    }

    /// Short name of the addressing model, used in error messages
    pub fn kind(&self) -> &'static str {
        match self {
            Destination::File(_) => "file",
            Destination::Sqlite(_) => "sqlite",
            Destination::InfluxV1(_) => "influxdb",
            Destination::InfluxV2(_) => "influxdb2",
        }
    }

    pub fn as_file(&self) -> Option<&FileDestination> {
        match self {
            Destination::File(file) => Some(file),
            _ => None,
        }
    }

    pub fn as_sqlite(&self) -> Option<&SqliteDestination> {
        match self {
            Destination::Sqlite(sqlite) => Some(sqlite),
            _ => None,
        }
    }

    pub fn as_influx_v1(&self) -> Option<&InfluxV1Destination> {
        match self {
            Destination::InfluxV1(influx) => Some(influx),
            _ => None,
        }
    }

    pub fn as_influx_v2(&self) -> Option<&InfluxV2Destination> {
        match self {
            Destination::InfluxV2(influx) => Some(influx),
            _ => None,
        }
    }

    /// Error for a backend handed a destination it cannot address
    pub(crate) fn mismatch(&self, backend: &str) -> StorageError {
        StorageError::config(format!(
            "{} backend cannot use a '{}' destination",
            backend,
            self.kind()
        ))
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct FileDestination {
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SqliteDestination {
    pub path: PathBuf,
    #[serde(default = "default_table")]
    pub table: String,
}

impl SqliteDestination {
    pub fn validate(&self) -> Result<()> {
        if !is_identifier(&self.table) {
            return Err(StorageError::config(format!(
                "Table name '{}' is not a valid identifier",
                self.table
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct InfluxV1Destination {
    pub url: String,
    pub database: String,
    #[serde(default)]
    pub retention_policy: Option<String>,
    pub measurement: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

impl InfluxV1Destination {
    pub fn new(
        url: impl Into<String>,
        database: impl Into<String>,
        measurement: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            database: database.into(),
            retention_policy: None,
            measurement: measurement.into(),
            username: None,
            password: None,
            timeout_seconds: default_timeout(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.url.is_empty() {
            return Err(StorageError::config("Missing InfluxDB URL"));
        }
        if self.database.is_empty() {
            return Err(StorageError::config("Missing InfluxDB database name"));
        }
        if self.measurement.is_empty() {
            return Err(StorageError::config("Missing InfluxDB measurement name"));
        }
        if self.password.is_some() && self.username.is_none() {
            return Err(StorageError::config("InfluxDB password given without username"));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct InfluxV2Destination {
    pub url: String,
    pub org: String,
    pub bucket: String,
    pub token: String,
    pub measurement: String,
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

impl InfluxV2Destination {
    pub fn new(
        url: impl Into<String>,
        org: impl Into<String>,
        bucket: impl Into<String>,
        token: impl Into<String>,
        measurement: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            org: org.into(),
            bucket: bucket.into(),
            token: token.into(),
            measurement: measurement.into(),
            timeout_seconds: default_timeout(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.url.is_empty() {
            return Err(StorageError::config("Missing InfluxDB URL"));
        }
        if self.token.is_empty() {
            return Err(StorageError::config("Missing token"));
        }
        if self.org.is_empty() {
            return Err(StorageError::config("Missing org ID"));
        }
        if self.bucket.is_empty() {
            return Err(StorageError::config("Missing bucket name/ID"));
        }
        if self.measurement.is_empty() {
            return Err(StorageError::config("Missing InfluxDB measurement name"));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

fn default_table() -> String { "records".to_string() }
fn default_timeout() -> u64 { 30 }

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_v2_missing_credentials() {
        let mut dest = InfluxV2Destination::new("http://localhost:8086", "org", "bucket", "", "speed");
        assert!(dest.validate().unwrap_err().to_string().contains("token"));

        dest.token = "secret".to_string();
        dest.org = String::new();
        assert!(dest.validate().unwrap_err().is_configuration());
    }

    #[test]
    fn test_v1_password_needs_user() {
        let mut dest = InfluxV1Destination::new("http://localhost:8086", "speedtest", "speed");
        assert!(dest.validate().is_ok());

        dest.password = Some("pw".to_string());
        assert!(dest.validate().is_err());
    }

    #[test]
    fn test_sqlite_table_name() {
        assert!(SqliteDestination {
            path: "x.db".into(),
            table: "records; DROP".to_string()
        }
        .validate()
        .is_err());
    }

    #[test]
    fn test_mismatch_message() {
        let err = Destination::file("/tmp/a.csv").mismatch("sqlite");
        assert!(err.is_configuration());
        assert!(err.to_string().contains("'file'"));
    }
}
