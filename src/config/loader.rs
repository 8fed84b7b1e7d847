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

// Configuration loader with environment variable substitution

use super::types::*;
use crate::storage::influx_v1::time_series_time_key;
use crate::storage::BackendKind;
use anyhow::{bail, Context, Result};
use regex::Regex;
use std::path::Path;

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from file with environment variable substitution
    pub fn load<P: AsRef<Path>>(path: P) -> Result<DatastoreConfig> {
        let content =
            std::fs::read_to_string(path.as_ref()).context("Failed to read config file")?;

        // Substitute environment variables
        let content = Self::substitute_env_vars(&content)?;

        let config: DatastoreConfig =
            serde_yaml::from_str(&content).context("Failed to parse YAML configuration")?;

        Self::validate(&config)?;

        Ok(config)
    }

    /// Substitute ${VAR} and ${VAR:-default} patterns with environment variables
    ///
    /// Examples:
    /// - ${HOME} -> /home/user
    /// - ${INFLUX_URL:-http://localhost:8086} -> http://localhost:8086 (if INFLUX_URL not set)
    fn substitute_env_vars(content: &str) -> Result<String> {
        let re = Regex::new(r"\$\{([^}:]+)(?::-([^}]+))?\}")
            .context("Invalid substitution pattern")?;

        Ok(re
            .replace_all(content, |caps: &regex::Captures| {
                let var_name = &caps[1];
                let default_value = caps.get(2).map(|m| m.as_str());

                match std::env::var(var_name) {
                    Ok(value) => value,
                    Err(_) => match default_value {
                        Some(default) => default.to_string(),
                        // Keep original if no default and var not found
                        None => format!("${{{}}}", var_name),
                    },
                }
            })
            .to_string())
    }

    /// Validate configuration
    pub fn validate(config: &DatastoreConfig) -> Result<()> {
        let kind: BackendKind = config.storage.backend.parse()?;

        let destination = config.storage.destination();
        if !kind.accepts(&destination) {
            bail!(
                "{} backend selected but '{}' destination configured",
                kind,
                destination.kind()
            );
        }

        if let Some(sqlite) = destination.as_sqlite() {
            sqlite.validate()?;
        }

        if matches!(kind, BackendKind::TimeSeriesV1 | BackendKind::TimeSeriesV2) {
            time_series_time_key(&config.storage.fields)?;
        }

        if config.retrieval.count == 0 {
            bail!("retrieval.count must be > 0");
        }

        if config.retrieval.hours == Some(0) {
            bail!("retrieval.hours must be > 0");
        }

        match config.logging.format.as_str() {
            "text" | "json" => {}
            unknown => bail!("Unknown logging.format: '{}'. Supported: text, json", unknown),
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(yaml: &str) -> DatastoreConfig {
        serde_yaml::from_str(yaml).unwrap()
    }

    const CSV: &str = r#"
storage:
  backend: csv
  file:
    path: /tmp/speed.csv
  fields:
    timestamp: text
    ping: real
"#;

    #[test]
    fn test_env_var_substitution() {
        std::env::set_var("NTWK_TEST_VAR", "test_value");

        let output = ConfigLoader::substitute_env_vars("url: ${NTWK_TEST_VAR}").unwrap();
        assert_eq!(output, "url: test_value");

        std::env::remove_var("NTWK_TEST_VAR");
    }

    #[test]
    fn test_env_var_with_default() {
        std::env::remove_var("NTWK_TEST_VAR2");

        let output =
            ConfigLoader::substitute_env_vars("path: ${NTWK_TEST_VAR2:-/data/speed.csv}").unwrap();
        assert_eq!(output, "path: /data/speed.csv");
    }

    #[test]
    fn test_validation_defaults() {
        let config = config(CSV);
        assert!(ConfigLoader::validate(&config).is_ok());
        assert_eq!(config.retrieval.count, 10);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_validation_unknown_backend() {
        let mut config = config(CSV);
        config.storage.backend = "xml".to_string();

        let result = ConfigLoader::validate(&config);
        assert!(result.unwrap_err().to_string().contains("'xml' is not supported"));
    }

    #[test]
    fn test_validation_destination_mismatch() {
        let mut config = config(CSV);
        config.storage.backend = "sqlite".to_string();

        let result = ConfigLoader::validate(&config);
        assert!(result.unwrap_err().to_string().contains("'file' destination"));
    }

    #[test]
    fn test_validation_zero_count() {
        let mut config = config(CSV);
        config.retrieval.count = 0;

        let result = ConfigLoader::validate(&config);
        assert!(result.unwrap_err().to_string().contains("retrieval.count"));
    }

    #[test]
    fn test_validation_time_series_fields() {
        let config = config(
            r#"
storage:
  backend: influxdb
  influxdb:
    url: http://localhost:8086
    database: speedtest
    measurement: speed
  fields:
    timestamp: timestamp
    location: tag
"#,
        );

        assert!(ConfigLoader::validate(&config).is_err());
    }
}
