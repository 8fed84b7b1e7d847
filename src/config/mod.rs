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

// Configuration module for ntwk-datastore
//
// Provides:
// - YAML configuration file loading
// - Environment variable substitution
// - Configuration validation
// - Default values

mod loader;
pub mod types;

pub use loader::ConfigLoader;
pub use types::*;

use anyhow::{Context, Result};
use std::path::Path;

/// Load configuration from a YAML file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<DatastoreConfig> {
    ConfigLoader::load(path).context("Failed to load configuration")
}

/// Load configuration with environment variable overrides
pub fn load_config_with_env<P: AsRef<Path>>(path: P) -> Result<DatastoreConfig> {
    let mut config = load_config(path)?;
    apply_env_overrides(&mut config, |name| std::env::var(name).ok());
    ConfigLoader::validate(&config).context("Invalid configuration after environment overrides")?;
    Ok(config)
}

/// Apply `NTWK_STORAGE`, `INFLUX_URL`, `INFLUX_TOKEN` and `INFLUX_PASSWORD`
pub fn apply_env_overrides<F>(config: &mut DatastoreConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(backend) = lookup("NTWK_STORAGE") {
        config.storage.backend = backend;
    }

    let backend_config = &mut config.storage.backend_config;

    if let Some(url) = lookup("INFLUX_URL") {
        if let Some(influx) = backend_config.as_influx_v1_mut() {
            influx.url = url.clone();
        }
        if let Some(influx) = backend_config.as_influx_v2_mut() {
            influx.url = url;
        }
    }

    if let Some(token) = lookup("INFLUX_TOKEN") {
        if let Some(influx) = backend_config.as_influx_v2_mut() {
            influx.token = token;
        }
    }

    if let Some(password) = lookup("INFLUX_PASSWORD") {
        if let Some(influx) = backend_config.as_influx_v1_mut() {
            influx.password = Some(password);
        }
    }
}
