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

// JSON backend implementation
//
// The whole file is one array of objects. Every save reads the array,
// appends and overwrites the file. There is no concurrency protection:
// two writers racing on the same file will lose records.

use super::backend::{ensure_parent_directory, project_all, StorageBackend};
use super::destination::Destination;
use super::window::{slice_window, Window, WindowUnit};
use crate::error::{Result, StorageError};
use crate::record::{FieldMap, Record};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::Path;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

/// JSON document backend
#[derive(Debug, Default, Clone)]
pub struct JsonBackend;

impl JsonBackend {
    pub fn new() -> Self {
        Self
    }

    /// Read the current array; absent, empty or unparseable files count as empty
    async fn read_existing(path: &Path) -> Result<Vec<Record>> {
        let content = match fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(StorageError::connection(
                    format!("Failed to access '{}'", path.display()),
                    e,
                ))
            }
        };

        if content.trim().is_empty() {
            return Ok(Vec::new());
        }

        match serde_json::from_str::<Vec<Record>>(&content) {
            Ok(records) => Ok(records),
            Err(e) => {
                warn!(
                    "Overwriting unreadable JSON data in {}: {}",
                    path.display(),
                    e
                );
                Ok(Vec::new())
            }
        }
    }

    async fn write_all(path: &Path, records: &[Record]) -> Result<()> {
        let body = serde_json::to_vec(records)
            .map_err(|e| StorageError::malformed("Failed to serialize records", e))?;

        let write_error =
            |e: std::io::Error| StorageError::connection(format!("Failed to write data to '{}'", path.display()), e);

        let mut file = fs::File::create(path).await.map_err(write_error)?;
        file.write_all(&body).await.map_err(write_error)?;
        file.flush().await.map_err(write_error)?;
        Ok(())
    }
}

#[async_trait]
impl StorageBackend for JsonBackend {
    async fn save(
        &self,
        records: &[Record],
        destination: &Destination,
        fields: &FieldMap,
    ) -> Result<()> {
        let path = &destination
            .as_file()
            .ok_or_else(|| destination.mismatch("json"))?
            .path;
        let mut rows = project_all(records, fields)?;

        ensure_parent_directory(path)?;

        let mut data = Self::read_existing(path).await?;
        debug!(
            "Appending {} records to {} existing in {}",
            rows.len(),
            data.len(),
            path.display()
        );
        data.append(&mut rows);

        Self::write_all(path, &data).await?;
        info!("Saved {} records to {}", records.len(), path.display());
        Ok(())
    }

    async fn get(
        &self,
        destination: &Destination,
        fields: &FieldMap,
        window: Window,
    ) -> Result<Vec<Record>> {
        window.check(WindowUnit::Records, self.backend_type())?;
        let path = &destination
            .as_file()
            .ok_or_else(|| destination.mismatch("json"))?
            .path;

        let content = fs::read_to_string(path).await.map_err(|e| {
            StorageError::connection(format!("Failed to read data from '{}'", path.display()), e)
        })?;
        if content.trim().is_empty() {
            return Err(StorageError::empty());
        }

        let data: Vec<Record> = serde_json::from_str(&content).map_err(|e| {
            StorageError::malformed(format!("Malformed JSON in '{}'", path.display()), e)
        })?;
        if data.is_empty() {
            return Err(StorageError::empty());
        }

        // The array is append-ordered, so both slices are already ascending
        project_all(slice_window(&data, window), fields)
    }

    fn backend_type(&self) -> &str {
        "json"
    }
}
