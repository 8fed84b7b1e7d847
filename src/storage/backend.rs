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

// Storage backend trait: the save/get contract every adapter implements

use super::destination::Destination;
use super::window::{Window, WindowUnit};
use crate::error::{Result, StorageError};
use crate::record::{FieldMap, Record};
use async_trait::async_trait;
use std::path::Path;
use tracing::info;

/// Generic storage backend trait
///
/// Each call is short-lived: handles and connections are acquired inside the
/// call and released before it returns, on every path. Nothing is retried.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Append records to the destination, creating it (and its schema) if absent
    ///
    /// # Arguments
    /// * `records` - Records to append; keys not in `fields` are dropped
    /// * `destination` - Where to write
    /// * `fields` - Which fields to persist, in order, with their type or role
    async fn save(
        &self,
        records: &[Record],
        destination: &Destination,
        fields: &FieldMap,
    ) -> Result<()>;

    /// Read a window of records, always in ascending time order
    ///
    /// Fails with a data error when the destination holds no records.
    async fn get(
        &self,
        destination: &Destination,
        fields: &FieldMap,
        window: Window,
    ) -> Result<Vec<Record>>;

    /// Unit in which this backend counts a window
    fn window_unit(&self) -> WindowUnit {
        WindowUnit::Records
    }

    /// Get backend type identifier
    fn backend_type(&self) -> &str;
}

/// Project every record onto the field map
pub(crate) fn project_all(records: &[Record], fields: &FieldMap) -> Result<Vec<Record>> {
    records.iter().map(|r| r.project(fields)).collect()
}

/// Create the directory holding `path` if it does not exist yet
pub(crate) fn ensure_parent_directory(path: &Path) -> Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() && !parent.exists() => {
            info!("Creating directory: {}", parent.display());
            std::fs::create_dir_all(parent).map_err(|e| {
                StorageError::connection(
                    format!("Failed to create path '{}'", parent.display()),
                    e,
                )
            })
        }
        _ => Ok(()),
    }
}

/// Run synchronous driver code to completion on the blocking pool
pub(crate) async fn run_blocking<T, F>(backend: &str, work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| StorageError::connection(format!("{} worker failed", backend), e))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_ensure_parent_directory() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("a").join("b").join("data.csv");

        ensure_parent_directory(&path).unwrap();
        assert!(path.parent().unwrap().is_dir());
        // Second call is a no-op
        ensure_parent_directory(&path).unwrap();
    }

    #[test]
    fn test_bare_file_name_has_no_parent_to_create() {
        assert!(ensure_parent_directory(Path::new("data.csv")).is_ok());
    }

    #[tokio::test]
    async fn test_run_blocking_propagates_errors() {
        let ok = run_blocking("test", || Ok(7)).await.unwrap();
        assert_eq!(ok, 7);

        let err = run_blocking::<(), _>("test", || Err(StorageError::empty()))
            .await
            .unwrap_err();
        assert!(err.is_empty_data());
    }
}
