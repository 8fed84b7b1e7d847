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

// Storage core for network speed measurements
//
// Persists ordered records to a pluggable backend and reads them back:
// - CSV and JSON files
// - SQLite tables, created on first save
// - InfluxDB 1.x and 2.x over HTTP
//
// Every read returns a window of records in ascending time order.

pub mod config;
pub mod error;
pub mod record;
pub mod storage;
pub mod timestamp;

// Re-export main types
pub use config::{load_config, load_config_with_env, DatastoreConfig};
pub use error::{Result, StorageError};
pub use record::{FieldMap, FieldSpec, FieldType, Record, Value};
pub use storage::{BackendKind, Destination, Dispatcher, StorageBackend, Window, WindowUnit};
