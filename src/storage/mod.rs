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

// Storage backend module
//
// Provides a trait-based abstraction over the stores records can be saved
// to and read back from (CSV and JSON files, SQLite, InfluxDB 1.x and 2.x).
// Callers go through the `Dispatcher`, which selects a backend by storage
// type name.

pub mod backend;
pub mod csv_file;
pub mod destination;
pub mod dispatcher;
pub mod factory;
pub(crate) mod http;
pub mod influx_v1;
pub mod influx_v2;
pub mod json_file;
pub mod line_protocol;
pub mod sqlite;
pub mod window;

pub use backend::StorageBackend;
pub use csv_file::CsvBackend;
pub use destination::{
    Destination, FileDestination, InfluxV1Destination, InfluxV2Destination, SqliteDestination,
};
pub use dispatcher::Dispatcher;
pub use factory::{BackendFactory, BackendKind};
pub use influx_v1::InfluxV1Backend;
pub use influx_v2::InfluxV2Backend;
pub use json_file::JsonBackend;
pub use sqlite::SqliteBackend;
pub use window::{Window, WindowUnit};
