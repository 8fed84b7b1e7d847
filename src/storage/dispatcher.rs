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

// Backend dispatcher: the single entry point surrounding code talks to

use super::backend::StorageBackend;
use super::destination::Destination;
use super::factory::{BackendFactory, BackendKind};
use super::window::{Window, WindowUnit};
use crate::config::StorageConfig;
use crate::error::Result;
use crate::record::{FieldMap, Record};
use std::sync::Arc;
use tracing::debug;

/// Resolves a storage type once and forwards save/get calls to that backend
#[derive(Clone)]
pub struct Dispatcher {
    kind: BackendKind,
    backend: Arc<dyn StorageBackend>,
}

impl Dispatcher {
    /// Resolve a case-insensitive storage type. Unknown types fail before any I/O.
    pub fn new(storage_type: &str) -> Result<Self> {
        Ok(Self::for_kind(storage_type.parse()?))
    }

    pub fn for_kind(kind: BackendKind) -> Self {
        Self {
            kind,
            backend: BackendFactory::create(kind),
        }
    }

    /// Resolve the configured backend and check its destination shape
    pub fn from_config(config: &StorageConfig) -> Result<Self> {
        let dispatcher = Self::new(&config.backend)?;
        dispatcher.check_destination(&config.destination())?;
        Ok(dispatcher)
    }

    pub fn kind(&self) -> BackendKind {
        self.kind
    }

    /// Unit the selected backend counts windows in (records or hours)
    pub fn window_unit(&self) -> WindowUnit {
        self.backend.window_unit()
    }

    pub async fn save(
        &self,
        records: &[Record],
        destination: &Destination,
        fields: &FieldMap,
    ) -> Result<()> {
        self.check_destination(destination)?;
        debug!("Saving {} records via {}", records.len(), self.kind);
        self.backend.save(records, destination, fields).await
    }

    pub async fn get(
        &self,
        destination: &Destination,
        fields: &FieldMap,
        window: Window,
    ) -> Result<Vec<Record>> {
        self.check_destination(destination)?;
        debug!("Reading {} via {}", window, self.kind);
        self.backend.get(destination, fields, window).await
    }

    fn check_destination(&self, destination: &Destination) -> Result<()> {
        if self.kind.accepts(destination) {
            Ok(())
        } else {
            Err(destination.mismatch(self.kind.as_str()))
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("kind", &self.kind)
            .field("backend", &self.backend.backend_type())
            .finish()
    }
}

impl From<BackendKind> for Dispatcher {
    fn from(kind: BackendKind) -> Self {
        Self::for_kind(kind)
    }
}
