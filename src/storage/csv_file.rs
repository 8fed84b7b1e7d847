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

// CSV backend implementation
//
// Append-only text file: a header row of field names, then one row per
// record. There is no index, so "last N" costs a full linear scan to count
// the rows before the file is rewound and read again from the tail offset.
// Single writer only; nothing is locked.

use super::backend::{ensure_parent_directory, project_all, run_blocking, StorageBackend};
use super::destination::Destination;
use super::window::{tail_offset, Window, WindowUnit};
use crate::error::{Result, StorageError};
use crate::record::{FieldMap, Record, Value};
use async_trait::async_trait;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// CSV file backend
#[derive(Debug, Default, Clone)]
pub struct CsvBackend;

impl CsvBackend {
    pub fn new() -> Self {
        Self
    }

    fn path(destination: &Destination) -> Result<PathBuf> {
        destination
            .as_file()
            .map(|file| file.path.clone())
            .ok_or_else(|| destination.mismatch("csv"))
    }
}

#[async_trait]
impl StorageBackend for CsvBackend {
    async fn save(
        &self,
        records: &[Record],
        destination: &Destination,
        fields: &FieldMap,
    ) -> Result<()> {
        let path = Self::path(destination)?;
        let rows = project_all(records, fields)?;
        let fields = fields.clone();

        run_blocking("csv", move || append_rows(&path, &rows, &fields)).await
    }

    async fn get(
        &self,
        destination: &Destination,
        fields: &FieldMap,
        window: Window,
    ) -> Result<Vec<Record>> {
        window.check(WindowUnit::Records, self.backend_type())?;
        let path = Self::path(destination)?;
        let fields = fields.clone();

        run_blocking("csv", move || read_window(&path, &fields, window)).await
    }

    fn backend_type(&self) -> &str {
        "csv"
    }
}

fn csv_error(path: &Path, e: csv::Error) -> StorageError {
    if e.is_io_error() {
        StorageError::connection(format!("Failed to access '{}'", path.display()), e)
    } else {
        StorageError::malformed(format!("Malformed CSV in '{}'", path.display()), e)
    }
}

fn reader_for<R: Read>(source: R) -> csv::Reader<R> {
    csv::ReaderBuilder::new().has_headers(true).from_reader(source)
}

fn append_rows(path: &Path, rows: &[Record], fields: &FieldMap) -> Result<()> {
    ensure_parent_directory(path)?;

    let mut file = OpenOptions::new()
        .create(true)
        .read(true)
        .append(true)
        .open(path)
        .map_err(|e| {
            StorageError::connection(format!("Failed to save data to '{}'", path.display()), e)
        })?;

    let is_new = file
        .metadata()
        .map_err(|e| StorageError::connection(format!("Failed to stat '{}'", path.display()), e))?
        .len()
        == 0;

    let names: Vec<&str> = fields.names().collect();
    if !is_new {
        let header = reader_for(&mut file)
            .headers()
            .map_err(|e| csv_error(path, e))?
            .clone();
        if !header.iter().eq(names.iter().copied()) {
            return Err(StorageError::schema(format!(
                "CSV header of '{}' is [{}], field map expects [{}]",
                path.display(),
                header.iter().collect::<Vec<_>>().join(","),
                names.join(",")
            )));
        }
        terminate_last_line(&mut file, path)?;
    }

    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(file);

    if is_new {
        debug!("Writing CSV header to {}", path.display());
        writer.write_record(&names).map_err(|e| csv_error(path, e))?;
    }

    for row in rows {
        writer
            .write_record(row.iter().map(|(_, value)| value.to_string()))
            .map_err(|e| csv_error(path, e))?;
    }

    writer.flush().map_err(|e| {
        StorageError::connection(format!("Failed to flush '{}'", path.display()), e)
    })?;

    info!("Saved {} records to {}", rows.len(), path.display());
    Ok(())
}

/// Add the missing line terminator to a hand-edited file so appended rows start on a fresh line
fn terminate_last_line(file: &mut File, path: &Path) -> Result<()> {
    let io_error =
        |e: std::io::Error| StorageError::connection(format!("Failed to access '{}'", path.display()), e);

    let mut last = [0u8; 1];
    file.seek(SeekFrom::End(-1)).map_err(io_error)?;
    file.read_exact(&mut last).map_err(io_error)?;
    if last[0] != b'\n' {
        debug!("Terminating last line of {}", path.display());
        file.write_all(b"\n").map_err(io_error)?;
    }
    Ok(())
}

/// Column index of every mapped field in the header
fn header_positions(header: &csv::StringRecord, fields: &FieldMap, path: &Path) -> Result<Vec<usize>> {
    if header.is_empty() {
        return Err(StorageError::data(format!(
            "Missing CSV header in '{}'",
            path.display()
        )));
    }

    fields
        .names()
        .map(|name| {
            header.iter().position(|h| h == name).ok_or_else(|| {
                StorageError::data(format!(
                    "CSV header of '{}' has no '{}' column",
                    path.display(),
                    name
                ))
            })
        })
        .collect()
}

fn parse_row(row: &csv::StringRecord, positions: &[usize], fields: &FieldMap) -> Result<Record> {
    fields
        .iter()
        .zip(positions)
        .map(|((name, spec), &idx)| {
            let raw = row.get(idx).ok_or_else(|| {
                StorageError::data(format!("CSV row is missing column '{}'", name))
            })?;
            Ok((name.to_string(), Value::parse(raw, spec.value_type())?))
        })
        .collect()
}

fn read_window(path: &Path, fields: &FieldMap, window: Window) -> Result<Vec<Record>> {
    let file = File::open(path).map_err(|e| {
        StorageError::connection(format!("Failed to read data from '{}'", path.display()), e)
    })?;

    let mut reader = reader_for(file);
    let header = reader.headers().map_err(|e| csv_error(path, e))?.clone();
    if header.is_empty() {
        return Err(StorageError::empty());
    }
    let positions = header_positions(&header, fields, path)?;

    let (skip, take) = match window {
        Window::First(n) => (0, n),
        Window::Last(n) => {
            let mut total = 0usize;
            let mut raw = csv::ByteRecord::new();
            while reader.read_byte_record(&mut raw).map_err(|e| csv_error(path, e))? {
                total += 1;
            }
            debug!("Counted {} rows in {}", total, path.display());

            let mut file = reader.into_inner();
            file.rewind().map_err(|e| {
                StorageError::connection(format!("Failed to rewind '{}'", path.display()), e)
            })?;
            reader = reader_for(file);
            reader.headers().map_err(|e| csv_error(path, e))?;

            (tail_offset(total, n), n)
        }
        Window::LastHours(_) => {
            return Err(StorageError::config(format!("csv backend cannot serve {}", window)))
        }
    };

    let mut records = Vec::new();
    let mut row = csv::StringRecord::new();
    let mut index = 0usize;
    while records.len() < take && reader.read_record(&mut row).map_err(|e| csv_error(path, e))? {
        if index >= skip {
            records.push(parse_row(&row, &positions, fields)?);
        }
        index += 1;
    }

    if records.is_empty() {
        return Err(StorageError::empty());
    }

    Ok(records)
}
