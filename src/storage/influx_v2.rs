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

// InfluxDB 2.x backend implementation
//
// Points are addressed by bucket + organization and read back with a Flux
// pipeline. Flux answers in column-oriented CSV (one row per field value),
// so records are rebuilt by grouping rows on `_time`. Windows for this
// backend are time ranges in hours, not row counts.

use super::backend::{project_all, StorageBackend};
use super::destination::{Destination, InfluxV2Destination};
use super::http::{check_status, client, endpoint, send_error};
use super::influx_v1::time_series_time_key;
use super::line_protocol::{encode, Point};
use super::window::{Window, WindowUnit};
use crate::error::{Result, StorageError};
use crate::record::{FieldMap, FieldSpec, Record, Value};
use crate::timestamp::{parse_server_time, time_value};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info};

/// InfluxDB 2.x time-series backend
#[derive(Debug, Default, Clone)]
pub struct InfluxV2Backend;

/// One row of a Flux CSV answer, keyed by column name
type FluxRow = HashMap<String, String>;

fn flux_string(raw: &str) -> String {
    format!("\"{}\"", raw.replace('\\', "\\\\").replace('"', "\\\""))
}

/// Render the filter/range/group pipeline for the trailing `hours`
pub fn flux_query(bucket: &str, measurement: &str, fields: &FieldMap, hours: u32) -> String {
    let field_filter = fields
        .fields()
        .map(|(name, _)| format!("r._field == {}", flux_string(name)))
        .collect::<Vec<_>>()
        .join(" or ");

    format!(
        "from(bucket: {bucket})\n  |> range(start: -{hours}h)\n  |> filter(fn: (r) => r._measurement == {measurement})\n  |> filter(fn: (r) => {fields})\n  |> group(columns: [\"_time\"])",
        bucket = flux_string(bucket),
        hours = hours,
        measurement = flux_string(measurement),
        fields = field_filter
    )
}

/// Parse an unannotated Flux CSV response; each table repeats its header row
pub fn parse_flux_csv(body: &str) -> Result<Vec<FluxRow>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(body.as_bytes());

    let mut header: Option<Vec<String>> = None;
    let mut rows = Vec::new();

    for record in reader.records() {
        let record = record
            .map_err(|e| StorageError::malformed("Unreadable Flux CSV response", e))?;

        if record.iter().all(str::is_empty) || record.get(0).is_some_and(|c| c.starts_with('#')) {
            continue;
        }
        if record.iter().any(|c| c == "_time") && record.iter().any(|c| c == "_value") {
            header = Some(record.iter().map(str::to_string).collect());
            continue;
        }

        let columns = header
            .as_ref()
            .ok_or_else(|| StorageError::data("Flux CSV row before any header"))?;
        rows.push(
            columns
                .iter()
                .cloned()
                .zip(record.iter().map(str::to_string))
                .collect(),
        );
    }

    Ok(rows)
}

/// Reassemble one record per `_time` group, ascending
pub fn assemble_records(rows: &[FluxRow], fields: &FieldMap, time_key: &str) -> Result<Vec<Record>> {
    let mut groups: BTreeMap<DateTime<Utc>, HashMap<String, Value>> = BTreeMap::new();

    for row in rows {
        let time = row
            .get("_time")
            .ok_or_else(|| StorageError::data("Flux row has no _time"))?;
        let group = groups.entry(parse_server_time(time)?).or_default();

        for tag in fields.tags() {
            if let Some(value) = row.get(tag).filter(|v| !v.is_empty()) {
                group
                    .entry(tag.to_string())
                    .or_insert_with(|| Value::Text(value.clone()));
            }
        }

        let name = row.get("_field").map(String::as_str).unwrap_or_default();
        if let Some(FieldSpec::Field(ty)) = fields.get(name) {
            let raw = row.get("_value").map(String::as_str).unwrap_or_default();
            if !group.contains_key(name) {
                group.insert(name.to_string(), Value::parse(raw, *ty)?);
            }
        }
    }

    Ok(groups
        .into_iter()
        .map(|(time, mut values)| {
            fields
                .iter()
                .map(|(name, spec)| {
                    let value = if name == time_key {
                        time_value(time, spec.value_type())
                    } else {
                        values.remove(name).unwrap_or(Value::Null)
                    };
                    (name.to_string(), value)
                })
                .collect()
        })
        .collect())
}

impl InfluxV2Backend {
    pub fn new() -> Self {
        Self
    }

    fn destination(destination: &Destination) -> Result<&InfluxV2Destination> {
        let influx = destination
            .as_influx_v2()
            .ok_or_else(|| destination.mismatch("timeseries-v2"))?;
        influx.validate()?;
        Ok(influx)
    }
}

#[async_trait]
impl StorageBackend for InfluxV2Backend {
    async fn save(
        &self,
        records: &[Record],
        destination: &Destination,
        fields: &FieldMap,
    ) -> Result<()> {
        let dest = Self::destination(destination)?;
        let time_key = time_series_time_key(fields)?;
        let points = project_all(records, fields)?
            .iter()
            .map(|r| Point::from_record(&dest.measurement, r, fields, time_key))
            .collect::<Result<Vec<_>>>()?;
        let body = encode(&points)?;

        let client = client(dest.timeout())?;
        let url = endpoint(&dest.url, "api/v2/write");
        let response = client
            .post(&url)
            .query(&[
                ("org", dest.org.as_str()),
                ("bucket", dest.bucket.as_str()),
                ("precision", "ns"),
            ])
            .header(AUTHORIZATION, format!("Token {}", dest.token))
            .header(CONTENT_TYPE, "text/plain; charset=utf-8")
            .body(body)
            .send()
            .await
            .map_err(|e| send_error(&url, e))?;
        check_status(response, "InfluxDB write").await?;

        info!(
            "Saved {} points to measurement '{}' in bucket '{}'",
            points.len(),
            dest.measurement,
            dest.bucket
        );
        Ok(())
    }

    async fn get(
        &self,
        destination: &Destination,
        fields: &FieldMap,
        window: Window,
    ) -> Result<Vec<Record>> {
        window.check(WindowUnit::Hours, self.backend_type())?;
        let hours = match window {
            Window::LastHours(h) => h,
            other => {
                return Err(StorageError::config(format!(
                    "timeseries-v2 backend cannot serve {}",
                    other
                )))
            }
        };
        let dest = Self::destination(destination)?;
        let time_key = time_series_time_key(fields)?;

        let query = flux_query(&dest.bucket, &dest.measurement, fields, hours);
        debug!("Flux: {}", query);

        let client = client(dest.timeout())?;
        let url = endpoint(&dest.url, "api/v2/query");
        let response = client
            .post(&url)
            .query(&[("org", dest.org.as_str())])
            .header(AUTHORIZATION, format!("Token {}", dest.token))
            .header(ACCEPT, "application/csv")
            .json(&serde_json::json!({
                "query": query,
                "type": "flux",
                "dialect": { "header": true, "annotations": [], "delimiter": "," }
            }))
            .send()
            .await
            .map_err(|e| send_error(&url, e))?;
        let body = check_status(response, "InfluxDB query")
            .await?
            .text()
            .await
            .map_err(|e| send_error(&url, e))?;

        let records = assemble_records(&parse_flux_csv(&body)?, fields, time_key)?;
        if records.is_empty() {
            return Err(StorageError::empty());
        }
        Ok(records)
    }

    fn window_unit(&self) -> WindowUnit {
        WindowUnit::Hours
    }

    fn backend_type(&self) -> &str {
        "timeseries-v2"
    }
}
