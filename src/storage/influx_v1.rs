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

// InfluxDB 1.x backend implementation
//
// Points are addressed by database + retention policy + measurement and
// queried with InfluxQL. The database is never created here: it must be
// provisioned on the server beforehand.

use super::backend::{project_all, StorageBackend};
use super::destination::{Destination, InfluxV1Destination};
use super::http::{check_status, client, endpoint, send_error};
use super::line_protocol::{encode, Point};
use super::window::{sort_ascending, windowed_select, Window, WindowUnit};
use crate::error::{Result, StorageError};
use crate::record::{FieldMap, FieldType, Record, Value};
use crate::timestamp::time_value;
use async_trait::async_trait;
use chrono::DateTime;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info};

/// InfluxDB 1.x time-series backend
#[derive(Debug, Default, Clone)]
pub struct InfluxV1Backend;

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    results: Vec<StatementResult>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StatementResult {
    #[serde(default)]
    series: Vec<Series>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Series {
    columns: Vec<String>,
    #[serde(default)]
    values: Vec<Vec<serde_json::Value>>,
}

impl QueryResponse {
    /// First statement's series, surfacing server-side errors
    fn into_series(self) -> Result<Vec<Series>> {
        if let Some(error) = self.error {
            return Err(StorageError::data(format!("InfluxDB query failed: {}", error)));
        }
        let statement = match self.results.into_iter().next() {
            Some(statement) => statement,
            None => return Ok(Vec::new()),
        };
        if let Some(error) = statement.error {
            return Err(StorageError::data(format!("InfluxDB query failed: {}", error)));
        }
        Ok(statement.series)
    }
}

/// Time key plus the checks every v1/v2 field map must pass
pub(crate) fn time_series_time_key(fields: &FieldMap) -> Result<&str> {
    let time_key = fields.time_key().ok_or_else(|| {
        StorageError::config("Time-series field map needs a 'timestamp' entry")
    })?;
    if fields.fields().next().is_none() {
        return Err(StorageError::config(
            "Time-series field map needs at least one 'field' entry",
        ));
    }
    if let Some((name, _)) = fields
        .iter()
        .find(|(name, spec)| *name != time_key && !spec.is_tag() && !spec.is_field())
    {
        return Err(StorageError::config(format!(
            "'{}' must be mapped as 'tag' or 'field' for a time-series backend",
            name
        )));
    }
    Ok(time_key)
}

/// Convert a JSON cell returned by the server to the declared type
pub(crate) fn json_to_value(cell: &serde_json::Value, ty: FieldType) -> Result<Value> {
    let value = match cell {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(*b),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => Value::Integer(i),
            None => Value::Real(n.as_f64().unwrap_or(f64::NAN)),
        },
        serde_json::Value::String(s) => match ty {
            FieldType::Text | FieldType::Timestamp => Value::Text(s.clone()),
            _ => Value::parse(s, ty)?,
        },
        other => {
            return Err(StorageError::data(format!(
                "unexpected value {} in query result",
                other
            )))
        }
    };
    Ok(value.coerce(ty))
}

impl InfluxV1Backend {
    pub fn new() -> Self {
        Self
    }

    fn destination(destination: &Destination) -> Result<&InfluxV1Destination> {
        let influx = destination
            .as_influx_v1()
            .ok_or_else(|| destination.mismatch("timeseries-v1"))?;
        influx.validate()?;
        Ok(influx)
    }

    fn credentials(dest: &InfluxV1Destination) -> Vec<(&'static str, String)> {
        let mut params = Vec::new();
        if let Some(user) = &dest.username {
            params.push(("u", user.clone()));
        }
        if let Some(password) = &dest.password {
            params.push(("p", password.clone()));
        }
        params
    }

    async fn query(
        client: &Client,
        dest: &InfluxV1Destination,
        query: &str,
        extra: &[(&'static str, String)],
    ) -> Result<QueryResponse> {
        let url = endpoint(&dest.url, "query");
        let mut params = Self::credentials(dest);
        params.push(("q", query.to_string()));
        params.extend(extra.iter().cloned());

        debug!("InfluxQL: {}", query);
        let response = client
            .get(&url)
            .query(&params)
            .send()
            .await
            .map_err(|e| send_error(&url, e))?;
        let response = check_status(response, "InfluxDB query").await?;

        response
            .json::<QueryResponse>()
            .await
            .map_err(|e| StorageError::malformed("Unreadable InfluxDB query response", e))
    }

    /// Fail with a schema error if the database has not been provisioned
    async fn require_database(client: &Client, dest: &InfluxV1Destination) -> Result<()> {
        let series = Self::query(client, dest, "SHOW DATABASES", &[])
            .await?
            .into_series()?;

        let exists = series
            .iter()
            .flat_map(|s| s.values.iter())
            .any(|row| row.first().and_then(|v| v.as_str()) == Some(dest.database.as_str()));

        if exists {
            Ok(())
        } else {
            Err(StorageError::schema(format!(
                "Missing Influx database '{}'",
                dest.database
            )))
        }
    }

    /// Fully qualified `"db"."rp"."measurement"`; an empty policy selects the default
    fn source(dest: &InfluxV1Destination) -> String {
        format!(
            "\"{}\".{}.\"{}\"",
            dest.database,
            dest.retention_policy
                .as_deref()
                .map(|rp| format!("\"{}\"", rp))
                .unwrap_or_default(),
            dest.measurement
        )
    }

    fn rows_to_records(series: &Series, fields: &FieldMap, time_key: &str) -> Result<Vec<Record>> {
        let positions = fields
            .names()
            .map(|name| {
                let column = if name == time_key { "time" } else { name };
                series.columns.iter().position(|c| c == column).ok_or_else(|| {
                    StorageError::data(format!("query result has no '{}' column", column))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        series
            .values
            .iter()
            .map(|row| {
                fields
                    .iter()
                    .zip(&positions)
                    .map(|((name, spec), &idx)| {
                        let cell = row.get(idx).unwrap_or(&serde_json::Value::Null);
                        let value = if name == time_key {
                            let nanos = cell.as_i64().ok_or_else(|| {
                                StorageError::data(format!("bad time value {}", cell))
                            })?;
                            time_value(DateTime::from_timestamp_nanos(nanos), spec.value_type())
                        } else {
                            json_to_value(cell, spec.value_type())?
                        };
                        Ok((name.to_string(), value))
                    })
                    .collect()
            })
            .collect()
    }
}

#[async_trait]
impl StorageBackend for InfluxV1Backend {
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
        Self::require_database(&client, dest).await?;

        let url = endpoint(&dest.url, "write");
        let mut params = Self::credentials(dest);
        params.push(("db", dest.database.clone()));
        params.push(("precision", "ns".to_string()));
        if let Some(rp) = &dest.retention_policy {
            params.push(("rp", rp.clone()));
        }

        let response = client
            .post(&url)
            .query(&params)
            .body(body)
            .send()
            .await
            .map_err(|e| send_error(&url, e))?;
        check_status(response, "InfluxDB write").await?;

        info!(
            "Saved {} points to measurement '{}' in database '{}'",
            points.len(),
            dest.measurement,
            dest.database
        );
        Ok(())
    }

    async fn get(
        &self,
        destination: &Destination,
        fields: &FieldMap,
        window: Window,
    ) -> Result<Vec<Record>> {
        window.check(WindowUnit::Records, self.backend_type())?;
        let dest = Self::destination(destination)?;
        let time_key = time_series_time_key(fields)?;

        let client = client(dest.timeout())?;
        Self::require_database(&client, dest).await?;

        let columns = fields
            .names()
            .filter(|name| *name != time_key)
            .map(|name| format!("\"{}\"", name))
            .collect::<Vec<_>>()
            .join(",");
        let query = windowed_select(&columns, &Self::source(dest), "time", window)?;

        let series = Self::query(
            &client,
            dest,
            &query,
            &[("db", dest.database.clone()), ("epoch", "ns".to_string())],
        )
        .await?
        .into_series()?;

        let mut records = match series.first() {
            Some(series) => Self::rows_to_records(series, fields, time_key)?,
            None => Vec::new(),
        };
        if records.is_empty() {
            return Err(StorageError::empty());
        }

        // The server may hand the tail back newest first
        sort_ascending(&mut records, time_key);
        Ok(records)
    }

    fn backend_type(&self) -> &str {
        "timeseries-v1"
    }
}
