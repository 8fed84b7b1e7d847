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

// Timestamp conversions for the time-series backends

use crate::error::{Result, StorageError};
use crate::record::{FieldType, Value};
use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};

const NANOS_PER_SEC: f64 = 1_000_000_000.0;

/// Convert a record timestamp to Unix nanoseconds.
///
/// Numbers are epoch seconds. Text must be RFC 3339, or a naive
/// `YYYY-MM-DDTHH:MM:SS[.fff]` which is read as UTC.
pub fn to_unix_nanos(value: &Value) -> Result<i64> {
    match value {
        Value::Integer(secs) => secs
            .checked_mul(1_000_000_000)
            .ok_or_else(|| StorageError::data(format!("timestamp {} out of range", secs))),
        Value::Real(secs) => {
            let nanos = secs * NANOS_PER_SEC;
            if nanos.is_finite() && nanos.abs() < i64::MAX as f64 {
                Ok(nanos.round() as i64)
            } else {
                Err(StorageError::data(format!("timestamp {} out of range", secs)))
            }
        }
        Value::Text(raw) => parse_text(raw)?
            .timestamp_nanos_opt()
            .ok_or_else(|| StorageError::data(format!("timestamp '{}' out of range", raw))),
        other => Err(StorageError::data(format!(
            "'{}' is not a usable timestamp",
            other
        ))),
    }
}

fn parse_text(raw: &str) -> Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f"))
        .map(|naive| naive.and_utc())
        .map_err(|e| StorageError::malformed(format!("'{}' is not an ISO-8601 timestamp", raw), e))
}

/// Parse an RFC 3339 time returned by a server into UTC
pub fn parse_server_time(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StorageError::malformed(format!("server returned bad time '{}'", raw), e))
}

/// Render a server time in the shape the field map declares for the time key
pub fn time_value(time: DateTime<Utc>, ty: FieldType) -> Value {
    match ty {
        FieldType::Integer => Value::Integer(time.timestamp()),
        FieldType::Real => {
            let nanos = time.timestamp_subsec_nanos() as f64;
            Value::Real(time.timestamp() as f64 + nanos / NANOS_PER_SEC)
        }
        _ => Value::Text(time.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
    }
}
