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

// InfluxDB line protocol points
//
// <measurement>[,<tag>=<value>...] <field>=<value>[,...] <unix nanos>

use crate::error::{Result, StorageError};
use crate::record::{format_real, FieldMap, Record, Value};
use crate::timestamp::to_unix_nanos;

/// One time-series point: tags are dimensions, fields are measured values
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    pub measurement: String,
    pub tags: Vec<(String, String)>,
    pub fields: Vec<(String, Value)>,
    pub timestamp_ns: i64,
}

impl Point {
    /// Split a projected record into tags and fields following the field-map roles
    pub fn from_record(
        measurement: &str,
        record: &Record,
        fields: &FieldMap,
        time_key: &str,
    ) -> Result<Point> {
        let time = record.get(time_key).ok_or_else(|| {
            StorageError::data(format!("missing required field '{}'", time_key))
        })?;

        let tags = fields
            .tags()
            .filter_map(|name| match record.get(name) {
                Some(Value::Null) | None => None,
                Some(value) => {
                    let text = value.to_string();
                    (!text.is_empty()).then(|| (name.to_string(), text))
                }
            })
            .collect();

        let values: Vec<(String, Value)> = fields
            .fields()
            .filter_map(|(name, ty)| match record.get(name) {
                Some(Value::Null) | None => None,
                Some(value) => Some((name.to_string(), value.clone().coerce(ty))),
            })
            .collect();

        if values.is_empty() {
            return Err(StorageError::data(format!(
                "point at {} has no field values",
                time
            )));
        }

        Ok(Point {
            measurement: measurement.to_string(),
            tags,
            fields: values,
            timestamp_ns: to_unix_nanos(time)?,
        })
    }

    pub fn to_line(&self) -> Result<String> {
        let mut line = escape(&self.measurement, &[',', ' ']);

        for (key, value) in &self.tags {
            line.push(',');
            line.push_str(&escape(key, &[',', '=', ' ']));
            line.push('=');
            line.push_str(&escape(value, &[',', '=', ' ']));
        }

        let fields = self
            .fields
            .iter()
            .map(|(key, value)| {
                Ok(format!(
                    "{}={}",
                    escape(key, &[',', '=', ' ']),
                    field_value(key, value)?
                ))
            })
            .collect::<Result<Vec<_>>>()?;

        line.push(' ');
        line.push_str(&fields.join(","));
        line.push(' ');
        line.push_str(&self.timestamp_ns.to_string());
        Ok(line)
    }
}

/// Encode a batch, one point per line
pub fn encode(points: &[Point]) -> Result<String> {
    Ok(points
        .iter()
        .map(Point::to_line)
        .collect::<Result<Vec<_>>>()?
        .join("\n"))
}

fn escape(raw: &str, special: &[char]) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if c == '\\' || special.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn field_value(key: &str, value: &Value) -> Result<String> {
    match value {
        Value::Integer(i) => Ok(format!("{}i", i)),
        Value::Real(f) if f.is_finite() => Ok(format_real(*f)),
        Value::Real(f) => Err(StorageError::data(format!(
            "field '{}' has non-finite value {}",
            key, f
        ))),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Text(s) => Ok(format!("\"{}\"", escape(s, &['"']))),
        Value::Null => Err(StorageError::data(format!("field '{}' is null", key))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields() -> FieldMap {
        FieldMap::parse([
            ("timestamp", "timestamp"),
            ("location", "tag"),
            ("locationTZ", "tag"),
            ("ping", "field"),
            ("download", "field"),
            ("samples", "field|integer"),
        ])
        .unwrap()
    }

    #[test]
    fn test_point_line() {
        let record = Record::new()
            .with("timestamp", 1_700_000_000)
            .with("location", "home office")
            .with("locationTZ", "Europe/Oslo")
            .with("ping", 12.5)
            .with("download", 90_000_000.0)
            .with("samples", 3);

        let point = Point::from_record("speedtest", &record, &fields(), "timestamp").unwrap();
        assert_eq!(
            point.to_line().unwrap(),
            "speedtest,location=home\\ office,locationTZ=Europe/Oslo ping=12.5,download=90000000.0,samples=3i 1700000000000000000"
        );
    }

    #[test]
    fn test_null_tags_and_fields_skipped() {
        let record = Record::new()
            .with("timestamp", "2024-01-01T00:00:00Z")
            .with("location", Value::Null)
            .with("locationTZ", "")
            .with("ping", 12.5)
            .with("download", Value::Null)
            .with("samples", Value::Null);

        let point = Point::from_record("m", &record, &fields(), "timestamp").unwrap();
        assert!(point.tags.is_empty());
        assert_eq!(point.fields.len(), 1);
        assert_eq!(point.to_line().unwrap(), "m ping=12.5 1704067200000000000");
    }

    #[test]
    fn test_point_without_fields() {
        let record = Record::new()
            .with("timestamp", 1)
            .with("location", "x")
            .with("locationTZ", "y")
            .with("ping", Value::Null)
            .with("download", Value::Null)
            .with("samples", Value::Null);

        let err = Point::from_record("m", &record, &fields(), "timestamp").unwrap_err();
        assert!(err.is_data());
    }

    #[test]
    fn test_fields_follow_declared_type() {
        let fields = FieldMap::parse([
            ("time", "timestamp"),
            ("ping", "field"),
            ("n", "field|integer"),
        ])
        .unwrap();
        let record = Record::new()
            .with("time", 1)
            .with("ping", 10)
            .with("n", 3.0);

        let point = Point::from_record("m", &record, &fields, "time").unwrap();
        assert_eq!(point.to_line().unwrap(), "m ping=10.0,n=3i 1000000000");
    }

    #[test]
    fn test_string_field_escaping() {
        let point = Point {
            measurement: "net,stats".to_string(),
            tags: vec![("host=name".to_string(), "a".to_string())],
            fields: vec![("note".to_string(), Value::from("say \"hi\""))],
            timestamp_ns: 5,
        };
        assert_eq!(
            point.to_line().unwrap(),
            "net\\,stats,host\\=name=a note=\"say \\\"hi\\\"\" 5"
        );
    }

    #[test]
    fn test_encode_batch() {
        let point = |ts| Point {
            measurement: "m".to_string(),
            tags: Vec::new(),
            fields: vec![("ping".to_string(), Value::Real(1.0))],
            timestamp_ns: ts,
        };
        assert_eq!(encode(&[point(1), point(2)]).unwrap(), "m ping=1.0 1\nm ping=1.0 2");
    }
}
