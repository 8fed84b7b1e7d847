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

// Record and field map model
//
// A record is one measurement as an ordered list of named scalar values.
// The field map, supplied per call, is the only schema: it decides which
// fields are persisted, in which order, with which type or time-series role.

use crate::error::{Result, StorageError};
use serde::de::{self, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Name of the conventional time field
pub const TIMESTAMP_FIELD: &str = "timestamp";

/// Scalar value of one record field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Integer(i64),
    Real(f64),
    Text(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Real(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Parse a textual cell according to the declared type. Empty cells are `Null`.
    pub fn parse(raw: &str, ty: FieldType) -> Result<Value> {
        if raw.is_empty() {
            return Ok(Value::Null);
        }

        match ty {
            FieldType::Integer => raw.parse::<i64>().map(Value::Integer).map_err(|e| {
                StorageError::malformed(format!("'{}' is not an integer", raw), e)
            }),
            FieldType::Real => raw
                .parse::<f64>()
                .map(Value::Real)
                .map_err(|e| StorageError::malformed(format!("'{}' is not a number", raw), e)),
            FieldType::Boolean => match raw.to_ascii_lowercase().as_str() {
                "true" | "1" => Ok(Value::Bool(true)),
                "false" | "0" => Ok(Value::Bool(false)),
                _ => Err(StorageError::data(format!("'{}' is not a boolean", raw))),
            },
            FieldType::Text => Ok(Value::Text(raw.to_string())),
            FieldType::Timestamp => {
                if let Ok(i) = raw.parse::<i64>() {
                    Ok(Value::Integer(i))
                } else if let Ok(f) = raw.parse::<f64>() {
                    Ok(Value::Real(f))
                } else {
                    Ok(Value::Text(raw.to_string()))
                }
            }
        }
    }

    /// Bring a value read back from a loosely typed store to its declared type
    pub fn coerce(self, ty: FieldType) -> Value {
        match (ty, self) {
            (FieldType::Real, Value::Integer(i)) => Value::Real(i as f64),
            (FieldType::Integer, Value::Real(f)) => match integral(f) {
                Some(i) => Value::Integer(i),
                None => Value::Real(f),
            },
            (FieldType::Boolean, Value::Integer(i)) => Value::Bool(i != 0),
            (_, value) => value,
        }
    }

    /// Check a value about to be stored against the declared type of `name`.
    ///
    /// `Null` fits every type. Integers widen to reals and integral reals
    /// narrow to integers. Timestamps take epoch numbers or text. Any other
    /// mismatch is a data error.
    pub fn conform(&self, name: &str, ty: FieldType) -> Result<Value> {
        match (ty, self) {
            (_, Value::Null) => Ok(Value::Null),
            (FieldType::Real, Value::Integer(i)) => Ok(Value::Real(*i as f64)),
            (FieldType::Integer, Value::Real(f)) if integral(*f).is_some() => {
                Ok(self.clone().coerce(ty))
            }
            (FieldType::Integer, Value::Integer(_))
            | (FieldType::Real, Value::Real(_))
            | (FieldType::Boolean, Value::Bool(_))
            | (FieldType::Text, Value::Text(_))
            | (FieldType::Timestamp, Value::Integer(_) | Value::Real(_) | Value::Text(_)) => {
                Ok(self.clone())
            }
            (_, value) => Err(StorageError::data(format!(
                "field '{}' is declared {} but holds {}",
                name,
                ty,
                value.describe()
            ))),
        }
    }

    fn describe(&self) -> String {
        match self {
            Value::Text(s) => format!("'{}'", s),
            other => other.to_string(),
        }
    }
}

fn integral(f: f64) -> Option<i64> {
    (f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64).then(|| f as i64)
}

/// Render a real so it always reads back as one: `10.0`, never `10`
pub(crate) fn format_real(r: f64) -> String {
    let text = r.to_string();
    if r.is_finite() && !text.contains('.') {
        format!("{}.0", text)
    } else {
        text
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Real(r) => f.write_str(&format_real(*r)),
            Value::Text(s) => f.write_str(s),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v.into())
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Real(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

/// One measurement: field names mapped to values, in insertion order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    fields: Vec<(String, Value)>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    /// Insert a field, replacing the value in place if the name already exists
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        let name = name.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(k, _)| *k == name) {
            Some(slot) => slot.1 = value,
            None => self.fields.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Keep only the mapped fields, in field-map order, checked against their types.
    ///
    /// Extra keys are dropped silently. A mapped field absent from the record,
    /// or holding a value its type cannot take, is a caller error.
    pub fn project(&self, fields: &FieldMap) -> Result<Record> {
        fields
            .iter()
            .map(|(name, spec)| -> Result<(String, Value)> {
                let value = self.get(name).ok_or_else(|| {
                    StorageError::data(format!("missing required field '{}'", name))
                })?;
                Ok((name.to_string(), value.conform(name, spec.value_type())?))
            })
            .collect()
    }
}

impl FromIterator<(String, Value)> for Record {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        let mut record = Record::new();
        for (name, value) in iter {
            record.insert(name, value);
        }
        record
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (name, value) in &self.fields {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Record {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct RecordVisitor;

        impl<'de> Visitor<'de> for RecordVisitor {
            type Value = Record;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an object of scalar values")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> std::result::Result<Record, A::Error> {
                let mut record = Record::new();
                while let Some((name, value)) = access.next_entry::<String, Value>()? {
                    record.insert(name, value);
                }
                Ok(record)
            }
        }

        deserializer.deserialize_map(RecordVisitor)
    }
}

/// Value type of a mapped field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Integer,
    Real,
    Text,
    Boolean,
    /// ISO-8601 text or Unix epoch number.
    ///
    /// SQLite gives this column NUMERIC affinity, so a whole-valued real epoch
    /// such as `1.0` is stored and read back as the integer `1`.
    Timestamp,
}

impl FieldType {
    /// Column type used by the relational backend
    pub fn sql_type(&self) -> &'static str {
        match self {
            FieldType::Integer => "INTEGER",
            FieldType::Real => "REAL",
            FieldType::Text => "TEXT",
            FieldType::Boolean => "BOOLEAN",
            FieldType::Timestamp => "TIMESTAMP",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldType::Integer => "integer",
            FieldType::Real => "real",
            FieldType::Text => "text",
            FieldType::Boolean => "boolean",
            FieldType::Timestamp => "timestamp",
        };
        f.write_str(name)
    }
}

impl FromStr for FieldType {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "integer" | "int" => Ok(FieldType::Integer),
            "real" | "float" | "double" => Ok(FieldType::Real),
            "text" | "string" | "str" => Ok(FieldType::Text),
            "boolean" | "bool" => Ok(FieldType::Boolean),
            "timestamp" | "datetime" => Ok(FieldType::Timestamp),
            other => Err(StorageError::config(format!("Unknown field type '{}'", other))),
        }
    }
}

/// One field-map entry: a typed column, or a time-series tag/field role
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldSpec {
    /// Plain typed column, optionally indexed by the relational backend (`real|idx`)
    Column { ty: FieldType, indexed: bool },
    /// Indexed low-cardinality dimension (`tag`)
    Tag,
    /// Measured value (`field`, or `field|integer` to override the default real type)
    Field(FieldType),
}

impl FieldSpec {
    pub fn column(ty: FieldType) -> Self {
        FieldSpec::Column { ty, indexed: false }
    }

    pub fn value_type(&self) -> FieldType {
        match self {
            FieldSpec::Column { ty, .. } => *ty,
            FieldSpec::Tag => FieldType::Text,
            FieldSpec::Field(ty) => *ty,
        }
    }

    pub fn is_tag(&self) -> bool {
        matches!(self, FieldSpec::Tag)
    }

    pub fn is_field(&self) -> bool {
        matches!(self, FieldSpec::Field(_))
    }

    pub fn is_indexed(&self) -> bool {
        matches!(self, FieldSpec::Column { indexed: true, .. })
    }
}

impl fmt::Display for FieldSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldSpec::Column { ty, indexed: false } => write!(f, "{}", ty),
            FieldSpec::Column { ty, indexed: true } => write!(f, "{}|idx", ty),
            FieldSpec::Tag => f.write_str("tag"),
            FieldSpec::Field(FieldType::Real) => f.write_str("field"),
            FieldSpec::Field(ty) => write!(f, "field|{}", ty),
        }
    }
}

impl FromStr for FieldSpec {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self> {
        let mut parts = s.split('|').map(str::trim);
        let head = parts.next().unwrap_or_default().to_ascii_lowercase();
        let modifier = parts.next();
        if parts.next().is_some() {
            return Err(StorageError::config(format!("Invalid field spec '{}'", s)));
        }

        match (head.as_str(), modifier) {
            ("tag", None) => Ok(FieldSpec::Tag),
            ("field", None) => Ok(FieldSpec::Field(FieldType::Real)),
            ("field", Some(ty)) => Ok(FieldSpec::Field(ty.parse()?)),
            (ty, None) => Ok(FieldSpec::column(ty.parse()?)),
            (ty, Some(m)) if m.eq_ignore_ascii_case("idx") => Ok(FieldSpec::Column {
                ty: ty.parse()?,
                indexed: true,
            }),
            _ => Err(StorageError::config(format!("Invalid field spec '{}'", s))),
        }
    }
}

/// Whether `name` can be used verbatim as a column, table or key name
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Ordered declaration of the fields to persist and retrieve
#[derive(Debug, Clone, PartialEq)]
pub struct FieldMap {
    entries: Vec<(String, FieldSpec)>,
}

impl FieldMap {
    /// Build a validated field map: non-empty, unique identifier names
    pub fn new<I, K>(entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, FieldSpec)>,
        K: Into<String>,
    {
        let mut map = FieldMap {
            entries: Vec::new(),
        };

        for (name, spec) in entries {
            let name = name.into();
            if !is_identifier(&name) {
                return Err(StorageError::config(format!(
                    "Field name '{}' is not a valid identifier",
                    name
                )));
            }
            if map.get(&name).is_some() {
                return Err(StorageError::config(format!(
                    "Field '{}' is declared twice",
                    name
                )));
            }
            map.entries.push((name, spec));
        }

        if map.entries.is_empty() {
            return Err(StorageError::config("Field map is empty"));
        }

        Ok(map)
    }

    /// Build from `name -> "real|idx"` style spec strings
    pub fn parse<I, K, V>(entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: AsRef<str>,
    {
        let parsed = entries
            .into_iter()
            .map(|(name, spec)| Ok((name.into(), spec.as_ref().parse::<FieldSpec>()?)))
            .collect::<Result<Vec<(String, FieldSpec)>>>()?;
        Self::new(parsed)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&FieldSpec> {
        self.entries.iter().find(|(k, _)| k == name).map(|(_, s)| s)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldSpec)> {
        self.entries.iter().map(|(k, s)| (k.as_str(), s))
    }

    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.iter().filter(|(_, s)| s.is_tag()).map(|(k, _)| k)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, FieldType)> {
        self.iter()
            .filter(|(_, s)| s.is_field())
            .map(|(k, s)| (k, s.value_type()))
    }

    /// `timestamp` if mapped, otherwise the first typed (non tag/field) entry
    pub fn time_key(&self) -> Option<&str> {
        if self.get(TIMESTAMP_FIELD).is_some() {
            return Some(TIMESTAMP_FIELD);
        }
        self.iter()
            .find(|(_, s)| matches!(s, FieldSpec::Column { .. }))
            .map(|(k, _)| k)
    }

    /// Key used to order records: the time key, else the first mapped field
    pub fn sort_key(&self) -> &str {
        self.time_key()
            .unwrap_or_else(|| self.entries[0].0.as_str())
    }
}

impl Serialize for FieldMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, spec) in &self.entries {
            map.serialize_entry(name, &spec.to_string())?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for FieldMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct FieldMapVisitor;

        impl<'de> Visitor<'de> for FieldMapVisitor {
            type Value = FieldMap;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of field names to types or roles")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> std::result::Result<FieldMap, A::Error> {
                let mut entries: Vec<(String, String)> = Vec::new();
                while let Some(entry) = access.next_entry::<String, String>()? {
                    entries.push(entry);
                }
                FieldMap::parse(entries).map_err(de::Error::custom)
            }
        }

        deserializer.deserialize_map(FieldMapVisitor)
    }
}
