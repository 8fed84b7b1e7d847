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

// First-N / last-N windowing shared by all backends
//
// Whatever the backend returns natively, a window is always handed back to
// the caller in ascending time order.

use crate::error::{Result, StorageError};
use crate::record::{Record, Value};
use std::cmp::Ordering;
use std::fmt;

/// What to retrieve from a destination
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Window {
    /// Earliest `n` records
    First(usize),
    /// Latest `n` records
    Last(usize),
    /// Every record from the trailing `h` hours
    LastHours(u32),
}

/// Unit in which a backend counts its window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowUnit {
    Records,
    Hours,
}

impl Window {
    /// Row-count window from the classic `(count, first)` pair
    pub fn records(count: usize, first: bool) -> Self {
        if first {
            Window::First(count)
        } else {
            Window::Last(count)
        }
    }

    /// Trailing time-range window
    pub fn hours(hours: u32) -> Self {
        Window::LastHours(hours)
    }

    pub fn unit(&self) -> WindowUnit {
        match self {
            Window::First(_) | Window::Last(_) => WindowUnit::Records,
            Window::LastHours(_) => WindowUnit::Hours,
        }
    }

    /// Check the window is non-empty and counted in the unit the backend understands
    pub fn check(&self, unit: WindowUnit, backend: &str) -> Result<()> {
        let size = match self {
            Window::First(n) | Window::Last(n) => *n,
            Window::LastHours(h) => *h as usize,
        };
        if size == 0 {
            return Err(StorageError::config(format!("{} requests nothing", self)));
        }
        if self.unit() != unit {
            return Err(StorageError::config(format!(
                "{} backend counts windows in {}, got {}",
                backend, unit, self
            )));
        }
        Ok(())
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Window::First(n) => write!(f, "first {} records", n),
            Window::Last(n) => write!(f, "last {} records", n),
            Window::LastHours(h) => write!(f, "last {} hours", h),
        }
    }
}

impl fmt::Display for WindowUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WindowUnit::Records => f.write_str("records"),
            WindowUnit::Hours => f.write_str("hours"),
        }
    }
}

/// Render a single-round-trip windowed SELECT.
///
/// `columns`, `source` and `sort_key` must already be quoted for the dialect.
/// The last-N form grabs the tail in descending order in a subquery and
/// re-applies ascending order outside it.
pub fn windowed_select(columns: &str, source: &str, sort_key: &str, window: Window) -> Result<String> {
    match window {
        Window::First(n) => Ok(format!(
            "SELECT {cols} FROM {src} ORDER BY {key} ASC LIMIT {n}",
            cols = columns,
            src = source,
            key = sort_key,
            n = n
        )),
        Window::Last(n) => Ok(format!(
            "SELECT * FROM (SELECT {cols} FROM {src} ORDER BY {key} DESC LIMIT {n}) ORDER BY {key} ASC",
            cols = columns,
            src = source,
            key = sort_key,
            n = n
        )),
        Window::LastHours(_) => Err(StorageError::config(format!(
            "{} cannot be expressed as a row-limited query",
            window
        ))),
    }
}

/// Number of leading records to skip so that `count` trailing ones remain
pub fn tail_offset(total: usize, count: usize) -> usize {
    total.saturating_sub(count)
}

/// Apply a record-count window to an append-ordered slice
pub fn slice_window(records: &[Record], window: Window) -> &[Record] {
    match window {
        Window::First(n) => &records[..n.min(records.len())],
        Window::Last(n) => &records[tail_offset(records.len(), n)..],
        Window::LastHours(_) => records,
    }
}

/// Stable ascending sort on `key`; records lacking the key sort first
pub fn sort_ascending(records: &mut [Record], key: &str) {
    records.sort_by(|a, b| compare_values(a.get(key), b.get(key)));
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Text(x)), Some(Value::Text(y))) => x.cmp(y),
        (Some(x), Some(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        },
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timeline(times: &[i64]) -> Vec<Record> {
        times
            .iter()
            .map(|t| Record::new().with("time", *t).with("ping", 10.0))
            .collect()
    }

    fn times(records: &[Record]) -> Vec<i64> {
        records
            .iter()
            .map(|r| match r.get("time") {
                Some(Value::Integer(t)) => *t,
                other => panic!("unexpected time {:?}", other),
            })
            .collect()
    }

    #[test]
    fn test_first_query() {
        let sql = windowed_select("\"time\",\"ping\"", "\"records\"", "\"time\"", Window::First(2)).unwrap();
        assert_eq!(
            sql,
            "SELECT \"time\",\"ping\" FROM \"records\" ORDER BY \"time\" ASC LIMIT 2"
        );
    }

    #[test]
    fn test_last_query_reorders_outside() {
        let sql = windowed_select("a", "t", "a", Window::Last(3)).unwrap();
        assert_eq!(
            sql,
            "SELECT * FROM (SELECT a FROM t ORDER BY a DESC LIMIT 3) ORDER BY a ASC"
        );
    }

    #[test]
    fn test_hours_not_row_limited() {
        assert!(windowed_select("a", "t", "a", Window::LastHours(1)).is_err());
    }

    #[test]
    fn test_check_units() {
        assert!(Window::Last(3).check(WindowUnit::Records, "csv").is_ok());
        assert!(Window::Last(0).check(WindowUnit::Records, "csv").is_err());
        let err = Window::records(5, true).check(WindowUnit::Hours, "timeseries-v2").unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("hours"));
    }

    #[test]
    fn test_tail_offset() {
        assert_eq!(tail_offset(10, 3), 7);
        assert_eq!(tail_offset(2, 3), 0);
        assert_eq!(tail_offset(0, 1), 0);
    }

    #[test]
    fn test_slice_window() {
        let records = timeline(&[1, 2, 3, 4, 5]);
        assert_eq!(times(slice_window(&records, Window::First(2))), vec![1, 2]);
        assert_eq!(times(slice_window(&records, Window::Last(3))), vec![3, 4, 5]);
        assert_eq!(times(slice_window(&records, Window::Last(9))), vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_sort_ascending_fixes_descending_tail() {
        let mut records = timeline(&[5, 4, 3]);
        sort_ascending(&mut records, "time");
        assert_eq!(times(&records), vec![3, 4, 5]);
    }

    #[test]
    fn test_sort_ascending_iso_text() {
        let mut records = vec![
            Record::new().with("timestamp", "2024-01-02T00:00:00Z"),
            Record::new().with("timestamp", "2024-01-01T00:00:00Z"),
        ];
        sort_ascending(&mut records, "timestamp");
        assert_eq!(
            records[0].get("timestamp"),
            Some(&Value::from("2024-01-01T00:00:00Z"))
        );
    }
}
