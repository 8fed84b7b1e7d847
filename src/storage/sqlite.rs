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

// SQLite backend implementation
//
// One table per measurement, columns taken from the field map. A batch is
// inserted inside a single transaction and committed only if every row went in.

use super::backend::{ensure_parent_directory, project_all, run_blocking, StorageBackend};
use super::destination::{Destination, SqliteDestination};
use super::window::{windowed_select, Window, WindowUnit};
use crate::error::{Result, StorageError};
use crate::record::{FieldMap, Record, Value};
use async_trait::async_trait;
use rusqlite::types::{ToSqlOutput, Value as SqlValue, ValueRef};
use rusqlite::{Connection, ErrorCode, OpenFlags, ToSql};
use std::path::Path;
use tracing::{debug, info};

/// SQLite relational backend
#[derive(Debug, Default, Clone)]
pub struct SqliteBackend;

impl SqliteBackend {
    pub fn new() -> Self {
        Self
    }

    fn destination(destination: &Destination) -> Result<SqliteDestination> {
        let sqlite = destination
            .as_sqlite()
            .ok_or_else(|| destination.mismatch("sqlite"))?;
        sqlite.validate()?;
        Ok(sqlite.clone())
    }
}

#[async_trait]
impl StorageBackend for SqliteBackend {
    async fn save(
        &self,
        records: &[Record],
        destination: &Destination,
        fields: &FieldMap,
    ) -> Result<()> {
        let dest = Self::destination(destination)?;
        let rows = project_all(records, fields)?;
        let fields = fields.clone();

        run_blocking("sqlite", move || insert_rows(&dest, &rows, &fields)).await
    }

    async fn get(
        &self,
        destination: &Destination,
        fields: &FieldMap,
        window: Window,
    ) -> Result<Vec<Record>> {
        window.check(WindowUnit::Records, self.backend_type())?;
        let dest = Self::destination(destination)?;
        let fields = fields.clone();

        run_blocking("sqlite", move || select_window(&dest, &fields, window)).await
    }

    fn backend_type(&self) -> &str {
        "sqlite"
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Null => ToSqlOutput::Owned(SqlValue::Null),
            Value::Bool(b) => ToSqlOutput::Owned(SqlValue::Integer(i64::from(*b))),
            Value::Integer(i) => ToSqlOutput::Owned(SqlValue::Integer(*i)),
            Value::Real(f) => ToSqlOutput::Owned(SqlValue::Real(*f)),
            Value::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
        })
    }
}

fn from_sql(value: SqlValue) -> Result<Value> {
    match value {
        SqlValue::Null => Ok(Value::Null),
        SqlValue::Integer(i) => Ok(Value::Integer(i)),
        SqlValue::Real(f) => Ok(Value::Real(f)),
        SqlValue::Text(s) => Ok(Value::Text(s)),
        SqlValue::Blob(_) => Err(StorageError::data("BLOB columns are not supported")),
    }
}

fn quote(identifier: &str) -> String {
    format!("\"{}\"", identifier)
}

/// Translate a driver error: bad rows are data errors, everything else is the store failing
fn db_error(context: String, e: rusqlite::Error) -> StorageError {
    match &e {
        rusqlite::Error::SqliteFailure(failure, _)
            if failure.code == ErrorCode::ConstraintViolation
                || failure.code == ErrorCode::TypeMismatch =>
        {
            StorageError::malformed(context, e)
        }
        _ => StorageError::connection(context, e),
    }
}

fn table_exists(conn: &Connection, table: &str) -> Result<bool> {
    conn.query_row(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name=?1",
        [table],
        |row| row.get(0),
    )
    .map_err(|e| db_error(format!("Failed to look up table '{}'", table), e))
}

fn table_columns(conn: &Connection, table: &str) -> Result<Vec<String>> {
    let context = || format!("Failed to read columns of table '{}'", table);
    let mut stmt = conn
        .prepare(&format!("PRAGMA table_info({})", quote(table)))
        .map_err(|e| db_error(context(), e))?;
    let columns = stmt
        .query_map([], |row| row.get::<_, String>(1))
        .map_err(|e| db_error(context(), e))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| db_error(context(), e))?;
    Ok(columns)
}

/// Create the table on first use; otherwise make sure it can hold the field map
fn ensure_table(conn: &Connection, table: &str, fields: &FieldMap) -> Result<()> {
    if table_exists(conn, table)? {
        let columns = table_columns(conn, table)?;
        let missing: Vec<&str> = fields
            .names()
            .filter(|name| !columns.iter().any(|c| c == name))
            .collect();
        if !missing.is_empty() {
            return Err(StorageError::schema(format!(
                "Table '{}' has no column(s) {}",
                table,
                missing.join(", ")
            )));
        }
        return Ok(());
    }

    let columns = fields
        .iter()
        .map(|(name, spec)| format!("{} {}", quote(name), spec.value_type().sql_type()))
        .collect::<Vec<_>>()
        .join(", ");
    let mut ddl = format!("CREATE TABLE IF NOT EXISTS {} ({});", quote(table), columns);

    // SQLite keeps its own rowid key; only the columns marked |idx get an index
    for (name, _) in fields.iter().filter(|(_, spec)| spec.is_indexed()) {
        ddl.push_str(&format!(
            "\nCREATE INDEX IF NOT EXISTS {} ON {}({});",
            quote(&format!("idx_{}_{}", table, name)),
            quote(table),
            quote(name)
        ));
    }

    info!("Creating table '{}'", table);
    debug!("{}", ddl);
    conn.execute_batch(&ddl)
        .map_err(|e| db_error(format!("Failed to create table '{}'", table), e))
}

fn insert_rows(dest: &SqliteDestination, rows: &[Record], fields: &FieldMap) -> Result<()> {
    let path = dest.path.as_path();
    ensure_parent_directory(path)?;

    let mut conn = Connection::open(path).map_err(|e| {
        StorageError::connection(
            format!("Failed to connect to database '{}'", path.display()),
            e,
        )
    })?;

    ensure_table(&conn, &dest.table, fields)?;

    let columns = fields.names().map(quote).collect::<Vec<_>>().join(",");
    let placeholders = vec!["?"; fields.len()].join(",");
    let sql = format!(
        "INSERT INTO {}({}) VALUES({})",
        quote(&dest.table),
        columns,
        placeholders
    );
    let context = || format!("Failed to save data to '{}'", path.display());

    // Dropping an uncommitted transaction rolls it back
    let tx = conn.transaction().map_err(|e| db_error(context(), e))?;
    {
        let mut stmt = tx.prepare(&sql).map_err(|e| db_error(context(), e))?;
        for row in rows {
            stmt.execute(rusqlite::params_from_iter(row.iter().map(|(_, value)| value)))
                .map_err(|e| db_error(context(), e))?;
        }
    }
    tx.commit().map_err(|e| db_error(context(), e))?;

    info!(
        "Saved {} records to table '{}' in {}",
        rows.len(),
        dest.table,
        path.display()
    );
    Ok(())
}

fn open_existing(path: &Path) -> Result<Connection> {
    if !path.exists() {
        return Err(StorageError::unreachable(format!(
            "Database '{}' does not exist",
            path.display()
        )));
    }
    Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .map_err(|e| {
        StorageError::connection(
            format!("Failed to connect to database '{}'", path.display()),
            e,
        )
    })
}

fn select_window(dest: &SqliteDestination, fields: &FieldMap, window: Window) -> Result<Vec<Record>> {
    let conn = open_existing(&dest.path)?;
    if !table_exists(&conn, &dest.table)? {
        return Err(StorageError::empty());
    }

    let columns = fields.names().map(quote).collect::<Vec<_>>().join(",");
    let sql = windowed_select(
        &columns,
        &quote(&dest.table),
        &quote(fields.sort_key()),
        window,
    )?;
    debug!("{}", sql);

    let context = || format!("Failed to read data from table '{}'", dest.table);
    let mut stmt = conn.prepare(&sql).map_err(|e| db_error(context(), e))?;
    let width = fields.len();
    let rows = stmt
        .query_map([], |row| {
            (0..width)
                .map(|i| row.get::<_, SqlValue>(i))
                .collect::<rusqlite::Result<Vec<_>>>()
        })
        .map_err(|e| db_error(context(), e))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| db_error(context(), e))?;

    if rows.is_empty() {
        return Err(StorageError::empty());
    }

    rows.into_iter()
        .map(|values| {
            fields
                .iter()
                .zip(values)
                .map(|((name, spec), value)| {
                    Ok((name.to_string(), from_sql(value)?.coerce(spec.value_type())))
                })
                .collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn fields() -> FieldMap {
        FieldMap::parse([
            ("time", "real"),
            ("location", "text|idx"),
            ("ping", "real"),
            ("online", "boolean"),
        ])
        .unwrap()
    }

    fn record(time: f64) -> Record {
        Record::new()
            .with("time", time)
            .with("location", "lab")
            .with("ping", 10.0)
            .with("online", true)
    }

    fn dest(temp_dir: &TempDir) -> SqliteDestination {
        SqliteDestination {
            path: temp_dir.path().join("db").join("speed.db"),
            table: "records".to_string(),
        }
    }

    fn count_objects(path: &Path, kind: &str) -> i64 {
        let conn = Connection::open(path).unwrap();
        conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type=?1",
            [kind],
            |row| row.get(0),
        )
        .unwrap()
    }

    #[test]
    fn test_table_and_index_created_once() {
        let temp_dir = TempDir::new().unwrap();
        let dest = dest(&temp_dir);

        for t in 1..=3 {
            insert_rows(&dest, &[record(t as f64)], &fields()).unwrap();
        }

        assert_eq!(count_objects(&dest.path, "table"), 1);
        assert_eq!(count_objects(&dest.path, "index"), 1);
    }

    #[test]
    fn test_existing_table_missing_column() {
        let temp_dir = TempDir::new().unwrap();
        let dest = dest(&temp_dir);
        std::fs::create_dir_all(dest.path.parent().unwrap()).unwrap();
        Connection::open(&dest.path)
            .unwrap()
            .execute_batch("CREATE TABLE records (time real, ping real);")
            .unwrap();

        let err = insert_rows(&dest, &[record(1.0)], &fields()).unwrap_err();
        assert!(err.is_schema());
        assert!(err.to_string().contains("location"));
    }

    #[test]
    fn test_failed_batch_rolls_back() {
        let temp_dir = TempDir::new().unwrap();
        let dest = dest(&temp_dir);
        std::fs::create_dir_all(dest.path.parent().unwrap()).unwrap();
        Connection::open(&dest.path)
            .unwrap()
            .execute_batch(
                "CREATE TABLE records (time real, location text, ping real NOT NULL, online boolean);",
            )
            .unwrap();

        let bad = record(2.0).with("ping", Value::Null);
        let err = insert_rows(&dest, &[record(1.0), bad], &fields()).unwrap_err();
        assert!(err.is_data());

        let conn = Connection::open(&dest.path).unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM records", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_select_coerces_types() {
        let temp_dir = TempDir::new().unwrap();
        let dest = dest(&temp_dir);
        insert_rows(&dest, &[record(1.0)], &fields()).unwrap();

        let records = select_window(&dest, &fields(), Window::First(1)).unwrap();
        assert_eq!(records, vec![record(1.0)]);
    }

    #[test]
    fn test_missing_database() {
        let temp_dir = TempDir::new().unwrap();
        let err = select_window(&dest(&temp_dir), &fields(), Window::First(1)).unwrap_err();
        assert!(err.is_connection());
    }
}
