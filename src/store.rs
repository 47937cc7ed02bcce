//! Typed object stores over the workspace database.
//!
//! Every store is one table keyed by a string `id`. A store declares the
//! columns it persists and the columns that may be used for indexed lookups;
//! lookups on any other column are rejected rather than turned into a scan.

use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, ErrorCode, OptionalExtension, Row};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug)]
pub enum StoreError {
    Sqlite(rusqlite::Error),
    Conflict {
        store: &'static str,
        message: String,
    },
    UnknownIndex {
        store: &'static str,
        index: String,
    },
    UnsupportedSchemaVersion {
        db_version: u32,
        latest_supported: u32,
    },
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "{err}"),
            Self::Conflict { store, message } => {
                write!(f, "{store}: uniqueness conflict: {message}")
            }
            Self::UnknownIndex { store, index } => {
                write!(f, "{store}: no index named `{index}`")
            }
            Self::UnsupportedSchemaVersion {
                db_version,
                latest_supported,
            } => write!(
                f,
                "database schema version {db_version} is newer than supported {latest_supported}"
            ),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}

/// A row type persisted in its own object store.
///
/// `COLUMNS[0]` must be `id`. `to_values` yields one value per column, in
/// `COLUMNS` order.
pub trait Record: Sized {
    const STORE: &'static str;
    const COLUMNS: &'static [&'static str];
    const INDEXES: &'static [&'static str];

    fn id(&self) -> &str;
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self>;
    fn to_values(&self) -> Vec<Value>;
}

fn select_sql<T: Record>() -> String {
    format!("SELECT {} FROM {}", T::COLUMNS.join(", "), T::STORE)
}

fn check_index<T: Record>(index: &str) -> StoreResult<()> {
    if index == "id" || T::INDEXES.contains(&index) {
        return Ok(());
    }
    Err(StoreError::UnknownIndex {
        store: T::STORE,
        index: index.to_string(),
    })
}

fn map_write_err<T: Record>(e: rusqlite::Error) -> StoreError {
    match &e {
        rusqlite::Error::SqliteFailure(f, msg) if f.code == ErrorCode::ConstraintViolation => {
            // Foreign key failures share the constraint code; keep those as plain sqlite errors.
            let message = msg.clone().unwrap_or_else(|| e.to_string());
            if message.contains("UNIQUE") || message.contains("PRIMARY KEY") {
                StoreError::Conflict {
                    store: T::STORE,
                    message,
                }
            } else {
                StoreError::Sqlite(e)
            }
        }
        _ => StoreError::Sqlite(e),
    }
}

pub fn get_all<T: Record>(conn: &Connection) -> StoreResult<Vec<T>> {
    let sql = format!("{} ORDER BY id", select_sql::<T>());
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], |row| T::from_row(row))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn get_by_id<T: Record>(conn: &Connection, id: &str) -> StoreResult<Option<T>> {
    let sql = format!("{} WHERE id = ?", select_sql::<T>());
    let row = conn
        .query_row(&sql, [id], |row| T::from_row(row))
        .optional()?;
    Ok(row)
}

pub fn get_by_index<T: Record>(conn: &Connection, index: &str, value: &str) -> StoreResult<Vec<T>> {
    check_index::<T>(index)?;
    let sql = format!("{} WHERE {} = ? ORDER BY id", select_sql::<T>(), index);
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([value], |row| T::from_row(row))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn count_all<T: Record>(conn: &Connection) -> StoreResult<i64> {
    let sql = format!("SELECT COUNT(*) FROM {}", T::STORE);
    let n: i64 = conn.query_row(&sql, [], |r| r.get(0))?;
    Ok(n)
}

pub fn count_by_index<T: Record>(conn: &Connection, index: &str, value: &str) -> StoreResult<i64> {
    check_index::<T>(index)?;
    let sql = format!("SELECT COUNT(*) FROM {} WHERE {} = ?", T::STORE, index);
    let n: i64 = conn.query_row(&sql, [value], |r| r.get(0))?;
    Ok(n)
}

/// Inserts a new record. Fails with `Conflict` if the id or a unique index is taken.
pub fn add<T: Record>(conn: &Connection, record: &T) -> StoreResult<()> {
    let placeholders = vec!["?"; T::COLUMNS.len()].join(", ");
    let sql = format!(
        "INSERT INTO {}({}) VALUES({})",
        T::STORE,
        T::COLUMNS.join(", "),
        placeholders
    );
    conn.execute(&sql, params_from_iter(record.to_values()))
        .map_err(map_write_err::<T>)?;
    Ok(())
}

/// Inserts or replaces by id. Unique indexes other than `id` still conflict.
pub fn put<T: Record>(conn: &Connection, record: &T) -> StoreResult<()> {
    let placeholders = vec!["?"; T::COLUMNS.len()].join(", ");
    let updates = T::COLUMNS
        .iter()
        .skip(1)
        .map(|c| format!("{c} = excluded.{c}"))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        "INSERT INTO {}({}) VALUES({}) ON CONFLICT(id) DO UPDATE SET {}",
        T::STORE,
        T::COLUMNS.join(", "),
        placeholders,
        updates
    );
    conn.execute(&sql, params_from_iter(record.to_values()))
        .map_err(map_write_err::<T>)?;
    Ok(())
}

/// Returns whether a row was removed.
pub fn delete<T: Record>(conn: &Connection, id: &str) -> StoreResult<bool> {
    let sql = format!("DELETE FROM {} WHERE id = ?", T::STORE);
    let n = conn.execute(&sql, [id])?;
    Ok(n > 0)
}

pub fn delete_by_index<T: Record>(
    conn: &Connection,
    index: &str,
    value: &str,
) -> StoreResult<usize> {
    check_index::<T>(index)?;
    let sql = format!("DELETE FROM {} WHERE {} = ?", T::STORE, index);
    Ok(conn.execute(&sql, [value])?)
}

pub fn text(s: &str) -> Value {
    Value::Text(s.to_string())
}

pub fn opt_text(s: &Option<String>) -> Value {
    match s {
        Some(v) => Value::Text(v.clone()),
        None => Value::Null,
    }
}

pub fn opt_real(v: Option<f64>) -> Value {
    v.map(Value::Real).unwrap_or(Value::Null)
}

pub fn opt_int(v: Option<i64>) -> Value {
    v.map(Value::Integer).unwrap_or(Value::Null)
}

pub fn flag(b: bool) -> Value {
    Value::Integer(if b { 1 } else { 0 })
}
