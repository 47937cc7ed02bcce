//! JSON snapshots of a whole workspace, for backup and moving between machines.

use crate::db::{self, STORE_ORDER};
use crate::models::{
    Assignment, ClassRoom, Course, DownloadRecord, Enrollment, Material, Plan, Score, ScoreDetail,
    Submission, User,
};
use crate::store::{self, Record};
use anyhow::{anyhow, Context};
use log::{info, warn};
use rusqlite::Connection;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::path::Path;

pub const SNAPSHOT_FORMAT: &str = "coursebook-snapshot-v1";

#[derive(Debug, Clone)]
pub struct ExportSummary {
    pub record_count: usize,
    pub checksum: String,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreImport {
    pub imported: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone, Default)]
pub struct ImportSummary {
    pub imported: usize,
    pub skipped: usize,
    pub per_store: BTreeMap<String, StoreImport>,
}

#[derive(Debug)]
pub struct ChecksumMismatch {
    pub expected: String,
    pub actual: String,
}

impl Display for ChecksumMismatch {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "snapshot checksum mismatch: expected {}, computed {}",
            self.expected, self.actual
        )
    }
}

impl std::error::Error for ChecksumMismatch {}

fn dump<T: Record + Serialize>(conn: &Connection) -> anyhow::Result<Value> {
    let rows = store::get_all::<T>(conn)?;
    Ok(serde_json::to_value(rows)?)
}

fn dump_store(conn: &Connection, name: &str) -> anyhow::Result<Value> {
    match name {
        "users" => dump::<User>(conn),
        "classes" => dump::<ClassRoom>(conn),
        "courses" => dump::<Course>(conn),
        "plans" => dump::<Plan>(conn),
        "enrollments" => dump::<Enrollment>(conn),
        "scores" => dump::<Score>(conn),
        "score_details" => dump::<ScoreDetail>(conn),
        "materials" => dump::<Material>(conn),
        "assignments" => dump::<Assignment>(conn),
        "submissions" => dump::<Submission>(conn),
        "download_history" => dump::<DownloadRecord>(conn),
        other => Err(anyhow!("unknown store: {other}")),
    }
}

fn load<T: Record + DeserializeOwned>(conn: &Connection, items: &[Value]) -> StoreImport {
    let mut out = StoreImport::default();
    for item in items {
        let record: T = match serde_json::from_value(item.clone()) {
            Ok(r) => r,
            Err(e) => {
                warn!(
                    "event=snapshot_import module=snapshot status=skip store={} reason=invalid error={}",
                    T::STORE,
                    e
                );
                out.skipped += 1;
                continue;
            }
        };
        match store::add(conn, &record) {
            Ok(()) => out.imported += 1,
            Err(e) => {
                warn!(
                    "event=snapshot_import module=snapshot status=skip store={} id={} error={}",
                    T::STORE,
                    record.id(),
                    e
                );
                out.skipped += 1;
            }
        }
    }
    out
}

fn load_store(conn: &Connection, name: &str, items: &[Value]) -> StoreImport {
    match name {
        "users" => load::<User>(conn, items),
        "classes" => load::<ClassRoom>(conn, items),
        "courses" => load::<Course>(conn, items),
        "plans" => load::<Plan>(conn, items),
        "enrollments" => load::<Enrollment>(conn, items),
        "scores" => load::<Score>(conn, items),
        "score_details" => load::<ScoreDetail>(conn, items),
        "materials" => load::<Material>(conn, items),
        "assignments" => load::<Assignment>(conn, items),
        "submissions" => load::<Submission>(conn, items),
        "download_history" => load::<DownloadRecord>(conn, items),
        _ => StoreImport {
            imported: 0,
            skipped: items.len(),
        },
    }
}

const SETTINGS_STORE: &str = "settings";

fn dump_settings(conn: &Connection) -> anyhow::Result<Value> {
    let rows: Vec<Value> = db::settings_all(conn)?
        .into_iter()
        .map(|(key, value)| json!({ "key": key, "value": value }))
        .collect();
    Ok(Value::Array(rows))
}

/// Settings already present in the workspace win over the snapshot's.
fn load_settings(conn: &Connection, items: &[Value]) -> StoreImport {
    let mut out = StoreImport::default();
    for item in items {
        let key = item.get("key").and_then(|v| v.as_str());
        let (Some(key), Some(value)) = (key, item.get("value")) else {
            out.skipped += 1;
            continue;
        };
        match db::settings_insert_new(conn, key, value) {
            Ok(true) => out.imported += 1,
            Ok(false) => out.skipped += 1,
            Err(e) => {
                warn!(
                    "event=snapshot_import module=snapshot status=skip store=settings key={} error={}",
                    key, e
                );
                out.skipped += 1;
            }
        }
    }
    out
}

/// Hex SHA-256 of the canonical (sorted-key) serialization of the stores object.
pub fn checksum(stores: &Value) -> anyhow::Result<String> {
    let canonical = serde_json::to_string(stores)?;
    let digest = Sha256::digest(canonical.as_bytes());
    Ok(format!("{:x}", digest))
}

pub fn export_snapshot(conn: &Connection, out_path: &Path) -> anyhow::Result<ExportSummary> {
    let mut stores = Map::new();
    let mut record_count = 0;
    for name in STORE_ORDER {
        let rows = dump_store(conn, name)?;
        record_count += rows.as_array().map(|a| a.len()).unwrap_or(0);
        stores.insert(name.to_string(), rows);
    }
    let settings = dump_settings(conn)?;
    record_count += settings.as_array().map(|a| a.len()).unwrap_or(0);
    stores.insert(SETTINGS_STORE.to_string(), settings);
    let stores = Value::Object(stores);
    let sum = checksum(&stores)?;

    let doc = json!({
        "format": SNAPSHOT_FORMAT,
        "schemaVersion": db::schema_version(conn)?,
        "appVersion": env!("CARGO_PKG_VERSION"),
        "exportedAt": chrono::Utc::now().to_rfc3339(),
        "checksum": sum,
        "stores": stores,
    });

    if let Some(parent) = out_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.to_string_lossy()))?;
    }
    let text = serde_json::to_string_pretty(&doc).context("failed to serialize snapshot")?;
    std::fs::write(out_path, text)
        .with_context(|| format!("failed to write snapshot {}", out_path.to_string_lossy()))?;

    info!(
        "event=snapshot_export module=snapshot status=ok records={} path={}",
        record_count,
        out_path.display()
    );
    Ok(ExportSummary {
        record_count,
        checksum: sum,
    })
}

/// Adds every record of the snapshot; records that collide or dangle are skipped.
pub fn import_snapshot(conn: &Connection, in_path: &Path) -> anyhow::Result<ImportSummary> {
    let text = std::fs::read_to_string(in_path)
        .with_context(|| format!("failed to read snapshot {}", in_path.to_string_lossy()))?;
    let doc: Value = serde_json::from_str(&text).context("snapshot is invalid JSON")?;

    let format = doc.get("format").and_then(|v| v.as_str()).unwrap_or("");
    if format != SNAPSHOT_FORMAT {
        return Err(anyhow!("unsupported snapshot format: {}", format));
    }
    let stores = doc
        .get("stores")
        .filter(|v| v.is_object())
        .ok_or_else(|| anyhow!("snapshot missing stores"))?;

    if let Some(expected) = doc.get("checksum").and_then(|v| v.as_str()) {
        let actual = checksum(stores)?;
        if actual != expected {
            return Err(ChecksumMismatch {
                expected: expected.to_string(),
                actual,
            }
            .into());
        }
    }

    let tx = conn.unchecked_transaction()?;
    let mut summary = ImportSummary::default();
    for name in STORE_ORDER {
        let Some(items) = stores.get(*name).and_then(|v| v.as_array()) else {
            continue;
        };
        let res = load_store(&tx, name, items);
        summary.imported += res.imported;
        summary.skipped += res.skipped;
        summary.per_store.insert(name.to_string(), res);
    }
    if let Some(items) = stores.get(SETTINGS_STORE).and_then(|v| v.as_array()) {
        let res = load_settings(&tx, items);
        summary.imported += res.imported;
        summary.skipped += res.skipped;
        summary.per_store.insert(SETTINGS_STORE.to_string(), res);
    }
    tx.commit()?;

    info!(
        "event=snapshot_import module=snapshot status=ok imported={} skipped={}",
        summary.imported, summary.skipped
    );
    Ok(summary)
}
