use crate::db;
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::helpers::required_str;
use crate::ipc::types::{AppState, Request};
use crate::seed;
use crate::snapshot::{self, ChecksumMismatch};
use log::info;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};

fn handle_health(state: &mut AppState, _req: &Request) -> Result<Value, HandlerErr> {
    Ok(json!({
        "version": env!("CARGO_PKG_VERSION"),
        "workspacePath": state.workspace.as_ref().map(|p| p.to_string_lossy().to_string())
    }))
}

/// Opens (or creates) the workspace store and makes it the active one.
pub fn open_workspace(state: &mut AppState, path: &Path) -> Result<Value, HandlerErr> {
    let conn = db::open_db(path).map_err(|e| HandlerErr::new("db_open_failed", format!("{e:#}")))?;
    let version = db::schema_version(&conn)?;
    state.workspace = Some(path.to_path_buf());
    state.db = Some(conn);
    info!(
        "event=workspace_select module=core status=ok path={}",
        path.display()
    );
    Ok(json!({
        "workspacePath": path.to_string_lossy(),
        "schemaVersion": version
    }))
}

fn handle_workspace_select(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let path = PathBuf::from(required_str(req, "path")?);
    open_workspace(state, &path)
}

fn require_db_mut(state: &mut AppState) -> Result<&mut rusqlite::Connection, HandlerErr> {
    state
        .db
        .as_mut()
        .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))
}

fn handle_workspace_seed(state: &mut AppState, _req: &Request) -> Result<Value, HandlerErr> {
    let conn = require_db_mut(state)?;
    let summary =
        seed::seed_demo(conn).map_err(|e| HandlerErr::new("db_insert_failed", format!("{e:#}")))?;
    Ok(json!({
        "skipped": summary.skipped,
        "records": summary.records,
        "demoStudentId": seed::DEMO_STUDENT_ID
    }))
}

fn handle_workspace_reset(state: &mut AppState, _req: &Request) -> Result<Value, HandlerErr> {
    let conn = require_db_mut(state)?;
    db::reset(conn).map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    info!("event=workspace_reset module=core status=ok");
    Ok(json!({ "schemaVersion": db::schema_version(conn)? }))
}

fn snapshot_err(e: anyhow::Error) -> HandlerErr {
    if let Some(m) = e.downcast_ref::<ChecksumMismatch>() {
        return HandlerErr::new("checksum_mismatch", m.to_string())
            .with_details(json!({ "expected": m.expected, "actual": m.actual }));
    }
    if e.downcast_ref::<std::io::Error>().is_some() {
        return HandlerErr::new("io_failed", format!("{e:#}"));
    }
    if e.downcast_ref::<rusqlite::Error>().is_some()
        || e.downcast_ref::<crate::store::StoreError>().is_some()
    {
        return HandlerErr::new("db_query_failed", format!("{e:#}"));
    }
    // Malformed documents: bad JSON, wrong format tag, missing stores.
    HandlerErr::bad_params(format!("{e:#}"))
}

fn handle_workspace_export(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let out_path = PathBuf::from(required_str(req, "outPath")?);
    let conn = require_db_mut(state)?;
    let summary = snapshot::export_snapshot(conn, &out_path).map_err(snapshot_err)?;
    Ok(json!({
        "outPath": out_path.to_string_lossy(),
        "recordCount": summary.record_count,
        "checksum": summary.checksum
    }))
}

fn handle_workspace_import(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let in_path = PathBuf::from(required_str(req, "inPath")?);
    let conn = require_db_mut(state)?;
    let summary = snapshot::import_snapshot(conn, &in_path).map_err(snapshot_err)?;
    Ok(json!({
        "imported": summary.imported,
        "skipped": summary.skipped,
        "stores": summary.per_store
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let outcome = match req.method.as_str() {
        "health" => handle_health(state, req),
        "workspace.select" => handle_workspace_select(state, req),
        "workspace.seed" => handle_workspace_seed(state, req),
        "workspace.reset" => handle_workspace_reset(state, req),
        "workspace.export" => handle_workspace_export(state, req),
        "workspace.import" => handle_workspace_import(state, req),
        _ => return None,
    };
    Some(respond(&req.id, &req.method, outcome))
}
