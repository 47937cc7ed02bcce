use crate::calc::round_to;
use crate::dates;
use crate::ids;
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::handlers::setup;
use crate::ipc::helpers::{
    contains_ci, optional_i64, optional_str, require_db, required_str, string_list,
};
use crate::ipc::types::{AppState, Request};
use crate::models::{file_type_for, Course, DownloadRecord, Material, Plan};
use crate::store;
use log::info;
use rusqlite::Connection;
use serde_json::{json, Value};
use std::collections::HashMap;

const HISTORY_LIMIT: i64 = 100;

/// `1536` -> `1.5 KB`; two decimals at most, trailing zeros dropped.
pub fn human_size(bytes: i64) -> String {
    if bytes <= 0 {
        return "0 Bytes".to_string();
    }
    const UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{} {}", round_to(value, 2), UNITS[unit])
}

fn storage_level(percent: f64) -> &'static str {
    if percent > 90.0 {
        "critical"
    } else if percent > 70.0 {
        "warning"
    } else {
        "ok"
    }
}

fn used_bytes(conn: &Connection, plan_id: Option<&str>) -> rusqlite::Result<i64> {
    match plan_id {
        Some(p) => conn.query_row(
            "SELECT COALESCE(SUM(size_bytes), 0) FROM materials WHERE plan_id = ?",
            [p],
            |r| r.get(0),
        ),
        None => conn.query_row(
            "SELECT COALESCE(SUM(size_bytes), 0) FROM materials",
            [],
            |r| r.get(0),
        ),
    }
}

/// 1 TiB; larger uploads are rejected before the quota check.
const MAX_MATERIAL_BYTES: i64 = 1 << 40;

fn handle_materials_add(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = require_db(state)?;
    let plan_id = required_str(req, "planId")?;
    let name = required_str(req, "name")?;
    let size_bytes = optional_i64(req, "sizeBytes")?
        .ok_or_else(|| HandlerErr::bad_params("missing sizeBytes"))?;
    if !(0..=MAX_MATERIAL_BYTES).contains(&size_bytes) {
        return Err(HandlerErr::bad_params(format!(
            "sizeBytes must be in 0..={MAX_MATERIAL_BYTES}"
        )));
    }
    if store::get_by_id::<Plan>(conn, &plan_id)?.is_none() {
        return Err(HandlerErr::not_found("plan"));
    }

    let quota = setup::storage_quota_bytes(conn);
    let used = used_bytes(conn, Some(&plan_id))?;
    if used.checked_add(size_bytes).map_or(true, |total| total > quota) {
        return Err(
            HandlerErr::new("quota_exceeded", "material would exceed the storage quota")
                .with_details(json!({
                    "usedBytes": used,
                    "sizeBytes": size_bytes,
                    "quotaBytes": quota
                })),
        );
    }

    let material = Material {
        id: ids::generic("mat"),
        plan_id,
        file_type: file_type_for(&name).to_string(),
        name,
        url: optional_str(req, "url")?,
        size_bytes,
        description: optional_str(req, "description")?.unwrap_or_default(),
        uploaded_at: dates::format_datetime(&dates::now()),
    };
    store::add(conn, &material)?;
    info!(
        "event=material_add module=materials status=ok id={} type={} bytes={}",
        material.id, material.file_type, material.size_bytes
    );
    Ok(json!({ "material": material }))
}

fn sort_materials(rows: &mut [(Material, Option<String>)], mode: &str) -> Result<(), HandlerErr> {
    match mode {
        "date-desc" => rows.sort_by(|a, b| b.0.uploaded_at.cmp(&a.0.uploaded_at)),
        "date-asc" => rows.sort_by(|a, b| a.0.uploaded_at.cmp(&b.0.uploaded_at)),
        "name-asc" => rows.sort_by(|a, b| a.0.name.to_lowercase().cmp(&b.0.name.to_lowercase())),
        "name-desc" => rows.sort_by(|a, b| b.0.name.to_lowercase().cmp(&a.0.name.to_lowercase())),
        "size-desc" => rows.sort_by(|a, b| b.0.size_bytes.cmp(&a.0.size_bytes)),
        "size-asc" => rows.sort_by(|a, b| a.0.size_bytes.cmp(&b.0.size_bytes)),
        other => return Err(HandlerErr::bad_params(format!("unknown sort: {other}"))),
    }
    Ok(())
}

fn handle_materials_list(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = require_db(state)?;
    let materials = match optional_str(req, "planId")? {
        Some(p) => store::get_by_index::<Material>(conn, "plan_id", &p)?,
        None => store::get_all::<Material>(conn)?,
    };

    let plans: HashMap<String, Plan> = store::get_all::<Plan>(conn)?
        .into_iter()
        .map(|p| (p.id.clone(), p))
        .collect();
    let courses: HashMap<String, Course> = store::get_all::<Course>(conn)?
        .into_iter()
        .map(|c| (c.id.clone(), c))
        .collect();
    let course_name = |m: &Material| {
        plans
            .get(&m.plan_id)
            .and_then(|p| courses.get(&p.course_id))
            .map(|c| c.name.clone())
    };

    let mut rows: Vec<(Material, Option<String>)> = materials
        .into_iter()
        .map(|m| {
            let c = course_name(&m);
            (m, c)
        })
        .collect();
    if let Some(term) = optional_str(req, "search")? {
        let term = term.to_lowercase();
        rows.retain(|(m, c)| {
            contains_ci(&m.name, &term)
                || contains_ci(&m.description, &term)
                || c.as_deref().is_some_and(|c| contains_ci(c, &term))
        });
    }
    let sort = optional_str(req, "sort")?.unwrap_or_else(|| "date-desc".to_string());
    sort_materials(&mut rows, &sort)?;

    let out: Vec<Value> = rows
        .into_iter()
        .map(|(m, c)| {
            let mut v = json!(m);
            v["courseName"] = json!(c);
            v["sizeText"] = json!(human_size(m.size_bytes));
            v
        })
        .collect();
    Ok(json!({ "materials": out }))
}

fn handle_materials_delete(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = require_db(state)?;
    let ids = string_list(req, "materialIds")?;
    if ids.is_empty() {
        return Err(HandlerErr::bad_params("materialIds must not be empty"));
    }
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    let mut deleted = 0;
    let mut missing = Vec::new();
    for id in &ids {
        store::delete_by_index::<DownloadRecord>(&tx, "material_id", id)?;
        if store::delete::<Material>(&tx, id)? {
            deleted += 1;
        } else {
            missing.push(id.clone());
        }
    }
    tx.commit()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    Ok(json!({ "deleted": deleted, "missing": missing }))
}

fn handle_materials_storage(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = require_db(state)?;
    let plan_id = optional_str(req, "planId")?;
    let used = used_bytes(conn, plan_id.as_deref())?;
    let quota = setup::storage_quota_bytes(conn);
    let percent = if quota > 0 {
        round_to(used as f64 * 100.0 / quota as f64, 1)
    } else {
        0.0
    };
    Ok(json!({
        "usedBytes": used,
        "usedText": human_size(used),
        "quotaBytes": quota,
        "quotaText": human_size(quota),
        "usagePercent": percent,
        "level": storage_level(percent)
    }))
}

fn handle_record_download(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = require_db(state)?;
    let material_id = required_str(req, "materialId")?;
    if store::get_by_id::<Material>(conn, &material_id)?.is_none() {
        return Err(HandlerErr::not_found("material"));
    }
    let record = DownloadRecord {
        id: ids::generic("dl"),
        material_id,
        user_id: optional_str(req, "userId")?,
        downloaded_at: dates::format_datetime(&dates::now()),
    };
    store::add(conn, &record)?;
    // Only the newest entries are kept.
    conn.execute(
        "DELETE FROM download_history WHERE id NOT IN (
           SELECT id FROM download_history ORDER BY downloaded_at DESC, rowid DESC LIMIT ?
         )",
        [HISTORY_LIMIT],
    )?;
    Ok(json!({ "record": record }))
}

fn handle_download_history(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = require_db(state)?;
    let limit = optional_i64(req, "limit")?.unwrap_or(HISTORY_LIMIT).clamp(1, HISTORY_LIMIT);
    let mut stmt = conn.prepare(
        "SELECT h.id, h.material_id, m.name, c.name, h.user_id, h.downloaded_at
         FROM download_history h
         LEFT JOIN materials m ON m.id = h.material_id
         LEFT JOIN plans p ON p.id = m.plan_id
         LEFT JOIN courses c ON c.id = p.course_id
         ORDER BY h.downloaded_at DESC, h.rowid DESC
         LIMIT ?",
    )?;
    let history = stmt
        .query_map([limit], |r| {
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "materialId": r.get::<_, String>(1)?,
                "materialName": r.get::<_, Option<String>>(2)?,
                "courseName": r.get::<_, Option<String>>(3)?,
                "userId": r.get::<_, Option<String>>(4)?,
                "downloadedAt": r.get::<_, String>(5)?,
            }))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(json!({ "total": history.len(), "history": history }))
}

fn handle_clear_history(state: &mut AppState, _req: &Request) -> Result<Value, HandlerErr> {
    let conn = require_db(state)?;
    let removed = conn
        .execute("DELETE FROM download_history", [])
        .map_err(|e| HandlerErr::new("db_delete_failed", e.to_string()))?;
    Ok(json!({ "removed": removed }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let outcome = match req.method.as_str() {
        "materials.add" => handle_materials_add(state, req),
        "materials.list" => handle_materials_list(state, req),
        "materials.delete" => handle_materials_delete(state, req),
        "materials.storage" => handle_materials_storage(state, req),
        "materials.recordDownload" => handle_record_download(state, req),
        "materials.downloadHistory" => handle_download_history(state, req),
        "materials.clearDownloadHistory" => handle_clear_history(state, req),
        _ => return None,
    };
    Some(respond(&req.id, &req.method, outcome))
}
