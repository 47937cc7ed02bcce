use crate::calc::{Weights, DEFAULT_PASS_THRESHOLD};
use crate::db;
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::helpers::{require_db, required_object, required_str};
use crate::ipc::types::{AppState, Request};
use log::debug;
use rusqlite::Connection;
use serde_json::{json, Map, Value};

#[derive(Clone, Copy)]
enum SetupSection {
    Grading,
    Materials,
    Enrollment,
    Dashboard,
}

impl SetupSection {
    const ALL: [SetupSection; 4] = [
        Self::Grading,
        Self::Materials,
        Self::Enrollment,
        Self::Dashboard,
    ];

    fn parse(s: &str) -> Option<Self> {
        match s {
            "grading" => Some(Self::Grading),
            "materials" => Some(Self::Materials),
            "enrollment" => Some(Self::Enrollment),
            "dashboard" => Some(Self::Dashboard),
            _ => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::Grading => "grading",
            Self::Materials => "materials",
            Self::Enrollment => "enrollment",
            Self::Dashboard => "dashboard",
        }
    }

    fn key(self) -> String {
        format!("setup.{}", self.name())
    }
}

fn default_section(section: SetupSection) -> Value {
    match section {
        SetupSection::Grading => json!({
            "defaultWeights": Weights::default(),
            "passThreshold": DEFAULT_PASS_THRESHOLD
        }),
        SetupSection::Materials => json!({
            "storageQuotaMb": 5000
        }),
        SetupSection::Enrollment => json!({
            "allowOverCapacity": false
        }),
        SetupSection::Dashboard => json!({
            "upcomingExamDays": 7
        }),
    }
}

fn parse_i64_range(v: &Value, key: &str, min: i64, max: i64) -> Result<i64, String> {
    let n = v
        .as_i64()
        .ok_or_else(|| format!("{} must be integer", key))?;
    if !(min..=max).contains(&n) {
        return Err(format!("{} must be in {}..={}", key, min, max));
    }
    Ok(n)
}

fn merge_section_patch(
    section: SetupSection,
    current: &mut Value,
    patch: &Map<String, Value>,
) -> Result<(), String> {
    let obj = current
        .as_object_mut()
        .ok_or_else(|| "internal setup object must be a JSON object".to_string())?;
    for (k, v) in patch {
        match (section, k.as_str()) {
            (SetupSection::Grading, "defaultWeights") => {
                let w: Weights = serde_json::from_value(v.clone())
                    .map_err(|e| format!("defaultWeights: {e}"))?;
                w.validate()?;
                obj.insert(k.clone(), json!(w));
            }
            (SetupSection::Grading, "passThreshold") => {
                let n = v
                    .as_f64()
                    .filter(|n| (0.0..=100.0).contains(n))
                    .ok_or_else(|| "passThreshold must be a number in 0..=100".to_string())?;
                obj.insert(k.clone(), json!(n));
            }
            (SetupSection::Materials, "storageQuotaMb") => {
                obj.insert(k.clone(), json!(parse_i64_range(v, k, 1, 1_000_000)?));
            }
            (SetupSection::Enrollment, "allowOverCapacity") => {
                let b = v
                    .as_bool()
                    .ok_or_else(|| "allowOverCapacity must be boolean".to_string())?;
                obj.insert(k.clone(), Value::Bool(b));
            }
            (SetupSection::Dashboard, "upcomingExamDays") => {
                obj.insert(k.clone(), json!(parse_i64_range(v, k, 1, MAX_UPCOMING_EXAM_DAYS)?));
            }
            _ => return Err(format!("unknown {} field: {}", section.name(), k)),
        }
    }
    Ok(())
}

fn load_section(conn: &Connection, section: SetupSection) -> anyhow::Result<Value> {
    let mut current = default_section(section);
    if let Some(saved) = db::settings_get_json(conn, &section.key())? {
        if let Some(saved_obj) = saved.as_object() {
            // Malformed historical values fall back to defaults.
            if let Err(e) = merge_section_patch(section, &mut current, saved_obj) {
                debug!(
                    "event=setup_load module=setup status=ignored section={} reason={}",
                    section.name(),
                    e
                );
                current = default_section(section);
            }
        }
    }
    Ok(current)
}

pub fn default_weights(conn: &Connection) -> Weights {
    load_section(conn, SetupSection::Grading)
        .ok()
        .and_then(|v| v.get("defaultWeights").cloned())
        .and_then(|v| serde_json::from_value(v).ok())
        .unwrap_or_default()
}

pub fn pass_threshold(conn: &Connection) -> f64 {
    load_section(conn, SetupSection::Grading)
        .ok()
        .and_then(|v| v.get("passThreshold").and_then(|n| n.as_f64()))
        .unwrap_or(DEFAULT_PASS_THRESHOLD)
}

pub fn storage_quota_bytes(conn: &Connection) -> i64 {
    let mb = load_section(conn, SetupSection::Materials)
        .ok()
        .and_then(|v| v.get("storageQuotaMb").and_then(|n| n.as_i64()))
        .unwrap_or(5000);
    mb * 1024 * 1024
}

pub fn allow_over_capacity(conn: &Connection) -> bool {
    load_section(conn, SetupSection::Enrollment)
        .ok()
        .and_then(|v| v.get("allowOverCapacity").and_then(|b| b.as_bool()))
        .unwrap_or(false)
}

pub const MAX_UPCOMING_EXAM_DAYS: i64 = 365;

pub fn upcoming_exam_days(conn: &Connection) -> i64 {
    load_section(conn, SetupSection::Dashboard)
        .ok()
        .and_then(|v| v.get("upcomingExamDays").and_then(|n| n.as_i64()))
        .unwrap_or(7)
}

fn handle_setup_get(state: &mut AppState, _req: &Request) -> Result<Value, HandlerErr> {
    let conn = require_db(state)?;
    let mut out = Map::new();
    for section in SetupSection::ALL {
        out.insert(section.name().to_string(), load_section(conn, section)?);
    }
    Ok(Value::Object(out))
}

fn handle_setup_update(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = require_db(state)?;
    let section_raw = required_str(req, "section")?;
    let section = SetupSection::parse(&section_raw)
        .ok_or_else(|| HandlerErr::bad_params("unknown section"))?;
    let patch = required_object(req, "patch")?;

    let mut current = load_section(conn, section)?;
    merge_section_patch(section, &mut current, patch).map_err(HandlerErr::bad_params)?;
    db::settings_set_json(conn, &section.key(), &current)
        .map_err(|e| HandlerErr::new("db_update_failed", e.to_string()))?;
    Ok(json!({ "section": section.name(), "value": current }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let outcome = match req.method.as_str() {
        "setup.get" => handle_setup_get(state, req),
        "setup.update" => handle_setup_update(state, req),
        _ => return None,
    };
    Some(respond(&req.id, &req.method, outcome))
}
