use crate::dates;
use crate::ipc::error::HandlerErr;
use crate::ipc::types::{AppState, Request};
use chrono::NaiveDateTime;
use rusqlite::Connection;
use serde_json::Value;

pub fn require_db<'a>(state: &'a AppState) -> Result<&'a Connection, HandlerErr> {
    state
        .db
        .as_ref()
        .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))
}

pub fn required_str(req: &Request, key: &str) -> Result<String, HandlerErr> {
    match req.params.get(key).and_then(|v| v.as_str()) {
        Some(v) if !v.trim().is_empty() => Ok(v.trim().to_string()),
        Some(_) => Err(HandlerErr::bad_params(format!("{key} must not be empty"))),
        None => Err(HandlerErr::bad_params(format!("missing {key}"))),
    }
}

/// Absent, null and blank strings all read as `None`.
pub fn optional_str(req: &Request, key: &str) -> Result<Option<String>, HandlerErr> {
    str_field(&req.params, key)
}

pub fn str_field(obj: &Value, key: &str) -> Result<Option<String>, HandlerErr> {
    match obj.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => {
            let s = s.trim();
            Ok((!s.is_empty()).then(|| s.to_string()))
        }
        Some(_) => Err(HandlerErr::bad_params(format!("{key} must be a string"))),
    }
}

pub fn f64_field(obj: &Value, key: &str) -> Result<Option<f64>, HandlerErr> {
    match obj.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v
            .as_f64()
            .filter(|n| n.is_finite())
            .map(Some)
            .ok_or_else(|| HandlerErr::bad_params(format!("{key} must be a number"))),
    }
}

pub fn i64_field(obj: &Value, key: &str) -> Result<Option<i64>, HandlerErr> {
    match obj.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v
            .as_i64()
            .map(Some)
            .ok_or_else(|| HandlerErr::bad_params(format!("{key} must be an integer"))),
    }
}

pub fn bool_field(obj: &Value, key: &str) -> Result<Option<bool>, HandlerErr> {
    match obj.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v
            .as_bool()
            .map(Some)
            .ok_or_else(|| HandlerErr::bad_params(format!("{key} must be boolean"))),
    }
}

pub fn optional_f64(req: &Request, key: &str) -> Result<Option<f64>, HandlerErr> {
    f64_field(&req.params, key)
}

pub fn optional_i64(req: &Request, key: &str) -> Result<Option<i64>, HandlerErr> {
    i64_field(&req.params, key)
}

pub fn optional_bool(req: &Request, key: &str) -> Result<Option<bool>, HandlerErr> {
    bool_field(&req.params, key)
}

pub fn required_object<'a>(
    req: &'a Request,
    key: &str,
) -> Result<&'a serde_json::Map<String, Value>, HandlerErr> {
    req.params
        .get(key)
        .and_then(|v| v.as_object())
        .ok_or_else(|| HandlerErr::bad_params(format!("{key} must be an object")))
}

pub fn string_list(req: &Request, key: &str) -> Result<Vec<String>, HandlerErr> {
    let Some(arr) = req.params.get(key).and_then(|v| v.as_array()) else {
        return Err(HandlerErr::bad_params(format!("{key} must be an array")));
    };
    arr.iter()
        .map(|v| {
            v.as_str()
                .map(|s| s.to_string())
                .ok_or_else(|| HandlerErr::bad_params(format!("{key} must contain strings")))
        })
        .collect()
}

/// `params.asOf` overrides the wall clock for deadline checks.
pub fn as_of(req: &Request) -> Result<NaiveDateTime, HandlerErr> {
    match optional_str(req, "asOf")? {
        Some(s) => dates::parse_datetime(&s).ok_or_else(|| {
            HandlerErr::bad_params("asOf must be YYYY-MM-DD or YYYY-MM-DDTHH:MM[:SS]")
        }),
        None => Ok(dates::now()),
    }
}

pub fn contains_ci(haystack: &str, needle_lower: &str) -> bool {
    haystack.to_lowercase().contains(needle_lower)
}
