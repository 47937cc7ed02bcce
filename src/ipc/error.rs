use crate::store::StoreError;
use log::warn;
use serde_json::json;

pub fn ok(id: &str, result: serde_json::Value) -> serde_json::Value {
    json!({
        "id": id,
        "ok": true,
        "result": result
    })
}

pub fn err(
    id: &str,
    code: &str,
    message: impl Into<String>,
    details: Option<serde_json::Value>,
) -> serde_json::Value {
    let mut error = json!({
        "code": code,
        "message": message.into(),
    });
    if let Some(d) = details {
        error["details"] = d;
    }
    json!({
        "id": id,
        "ok": false,
        "error": error,
    })
}

#[derive(Debug)]
pub struct HandlerErr {
    pub code: &'static str,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl HandlerErr {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn bad_params(message: impl Into<String>) -> Self {
        Self::new("bad_params", message)
    }

    pub fn not_found(what: &str) -> Self {
        Self::new("not_found", format!("{what} not found"))
    }

    pub fn response(self, id: &str) -> serde_json::Value {
        err(id, self.code, self.message, self.details)
    }
}

impl From<StoreError> for HandlerErr {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Conflict { store, message } => {
                Self::new("conflict", message).with_details(json!({ "store": store }))
            }
            StoreError::UnknownIndex { .. } => Self::bad_params(e.to_string()),
            StoreError::UnsupportedSchemaVersion { .. } => {
                Self::new("db_open_failed", e.to_string())
            }
            StoreError::Sqlite(inner) => Self::new("db_query_failed", inner.to_string()),
        }
    }
}

impl From<rusqlite::Error> for HandlerErr {
    fn from(e: rusqlite::Error) -> Self {
        Self::new("db_query_failed", e.to_string())
    }
}

impl From<anyhow::Error> for HandlerErr {
    fn from(e: anyhow::Error) -> Self {
        Self::new("db_query_failed", format!("{e:#}"))
    }
}

/// Turns a handler outcome into the response envelope, logging failures.
pub fn respond(
    id: &str,
    method: &str,
    outcome: Result<serde_json::Value, HandlerErr>,
) -> serde_json::Value {
    match outcome {
        Ok(v) => ok(id, v),
        Err(e) => {
            warn!(
                "event=request module=ipc status=error method={} code={} message={}",
                method, e.code, e.message
            );
            e.response(id)
        }
    }
}
