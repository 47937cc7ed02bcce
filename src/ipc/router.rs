use super::handlers;
use super::types::{AppState, Request};
use crate::ipc::error::err;
use log::debug;

type Handler = fn(&mut AppState, &Request) -> Option<serde_json::Value>;

const HANDLERS: &[Handler] = &[
    handlers::core::try_handle,
    handlers::setup::try_handle,
    handlers::users::try_handle,
    handlers::classes::try_handle,
    handlers::courses::try_handle,
    handlers::plans::try_handle,
    handlers::enrollments::try_handle,
    handlers::materials::try_handle,
    handlers::assignments::try_handle,
    handlers::submissions::try_handle,
    handlers::grades::try_handle,
    handlers::dashboard::try_handle,
];

pub fn handle_request(state: &mut AppState, req: Request) -> serde_json::Value {
    debug!(
        "event=request module=ipc status=start id={} method={}",
        req.id, req.method
    );
    for handler in HANDLERS {
        if let Some(resp) = handler(state, &req) {
            return resp;
        }
    }

    err(
        &req.id,
        "not_implemented",
        format!("unknown method: {}", req.method),
        None,
    )
}
