mod calc;
mod config;
mod dates;
mod db;
mod ids;
mod ipc;
mod logging;
mod models;
mod seed;
mod snapshot;
mod store;

use log::{error, info, warn};
use std::io::{self, BufRead, Write};

fn main() {
    let cfg = config::Config::from_env();
    if let Err(e) = logging::init_logging(&cfg) {
        eprintln!("coursebookd: logging disabled: {e}");
    }

    let mut state = ipc::AppState {
        workspace: None,
        db: None,
    };
    if let Some(ws) = &cfg.workspace {
        if let Err(e) = ipc::open_workspace(&mut state, ws) {
            warn!(
                "event=workspace_autoload module=core status=error path={} code={} message={}",
                ws.display(),
                e.code,
                e.message
            );
        }
    }

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(e) => {
                error!("event=stdin_read module=ipc status=error error={}", e);
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let req: ipc::Request = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                // No id to echo back.
                let resp = serde_json::json!({
                    "ok": false,
                    "error": { "code": "bad_json", "message": e.to_string() }
                });
                let _ = writeln!(stdout, "{}", resp);
                let _ = stdout.flush();
                continue;
            }
        };

        let resp = ipc::handle_request(&mut state, req);
        let _ = writeln!(
            stdout,
            "{}",
            serde_json::to_string(&resp).unwrap_or_else(|_| "{\"ok\":false}".to_string())
        );
        let _ = stdout.flush();
    }
    info!("event=app_stop module=core status=ok");
}
