mod assignments;
mod auth;
mod calendar;
mod config;
mod dashboard;
mod db;
mod error;
mod groups;
mod ipc;
mod logging;
mod model;
mod subjects;
mod tasks;
mod users;

use std::io::{self, BufRead, Write};

use anyhow::Context;
use clap::Parser;
use serde_json::json;

fn main() -> anyhow::Result<()> {
    let config = config::Config::parse();
    logging::init(config.log_format);

    if config.jwt_secret.as_deref().map_or(true, str::is_empty) {
        tracing::warn!("no jwt secret configured; logins will fail");
    }

    let mut state = ipc::AppState::new(config);
    if let Some(ws) = state.config.workspace.clone() {
        let conn = db::open_db(&ws)
            .with_context(|| format!("failed to open workspace {}", ws.display()))?;
        tracing::info!(workspace = %ws.display(), "workspace opened");
        state.workspace = Some(ws);
        state.db = Some(conn);
    }
    tracing::info!(version = env!("CARGO_PKG_VERSION"), today = %state.today(), "schooltasksd ready");

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(e) => {
                tracing::error!(error = %e, "stdin read failed");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let resp = match serde_json::from_str::<ipc::Request>(&line) {
            Ok(req) => ipc::handle_request(&mut state, req),
            Err(e) => {
                // No id to echo back.
                tracing::warn!(error = %e, "unparseable request line");
                json!({
                    "ok": false,
                    "error": { "code": "bad_json", "message": e.to_string() }
                })
            }
        };

        let _ = writeln!(
            stdout,
            "{}",
            serde_json::to_string(&resp).unwrap_or_else(|_| "{\"ok\":false}".to_string())
        );
        let _ = stdout.flush();
    }

    tracing::info!("stdin closed; exiting");
    Ok(())
}
