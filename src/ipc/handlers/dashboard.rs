use crate::dashboard;
use crate::ipc::helpers::{authenticate_as, db_conn, respond, to_json, HandlerResult};
use crate::ipc::types::{AppState, Request};
use crate::model::Role;

fn handle_dashboard_coordinator(state: &mut AppState, req: &Request) -> HandlerResult {
    authenticate_as(state, req, Role::Coordinator)?;
    let conn = db_conn(state)?;
    to_json(&dashboard::coordinator_dashboard(conn)?)
}

fn handle_dashboard_teacher(state: &mut AppState, req: &Request) -> HandlerResult {
    let me = authenticate_as(state, req, Role::Teacher)?;
    let conn = db_conn(state)?;
    to_json(&dashboard::teacher_dashboard(conn, &me.id, state.today())?)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "dashboard.coordinator" => handle_dashboard_coordinator(state, req),
        "dashboard.teacher" => handle_dashboard_teacher(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}
