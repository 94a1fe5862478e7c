use serde_json::json;

use crate::ipc::helpers::{
    authenticate_as, db_conn, optional_str, page_request, required_str, respond, to_json,
    HandlerErr, HandlerResult,
};
use crate::ipc::types::{AppState, Request};
use crate::model::Role;
use crate::subjects::{self, SubjectInput};

fn subject_input(params: &serde_json::Value) -> Result<SubjectInput, HandlerErr> {
    Ok(SubjectInput {
        name: optional_str(params, "name")?,
        code: optional_str(params, "code")?,
        description: optional_str(params, "description")?,
    })
}

fn handle_subjects_create(state: &mut AppState, req: &Request) -> HandlerResult {
    authenticate_as(state, req, Role::Coordinator)?;
    let conn = db_conn(state)?;
    to_json(&subjects::create_subject(conn, &subject_input(&req.params)?)?)
}

fn handle_subjects_list(state: &mut AppState, req: &Request) -> HandlerResult {
    authenticate_as(state, req, Role::Coordinator)?;
    let conn = db_conn(state)?;
    let search = optional_str(&req.params, "search")?;
    to_json(&subjects::list_subjects(
        conn,
        search.as_deref(),
        page_request(&req.params)?,
    )?)
}

fn handle_subjects_get(state: &mut AppState, req: &Request) -> HandlerResult {
    authenticate_as(state, req, Role::Coordinator)?;
    let conn = db_conn(state)?;
    to_json(&subjects::get_subject(conn, &required_str(&req.params, "id")?)?)
}

fn handle_subjects_update(state: &mut AppState, req: &Request) -> HandlerResult {
    authenticate_as(state, req, Role::Coordinator)?;
    let conn = db_conn(state)?;
    let id = required_str(&req.params, "id")?;
    to_json(&subjects::update_subject(conn, &id, &subject_input(&req.params)?)?)
}

fn handle_subjects_delete(state: &mut AppState, req: &Request) -> HandlerResult {
    authenticate_as(state, req, Role::Coordinator)?;
    let conn = db_conn(state)?;
    let id = required_str(&req.params, "id")?;
    subjects::deactivate_subject(conn, &id)?;
    Ok(json!({ "id": id, "deleted": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "subjects.create" => handle_subjects_create(state, req),
        "subjects.list" => handle_subjects_list(state, req),
        "subjects.get" => handle_subjects_get(state, req),
        "subjects.update" => handle_subjects_update(state, req),
        "subjects.delete" => handle_subjects_delete(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}
