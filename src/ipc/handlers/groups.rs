use serde_json::json;

use crate::groups::{self, GroupInput};
use crate::ipc::helpers::{
    authenticate_as, db_conn, optional_i64, optional_str, page_request, required_str, respond,
    to_json, HandlerErr, HandlerResult,
};
use crate::ipc::types::{AppState, Request};
use crate::model::Role;

fn group_input(params: &serde_json::Value) -> Result<GroupInput, HandlerErr> {
    Ok(GroupInput {
        name: required_str(params, "name")?,
        grade: required_str(params, "grade")?,
        section: required_str(params, "section")?,
        academic_year: required_str(params, "academicYear")?,
        student_count: optional_i64(params, "studentCount")?,
    })
}

fn handle_groups_create(state: &mut AppState, req: &Request) -> HandlerResult {
    authenticate_as(state, req, Role::Coordinator)?;
    let conn = db_conn(state)?;
    to_json(&groups::create_group(conn, &group_input(&req.params)?)?)
}

fn handle_groups_list(state: &mut AppState, req: &Request) -> HandlerResult {
    authenticate_as(state, req, Role::Coordinator)?;
    let conn = db_conn(state)?;
    let search = optional_str(&req.params, "search")?;
    to_json(&groups::list_groups(
        conn,
        search.as_deref(),
        page_request(&req.params)?,
    )?)
}

fn handle_groups_get(state: &mut AppState, req: &Request) -> HandlerResult {
    authenticate_as(state, req, Role::Coordinator)?;
    let conn = db_conn(state)?;
    to_json(&groups::get_group(conn, &required_str(&req.params, "id")?)?)
}

fn handle_groups_update(state: &mut AppState, req: &Request) -> HandlerResult {
    authenticate_as(state, req, Role::Coordinator)?;
    let conn = db_conn(state)?;
    let id = required_str(&req.params, "id")?;
    to_json(&groups::update_group(conn, &id, &group_input(&req.params)?)?)
}

fn handle_groups_delete(state: &mut AppState, req: &Request) -> HandlerResult {
    authenticate_as(state, req, Role::Coordinator)?;
    let conn = db_conn(state)?;
    let id = required_str(&req.params, "id")?;
    groups::deactivate_group(conn, &id)?;
    Ok(json!({ "id": id, "deleted": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "groups.create" => handle_groups_create(state, req),
        "groups.list" => handle_groups_list(state, req),
        "groups.get" => handle_groups_get(state, req),
        "groups.update" => handle_groups_update(state, req),
        "groups.delete" => handle_groups_delete(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}
