use serde_json::json;

use crate::assignments::{self, AssignmentFilter, NewAssignment};
use crate::error::AppError;
use crate::ipc::helpers::{
    authenticate, authenticate_as, db_conn, optional_str, page_request, required_str, respond,
    to_json, HandlerResult,
};
use crate::ipc::types::{AppState, Request};
use crate::model::Role;

fn handle_assignments_create(state: &mut AppState, req: &Request) -> HandlerResult {
    authenticate_as(state, req, Role::Coordinator)?;
    let conn = db_conn(state)?;
    let p = &req.params;
    let input = NewAssignment {
        teacher_id: required_str(p, "userId")?,
        subject_id: required_str(p, "subjectId")?,
        group_id: required_str(p, "groupId")?,
        academic_year: required_str(p, "academicYear")?,
    };
    to_json(&assignments::create_assignment(conn, &input)?)
}

fn handle_assignments_list(state: &mut AppState, req: &Request) -> HandlerResult {
    authenticate_as(state, req, Role::Coordinator)?;
    let conn = db_conn(state)?;
    let p = &req.params;
    let filter = AssignmentFilter {
        teacher_id: optional_str(p, "teacherId")?,
        subject_id: optional_str(p, "subjectId")?,
        group_id: optional_str(p, "groupId")?,
        academic_year: optional_str(p, "academicYear")?,
        search: optional_str(p, "search")?,
    };
    to_json(&assignments::list_assignments(conn, &filter, page_request(p)?)?)
}

/// Coordinators may look at anyone; teachers only at themselves.
fn handle_assignments_by_teacher(state: &mut AppState, req: &Request) -> HandlerResult {
    let me = authenticate(state, req)?;
    let conn = db_conn(state)?;
    let teacher_id = required_str(&req.params, "teacherId")?;
    if me.role != Role::Coordinator && me.id != teacher_id {
        return Err(AppError::permission("you can only view your own assignments").into());
    }
    let year = optional_str(&req.params, "academicYear")?;
    to_json(&assignments::assignments_for_teacher(
        conn,
        &teacher_id,
        year.as_deref(),
    )?)
}

fn handle_assignments_available_groups(state: &mut AppState, req: &Request) -> HandlerResult {
    authenticate_as(state, req, Role::Coordinator)?;
    let conn = db_conn(state)?;
    let subject_id = required_str(&req.params, "subjectId")?;
    let year = optional_str(&req.params, "academicYear")?;
    to_json(&assignments::available_groups(
        conn,
        &subject_id,
        year.as_deref(),
    )?)
}

fn handle_assignments_delete(state: &mut AppState, req: &Request) -> HandlerResult {
    authenticate_as(state, req, Role::Coordinator)?;
    let conn = db_conn(state)?;
    let id = required_str(&req.params, "id")?;
    assignments::deactivate_assignment(conn, &id)?;
    Ok(json!({ "id": id, "deleted": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "assignments.create" => handle_assignments_create(state, req),
        "assignments.list" => handle_assignments_list(state, req),
        "assignments.byTeacher" => handle_assignments_by_teacher(state, req),
        "assignments.availableGroups" => handle_assignments_available_groups(state, req),
        "assignments.delete" => handle_assignments_delete(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}
