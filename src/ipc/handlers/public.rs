//! Read-only calendar views that need no session.

use serde_json::json;

use crate::groups;
use crate::ipc::helpers::{
    db_conn, required_i64, required_str, respond, to_json, year_month, HandlerResult,
};
use crate::ipc::types::{AppState, Request};
use crate::tasks::{self, TaskView};

fn handle_public_groups(state: &mut AppState, _req: &Request) -> HandlerResult {
    let conn = db_conn(state)?;
    let items = groups::active_groups(conn)?;
    Ok(json!({ "items": items }))
}

fn handle_public_grades(state: &mut AppState, _req: &Request) -> HandlerResult {
    let conn = db_conn(state)?;
    let items = groups::distinct_grades(conn)?;
    Ok(json!({ "items": items }))
}

fn handle_public_grade_groups(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state)?;
    let grade = required_i64(&req.params, "grade")?;
    let items = groups::groups_for_grade(conn, grade)?;
    Ok(json!({ "items": items }))
}

fn handle_public_calendar_group(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state)?;
    let group_id = required_str(&req.params, "groupId")?;
    let (year, month) = year_month(&req.params)?;
    let group = groups::require_active_group(conn, &group_id)?;
    let calendar = tasks::month_calendar(conn, &[group.id.clone()], year, month, state.today())?;
    Ok(json!({ "group": group, "calendar": calendar }))
}

fn handle_public_calendar_grade(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state)?;
    let grade = required_i64(&req.params, "grade")?;
    let (year, month) = year_month(&req.params)?;
    let group_ids: Vec<String> = groups::groups_for_grade(conn, grade)?
        .into_iter()
        .map(|g| g.id)
        .collect();
    let calendar = tasks::month_calendar(conn, &group_ids, year, month, state.today())?;
    Ok(json!({
        "grade": grade,
        "groupIds": group_ids,
        "calendar": calendar,
    }))
}

fn handle_public_task(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state)?;
    let task = tasks::get_public_task(conn, &required_str(&req.params, "taskId")?)?;
    to_json(&TaskView::new(task, state.today()))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "public.groups" => handle_public_groups(state, req),
        "public.grades" => handle_public_grades(state, req),
        "public.gradeGroups" => handle_public_grade_groups(state, req),
        "public.calendar.group" => handle_public_calendar_group(state, req),
        "public.calendar.grade" => handle_public_calendar_grade(state, req),
        "public.task" => handle_public_task(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}
