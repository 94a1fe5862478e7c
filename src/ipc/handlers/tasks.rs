use serde_json::json;

use crate::assignments;
use crate::calendar::parse_due_date;
use crate::error::AppError;
use crate::ipc::helpers::{
    authenticate_as, db_conn, optional_enum, optional_str, required_str, respond, to_json,
    year_month, HandlerResult,
};
use crate::ipc::types::{AppState, Request};
use crate::model::Role;
use crate::tasks::{self, NewTask, TaskFilter, TaskPatch, TaskView};

/// The (group, subject) pairs the caller may post tasks for.
fn handle_tasks_groups(state: &mut AppState, req: &Request) -> HandlerResult {
    let me = authenticate_as(state, req, Role::Teacher)?;
    let conn = db_conn(state)?;
    let pairs: Vec<serde_json::Value> = assignments::assignments_for_teacher(conn, &me.id, None)?
        .into_iter()
        .map(|a| {
            json!({
                "assignmentId": a.id,
                "academicYear": a.academic_year,
                "group": a.group,
                "subject": a.subject,
            })
        })
        .collect();
    Ok(json!({ "items": pairs }))
}

fn handle_tasks_group_subjects(state: &mut AppState, req: &Request) -> HandlerResult {
    let me = authenticate_as(state, req, Role::Teacher)?;
    let conn = db_conn(state)?;
    let group_id = required_str(&req.params, "groupId")?;
    let subjects: Vec<_> = assignments::assignments_for_teacher(conn, &me.id, None)?
        .into_iter()
        .filter(|a| a.group_id == group_id)
        .map(|a| a.subject)
        .collect();
    Ok(json!({ "items": subjects }))
}

fn handle_tasks_create(state: &mut AppState, req: &Request) -> HandlerResult {
    let me = authenticate_as(state, req, Role::Teacher)?;
    let conn = db_conn(state)?;
    let p = &req.params;
    let input = NewTask {
        title: required_str(p, "title")?,
        description: required_str(p, "description")?,
        due_date: parse_due_date(&required_str(p, "dueDate")?)?,
        priority: optional_enum(p, "priority")?,
        subject_id: required_str(p, "subjectId")?,
        group_id: required_str(p, "groupId")?,
    };
    let task = tasks::create_task(conn, &me.id, &input)?;
    to_json(&TaskView::new(task, state.today()))
}

fn handle_tasks_list(state: &mut AppState, req: &Request) -> HandlerResult {
    let me = authenticate_as(state, req, Role::Teacher)?;
    let conn = db_conn(state)?;
    let p = &req.params;
    let filter = TaskFilter {
        status: optional_enum(p, "status")?,
        group_id: optional_str(p, "groupId")?,
        subject_id: optional_str(p, "subjectId")?,
    };
    let items = tasks::list_teacher_tasks(conn, &me.id, &filter, state.today())?;
    Ok(json!({ "items": items }))
}

fn handle_tasks_calendar(state: &mut AppState, req: &Request) -> HandlerResult {
    let me = authenticate_as(state, req, Role::Teacher)?;
    let conn = db_conn(state)?;
    let group_id = required_str(&req.params, "groupId")?;
    let (year, month) = year_month(&req.params)?;
    if !assignments::teaches_group(conn, &me.id, &group_id)? {
        return Err(AppError::permission("you are not assigned to this group").into());
    }
    to_json(&tasks::month_calendar(
        conn,
        &[group_id],
        year,
        month,
        state.today(),
    )?)
}

fn handle_tasks_update(state: &mut AppState, req: &Request) -> HandlerResult {
    let me = authenticate_as(state, req, Role::Teacher)?;
    let conn = db_conn(state)?;
    let p = &req.params;
    let task_id = required_str(p, "taskId")?;
    let patch = TaskPatch {
        title: optional_str(p, "title")?,
        description: optional_str(p, "description")?,
        due_date: optional_str(p, "dueDate")?
            .map(|raw| parse_due_date(&raw))
            .transpose()?,
        priority: optional_enum(p, "priority")?,
        status: optional_enum(p, "status")?,
    };
    let task = tasks::update_task(conn, &me.id, &task_id, &patch)?;
    to_json(&TaskView::new(task, state.today()))
}

fn handle_tasks_delete(state: &mut AppState, req: &Request) -> HandlerResult {
    let me = authenticate_as(state, req, Role::Teacher)?;
    let conn = db_conn(state)?;
    let task_id = required_str(&req.params, "taskId")?;
    tasks::delete_task(conn, &me.id, &task_id)?;
    Ok(json!({ "taskId": task_id, "deleted": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "tasks.groups" => handle_tasks_groups(state, req),
        "tasks.groupSubjects" => handle_tasks_group_subjects(state, req),
        "tasks.create" => handle_tasks_create(state, req),
        "tasks.list" => handle_tasks_list(state, req),
        "tasks.calendar" => handle_tasks_calendar(state, req),
        "tasks.update" => handle_tasks_update(state, req),
        "tasks.delete" => handle_tasks_delete(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}
