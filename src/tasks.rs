use crate::assignments;
use crate::calendar::{effective_status, month_range, project_month, urgency_bucket, DayCell, Urgency};
use crate::error::{AppError, AppResult};
use crate::model::{
    now_stamp, GroupRef, Priority, RecordStatus, SubjectRef, Task, TaskStatus, TeacherRef,
};
use chrono::NaiveDate;
use rusqlite::{params, params_from_iter, types::Value, Connection, OptionalExtension, Row};
use serde::Serialize;
use uuid::Uuid;

pub const MAX_TITLE_LEN: usize = 200;
const NOT_FOUND_OR_FORBIDDEN: &str = "task not found or no permission";

const TASK_SELECT: &str = "SELECT
       t.id, t.title, t.description, t.due_date, t.status, t.priority,
       t.user_id, t.subject_id, t.group_id, t.created_at, t.updated_at,
       u.first_name, u.last_name,
       s.name, s.code,
       g.name, g.grade, g.section
     FROM tasks t
     JOIN users u ON u.id = t.user_id
     JOIN subjects s ON s.id = t.subject_id
     JOIN class_groups g ON g.id = t.group_id";

fn task_from_row(row: &Row<'_>) -> rusqlite::Result<Task> {
    let teacher_id: String = row.get(6)?;
    let subject_id: String = row.get(7)?;
    let group_id: String = row.get(8)?;
    Ok(Task {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        due_date: row.get(3)?,
        status: row.get(4)?,
        priority: row.get(5)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
        teacher: TeacherRef {
            id: teacher_id.clone(),
            first_name: row.get(11)?,
            last_name: row.get(12)?,
            email: None,
        },
        subject: SubjectRef {
            id: subject_id.clone(),
            name: row.get(13)?,
            code: row.get(14)?,
        },
        group: GroupRef {
            id: group_id.clone(),
            name: row.get(15)?,
            grade: row.get(16)?,
            section: row.get(17)?,
        },
        teacher_id,
        subject_id,
        group_id,
    })
}

/// A task as handed to readers: stored fields plus what "today" makes of them.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskView {
    #[serde(flatten)]
    pub task: Task,
    pub effective_status: TaskStatus,
    pub urgency: Urgency,
}

impl TaskView {
    pub fn new(task: Task, today: NaiveDate) -> Self {
        Self {
            effective_status: effective_status(task.status, task.due_date, today),
            urgency: urgency_bucket(task.due_date, today),
            task,
        }
    }
}

pub fn views(tasks: Vec<Task>, today: NaiveDate) -> Vec<TaskView> {
    tasks.into_iter().map(|t| TaskView::new(t, today)).collect()
}

#[derive(Debug, Clone)]
pub struct NewTask {
    pub title: String,
    pub description: String,
    pub due_date: NaiveDate,
    pub priority: Option<Priority>,
    pub subject_id: String,
    pub group_id: String,
}

#[derive(Debug, Clone, Default)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub due_date: Option<NaiveDate>,
    pub priority: Option<Priority>,
    pub status: Option<TaskStatus>,
}

#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    /// Compared against the effective status.
    pub status: Option<TaskStatus>,
    pub group_id: Option<String>,
    pub subject_id: Option<String>,
}

fn clean_title(raw: &str) -> AppResult<String> {
    let title = raw.trim();
    if title.is_empty() {
        return Err(AppError::validation("title must not be empty"));
    }
    if title.chars().count() > MAX_TITLE_LEN {
        return Err(AppError::validation(format!(
            "title must be at most {} characters",
            MAX_TITLE_LEN
        )));
    }
    Ok(title.to_string())
}

fn clean_description(raw: &str) -> AppResult<String> {
    let d = raw.trim();
    if d.is_empty() {
        return Err(AppError::validation("description must not be empty"));
    }
    Ok(d.to_string())
}

/// Creates a task for a (subject, group) the teacher is actively assigned to.
///
/// There is no per-day limit on tasks.
pub fn create_task(conn: &Connection, teacher_id: &str, input: &NewTask) -> AppResult<Task> {
    let title = clean_title(&input.title)?;
    let description = clean_description(&input.description)?;

    if !assignments::has_active_assignment(conn, teacher_id, &input.subject_id, &input.group_id)? {
        tracing::warn!(
            teacher_id = %teacher_id,
            group_id = %input.group_id,
            subject_id = %input.subject_id,
            "task rejected: no active assignment"
        );
        return Err(AppError::permission(
            "you do not have permission to create tasks for this group and subject",
        ));
    }

    let id = Uuid::new_v4().to_string();
    let now = now_stamp();
    conn.execute(
        "INSERT INTO tasks(id, title, description, due_date, status, priority, user_id, subject_id, group_id, record_status, created_at, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        params![
            id,
            title,
            description,
            input.due_date,
            TaskStatus::Pending,
            input.priority.unwrap_or(Priority::Medium),
            teacher_id,
            input.subject_id,
            input.group_id,
            RecordStatus::Active,
            now,
            now
        ],
    )?;
    tracing::info!(task_id = %id, due_date = %input.due_date, group_id = %input.group_id, "task created");
    get_active_task(conn, &id)
}

pub fn get_active_task(conn: &Connection, id: &str) -> AppResult<Task> {
    let sql = format!("{} WHERE t.id = ? AND t.record_status = ?", TASK_SELECT);
    conn.query_row(&sql, params![id, RecordStatus::Active], task_from_row)
        .optional()?
        .ok_or_else(|| AppError::not_found("task not found"))
}

/// Active task whose group is still active; the public views hide tasks of retired groups.
pub fn get_public_task(conn: &Connection, id: &str) -> AppResult<Task> {
    let sql = format!(
        "{} WHERE t.id = ? AND t.record_status = ? AND g.record_status = ?",
        TASK_SELECT
    );
    conn.query_row(
        &sql,
        params![id, RecordStatus::Active, RecordStatus::Active],
        task_from_row,
    )
    .optional()?
    .ok_or_else(|| AppError::not_found("task not found"))
}

fn owned_task_exists(conn: &Connection, teacher_id: &str, task_id: &str) -> AppResult<bool> {
    let hit: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM tasks WHERE id = ? AND user_id = ? AND record_status = ?",
            params![task_id, teacher_id, RecordStatus::Active],
            |r| r.get(0),
        )
        .optional()?;
    Ok(hit.is_some())
}

pub fn update_task(conn: &Connection, teacher_id: &str, task_id: &str, patch: &TaskPatch) -> AppResult<Task> {
    if !owned_task_exists(conn, teacher_id, task_id)? {
        return Err(AppError::not_found(NOT_FOUND_OR_FORBIDDEN));
    }

    let mut sets: Vec<&str> = Vec::new();
    let mut args: Vec<Value> = Vec::new();
    if let Some(v) = patch.title.as_deref() {
        sets.push("title = ?");
        args.push(Value::Text(clean_title(v)?));
    }
    if let Some(v) = patch.description.as_deref() {
        sets.push("description = ?");
        args.push(Value::Text(clean_description(v)?));
    }
    if let Some(d) = patch.due_date {
        sets.push("due_date = ?");
        args.push(Value::Text(d.format("%Y-%m-%d").to_string()));
    }
    if let Some(p) = patch.priority {
        sets.push("priority = ?");
        args.push(Value::Text(p.as_str().to_string()));
    }
    if let Some(s) = patch.status {
        sets.push("status = ?");
        args.push(Value::Text(s.as_str().to_string()));
    }

    if !sets.is_empty() {
        sets.push("updated_at = ?");
        args.push(Value::Text(now_stamp()));
        args.push(Value::Text(task_id.to_string()));
        let sql = format!("UPDATE tasks SET {} WHERE id = ?", sets.join(", "));
        conn.execute(&sql, params_from_iter(args.iter()))?;
        tracing::info!(task_id = %task_id, "task updated");
    }
    get_active_task(conn, task_id)
}

/// Soft delete; only the owner may do it.
pub fn delete_task(conn: &Connection, teacher_id: &str, task_id: &str) -> AppResult<()> {
    if !owned_task_exists(conn, teacher_id, task_id)? {
        return Err(AppError::not_found(NOT_FOUND_OR_FORBIDDEN));
    }
    conn.execute(
        "UPDATE tasks SET record_status = ?, updated_at = ? WHERE id = ?",
        params![RecordStatus::Inactive, now_stamp(), task_id],
    )?;
    tracing::info!(task_id = %task_id, "task deleted");
    Ok(())
}

/// The teacher's active tasks, earliest due date first.
pub fn list_teacher_tasks(
    conn: &Connection,
    teacher_id: &str,
    filter: &TaskFilter,
    today: NaiveDate,
) -> AppResult<Vec<TaskView>> {
    let mut sql = format!("{} WHERE t.user_id = ? AND t.record_status = ?", TASK_SELECT);
    let mut args: Vec<Value> = vec![
        Value::Text(teacher_id.to_string()),
        Value::Text(RecordStatus::Active.as_str().to_string()),
    ];
    if let Some(g) = filter.group_id.as_deref().filter(|s| !s.is_empty()) {
        sql.push_str(" AND t.group_id = ?");
        args.push(Value::Text(g.to_string()));
    }
    if let Some(s) = filter.subject_id.as_deref().filter(|s| !s.is_empty()) {
        sql.push_str(" AND t.subject_id = ?");
        args.push(Value::Text(s.to_string()));
    }
    sql.push_str(" ORDER BY t.due_date, t.created_at");

    let mut stmt = conn.prepare(&sql)?;
    let tasks = stmt
        .query_map(params_from_iter(args.iter()), task_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(views(tasks, today)
        .into_iter()
        .filter(|v| filter.status.map_or(true, |s| v.effective_status == s))
        .collect())
}

/// Active tasks of the given groups due within `[from, to]`, any teacher.
pub fn tasks_for_groups_between(
    conn: &Connection,
    group_ids: &[String],
    from: NaiveDate,
    to: NaiveDate,
) -> AppResult<Vec<Task>> {
    if group_ids.is_empty() {
        return Ok(Vec::new());
    }
    let marks = vec!["?"; group_ids.len()].join(", ");
    let sql = format!(
        "{} WHERE t.group_id IN ({}) AND t.record_status = ? AND t.due_date BETWEEN ? AND ?
         ORDER BY t.due_date, t.created_at",
        TASK_SELECT, marks
    );
    let mut args: Vec<Value> = group_ids.iter().cloned().map(Value::Text).collect();
    args.push(Value::Text(RecordStatus::Active.as_str().to_string()));
    args.push(Value::Text(from.format("%Y-%m-%d").to_string()));
    args.push(Value::Text(to.format("%Y-%m-%d").to_string()));

    let mut stmt = conn.prepare(&sql)?;
    let tasks = stmt
        .query_map(params_from_iter(args.iter()), task_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(tasks)
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthCalendar {
    pub year: i32,
    pub month: u32,
    pub tasks: Vec<TaskView>,
    pub days: Vec<DayCell>,
}

/// Tasks of the groups due in the month, plus one colored cell per day.
pub fn month_calendar(
    conn: &Connection,
    group_ids: &[String],
    year: i32,
    month: u32,
    today: NaiveDate,
) -> AppResult<MonthCalendar> {
    let (first, last) = month_range(year, month)?;
    let tasks = tasks_for_groups_between(conn, group_ids, first, last)?;
    let days = project_month(year, month, tasks.iter().map(|t| t.due_date), today)?;
    Ok(MonthCalendar {
        year,
        month,
        tasks: views(tasks, today),
        days,
    })
}

/// Most recently created active tasks across the school.
pub fn recent_tasks(conn: &Connection, limit: u32) -> AppResult<Vec<Task>> {
    let sql = format!(
        "{} WHERE t.record_status = ? ORDER BY t.created_at DESC, t.rowid DESC LIMIT ?",
        TASK_SELECT
    );
    let mut stmt = conn.prepare(&sql)?;
    let tasks = stmt
        .query_map(params![RecordStatus::Active, limit], task_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(tasks)
}
