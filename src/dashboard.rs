use crate::assignments;
use crate::error::AppResult;
use crate::model::{Assignment, RecordStatus, Role, Task, TaskStatus};
use crate::tasks::{self, TaskFilter, TaskView};
use chrono::{Duration, NaiveDate};
use rusqlite::{params, Connection, Row};
use serde::Serialize;
use std::collections::HashSet;

pub const RECENT_TASKS: u32 = 10;
pub const TOP_TEACHERS: u32 = 5;
pub const UPCOMING_DAYS: i64 = 7;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusCount {
    pub status: TaskStatus,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchoolStatistics {
    pub total_teachers: i64,
    pub total_subjects: i64,
    pub total_groups: i64,
    pub total_tasks: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeacherTaskCount {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub task_count: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CoordinatorDashboard {
    pub statistics: SchoolStatistics,
    pub tasks_by_status: Vec<StatusCount>,
    pub recent_tasks: Vec<Task>,
    pub active_teachers: Vec<TeacherTaskCount>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeacherStats {
    pub total_subjects: usize,
    pub total_groups: usize,
    pub total_tasks: usize,
    pub pending_tasks: usize,
    pub completed_tasks: usize,
    pub overdue_tasks: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeacherDashboard {
    pub assignments: Vec<Assignment>,
    pub tasks: Vec<TaskView>,
    pub stats: TeacherStats,
    pub task_stats: Vec<StatusCount>,
    pub upcoming_tasks: Vec<TaskView>,
}

fn count_active(conn: &Connection, table: &str) -> AppResult<i64> {
    let sql = format!("SELECT COUNT(*) FROM {} WHERE record_status = ?", table);
    Ok(conn.query_row(&sql, [RecordStatus::Active], |r| r.get(0))?)
}

fn status_count_from_row(r: &Row<'_>) -> rusqlite::Result<StatusCount> {
    Ok(StatusCount {
        status: r.get(0)?,
        count: r.get(1)?,
    })
}

fn status_counts(conn: &Connection, teacher_id: Option<&str>) -> AppResult<Vec<StatusCount>> {
    let mut sql = "SELECT status, COUNT(*) FROM tasks WHERE record_status = ?".to_string();
    if teacher_id.is_some() {
        sql.push_str(" AND user_id = ?");
    }
    sql.push_str(" GROUP BY status ORDER BY status");
    let mut stmt = conn.prepare(&sql)?;
    let rows = match teacher_id {
        Some(id) => stmt
            .query_map(params![RecordStatus::Active, id], status_count_from_row)?
            .collect::<Result<Vec<_>, _>>()?,
        None => stmt
            .query_map(params![RecordStatus::Active], status_count_from_row)?
            .collect::<Result<Vec<_>, _>>()?,
    };
    Ok(rows)
}

pub fn coordinator_dashboard(conn: &Connection) -> AppResult<CoordinatorDashboard> {
    let total_teachers: i64 = conn.query_row(
        "SELECT COUNT(*) FROM users WHERE role = ? AND record_status = ?",
        params![Role::Teacher, RecordStatus::Active],
        |r| r.get(0),
    )?;
    let statistics = SchoolStatistics {
        total_teachers,
        total_subjects: count_active(conn, "subjects")?,
        total_groups: count_active(conn, "class_groups")?,
        total_tasks: count_active(conn, "tasks")?,
    };

    let mut stmt = conn.prepare(
        "SELECT
           u.id, u.first_name, u.last_name, u.email,
           (SELECT COUNT(*) FROM tasks t WHERE t.user_id = u.id AND t.record_status = 'active') AS task_count
         FROM users u
         WHERE u.role = ? AND u.record_status = ?
         ORDER BY task_count DESC, u.last_name, u.first_name
         LIMIT ?",
    )?;
    let active_teachers = stmt
        .query_map(
            params![Role::Teacher, RecordStatus::Active, TOP_TEACHERS],
            |r| {
                Ok(TeacherTaskCount {
                    id: r.get(0)?,
                    first_name: r.get(1)?,
                    last_name: r.get(2)?,
                    email: r.get(3)?,
                    task_count: r.get(4)?,
                })
            },
        )?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(CoordinatorDashboard {
        statistics,
        tasks_by_status: status_counts(conn, None)?,
        recent_tasks: tasks::recent_tasks(conn, RECENT_TASKS)?,
        active_teachers,
    })
}

pub fn teacher_dashboard(conn: &Connection, teacher_id: &str, today: NaiveDate) -> AppResult<TeacherDashboard> {
    let assignments = assignments::assignments_for_teacher(conn, teacher_id, None)?;
    let tasks = tasks::list_teacher_tasks(conn, teacher_id, &TaskFilter::default(), today)?;

    let groups: HashSet<&str> = assignments.iter().map(|a| a.group_id.as_str()).collect();
    let count = |s: TaskStatus| tasks.iter().filter(|t| t.effective_status == s).count();
    let stats = TeacherStats {
        total_subjects: assignments.len(),
        total_groups: groups.len(),
        total_tasks: tasks.len(),
        pending_tasks: count(TaskStatus::Pending),
        completed_tasks: count(TaskStatus::Completed),
        overdue_tasks: count(TaskStatus::Overdue),
    };

    let horizon = today + Duration::days(UPCOMING_DAYS);
    let upcoming_tasks = tasks
        .iter()
        .filter(|t| {
            t.task.due_date >= today
                && t.task.due_date <= horizon
                && matches!(t.task.status, TaskStatus::Pending | TaskStatus::InProgress)
        })
        .cloned()
        .collect();

    Ok(TeacherDashboard {
        task_stats: status_counts(conn, Some(teacher_id))?,
        assignments,
        tasks,
        stats,
        upcoming_tasks,
    })
}
