//! Teacher → subject → group bindings.
//!
//! A group has at most one active teacher per subject. The rule lives in the
//! partial unique index `ux_assignments_active_group_subject`; inserts are
//! attempted directly and a violation surfaces as `AppError::Conflict`, so two
//! concurrent creates for the same pair cannot both succeed.

use crate::error::{is_unique_violation, AppError, AppResult};
use crate::groups;
use crate::model::{
    like_pattern, now_stamp, Assignment, Group, GroupRef, Page, PageRequest, RecordStatus,
    SubjectRef, TeacherRef,
};
use crate::subjects;
use crate::users;
use rusqlite::{params, params_from_iter, types::Value, Connection, OptionalExtension, Row};
use uuid::Uuid;

pub const ASSIGNMENT_TAKEN: &str =
    "this group already has a teacher for this subject; a group can only have one teacher per subject";

const ASSIGNMENT_SELECT: &str = "SELECT
       a.id, a.user_id, a.subject_id, a.group_id, a.academic_year, a.record_status, a.created_at,
       u.first_name, u.last_name, u.email,
       s.name, s.code,
       g.name, g.grade, g.section
     FROM subject_assignments a
     JOIN users u ON u.id = a.user_id
     JOIN subjects s ON s.id = a.subject_id
     JOIN class_groups g ON g.id = a.group_id";

fn assignment_from_row(row: &Row<'_>) -> rusqlite::Result<Assignment> {
    let teacher_id: String = row.get(1)?;
    let subject_id: String = row.get(2)?;
    let group_id: String = row.get(3)?;
    Ok(Assignment {
        id: row.get(0)?,
        academic_year: row.get(4)?,
        status: row.get(5)?,
        created_at: row.get(6)?,
        teacher: TeacherRef {
            id: teacher_id.clone(),
            first_name: row.get(7)?,
            last_name: row.get(8)?,
            email: Some(row.get(9)?),
        },
        subject: SubjectRef {
            id: subject_id.clone(),
            name: row.get(10)?,
            code: row.get(11)?,
        },
        group: GroupRef {
            id: group_id.clone(),
            name: row.get(12)?,
            grade: row.get(13)?,
            section: row.get(14)?,
        },
        teacher_id,
        subject_id,
        group_id,
    })
}

#[derive(Debug, Clone)]
pub struct NewAssignment {
    pub teacher_id: String,
    pub subject_id: String,
    pub group_id: String,
    pub academic_year: String,
}

#[derive(Debug, Clone, Default)]
pub struct AssignmentFilter {
    pub teacher_id: Option<String>,
    pub subject_id: Option<String>,
    pub group_id: Option<String>,
    pub academic_year: Option<String>,
    pub search: Option<String>,
}

pub fn create_assignment(conn: &Connection, input: &NewAssignment) -> AppResult<Assignment> {
    let academic_year = input.academic_year.trim();
    if input.teacher_id.trim().is_empty()
        || input.subject_id.trim().is_empty()
        || input.group_id.trim().is_empty()
        || academic_year.is_empty()
    {
        return Err(AppError::validation(
            "userId, subjectId, groupId and academicYear are required",
        ));
    }

    users::require_active_teacher(conn, &input.teacher_id)?;
    subjects::require_active_subject(conn, &input.subject_id)?;
    groups::require_active_group(conn, &input.group_id)?;

    let id = Uuid::new_v4().to_string();
    let now = now_stamp();
    let inserted = conn.execute(
        "INSERT INTO subject_assignments(id, user_id, subject_id, group_id, academic_year, record_status, created_at, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
        params![
            id,
            input.teacher_id,
            input.subject_id,
            input.group_id,
            academic_year,
            RecordStatus::Active,
            now,
            now
        ],
    );
    if let Err(e) = inserted {
        if is_unique_violation(&e, Some("subject_assignments.group_id")) {
            tracing::warn!(
                group_id = %input.group_id,
                subject_id = %input.subject_id,
                teacher_id = %input.teacher_id,
                "assignment rejected: group already has a teacher for subject"
            );
            return Err(AppError::conflict(ASSIGNMENT_TAKEN));
        }
        return Err(e.into());
    }

    tracing::info!(
        assignment_id = %id,
        group_id = %input.group_id,
        subject_id = %input.subject_id,
        "assignment created"
    );
    get_assignment(conn, &id)
}

pub fn get_assignment(conn: &Connection, id: &str) -> AppResult<Assignment> {
    let sql = format!("{} WHERE a.id = ?", ASSIGNMENT_SELECT);
    conn.query_row(&sql, [id], assignment_from_row)
        .optional()?
        .ok_or_else(|| AppError::not_found("assignment not found"))
}

/// Active assignments, newest first. `search` matches the teacher's name, the
/// subject name, or the group's name, grade or section.
pub fn list_assignments(
    conn: &Connection,
    filter: &AssignmentFilter,
    page: PageRequest,
) -> AppResult<Page<Assignment>> {
    let mut clauses = vec!["a.record_status = ?".to_string()];
    let mut args: Vec<Value> = vec![Value::Text(RecordStatus::Active.as_str().to_string())];

    let exact = [
        ("a.user_id", &filter.teacher_id),
        ("a.subject_id", &filter.subject_id),
        ("a.group_id", &filter.group_id),
        ("a.academic_year", &filter.academic_year),
    ];
    for (col, value) in exact {
        if let Some(v) = value.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            clauses.push(format!("{} = ?", col));
            args.push(Value::Text(v.to_string()));
        }
    }
    if let Some(term) = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        let cols = [
            "u.first_name",
            "u.last_name",
            "s.name",
            "g.name",
            "g.grade",
            "g.section",
        ];
        let ors: Vec<String> = cols
            .iter()
            .map(|c| format!("{} LIKE ? ESCAPE '\\'", c))
            .collect();
        clauses.push(format!("({})", ors.join(" OR ")));
        args.extend(std::iter::repeat(Value::Text(like_pattern(term))).take(cols.len()));
    }
    let where_sql = clauses.join(" AND ");

    let total: i64 = conn.query_row(
        &format!(
            "SELECT COUNT(*) FROM ({} WHERE {})",
            ASSIGNMENT_SELECT, where_sql
        ),
        params_from_iter(args.iter()),
        |r| r.get(0),
    )?;

    let sql = format!(
        "{} WHERE {} ORDER BY a.created_at DESC, a.rowid DESC LIMIT ? OFFSET ?",
        ASSIGNMENT_SELECT, where_sql
    );
    args.push(Value::Integer(i64::from(page.limit)));
    args.push(Value::Integer(page.offset()));
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(args.iter()), assignment_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(page.finish(rows, total))
}

pub fn assignments_for_teacher(
    conn: &Connection,
    teacher_id: &str,
    academic_year: Option<&str>,
) -> AppResult<Vec<Assignment>> {
    let mut sql = format!(
        "{} WHERE a.user_id = ? AND a.record_status = ?",
        ASSIGNMENT_SELECT
    );
    let mut args: Vec<Value> = vec![
        Value::Text(teacher_id.to_string()),
        Value::Text(RecordStatus::Active.as_str().to_string()),
    ];
    if let Some(year) = academic_year.map(str::trim).filter(|s| !s.is_empty()) {
        sql.push_str(" AND a.academic_year = ?");
        args.push(Value::Text(year.to_string()));
    }
    sql.push_str(" ORDER BY a.created_at DESC, a.rowid DESC");

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(args.iter()), assignment_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Active groups with no active assignment for `subject_id`.
///
/// `academic_year` narrows the set of assignments considered taken, not the groups.
pub fn available_groups(
    conn: &Connection,
    subject_id: &str,
    academic_year: Option<&str>,
) -> AppResult<Vec<Group>> {
    if subject_id.trim().is_empty() {
        return Err(AppError::validation("subjectId is required"));
    }

    let mut sql =
        "SELECT group_id FROM subject_assignments WHERE subject_id = ? AND record_status = ?"
            .to_string();
    let mut args: Vec<Value> = vec![
        Value::Text(subject_id.to_string()),
        Value::Text(RecordStatus::Active.as_str().to_string()),
    ];
    if let Some(year) = academic_year.map(str::trim).filter(|s| !s.is_empty()) {
        sql.push_str(" AND academic_year = ?");
        args.push(Value::Text(year.to_string()));
    }
    let mut stmt = conn.prepare(&sql)?;
    let taken = stmt
        .query_map(params_from_iter(args.iter()), |r| r.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;

    groups::active_groups_excluding(conn, &taken)
}

/// Soft delete. Repeating it on an inactive row is a no-op.
pub fn deactivate_assignment(conn: &Connection, id: &str) -> AppResult<()> {
    let exists: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM subject_assignments WHERE id = ?",
            [id],
            |r| r.get(0),
        )
        .optional()?;
    if exists.is_none() {
        return Err(AppError::not_found("assignment not found"));
    }
    conn.execute(
        "UPDATE subject_assignments SET record_status = ?, updated_at = ? WHERE id = ?",
        params![RecordStatus::Inactive, now_stamp(), id],
    )?;
    tracing::info!(assignment_id = %id, "assignment deactivated");
    Ok(())
}

pub fn has_active_assignment(
    conn: &Connection,
    teacher_id: &str,
    subject_id: &str,
    group_id: &str,
) -> AppResult<bool> {
    let hit: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM subject_assignments
             WHERE user_id = ? AND subject_id = ? AND group_id = ? AND record_status = ?
             LIMIT 1",
            params![teacher_id, subject_id, group_id, RecordStatus::Active],
            |r| r.get(0),
        )
        .optional()?;
    Ok(hit.is_some())
}

/// True when the teacher has any active assignment in the group.
pub fn teaches_group(conn: &Connection, teacher_id: &str, group_id: &str) -> AppResult<bool> {
    let hit: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM subject_assignments
             WHERE user_id = ? AND group_id = ? AND record_status = ?
             LIMIT 1",
            params![teacher_id, group_id, RecordStatus::Active],
            |r| r.get(0),
        )
        .optional()?;
    Ok(hit.is_some())
}
