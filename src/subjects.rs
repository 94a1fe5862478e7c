use crate::error::{is_unique_violation, AppError, AppResult};
use crate::model::{like_pattern, now_stamp, Page, PageRequest, RecordStatus, Subject};
use rusqlite::{params, params_from_iter, types::Value, Connection, OptionalExtension, Row};
use uuid::Uuid;

const SUBJECT_COLS: &str = "id, name, code, description, record_status, created_at, updated_at";

fn subject_from_row(row: &Row<'_>) -> rusqlite::Result<Subject> {
    Ok(Subject {
        id: row.get(0)?,
        name: row.get(1)?,
        code: row.get(2)?,
        description: row.get(3)?,
        status: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

#[derive(Debug, Clone, Default)]
pub struct SubjectInput {
    pub name: Option<String>,
    pub code: Option<String>,
    pub description: Option<String>,
}

fn blank_to_none(v: Option<&str>) -> Option<String> {
    v.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
}

fn map_code_conflict(e: rusqlite::Error) -> AppError {
    if is_unique_violation(&e, Some("subjects.code")) {
        AppError::conflict("a subject with this code already exists")
    } else {
        e.into()
    }
}

pub fn create_subject(conn: &Connection, input: &SubjectInput) -> AppResult<Subject> {
    let name = blank_to_none(input.name.as_deref())
        .ok_or_else(|| AppError::validation("subject name is required"))?;
    let code = blank_to_none(input.code.as_deref());
    let description = blank_to_none(input.description.as_deref());

    let id = Uuid::new_v4().to_string();
    let now = now_stamp();
    conn.execute(
        "INSERT INTO subjects(id, name, code, description, record_status, created_at, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?)",
        params![id, name, code, description, RecordStatus::Active, now, now],
    )
    .map_err(map_code_conflict)?;

    tracing::info!(subject_id = %id, "subject created");
    get_subject(conn, &id)
}

pub fn find_subject(conn: &Connection, id: &str) -> AppResult<Option<Subject>> {
    let sql = format!("SELECT {} FROM subjects WHERE id = ?", SUBJECT_COLS);
    Ok(conn.query_row(&sql, [id], subject_from_row).optional()?)
}

pub fn get_subject(conn: &Connection, id: &str) -> AppResult<Subject> {
    find_subject(conn, id)?.ok_or_else(|| AppError::not_found("subject not found"))
}

pub fn require_active_subject(conn: &Connection, id: &str) -> AppResult<Subject> {
    match find_subject(conn, id)? {
        Some(s) if s.status == RecordStatus::Active => Ok(s),
        _ => Err(AppError::not_found("subject not found or inactive")),
    }
}

pub fn list_subjects(conn: &Connection, search: Option<&str>, page: PageRequest) -> AppResult<Page<Subject>> {
    let mut where_sql = "record_status = ?".to_string();
    let mut args: Vec<Value> = vec![Value::Text(RecordStatus::Active.as_str().to_string())];
    if let Some(term) = search.map(str::trim).filter(|s| !s.is_empty()) {
        where_sql.push_str(
            " AND (name LIKE ? ESCAPE '\\' OR code LIKE ? ESCAPE '\\' OR description LIKE ? ESCAPE '\\')",
        );
        let pat = like_pattern(term);
        args.extend(std::iter::repeat(Value::Text(pat)).take(3));
    }

    let total: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM subjects WHERE {}", where_sql),
        params_from_iter(args.iter()),
        |r| r.get(0),
    )?;

    let sql = format!(
        "SELECT {} FROM subjects WHERE {} ORDER BY name COLLATE NOCASE, rowid LIMIT ? OFFSET ?",
        SUBJECT_COLS, where_sql
    );
    args.push(Value::Integer(i64::from(page.limit)));
    args.push(Value::Integer(page.offset()));
    let mut stmt = conn.prepare(&sql)?;
    let subjects = stmt
        .query_map(params_from_iter(args.iter()), subject_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(page.finish(subjects, total))
}

/// Absent fields are left alone; a blank code or description clears it.
pub fn update_subject(conn: &Connection, id: &str, input: &SubjectInput) -> AppResult<Subject> {
    let current = require_active_subject(conn, id)?;

    let name = match input.name.as_deref() {
        Some(raw) => blank_to_none(Some(raw))
            .ok_or_else(|| AppError::validation("subject name must not be empty"))?,
        None => current.name,
    };
    let code = match input.code.as_deref() {
        Some(raw) => blank_to_none(Some(raw)),
        None => current.code,
    };
    let description = match input.description.as_deref() {
        Some(raw) => blank_to_none(Some(raw)),
        None => current.description,
    };

    conn.execute(
        "UPDATE subjects SET name = ?, code = ?, description = ?, updated_at = ? WHERE id = ?",
        params![name, code, description, now_stamp(), id],
    )
    .map_err(map_code_conflict)?;
    get_subject(conn, id)
}

pub fn deactivate_subject(conn: &Connection, id: &str) -> AppResult<()> {
    require_active_subject(conn, id)?;
    conn.execute(
        "UPDATE subjects SET record_status = ?, updated_at = ? WHERE id = ?",
        params![RecordStatus::Inactive, now_stamp(), id],
    )?;
    tracing::info!(subject_id = %id, "subject deactivated");
    Ok(())
}
