use crate::error::{is_unique_violation, AppError, AppResult};
use crate::model::{like_pattern, now_stamp, Group, Page, PageRequest, RecordStatus};
use rusqlite::{params, params_from_iter, types::Value, Connection, OptionalExtension, Row};
use uuid::Uuid;

const GROUP_COLS: &str =
    "id, name, grade, section, academic_year, student_count, record_status, created_at, updated_at";

// Grades are free text ("10", "10°"); numeric ones sort numerically first.
const GRADE_ORDER: &str = "CAST(grade AS INTEGER), grade, section";

fn group_from_row(row: &Row<'_>) -> rusqlite::Result<Group> {
    Ok(Group {
        id: row.get(0)?,
        name: row.get(1)?,
        grade: row.get(2)?,
        section: row.get(3)?,
        academic_year: row.get(4)?,
        student_count: row.get(5)?,
        status: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

#[derive(Debug, Clone)]
pub struct GroupInput {
    pub name: String,
    pub grade: String,
    pub section: String,
    pub academic_year: String,
    pub student_count: Option<i64>,
}

struct CleanGroup {
    name: String,
    grade: String,
    section: String,
    academic_year: String,
}

fn clean(input: &GroupInput) -> AppResult<CleanGroup> {
    let name = input.name.trim();
    let grade = input.grade.trim();
    let section = input.section.trim();
    let academic_year = input.academic_year.trim();
    if name.is_empty() || grade.is_empty() || section.is_empty() || academic_year.is_empty() {
        return Err(AppError::validation(
            "name, grade, section and academicYear are required",
        ));
    }
    if let Some(n) = input.student_count {
        if n < 0 {
            return Err(AppError::validation("studentCount must not be negative"));
        }
    }
    Ok(CleanGroup {
        name: name.to_string(),
        grade: grade.to_string(),
        section: section.to_string(),
        academic_year: academic_year.to_string(),
    })
}

fn map_identity_conflict(e: rusqlite::Error) -> AppError {
    if is_unique_violation(&e, Some("class_groups.name")) {
        AppError::conflict(
            "a group with this name, grade and section already exists for the academic year",
        )
    } else {
        e.into()
    }
}

/// Leading digits of a grade label: `"10°"` and `"10"` both give 10.
pub fn parse_grade_number(grade: &str) -> Option<i64> {
    let digits: String = grade
        .trim()
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

pub fn create_group(conn: &Connection, input: &GroupInput) -> AppResult<Group> {
    let g = clean(input)?;
    let id = Uuid::new_v4().to_string();
    let now = now_stamp();
    conn.execute(
        "INSERT INTO class_groups(id, name, grade, section, academic_year, student_count, record_status, created_at, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?)",
        params![
            id,
            g.name,
            g.grade,
            g.section,
            g.academic_year,
            input.student_count.unwrap_or(0),
            RecordStatus::Active,
            now,
            now
        ],
    )
    .map_err(map_identity_conflict)?;
    tracing::info!(group_id = %id, grade = %g.grade, section = %g.section, "group created");
    get_group(conn, &id)
}

pub fn find_group(conn: &Connection, id: &str) -> AppResult<Option<Group>> {
    let sql = format!("SELECT {} FROM class_groups WHERE id = ?", GROUP_COLS);
    Ok(conn.query_row(&sql, [id], group_from_row).optional()?)
}

/// Looks a group up regardless of status.
pub fn get_group(conn: &Connection, id: &str) -> AppResult<Group> {
    find_group(conn, id)?.ok_or_else(|| AppError::not_found("group not found"))
}

pub fn require_active_group(conn: &Connection, id: &str) -> AppResult<Group> {
    match find_group(conn, id)? {
        Some(g) if g.status == RecordStatus::Active => Ok(g),
        _ => Err(AppError::not_found("group not found or inactive")),
    }
}

pub fn list_groups(conn: &Connection, search: Option<&str>, page: PageRequest) -> AppResult<Page<Group>> {
    let mut where_sql = "record_status = ?".to_string();
    let mut args: Vec<Value> = vec![Value::Text(RecordStatus::Active.as_str().to_string())];
    if let Some(term) = search.map(str::trim).filter(|s| !s.is_empty()) {
        where_sql.push_str(
            " AND (name LIKE ? ESCAPE '\\' OR grade LIKE ? ESCAPE '\\' OR section LIKE ? ESCAPE '\\' OR academic_year LIKE ? ESCAPE '\\')",
        );
        args.extend(std::iter::repeat(Value::Text(like_pattern(term))).take(4));
    }

    let total: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM class_groups WHERE {}", where_sql),
        params_from_iter(args.iter()),
        |r| r.get(0),
    )?;

    let sql = format!(
        "SELECT {} FROM class_groups WHERE {} ORDER BY created_at DESC, rowid DESC LIMIT ? OFFSET ?",
        GROUP_COLS, where_sql
    );
    args.push(Value::Integer(i64::from(page.limit)));
    args.push(Value::Integer(page.offset()));
    let mut stmt = conn.prepare(&sql)?;
    let groups = stmt
        .query_map(params_from_iter(args.iter()), group_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(page.finish(groups, total))
}

/// Every active group, ordered by grade then section.
pub fn active_groups(conn: &Connection) -> AppResult<Vec<Group>> {
    let sql = format!(
        "SELECT {} FROM class_groups WHERE record_status = ? ORDER BY {}",
        GROUP_COLS, GRADE_ORDER
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([RecordStatus::Active], group_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Active groups whose id is not in `excluded`, ordered by grade then section.
pub fn active_groups_excluding(conn: &Connection, excluded: &[String]) -> AppResult<Vec<Group>> {
    let mut sql = format!(
        "SELECT {} FROM class_groups WHERE record_status = ?",
        GROUP_COLS
    );
    let mut args: Vec<Value> = vec![Value::Text(RecordStatus::Active.as_str().to_string())];
    if !excluded.is_empty() {
        let marks = vec!["?"; excluded.len()].join(", ");
        sql.push_str(&format!(" AND id NOT IN ({})", marks));
        args.extend(excluded.iter().cloned().map(Value::Text));
    }
    sql.push_str(&format!(" ORDER BY {}", GRADE_ORDER));

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(args.iter()), group_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Distinct numeric grades among active groups, ascending.
pub fn distinct_grades(conn: &Connection) -> AppResult<Vec<i64>> {
    let mut grades: Vec<i64> = active_groups(conn)?
        .iter()
        .filter_map(|g| parse_grade_number(&g.grade))
        .collect();
    grades.sort_unstable();
    grades.dedup();
    Ok(grades)
}

pub fn groups_for_grade(conn: &Connection, grade: i64) -> AppResult<Vec<Group>> {
    let mut groups: Vec<Group> = active_groups(conn)?
        .into_iter()
        .filter(|g| parse_grade_number(&g.grade) == Some(grade))
        .collect();
    groups.sort_by(|a, b| a.section.cmp(&b.section));
    Ok(groups)
}

pub fn update_group(conn: &Connection, id: &str, input: &GroupInput) -> AppResult<Group> {
    let current = require_active_group(conn, id)?;
    let g = clean(input)?;
    conn.execute(
        "UPDATE class_groups
         SET name = ?, grade = ?, section = ?, academic_year = ?, student_count = ?, updated_at = ?
         WHERE id = ?",
        params![
            g.name,
            g.grade,
            g.section,
            g.academic_year,
            input.student_count.unwrap_or(current.student_count),
            now_stamp(),
            id
        ],
    )
    .map_err(map_identity_conflict)?;
    get_group(conn, id)
}

pub fn deactivate_group(conn: &Connection, id: &str) -> AppResult<()> {
    require_active_group(conn, id)?;
    conn.execute(
        "UPDATE class_groups SET record_status = ?, updated_at = ? WHERE id = ?",
        params![RecordStatus::Inactive, now_stamp(), id],
    )?;
    tracing::info!(group_id = %id, "group deactivated");
    Ok(())
}

#[cfg(test)]
pub fn sample(name: &str, grade: &str, section: &str) -> GroupInput {
    GroupInput {
        name: name.into(),
        grade: grade.into(),
        section: section.into(),
        academic_year: "2025".into(),
        student_count: None,
    }
}
