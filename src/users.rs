use crate::auth::{hash_password, MIN_PASSWORD_LEN};
use crate::error::{is_unique_violation, AppError, AppResult};
use crate::model::{like_pattern, now_stamp, Page, PageRequest, RecordStatus, Role, User};
use rusqlite::{params, params_from_iter, types::Value, Connection, OptionalExtension, Row};
use uuid::Uuid;

const USER_COLS: &str =
    "id, email, first_name, last_name, role, record_status, created_at, updated_at";

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        email: row.get(1)?,
        first_name: row.get(2)?,
        last_name: row.get(3)?,
        role: row.get(4)?,
        status: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
    pub role: Role,
}

#[derive(Debug, Clone, Default)]
pub struct UserPatch {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub role: Option<Role>,
    pub password: Option<String>,
    pub status: Option<RecordStatus>,
}

#[derive(Debug, Clone, Default)]
pub struct UserFilter {
    pub role: Option<Role>,
    pub search: Option<String>,
}

/// Trims and lowercases an email after a `local@domain.tld` shape check.
pub fn normalize_email(raw: &str) -> AppResult<String> {
    let email = raw.trim().to_ascii_lowercase();
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && !email.chars().any(char::is_whitespace)
                && domain
                    .rsplit_once('.')
                    .map(|(host, tld)| !host.is_empty() && !tld.is_empty())
                    .unwrap_or(false)
        }
        None => false,
    };
    if !valid {
        return Err(AppError::validation("invalid email format"));
    }
    Ok(email)
}

fn check_password(password: &str) -> AppResult<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::validation(format!(
            "password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    Ok(())
}

fn required_name(value: &str, field: &str) -> AppResult<String> {
    let v = value.trim();
    if v.is_empty() {
        return Err(AppError::validation(format!("{} must not be empty", field)));
    }
    Ok(v.to_string())
}

fn map_email_conflict(e: rusqlite::Error) -> AppError {
    if is_unique_violation(&e, Some("users.email")) {
        AppError::conflict("a user with this email already exists")
    } else {
        e.into()
    }
}

pub fn create_user(conn: &Connection, input: &NewUser) -> AppResult<User> {
    let first_name = required_name(&input.first_name, "firstName")?;
    let last_name = required_name(&input.last_name, "lastName")?;
    let email = normalize_email(&input.email)?;
    check_password(&input.password)?;
    let password_hash = hash_password(&input.password)?;

    let id = Uuid::new_v4().to_string();
    let now = now_stamp();
    conn.execute(
        "INSERT INTO users(id, email, password_hash, first_name, last_name, role, record_status, created_at, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?)",
        params![
            id,
            email,
            password_hash,
            first_name,
            last_name,
            input.role,
            RecordStatus::Active,
            now,
            now
        ],
    )
    .map_err(map_email_conflict)?;

    tracing::info!(user_id = %id, role = %input.role, "user created");
    get_user(conn, &id)
}

/// Looks a user up regardless of status.
pub fn get_user(conn: &Connection, id: &str) -> AppResult<User> {
    find_user(conn, id)?.ok_or_else(|| AppError::not_found("user not found"))
}

pub fn find_user(conn: &Connection, id: &str) -> AppResult<Option<User>> {
    let sql = format!("SELECT {} FROM users WHERE id = ?", USER_COLS);
    Ok(conn.query_row(&sql, [id], user_from_row).optional()?)
}

/// Active user plus stored password hash, for credential checks only.
pub fn find_active_credentials(conn: &Connection, email: &str) -> AppResult<Option<(User, String)>> {
    let email = email.trim().to_ascii_lowercase();
    let sql = format!(
        "SELECT {}, password_hash FROM users WHERE email = ? AND record_status = ?",
        USER_COLS
    );
    Ok(conn
        .query_row(&sql, params![email, RecordStatus::Active], |row| {
            Ok((user_from_row(row)?, row.get::<_, String>(8)?))
        })
        .optional()?)
}

/// Active teacher by id, or NotFound.
pub fn require_active_teacher(conn: &Connection, id: &str) -> AppResult<User> {
    match find_user(conn, id)? {
        Some(u) if u.is_active() && u.role == Role::Teacher => Ok(u),
        _ => Err(AppError::not_found("teacher not found or inactive")),
    }
}

pub fn list_users(conn: &Connection, filter: &UserFilter, page: PageRequest) -> AppResult<Page<User>> {
    let mut clauses = vec!["record_status = ?".to_string()];
    let mut args: Vec<Value> = vec![Value::Text(RecordStatus::Active.as_str().to_string())];

    if let Some(role) = filter.role {
        clauses.push("role = ?".into());
        args.push(Value::Text(role.as_str().to_string()));
    }
    if let Some(term) = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        clauses.push(
            "(first_name LIKE ? ESCAPE '\\' OR last_name LIKE ? ESCAPE '\\' OR email LIKE ? ESCAPE '\\')"
                .into(),
        );
        let pat = like_pattern(term);
        for _ in 0..3 {
            args.push(Value::Text(pat.clone()));
        }
    }
    let where_sql = clauses.join(" AND ");

    let total: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM users WHERE {}", where_sql),
        params_from_iter(args.iter()),
        |r| r.get(0),
    )?;

    let sql = format!(
        "SELECT {} FROM users WHERE {} ORDER BY created_at DESC, rowid DESC LIMIT ? OFFSET ?",
        USER_COLS, where_sql
    );
    args.push(Value::Integer(i64::from(page.limit)));
    args.push(Value::Integer(page.offset()));
    let mut stmt = conn.prepare(&sql)?;
    let users = stmt
        .query_map(params_from_iter(args.iter()), user_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(page.finish(users, total))
}

/// `acting_user_id` may not deactivate itself, same as `deactivate_user`.
pub fn update_user(conn: &Connection, id: &str, acting_user_id: &str, patch: &UserPatch) -> AppResult<User> {
    let current = get_user(conn, id)?;
    if patch.status == Some(RecordStatus::Inactive) && current.id == acting_user_id {
        return Err(AppError::validation("you cannot deactivate your own account"));
    }

    let mut sets: Vec<&str> = Vec::new();
    let mut args: Vec<Value> = Vec::new();

    if let Some(v) = patch.first_name.as_deref() {
        sets.push("first_name = ?");
        args.push(Value::Text(required_name(v, "firstName")?));
    }
    if let Some(v) = patch.last_name.as_deref() {
        sets.push("last_name = ?");
        args.push(Value::Text(required_name(v, "lastName")?));
    }
    if let Some(v) = patch.email.as_deref() {
        let email = normalize_email(v)?;
        if email != current.email {
            sets.push("email = ?");
            args.push(Value::Text(email));
        }
    }
    if let Some(role) = patch.role {
        sets.push("role = ?");
        args.push(Value::Text(role.as_str().to_string()));
    }
    if let Some(pw) = patch.password.as_deref() {
        check_password(pw)?;
        sets.push("password_hash = ?");
        args.push(Value::Text(hash_password(pw)?));
    }
    if let Some(status) = patch.status {
        sets.push("record_status = ?");
        args.push(Value::Text(status.as_str().to_string()));
    }

    if sets.is_empty() {
        return Ok(current);
    }
    sets.push("updated_at = ?");
    args.push(Value::Text(now_stamp()));
    args.push(Value::Text(id.to_string()));

    let sql = format!("UPDATE users SET {} WHERE id = ?", sets.join(", "));
    conn.execute(&sql, params_from_iter(args.iter()))
        .map_err(map_email_conflict)?;

    get_user(conn, id)
}

/// Soft delete. Tasks and assignments that reference the user are left untouched.
pub fn deactivate_user(conn: &Connection, id: &str, acting_user_id: &str) -> AppResult<()> {
    let user = get_user(conn, id)?;
    if user.id == acting_user_id {
        return Err(AppError::validation("you cannot delete your own account"));
    }
    conn.execute(
        "UPDATE users SET record_status = ?, updated_at = ? WHERE id = ?",
        params![RecordStatus::Inactive, now_stamp(), id],
    )?;
    tracing::info!(user_id = %id, "user deactivated");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_memory;

    fn teacher(email: &str) -> NewUser {
        NewUser {
            first_name: "Ana".into(),
            last_name: "Ruiz".into(),
            email: email.into(),
            password: "secret123".into(),
            role: Role::Teacher,
        }
    }

    #[test]
    fn email_shape_is_checked_and_normalized() {
        assert_eq!(normalize_email("  Ana@School.Test ").unwrap(), "ana@school.test");
        assert!(normalize_email("ana@school").is_err());
        assert!(normalize_email("ana school@x.io").is_err());
        assert!(normalize_email("@x.io").is_err());
        assert!(normalize_email("a@b@c.io").is_err());
    }

    #[test]
    fn duplicate_email_is_a_conflict_even_with_different_case() {
        let conn = open_memory();
        create_user(&conn, &teacher("ana@school.test")).expect("create");
        let err = create_user(&conn, &teacher("ANA@school.test")).unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)), "{err:?}");
    }

    #[test]
    fn listing_hides_inactive_users_and_filters_by_role() {
        let conn = open_memory();
        let boss = create_user(
            &conn,
            &NewUser {
                role: Role::Coordinator,
                ..teacher("boss@school.test")
            },
        )
        .unwrap();
        let a = create_user(&conn, &teacher("a@school.test")).unwrap();
        create_user(&conn, &teacher("b@school.test")).unwrap();

        deactivate_user(&conn, &a.id, &boss.id).unwrap();

        let teachers = list_users(
            &conn,
            &UserFilter {
                role: Some(Role::Teacher),
                search: None,
            },
            PageRequest::default(),
        )
        .unwrap();
        assert_eq!(teachers.pagination.total_items, 1);
        assert_eq!(teachers.items[0].email, "b@school.test");

        // History is kept.
        assert_eq!(get_user(&conn, &a.id).unwrap().status, RecordStatus::Inactive);
    }

    #[test]
    fn coordinator_cannot_delete_self() {
        let conn = open_memory();
        let u = create_user(&conn, &teacher("self@school.test")).unwrap();
        assert!(matches!(
            deactivate_user(&conn, &u.id, &u.id),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn coordinator_cannot_deactivate_self_through_update() {
        let conn = open_memory();
        let u = create_user(&conn, &teacher("self@school.test")).unwrap();
        let off = UserPatch {
            status: Some(RecordStatus::Inactive),
            ..Default::default()
        };
        assert!(matches!(
            update_user(&conn, &u.id, &u.id, &off),
            Err(AppError::Validation(_))
        ));
        assert!(get_user(&conn, &u.id).unwrap().is_active());

        let renamed = update_user(
            &conn,
            &u.id,
            &u.id,
            &UserPatch {
                first_name: Some("Eva".into()),
                status: Some(RecordStatus::Active),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(renamed.first_name, "Eva");
    }

    #[test]
    fn update_rehashes_password_and_rejects_taken_email() {
        let conn = open_memory();
        let a = create_user(&conn, &teacher("a@school.test")).unwrap();
        create_user(&conn, &teacher("b@school.test")).unwrap();

        let err = update_user(
            &conn,
            &a.id,
            "someone-else",
            &UserPatch {
                email: Some("b@school.test".into()),
                ..Default::default()
            },
        )
        .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        update_user(
            &conn,
            &a.id,
            "someone-else",
            &UserPatch {
                password: Some("another-pass".into()),
                ..Default::default()
            },
        )
        .unwrap();
        let (_, hash) = find_active_credentials(&conn, "a@school.test").unwrap().unwrap();
        assert!(crate::auth::verify_password("another-pass", &hash));
    }
}
