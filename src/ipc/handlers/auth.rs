use chrono::Utc;
use serde_json::json;

use crate::auth::verify_password;
use crate::db;
use crate::error::AppError;
use crate::ipc::helpers::{authenticate, db_conn, required_str, respond, to_json, HandlerResult};
use crate::ipc::types::{AppState, Request};
use crate::model::Role;
use crate::users::{self, NewUser};

const INVALID_CREDENTIALS: &str = "invalid credentials";

fn handle_bootstrap(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state)?;
    if db::count_users(conn)? > 0 {
        return Err(AppError::conflict("users already exist; sign in as a coordinator").into());
    }
    let user = users::create_user(
        conn,
        &NewUser {
            first_name: required_str(&req.params, "firstName")?,
            last_name: required_str(&req.params, "lastName")?,
            email: required_str(&req.params, "email")?,
            password: required_str(&req.params, "password")?,
            role: Role::Coordinator,
        },
    )?;
    tracing::info!(user_id = %user.id, "first coordinator created");
    to_json(&user)
}

fn handle_login(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state)?;
    let email = required_str(&req.params, "email")?;
    let password = required_str(&req.params, "password")?;
    let signer = state
        .signer
        .as_ref()
        .ok_or_else(|| AppError::Internal("server misconfigured: no jwt secret".into()))?;

    let normalized = email.trim().to_lowercase();
    let found = users::find_active_credentials(conn, &normalized)?;
    let user = match found {
        Some((user, hash)) if verify_password(&password, &hash) => user,
        _ => {
            tracing::warn!(email = %normalized, "login failed");
            return Err(AppError::Unauthenticated(INVALID_CREDENTIALS.into()).into());
        }
    };

    let token = signer.issue(&user.id, &user.email, user.role, Utc::now())?;
    tracing::info!(user_id = %user.id, role = %user.role, "login succeeded");
    Ok(json!({ "token": token, "user": user }))
}

fn handle_me(state: &mut AppState, req: &Request) -> HandlerResult {
    let user = authenticate(state, req)?;
    to_json(&user)
}

fn handle_logout(state: &mut AppState, req: &Request) -> HandlerResult {
    let user = authenticate(state, req)?;
    tracing::info!(user_id = %user.id, "logout");
    Ok(json!({ "loggedOut": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "auth.bootstrap" => handle_bootstrap(state, req),
        "auth.login" => handle_login(state, req),
        "auth.me" => handle_me(state, req),
        "auth.logout" => handle_logout(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}
