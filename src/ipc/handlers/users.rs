use serde_json::json;

use crate::ipc::helpers::{
    authenticate_as, db_conn, optional_bool, optional_enum, optional_str, page_request,
    required_str, respond, to_json, HandlerResult,
};
use crate::ipc::types::{AppState, Request};
use crate::model::{RecordStatus, Role};
use crate::users::{self, NewUser, UserFilter, UserPatch};

fn handle_users_create(state: &mut AppState, req: &Request) -> HandlerResult {
    authenticate_as(state, req, Role::Coordinator)?;
    let conn = db_conn(state)?;
    let p = &req.params;
    let role = optional_enum::<Role>(p, "role")?.unwrap_or(Role::Teacher);
    let user = users::create_user(
        conn,
        &NewUser {
            first_name: required_str(p, "firstName")?,
            last_name: required_str(p, "lastName")?,
            email: required_str(p, "email")?,
            password: required_str(p, "password")?,
            role,
        },
    )?;
    to_json(&user)
}

fn handle_users_list(state: &mut AppState, req: &Request) -> HandlerResult {
    authenticate_as(state, req, Role::Coordinator)?;
    let conn = db_conn(state)?;
    let filter = UserFilter {
        role: optional_enum(&req.params, "role")?,
        search: optional_str(&req.params, "search")?,
    };
    to_json(&users::list_users(conn, &filter, page_request(&req.params)?)?)
}

fn handle_users_get(state: &mut AppState, req: &Request) -> HandlerResult {
    authenticate_as(state, req, Role::Coordinator)?;
    let conn = db_conn(state)?;
    to_json(&users::get_user(conn, &required_str(&req.params, "id")?)?)
}

fn handle_users_update(state: &mut AppState, req: &Request) -> HandlerResult {
    let me = authenticate_as(state, req, Role::Coordinator)?;
    let conn = db_conn(state)?;
    let p = &req.params;
    let id = required_str(p, "id")?;
    let patch = UserPatch {
        first_name: optional_str(p, "firstName")?,
        last_name: optional_str(p, "lastName")?,
        email: optional_str(p, "email")?,
        role: optional_enum(p, "role")?,
        password: optional_str(p, "password")?.filter(|s| !s.is_empty()),
        status: optional_bool(p, "isActive")?.map(|active| {
            if active {
                RecordStatus::Active
            } else {
                RecordStatus::Inactive
            }
        }),
    };
    to_json(&users::update_user(conn, &id, &me.id, &patch)?)
}

fn handle_users_delete(state: &mut AppState, req: &Request) -> HandlerResult {
    let me = authenticate_as(state, req, Role::Coordinator)?;
    let conn = db_conn(state)?;
    let id = required_str(&req.params, "id")?;
    users::deactivate_user(conn, &id, &me.id)?;
    Ok(json!({ "id": id, "deleted": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "users.create" => handle_users_create(state, req),
        "users.list" => handle_users_list(state, req),
        "users.get" => handle_users_get(state, req),
        "users.update" => handle_users_update(state, req),
        "users.delete" => handle_users_delete(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}
