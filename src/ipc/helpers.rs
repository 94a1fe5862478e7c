use std::str::FromStr;

use rusqlite::Connection;
use serde::Serialize;
use serde_json::Value;

use crate::error::AppError;
use crate::ipc::error::{err, fail, ok};
use crate::ipc::types::{AppState, Request};
use crate::model::{PageRequest, ParseEnumError, Role, User};
use crate::users;

/// Why a handler could not produce a result.
pub enum HandlerErr {
    /// Raised by the domain layer; mapped through `AppError::code`.
    App(AppError),
    NoWorkspace,
}

impl HandlerErr {
    pub fn response(self, id: &str) -> Value {
        match self {
            HandlerErr::App(e) => fail(id, &e),
            HandlerErr::NoWorkspace => err(id, "no_workspace", "select a workspace first", None),
        }
    }
}

impl From<AppError> for HandlerErr {
    fn from(e: AppError) -> Self {
        HandlerErr::App(e)
    }
}

impl From<rusqlite::Error> for HandlerErr {
    fn from(e: rusqlite::Error) -> Self {
        HandlerErr::App(e.into())
    }
}

impl From<serde_json::Error> for HandlerErr {
    fn from(e: serde_json::Error) -> Self {
        HandlerErr::App(e.into())
    }
}

pub type HandlerResult = Result<Value, HandlerErr>;

pub fn respond(req: &Request, result: HandlerResult) -> Value {
    match result {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    }
}

pub fn to_json<T: Serialize>(value: &T) -> HandlerResult {
    Ok(serde_json::to_value(value)?)
}

pub fn db_conn(state: &AppState) -> Result<&Connection, HandlerErr> {
    state.db.as_ref().ok_or(HandlerErr::NoWorkspace)
}

fn bad_params(message: impl Into<String>) -> HandlerErr {
    HandlerErr::App(AppError::validation(message))
}

/// A string param that must be present. Blank strings count as present;
/// the domain layer decides whether they are acceptable.
pub fn required_str(params: &Value, key: &str) -> Result<String, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| bad_params(format!("missing {}", key)))
}

pub fn optional_str(params: &Value, key: &str) -> Result<Option<String>, HandlerErr> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(bad_params(format!("{} must be a string", key))),
    }
}

pub fn optional_i64(params: &Value, key: &str) -> Result<Option<i64>, HandlerErr> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v
            .as_i64()
            .map(Some)
            .ok_or_else(|| bad_params(format!("{} must be an integer", key))),
    }
}

pub fn required_i64(params: &Value, key: &str) -> Result<i64, HandlerErr> {
    optional_i64(params, key)?.ok_or_else(|| bad_params(format!("missing {}", key)))
}

pub fn optional_bool(params: &Value, key: &str) -> Result<Option<bool>, HandlerErr> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Bool(b)) => Ok(Some(*b)),
        Some(_) => Err(bad_params(format!("{} must be a boolean", key))),
    }
}

pub fn optional_enum<T>(params: &Value, key: &str) -> Result<Option<T>, HandlerErr>
where
    T: FromStr<Err = ParseEnumError>,
{
    match optional_str(params, key)? {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e: ParseEnumError| bad_params(e.to_string())),
    }
}

/// `{page?, limit?}`; non-positive or missing values fall back to defaults.
pub fn page_request(params: &Value) -> Result<PageRequest, HandlerErr> {
    let clamp = |v: Option<i64>| v.map(|n| n.clamp(0, i64::from(u32::MAX)) as u32);
    Ok(PageRequest::new(
        clamp(optional_i64(params, "page")?),
        clamp(optional_i64(params, "limit")?),
    ))
}

/// `{year, month}` for calendar views.
pub fn year_month(params: &Value) -> Result<(i32, u32), HandlerErr> {
    let year = required_i64(params, "year")?;
    let month = required_i64(params, "month")?;
    let year = i32::try_from(year).map_err(|_| bad_params("year out of range"))?;
    let month = u32::try_from(month).map_err(|_| bad_params("month must be between 1 and 12"))?;
    Ok((year, month))
}

/// Resolves the request token to an active user.
pub fn authenticate(state: &AppState, req: &Request) -> Result<User, HandlerErr> {
    let conn = db_conn(state)?;
    let token = req
        .token
        .as_deref()
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| AppError::Unauthenticated("missing token".into()))?;
    let signer = state
        .signer
        .as_ref()
        .ok_or_else(|| AppError::Internal("server misconfigured: no jwt secret".into()))?;
    let claims = signer.verify(token)?;
    match users::find_user(conn, &claims.sub)? {
        Some(user) if user.is_active() => Ok(user),
        _ => {
            tracing::warn!(user_id = %claims.sub, "token for missing or inactive user");
            Err(AppError::Unauthenticated("user not found or inactive".into()).into())
        }
    }
}

pub fn authenticate_as(state: &AppState, req: &Request, role: Role) -> Result<User, HandlerErr> {
    let user = authenticate(state, req)?;
    if user.role != role {
        tracing::warn!(user_id = %user.id, required = %role, "role check failed");
        return Err(AppError::permission(format!("{} role required", role)).into());
    }
    Ok(user)
}
