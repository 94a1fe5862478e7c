use super::handlers;
use super::types::{AppState, Request};
use crate::ipc::error::err;

type Handler = fn(&mut AppState, &Request) -> Option<serde_json::Value>;

const HANDLERS: &[Handler] = &[
    handlers::core::try_handle,
    handlers::auth::try_handle,
    handlers::users::try_handle,
    handlers::subjects::try_handle,
    handlers::groups::try_handle,
    handlers::assignments::try_handle,
    handlers::tasks::try_handle,
    handlers::public::try_handle,
    handlers::dashboard::try_handle,
];

pub fn handle_request(state: &mut AppState, req: Request) -> serde_json::Value {
    let span = tracing::info_span!("request", id = %req.id, method = %req.method);
    let _guard = span.enter();

    for try_handle in HANDLERS {
        if let Some(resp) = try_handle(state, &req) {
            tracing::debug!(ok = resp["ok"].as_bool().unwrap_or(false), "handled");
            return resp;
        }
    }

    tracing::warn!("unknown method");
    err(
        &req.id,
        "not_implemented",
        format!("unknown method: {}", req.method),
        None,
    )
}
