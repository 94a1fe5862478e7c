use rusqlite::ffi;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Permission(String),

    #[error("{0}")]
    Unauthenticated(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn validation(msg: impl Into<String>) -> Self {
        AppError::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        AppError::NotFound(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        AppError::Conflict(msg.into())
    }

    pub fn permission(msg: impl Into<String>) -> Self {
        AppError::Permission(msg.into())
    }

    /// Wire code used in the `error.code` field of a failed response.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "bad_params",
            AppError::NotFound(_) => "not_found",
            AppError::Conflict(_) => "conflict",
            AppError::Permission(_) => "forbidden",
            AppError::Unauthenticated(_) => "unauthorized",
            AppError::Internal(_) => "internal",
        }
    }

    /// Message safe to hand back to a caller. Internal detail stays in the logs.
    pub fn public_message(&self) -> String {
        match self {
            AppError::Internal(_) => "internal error".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<rusqlite::Error> for AppError {
    fn from(e: rusqlite::Error) -> Self {
        AppError::Internal(e.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(e: serde_json::Error) -> Self {
        AppError::Internal(e.to_string())
    }
}

/// True when `e` is a UNIQUE constraint violation, optionally on a specific index or column list.
pub fn is_unique_violation(e: &rusqlite::Error, needle: Option<&str>) -> bool {
    match e {
        rusqlite::Error::SqliteFailure(f, msg) => {
            if f.extended_code != ffi::SQLITE_CONSTRAINT_UNIQUE {
                return false;
            }
            match needle {
                None => true,
                Some(n) => msg.as_deref().map(|m| m.contains(n)).unwrap_or(false),
            }
        }
        _ => false,
    }
}
