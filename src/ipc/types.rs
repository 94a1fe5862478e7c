use std::path::PathBuf;

use chrono::NaiveDate;
use rusqlite::Connection;
use serde::Deserialize;

use crate::auth::TokenSigner;
use crate::config::Config;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
    /// Session token for protected methods.
    #[serde(default)]
    pub token: Option<String>,
}

pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
    pub config: Config,
    pub signer: Option<TokenSigner>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let signer = config
            .jwt_secret
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(|s| TokenSigner::new(s, config.token_ttl_hours));
        Self {
            workspace: None,
            db: None,
            config,
            signer,
        }
    }

    pub fn today(&self) -> NaiveDate {
        self.config.today()
    }
}
