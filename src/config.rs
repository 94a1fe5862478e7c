use chrono::NaiveDate;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

/// School task service speaking line-delimited JSON over stdin/stdout.
#[derive(Debug, Clone, Parser)]
#[command(name = "schooltasksd", version)]
pub struct Config {
    /// Directory holding the database; may also be chosen later with `workspace.select`.
    #[arg(long, env = "SCHOOLTASKSD_WORKSPACE")]
    pub workspace: Option<PathBuf>,

    /// Secret used to sign session tokens.
    #[arg(long, env = "SCHOOLTASKSD_JWT_SECRET", hide_env_values = true)]
    pub jwt_secret: Option<String>,

    /// Session token lifetime, at most one year.
    #[arg(
        long,
        env = "SCHOOLTASKSD_TOKEN_TTL_HOURS",
        default_value_t = 24,
        value_parser = clap::value_parser!(i64).range(1..=8760)
    )]
    pub token_ttl_hours: i64,

    /// Fixed "today" (YYYY-MM-DD) for calendar and status derivation.
    #[arg(long, env = "SCHOOLTASKSD_TODAY")]
    pub today: Option<NaiveDate>,

    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

impl Config {
    pub fn today(&self) -> NaiveDate {
        self.today
            .unwrap_or_else(|| chrono::Local::now().date_naive())
    }
}
