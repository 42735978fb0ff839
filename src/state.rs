use sqlx::SqlitePool;

use crate::config::Config;

/// Shared by every handler behind an `Arc`.
pub struct AppState {
    pub database: SqlitePool,
    pub config: Config,
}

impl AppState {
    pub fn new(database: SqlitePool, config: Config) -> Self {
        Self { database, config }
    }
}
