//! Application state

use std::sync::Arc;

use pawcare_blocking::BlockingService;
use sqlx::PgPool;

use crate::config::Config;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Config,
    pub blocking: Arc<BlockingService>,
}

impl AppState {
    pub fn new(pool: PgPool, config: Config, blocking: Arc<BlockingService>) -> Self {
        Self {
            pool,
            config,
            blocking,
        }
    }
}
