use std::sync::Arc;

use crate::auth::SessionService;
use crate::db::{Database, Store};
use crate::token::Maker;
use crate::worker::TaskDistributor;

/// Gateway shared state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    /// Verifies bearer access tokens
    pub maker: Arc<dyn Maker>,
    pub sessions: Arc<SessionService>,
    /// Schedules side-effect tasks (verification email)
    pub distributor: Arc<dyn TaskDistributor>,
    /// PostgreSQL pool for health checks (absent with the in-memory store)
    pub pg_db: Option<Arc<Database>>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn Store>,
        maker: Arc<dyn Maker>,
        sessions: Arc<SessionService>,
        distributor: Arc<dyn TaskDistributor>,
    ) -> Self {
        Self {
            store,
            maker,
            sessions,
            distributor,
            pg_db: None,
        }
    }

    pub fn with_database(mut self, db: Arc<Database>) -> Self {
        self.pg_db = Some(db);
        self
    }
}
