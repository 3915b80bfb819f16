use axum::extract::FromRef;

use crate::index_db::SqliteIndexDatabase;
use crate::store::SyncedQueryStore;
use std::sync::Arc;
use std::time::Instant;

use super::ServerConfig;

pub type GuardedIndexStore = Arc<SyncedQueryStore<SqliteIndexDatabase>>;

#[derive(Clone)]
pub struct ServerState {
    pub config: ServerConfig,
    pub start_time: Instant,
    pub store: GuardedIndexStore,
}

impl ServerState {
    pub fn new(config: ServerConfig, store: GuardedIndexStore) -> Self {
        ServerState {
            config,
            start_time: Instant::now(),
            store,
        }
    }
}

impl FromRef<ServerState> for GuardedIndexStore {
    fn from_ref(input: &ServerState) -> Self {
        input.store.clone()
    }
}

impl FromRef<ServerState> for ServerConfig {
    fn from_ref(input: &ServerState) -> Self {
        input.config.clone()
    }
}
