use dashmap::DashMap;
use std::sync::Arc;

use super::blockchain::ChainSyncer;
use super::database::PgStore;

// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub store: PgStore, // Read access to cursors and ledger rows
    pub syncers: Arc<DashMap<String, Arc<ChainSyncer>>>, // One syncer per active chain, by key
}

impl AppState {
    pub fn new(store: PgStore) -> Self {
        AppState {
            store,
            syncers: Arc::new(DashMap::new()),
        }
    }

    pub fn register(&self, syncer: Arc<ChainSyncer>) {
        self.syncers.insert(syncer.key().to_string(), syncer);
    }
}
