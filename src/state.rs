use std::sync::Arc;
use std::time::Duration;

use sqlx::SqlitePool;

use crate::connectivity::Connectivity;
use crate::query::FallbackQuery;
use crate::remote::RemoteClient;
use crate::services::{MutationRecorder, RecordLock, SyncScheduler, SyncService};

#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub connectivity: Connectivity,
    pub recorder: Arc<MutationRecorder>,
    pub query: Arc<FallbackQuery>,
    pub scheduler: Arc<SyncScheduler>,
}

impl AppState {
    /// Wires the sync components around one local store and one remote.
    pub fn new(
        db: SqlitePool,
        remote: Arc<dyn RemoteClient>,
        connectivity: Connectivity,
        poll_interval: Duration,
        push_timeout: Duration,
    ) -> Self {
        let lock = RecordLock::new();
        let sync = Arc::new(SyncService::new(db.clone(), remote.clone(), lock.clone(), push_timeout));

        Self {
            recorder: Arc::new(MutationRecorder::new(
                db.clone(),
                sync.clone(),
                connectivity.clone(),
                lock,
            )),
            query: Arc::new(FallbackQuery::new(
                db.clone(),
                remote,
                connectivity.clone(),
                push_timeout,
            )),
            scheduler: Arc::new(SyncScheduler::new(
                db.clone(),
                sync,
                connectivity.clone(),
                poll_interval,
            )),
            connectivity,
            db,
        }
    }
}
