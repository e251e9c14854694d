pub mod filter;

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use sqlx::SqlitePool;
use tracing::{debug, warn};

use crate::connectivity::Connectivity;
use crate::db::repository;
use crate::error::AppError;
use crate::models::Collection;
use crate::remote::{RemoteClient, bounded};

pub use filter::{Direction, Filter, Op};

/// Remote-preferred reads with a local fallback. Soft-deleted records
/// are never served.
pub struct FallbackQuery {
    db: SqlitePool,
    remote: Arc<dyn RemoteClient>,
    connectivity: Connectivity,
    timeout: Duration,
}

impl FallbackQuery {
    pub fn new(
        db: SqlitePool,
        remote: Arc<dyn RemoteClient>,
        connectivity: Connectivity,
        timeout: Duration,
    ) -> Self {
        Self {
            db,
            remote,
            connectivity,
            timeout,
        }
    }

    pub async fn query(&self, collection: Collection, filter: &Filter) -> Result<Vec<Value>, AppError> {
        if self.connectivity.is_reachable() {
            match bounded(self.timeout, self.remote.select(collection.remote_table(), filter)).await {
                Ok(rows) => return Ok(rows),
                Err(e) => warn!("Remote read of {} failed, serving local copy: {}", collection, e),
            }
        }

        self.query_local(collection, filter).await
    }

    pub async fn query_local(&self, collection: Collection, filter: &Filter) -> Result<Vec<Value>, AppError> {
        let rows: Vec<Value> = repository::list_records(&self.db, collection)
            .await?
            .into_iter()
            .filter(|record| !record.is_deleted())
            .map(|record| record.to_row())
            .collect();

        debug!("Serving {} local rows of {}", rows.len(), collection);
        Ok(filter.apply(rows))
    }
}
