use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqlitePool;
use tracing::{debug, info, warn};

use crate::db::repository;
use crate::error::AppError;
use crate::models::{Collection, Record, SyncOperation, SyncStatus};
use crate::remote::{RemoteClient, bounded};
use crate::services::RecordLock;

/// Reconciliation engine: drives pending records toward `synced`.
pub struct SyncService {
    db: SqlitePool,
    remote: Arc<dyn RemoteClient>,
    lock: RecordLock,
    push_timeout: Duration,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncErrorDetail {
    pub collection: Collection,
    pub local_id: i64,
    pub operation: SyncOperation,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub synced_count: usize,
    pub error_count: usize,
    pub errors: Vec<SyncErrorDetail>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome {
    /// The record now matches a remote row.
    Synced { remote_id: String },
    /// The record was removed locally after its delete was settled.
    Purged,
}

impl SyncService {
    pub fn new(
        db: SqlitePool,
        remote: Arc<dyn RemoteClient>,
        lock: RecordLock,
        push_timeout: Duration,
    ) -> Self {
        Self {
            db,
            remote,
            lock,
            push_timeout,
        }
    }

    /// One full sweep over every collection. Per-record failures are
    /// collected in the report; only a storage fault aborts the sweep.
    pub async fn sync_all(&self) -> Result<SyncReport, AppError> {
        info!("Starting sync sweep...");
        let mut report = SyncReport {
            synced_count: 0,
            error_count: 0,
            errors: Vec::new(),
            started_at: Utc::now(),
            finished_at: Utc::now(),
        };

        for collection in Collection::ALL {
            self.sync_collection(collection, &mut report).await?;
        }

        report.finished_at = Utc::now();
        info!(
            "Sync sweep completed - synced: {}, errors: {}",
            report.synced_count, report.error_count
        );
        Ok(report)
    }

    async fn sync_collection(
        &self,
        collection: Collection,
        report: &mut SyncReport,
    ) -> Result<(), AppError> {
        let mut attempted: HashSet<i64> = HashSet::new();

        // records that turn pending while the sweep runs are picked up by the next listing
        loop {
            let ids: Vec<i64> = repository::list_pending_ids(&self.db, collection)
                .await?
                .into_iter()
                .filter(|id| !attempted.contains(id))
                .collect();
            if ids.is_empty() {
                break;
            }

            for local_id in ids {
                attempted.insert(local_id);
                let _guard = self.lock.acquire().await;

                let Some(record) = repository::get_record(&self.db, collection, local_id).await?
                else {
                    continue;
                };
                if !record.is_pending() {
                    continue;
                }

                let operation = record.sync_operation;
                match self.push(collection, record).await {
                    Ok(outcome) => {
                        debug!("{} #{} {}: {:?}", collection, local_id, operation, outcome);
                        report.synced_count += 1;
                    }
                    Err(e @ (AppError::Database(_) | AppError::Migration(_))) => return Err(e),
                    Err(e) => {
                        if e.is_retryable() {
                            warn!("Failed to sync {} #{} ({}), will retry: {}", collection, local_id, operation, e);
                        } else {
                            warn!("Skipping {} #{} ({}) until it is fixed: {}", collection, local_id, operation, e);
                        }
                        report.error_count += 1;
                        report.errors.push(SyncErrorDetail {
                            collection,
                            local_id,
                            operation,
                            error: e.to_string(),
                        });
                    }
                }
            }
        }

        Ok(())
    }

    /// Pushes a single record outside of a sweep. Returns `None` when the
    /// record is gone or no longer pending.
    pub async fn push_one(
        &self,
        collection: Collection,
        local_id: i64,
    ) -> Result<Option<PushOutcome>, AppError> {
        let _guard = self.lock.acquire().await;

        match repository::get_record(&self.db, collection, local_id).await? {
            Some(record) if record.is_pending() => self.push(collection, record).await.map(Some),
            _ => Ok(None),
        }
    }

    /// Caller must hold the record lock.
    async fn push(&self, collection: Collection, mut record: Record) -> Result<PushOutcome, AppError> {
        let table = collection.remote_table();
        let payload = record.outgoing_payload()?;

        match record.sync_operation {
            SyncOperation::Delete => {
                if let Some(remote_id) = &record.remote_id {
                    bounded(self.push_timeout, self.remote.delete(table, remote_id)).await?;
                }
                repository::delete_record(&self.db, collection, record.local_id).await?;
                Ok(PushOutcome::Purged)
            }
            SyncOperation::Create | SyncOperation::Update => {
                // an update that never reached the remote is sent as an insert
                let remote_id = match &record.remote_id {
                    Some(remote_id) => {
                        bounded(self.push_timeout, self.remote.update(table, remote_id, &payload))
                            .await?;
                        remote_id.clone()
                    }
                    None => {
                        bounded(self.push_timeout, self.remote.insert(table, &payload))
                            .await?
                            .remote_id
                    }
                };

                record.remote_id = Some(remote_id.clone());
                record.sync_status = SyncStatus::Synced;
                repository::update_record(&self.db, collection, &record).await?;
                Ok(PushOutcome::Synced { remote_id })
            }
        }
    }
}
