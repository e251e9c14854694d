use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use sqlx::SqlitePool;
use tracing::{debug, warn};

use crate::connectivity::Connectivity;
use crate::db::repository;
use crate::error::AppError;
use crate::models::{Collection, SyncOperation, SyncStatus, validate_payload};
use crate::services::{PushOutcome, RecordLock, SyncService};

/// The only entry point for changing domain data: write locally first,
/// then push once if the remote is reachable.
pub struct MutationRecorder {
    db: SqlitePool,
    sync: Arc<SyncService>,
    connectivity: Connectivity,
    lock: RecordLock,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateResult {
    pub local_id: i64,
    pub synced: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchFailure {
    pub index: usize,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchResult {
    pub total: usize,
    pub created: usize,
    pub synced: usize,
    pub failed: usize,
    /// Local ids written but still awaiting a sweep.
    pub pending_ids: Vec<i64>,
    pub failures: Vec<BatchFailure>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UpdateResult {
    pub local_id: i64,
    pub synced: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeleteResult {
    pub local_id: i64,
    /// True once the record no longer exists locally.
    pub purged: bool,
}

impl MutationRecorder {
    pub fn new(
        db: SqlitePool,
        sync: Arc<SyncService>,
        connectivity: Connectivity,
        lock: RecordLock,
    ) -> Self {
        Self {
            db,
            sync,
            connectivity,
            lock,
        }
    }

    pub async fn create(&self, collection: Collection, payload: Value) -> Result<CreateResult, AppError> {
        let payload = validate_payload(payload)?;

        let local_id = {
            let _guard = self.lock.acquire().await;
            repository::add_record(&self.db, collection, &payload).await?
        };
        debug!("Recorded new {} #{}", collection, local_id);

        let synced = if self.connectivity.is_reachable() {
            self.try_push(collection, local_id).await?
        } else {
            false
        };

        Ok(CreateResult { local_id, synced })
    }

    /// Creates each payload independently; one failure never stops the rest.
    pub async fn create_batch(
        &self,
        collection: Collection,
        payloads: Vec<Value>,
    ) -> Result<BatchResult, AppError> {
        let mut result = BatchResult {
            total: payloads.len(),
            created: 0,
            synced: 0,
            failed: 0,
            pending_ids: Vec::new(),
            failures: Vec::new(),
        };

        for (index, payload) in payloads.into_iter().enumerate() {
            match self.create(collection, payload).await {
                Ok(created) => {
                    result.created += 1;
                    if created.synced {
                        result.synced += 1;
                    } else {
                        result.pending_ids.push(created.local_id);
                    }
                }
                Err(e) => {
                    warn!("Batch item {} for {} rejected: {}", index, collection, e);
                    result.failed += 1;
                    result.failures.push(BatchFailure {
                        index,
                        error: e.to_string(),
                    });
                }
            }
        }

        Ok(result)
    }

    /// Merges `changes` into the stored payload.
    pub async fn update(
        &self,
        collection: Collection,
        local_id: i64,
        changes: Value,
    ) -> Result<UpdateResult, AppError> {
        let changes = validate_payload(changes)?;

        let has_remote = {
            let _guard = self.lock.acquire().await;
            let mut record = repository::get_record(&self.db, collection, local_id)
                .await?
                .filter(|r| !r.is_deleted())
                .ok_or(AppError::NotFound)?;

            record.payload.extend(changes);
            record.sync_status = SyncStatus::Pending;
            // a record the remote has never seen is still owed a create
            record.sync_operation = if record.remote_id.is_some() {
                SyncOperation::Update
            } else {
                SyncOperation::Create
            };
            record.updated_at = Utc::now();
            repository::update_record(&self.db, collection, &record).await?;

            record.remote_id.is_some()
        };

        let synced = if has_remote && self.connectivity.is_reachable() {
            self.try_push(collection, local_id).await?
        } else {
            false
        };

        Ok(UpdateResult { local_id, synced })
    }

    pub async fn delete(&self, collection: Collection, local_id: i64) -> Result<DeleteResult, AppError> {
        {
            let _guard = self.lock.acquire().await;
            let mut record = repository::get_record(&self.db, collection, local_id)
                .await?
                .ok_or(AppError::NotFound)?;

            if record.remote_id.is_none() {
                repository::delete_record(&self.db, collection, local_id).await?;
                debug!("Purged unsynced {} #{}", collection, local_id);
                return Ok(DeleteResult {
                    local_id,
                    purged: true,
                });
            }

            if !record.is_deleted() {
                let now = Utc::now();
                record.sync_status = SyncStatus::Pending;
                record.sync_operation = SyncOperation::Delete;
                record.deleted_at = Some(now);
                record.updated_at = now;
                repository::update_record(&self.db, collection, &record).await?;
            }
        }

        let purged = if self.connectivity.is_reachable() {
            self.try_push(collection, local_id).await?
        } else {
            false
        };

        Ok(DeleteResult { local_id, purged })
    }

    /// One best-effort push. Remote and validation failures leave the
    /// record pending; storage faults still surface.
    async fn try_push(&self, collection: Collection, local_id: i64) -> Result<bool, AppError> {
        match self.sync.push_one(collection, local_id).await {
            Ok(Some(PushOutcome::Synced { .. } | PushOutcome::Purged)) => Ok(true),
            Ok(None) => {
                // a concurrent sweep may have settled it already
                let record = repository::get_record(&self.db, collection, local_id).await?;
                Ok(record.is_none_or(|r| r.sync_status == SyncStatus::Synced))
            }
            Err(e @ (AppError::Database(_) | AppError::Migration(_))) => Err(e),
            Err(e) => {
                warn!("Immediate push of {} #{} failed, left pending: {}", collection, local_id, e);
                Ok(false)
            }
        }
    }
}
