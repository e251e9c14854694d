use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::time::Duration;

use serde::Serialize;
use sqlx::SqlitePool;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use crate::connectivity::Connectivity;
use crate::db::repository;
use crate::error::AppError;
use crate::services::sync_service::{SyncReport, SyncService};

/// Read-only view consumed by the UI.
#[derive(Debug, Clone, Serialize)]
pub struct SyncStatusView {
    pub reachable: bool,
    pub pending_count: i64,
    pub sweep_in_progress: bool,
    pub last_sweep: Option<SyncReport>,
}

/// Decides when sweeps run and guarantees at most one runs at a time.
pub struct SyncScheduler {
    db: SqlitePool,
    sync: Arc<SyncService>,
    connectivity: Connectivity,
    interval: Duration,
    sweeping: AtomicBool,
    pending_count: AtomicI64,
    last_sweep: RwLock<Option<SyncReport>>,
}

/// Clears the sweep flag however the sweep ends.
struct SweepGuard<'a>(&'a AtomicBool);

impl Drop for SweepGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl SyncScheduler {
    pub fn new(
        db: SqlitePool,
        sync: Arc<SyncService>,
        connectivity: Connectivity,
        interval: Duration,
    ) -> Self {
        Self {
            db,
            sync,
            connectivity,
            interval,
            sweeping: AtomicBool::new(false),
            pending_count: AtomicI64::new(0),
            last_sweep: RwLock::new(None),
        }
    }

    /// Reacts to connectivity transitions and refreshes the pending count
    /// on a fixed interval. Runs until the task is dropped.
    pub async fn start(self: Arc<Self>) {
        info!("Starting sync scheduler (pending-count interval: {:?})", self.interval);

        let mut reachable_rx = self.connectivity.subscribe();
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        // records left pending by a previous run
        if *reachable_rx.borrow_and_update() {
            self.spawn_sweep("startup");
        }

        loop {
            tokio::select! {
                changed = reachable_rx.changed() => {
                    if changed.is_err() {
                        warn!("Connectivity signal closed, stopping scheduler");
                        break;
                    }
                    if *reachable_rx.borrow_and_update() {
                        self.spawn_sweep("reconnect");
                    }
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.refresh_pending_count().await {
                        error!("Failed to refresh pending count: {}", e);
                    }
                }
            }
        }
    }

    fn spawn_sweep(self: &Arc<Self>, trigger: &'static str) {
        let scheduler = Arc::clone(self);
        tokio::spawn(async move {
            match scheduler.sync_now().await {
                Ok(Some(report)) => info!(
                    "Sync ({}) finished - synced: {}, errors: {}",
                    trigger, report.synced_count, report.error_count
                ),
                Ok(None) => {}
                Err(e) => error!("Sync ({}) aborted: {}", trigger, e),
            }
        });
    }

    /// Runs one sweep unless one is already in flight, in which case the
    /// trigger is dropped and `None` returned.
    pub async fn sync_now(&self) -> Result<Option<SyncReport>, AppError> {
        if self
            .sweeping
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            info!("Sweep already running, trigger dropped");
            return Ok(None);
        }
        let _guard = SweepGuard(&self.sweeping);

        let result = self.sync.sync_all().await;
        if let Ok(report) = &result {
            *self.last_sweep.write().await = Some(report.clone());
        }
        if let Err(e) = self.refresh_pending_count().await {
            error!("Failed to refresh pending count after sweep: {}", e);
        }

        result.map(Some)
    }

    pub async fn refresh_pending_count(&self) -> Result<i64, AppError> {
        let count = repository::count_all_pending(&self.db).await?;
        self.pending_count.store(count, Ordering::Relaxed);
        Ok(count)
    }

    pub fn is_sweeping(&self) -> bool {
        self.sweeping.load(Ordering::Acquire)
    }

    pub async fn status(&self) -> SyncStatusView {
        SyncStatusView {
            reachable: self.connectivity.is_reachable(),
            pending_count: self.pending_count.load(Ordering::Relaxed),
            sweep_in_progress: self.is_sweeping(),
            last_sweep: self.last_sweep.read().await.clone(),
        }
    }
}
