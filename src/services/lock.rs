use std::sync::Arc;

use tokio::sync::{Mutex, MutexGuard};

/// Serializes every read-push-write sequence against the local store, so
/// an immediate push and a sweep never act on the same record at once.
#[derive(Clone, Default)]
pub struct RecordLock {
    inner: Arc<Mutex<()>>,
}

impl RecordLock {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self) -> MutexGuard<'_, ()> {
        self.inner.lock().await
    }
}
