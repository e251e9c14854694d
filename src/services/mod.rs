pub mod lock;
pub mod recorder;
pub mod scheduler;
pub mod sync_service;

pub use lock::RecordLock;
pub use recorder::{BatchResult, CreateResult, DeleteResult, MutationRecorder, UpdateResult};
pub use scheduler::{SyncScheduler, SyncStatusView};
pub use sync_service::{PushOutcome, SyncErrorDetail, SyncReport, SyncService};
