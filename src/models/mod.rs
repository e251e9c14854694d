pub mod collection;
pub mod record;

pub use collection::{Collection, remote_table_for};
pub use record::{BOOKKEEPING_FIELDS, Payload, Record, SyncOperation, SyncStatus, validate_payload};
