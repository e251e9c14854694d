use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::FromRow;

use crate::error::AppError;

/// Domain fields of a record, keyed by field name.
pub type Payload = Map<String, Value>;

/// Local bookkeeping never sent to the remote service. `id` is the
/// remote primary key and is addressed separately through `remote_id`.
pub const BOOKKEEPING_FIELDS: [&str; 6] = [
    "id",
    "local_id",
    "remote_id",
    "sync_status",
    "sync_operation",
    "deleted_at",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Pending,
    Synced,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncOperation {
    Create,
    Update,
    Delete,
}

impl SyncStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SyncStatus::Pending => "pending",
            SyncStatus::Synced => "synced",
        }
    }
}

impl SyncOperation {
    pub fn as_str(self) -> &'static str {
        match self {
            SyncOperation::Create => "create",
            SyncOperation::Update => "update",
            SyncOperation::Delete => "delete",
        }
    }
}

impl FromStr for SyncStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(SyncStatus::Pending),
            "synced" => Ok(SyncStatus::Synced),
            other => Err(AppError::validation(format!("unknown sync_status: {}", other))),
        }
    }
}

impl FromStr for SyncOperation {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(SyncOperation::Create),
            "update" => Ok(SyncOperation::Update),
            "delete" => Ok(SyncOperation::Delete),
            other => Err(AppError::validation(format!("unknown sync_operation: {}", other))),
        }
    }
}

impl fmt::Display for SyncOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The unit of synchronization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
    pub local_id: i64,
    pub remote_id: Option<String>,
    pub payload: Payload,
    pub sync_status: SyncStatus,
    pub sync_operation: SyncOperation,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Record {
    pub fn is_pending(&self) -> bool {
        self.sync_status == SyncStatus::Pending
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Payload as it may be sent to the remote service.
    pub fn outgoing_payload(&self) -> Result<Payload, AppError> {
        validate_payload(Value::Object(self.payload.clone()))
    }

    /// Flattened view served by local reads: domain fields plus the
    /// identifiers and sync state a caller may filter on.
    pub fn to_row(&self) -> Value {
        let mut row = self.payload.clone();
        row.insert(
            "id".to_string(),
            self.remote_id.clone().map(Value::String).unwrap_or(Value::Null),
        );
        row.insert("local_id".to_string(), Value::from(self.local_id));
        row.insert(
            "sync_status".to_string(),
            Value::String(self.sync_status.as_str().to_string()),
        );
        // timestamps sent by the caller are what the remote row holds
        row.entry("created_at")
            .or_insert_with(|| Value::String(self.created_at.to_rfc3339()));
        row.entry("updated_at")
            .or_insert_with(|| Value::String(self.updated_at.to_rfc3339()));
        Value::Object(row)
    }
}

/// Strips bookkeeping fields and rejects anything that is not a
/// non-empty keyed structure.
pub fn validate_payload(payload: Value) -> Result<Payload, AppError> {
    let mut fields = match payload {
        Value::Object(fields) => fields,
        other => {
            return Err(AppError::validation(format!(
                "payload must be an object, got {}",
                json_kind(&other)
            )));
        }
    };

    for key in BOOKKEEPING_FIELDS {
        fields.remove(key);
    }

    if fields.is_empty() {
        return Err(AppError::validation("payload is empty"));
    }

    Ok(fields)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Row shape of a collection table.
#[derive(Debug, FromRow)]
pub struct RecordRow {
    pub local_id: i64,
    pub remote_id: Option<String>,
    pub payload: String,
    pub sync_status: String,
    pub sync_operation: String,
    pub created_at: String,
    pub updated_at: String,
    pub deleted_at: Option<String>,
}

impl TryFrom<RecordRow> for Record {
    type Error = AppError;

    fn try_from(row: RecordRow) -> Result<Self, Self::Error> {
        let payload = match serde_json::from_str::<Value>(&row.payload)? {
            Value::Object(fields) => fields,
            _ => Payload::new(),
        };

        Ok(Record {
            local_id: row.local_id,
            remote_id: row.remote_id,
            payload,
            sync_status: row.sync_status.parse()?,
            sync_operation: row.sync_operation.parse()?,
            created_at: parse_timestamp(&row.created_at)?,
            updated_at: parse_timestamp(&row.updated_at)?,
            deleted_at: row.deleted_at.as_deref().map(parse_timestamp).transpose()?,
        })
    }
}

fn parse_timestamp(ts: &str) -> Result<DateTime<Utc>, AppError> {
    DateTime::parse_from_rfc3339(ts)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| AppError::validation(format!("bad timestamp {}: {}", ts, e)))
}
