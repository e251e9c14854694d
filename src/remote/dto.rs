use serde_json::Value;

use crate::error::AppError;

/// A row returned by the remote service after an insert.
#[derive(Debug, Clone)]
pub struct RemoteRow {
    pub remote_id: String,
    pub fields: Value,
}

impl RemoteRow {
    /// Reads the remote primary key, which may come back as a string or a number.
    pub fn from_value(fields: Value) -> Result<Self, AppError> {
        let remote_id = match fields.get("id") {
            Some(Value::String(id)) if !id.is_empty() => id.clone(),
            Some(Value::Number(id)) => id.to_string(),
            _ => {
                return Err(AppError::remote(None, "insert response has no id"));
            }
        };
        Ok(Self { remote_id, fields })
    }
}
