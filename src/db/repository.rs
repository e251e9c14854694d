use chrono::Utc;
use sqlx::SqlitePool;

use crate::error::AppError;
use crate::models::record::RecordRow;
use crate::models::{Collection, Payload, Record, SyncOperation, SyncStatus};

const RECORD_COLUMNS: &str =
    "local_id, remote_id, payload, sync_status, sync_operation, created_at, updated_at, deleted_at";

/// Persists a new pending/create record and returns its fresh local id.
pub async fn add_record(
    db: &SqlitePool,
    collection: Collection,
    payload: &Payload,
) -> Result<i64, AppError> {
    let now = Utc::now().to_rfc3339();
    let body = serde_json::to_string(payload)?;

    let result = sqlx::query(&format!(
        r#"
        INSERT INTO {}
            (remote_id, payload, sync_status, sync_operation,
            created_at, updated_at, deleted_at)
        VALUES (NULL, ?1, ?2, ?3, ?4, ?4, NULL)
        "#,
        collection.name()
    ))
    .bind(body)
    .bind(SyncStatus::Pending.as_str())
    .bind(SyncOperation::Create.as_str())
    .bind(now)
    .execute(db)
    .await?;

    Ok(result.last_insert_rowid())
}

pub async fn get_record(
    db: &SqlitePool,
    collection: Collection,
    local_id: i64,
) -> Result<Option<Record>, AppError> {
    let row = sqlx::query_as::<_, RecordRow>(&format!(
        "SELECT {} FROM {} WHERE local_id = ?",
        RECORD_COLUMNS,
        collection.name()
    ))
    .bind(local_id)
    .fetch_optional(db)
    .await?;

    row.map(Record::try_from).transpose()
}

/// Overwrites every stored attribute of `record`.
pub async fn update_record(
    db: &SqlitePool,
    collection: Collection,
    record: &Record,
) -> Result<(), AppError> {
    let body = serde_json::to_string(&record.payload)?;

    let affected = sqlx::query(&format!(
        r#"
        UPDATE {}
        SET remote_id = ?1,
            payload = ?2,
            sync_status = ?3,
            sync_operation = ?4,
            updated_at = ?5,
            deleted_at = ?6
        WHERE local_id = ?7
        "#,
        collection.name()
    ))
    .bind(&record.remote_id)
    .bind(body)
    .bind(record.sync_status.as_str())
    .bind(record.sync_operation.as_str())
    .bind(record.updated_at.to_rfc3339())
    .bind(record.deleted_at.map(|dt| dt.to_rfc3339()))
    .bind(record.local_id)
    .execute(db)
    .await?
    .rows_affected();

    if affected == 0 {
        return Err(AppError::NotFound);
    }
    Ok(())
}

/// Hard removal. Soft-delete bookkeeping is the caller's job.
pub async fn delete_record(
    db: &SqlitePool,
    collection: Collection,
    local_id: i64,
) -> Result<bool, AppError> {
    let affected = sqlx::query(&format!("DELETE FROM {} WHERE local_id = ?", collection.name()))
        .bind(local_id)
        .execute(db)
        .await?
        .rows_affected();

    Ok(affected > 0)
}

pub async fn list_records(db: &SqlitePool, collection: Collection) -> Result<Vec<Record>, AppError> {
    let rows = sqlx::query_as::<_, RecordRow>(&format!(
        "SELECT {} FROM {}",
        RECORD_COLUMNS,
        collection.name()
    ))
    .fetch_all(db)
    .await?;

    rows.into_iter().map(Record::try_from).collect()
}

pub async fn list_pending_ids(db: &SqlitePool, collection: Collection) -> Result<Vec<i64>, AppError> {
    let ids = sqlx::query_scalar::<_, i64>(&format!(
        "SELECT local_id FROM {} WHERE sync_status = 'pending'",
        collection.name()
    ))
    .fetch_all(db)
    .await?;

    Ok(ids)
}

pub async fn count_pending(db: &SqlitePool, collection: Collection) -> Result<i64, AppError> {
    let count = sqlx::query_scalar::<_, i64>(&format!(
        "SELECT COUNT(*) FROM {} WHERE sync_status = 'pending'",
        collection.name()
    ))
    .fetch_one(db)
    .await?;

    Ok(count)
}

pub async fn count_all_pending(db: &SqlitePool) -> Result<i64, AppError> {
    let mut total = 0;
    for collection in Collection::ALL {
        total += count_pending(db, collection).await?;
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn setup_test_db() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .expect("Failed to create test db");

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .expect("Failed to run migrations");

        pool
    }

    fn payload(value: serde_json::Value) -> Payload {
        value.as_object().cloned().expect("object payload")
    }

    #[tokio::test]
    async fn test_add_and_get_record() {
        let pool = setup_test_db().await;

        let id = add_record(
            &pool,
            Collection::AttendanceMarks,
            &payload(json!({ "student_id": "s-1", "status": "present" })),
        )
        .await
        .expect("Failed to add record");

        let record = get_record(&pool, Collection::AttendanceMarks, id)
            .await
            .expect("Failed to get record")
            .expect("Record not found");

        assert_eq!(record.local_id, id);
        assert_eq!(record.sync_status, SyncStatus::Pending);
        assert_eq!(record.sync_operation, SyncOperation::Create);
        assert!(record.remote_id.is_none());
        assert_eq!(record.payload["status"], "present");

        // collections are separate partitions
        let other = get_record(&pool, Collection::GradeEntries, id).await.unwrap();
        assert!(other.is_none());
    }

    #[tokio::test]
    async fn test_local_ids_are_not_reused() {
        let pool = setup_test_db().await;
        let body = payload(json!({ "body": "late twice" }));

        let first = add_record(&pool, Collection::StudentNotes, &body).await.unwrap();
        assert!(delete_record(&pool, Collection::StudentNotes, first).await.unwrap());
        let second = add_record(&pool, Collection::StudentNotes, &body).await.unwrap();

        assert!(second > first);
    }

    #[tokio::test]
    async fn test_update_record() {
        let pool = setup_test_db().await;
        let id = add_record(&pool, Collection::GradeEntries, &payload(json!({ "score": 71 })))
            .await
            .unwrap();

        let mut record = get_record(&pool, Collection::GradeEntries, id).await.unwrap().unwrap();
        record.remote_id = Some("g-100".to_string());
        record.sync_status = SyncStatus::Synced;
        record.payload.insert("score".to_string(), json!(75));
        update_record(&pool, Collection::GradeEntries, &record).await.unwrap();

        let stored = get_record(&pool, Collection::GradeEntries, id).await.unwrap().unwrap();
        assert_eq!(stored.remote_id.as_deref(), Some("g-100"));
        assert_eq!(stored.sync_status, SyncStatus::Synced);
        assert_eq!(stored.payload["score"], 75);
    }

    #[tokio::test]
    async fn test_update_missing_record_is_not_found() {
        let pool = setup_test_db().await;
        let id = add_record(&pool, Collection::GradeEntries, &payload(json!({ "score": 50 })))
            .await
            .unwrap();
        let mut record = get_record(&pool, Collection::GradeEntries, id).await.unwrap().unwrap();
        record.local_id = id + 41;

        let result = update_record(&pool, Collection::GradeEntries, &record).await;
        assert!(matches!(result, Err(AppError::NotFound)));
    }

    #[tokio::test]
    async fn test_pending_counts() {
        let pool = setup_test_db().await;
        let body = payload(json!({ "status": "absent" }));

        add_record(&pool, Collection::AttendanceMarks, &body).await.unwrap();
        let id = add_record(&pool, Collection::AttendanceMarks, &body).await.unwrap();
        add_record(&pool, Collection::StudentNotes, &payload(json!({ "body": "x" })))
            .await
            .unwrap();

        let mut record = get_record(&pool, Collection::AttendanceMarks, id).await.unwrap().unwrap();
        record.remote_id = Some("a-1".to_string());
        record.sync_status = SyncStatus::Synced;
        update_record(&pool, Collection::AttendanceMarks, &record).await.unwrap();

        assert_eq!(count_pending(&pool, Collection::AttendanceMarks).await.unwrap(), 1);
        assert_eq!(count_all_pending(&pool).await.unwrap(), 2);
        assert_eq!(list_pending_ids(&pool, Collection::AttendanceMarks).await.unwrap().len(), 1);
        assert_eq!(list_records(&pool, Collection::AttendanceMarks).await.unwrap().len(), 2);
    }
}
