#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;
use tokio::sync::Notify;

use school_sync::connectivity::Connectivity;
use school_sync::error::AppError;
use school_sync::models::Payload;
use school_sync::query::Filter;
use school_sync::remote::{RemoteClient, RemoteRow};
use school_sync::state::AppState;

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Insert(String),
    Update(String, String),
    Delete(String, String),
    Select(String),
}

/// In-memory remote service with failure injection.
#[derive(Default)]
pub struct MockRemote {
    tables: Mutex<HashMap<String, Vec<Value>>>,
    calls: Mutex<Vec<Call>>,
    failing: AtomicBool,
    fail_when: Mutex<Option<(String, Value)>>,
    hold: AtomicBool,
    pub entered: Notify,
    pub release: Notify,
}

impl MockRemote {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Every call fails while set.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Inserts and updates whose payload has `field == value` fail.
    pub fn fail_when(&self, field: &str, value: impl Into<Value>) {
        *self.fail_when.lock().unwrap() = Some((field.to_string(), value.into()));
    }

    /// Writes park until `release` is notified.
    pub fn hold_writes(&self, hold: bool) {
        self.hold.store(hold, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, matcher: impl Fn(&Call) -> bool) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| matcher(c)).count()
    }

    pub fn inserts(&self) -> usize {
        self.count(|c| matches!(c, Call::Insert(_)))
    }

    pub fn rows(&self, table: &str) -> Vec<Value> {
        self.tables.lock().unwrap().get(table).cloned().unwrap_or_default()
    }

    async fn enter(&self, call: Call, payload: Option<&Payload>) -> Result<(), AppError> {
        self.calls.lock().unwrap().push(call);

        if self.hold.load(Ordering::SeqCst) {
            self.entered.notify_one();
            self.release.notified().await;
        }

        if self.failing.load(Ordering::SeqCst) {
            return Err(AppError::remote(Some(503), "service unavailable"));
        }

        let rejected = match (payload, self.fail_when.lock().unwrap().as_ref()) {
            (Some(payload), Some((field, value))) => payload.get(field) == Some(value),
            _ => false,
        };
        if rejected {
            return Err(AppError::remote(Some(500), "rejected by remote"));
        }

        Ok(())
    }
}

#[async_trait]
impl RemoteClient for MockRemote {
    async fn insert(&self, table: &str, payload: &Payload) -> Result<RemoteRow, AppError> {
        self.enter(Call::Insert(table.to_string()), Some(payload)).await?;

        let mut row = payload.clone();
        row.insert("id".to_string(), Value::String(uuid::Uuid::new_v4().to_string()));
        let row = Value::Object(row);
        self.tables
            .lock()
            .unwrap()
            .entry(table.to_string())
            .or_default()
            .push(row.clone());

        RemoteRow::from_value(row)
    }

    async fn update(&self, table: &str, remote_id: &str, payload: &Payload) -> Result<(), AppError> {
        self.enter(Call::Update(table.to_string(), remote_id.to_string()), Some(payload))
            .await?;

        let mut tables = self.tables.lock().unwrap();
        let row = tables
            .get_mut(table)
            .and_then(|rows| rows.iter_mut().find(|r| r["id"] == remote_id))
            .ok_or_else(|| AppError::remote(Some(404), "no such row"))?;
        if let Value::Object(fields) = row {
            fields.extend(payload.clone());
        }
        Ok(())
    }

    async fn delete(&self, table: &str, remote_id: &str) -> Result<(), AppError> {
        self.enter(Call::Delete(table.to_string(), remote_id.to_string()), None)
            .await?;

        if let Some(rows) = self.tables.lock().unwrap().get_mut(table) {
            rows.retain(|r| r["id"] != remote_id);
        }
        Ok(())
    }

    async fn select(&self, table: &str, filter: &Filter) -> Result<Vec<Value>, AppError> {
        self.enter(Call::Select(table.to_string()), None).await?;
        Ok(filter.apply(self.rows(table)))
    }

    async fn ping(&self) -> Result<(), AppError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(AppError::remote(None, "unreachable"));
        }
        Ok(())
    }
}

pub async fn setup_test_db() -> SqlitePool {
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

pub async fn setup_with(push_timeout: Duration, poll_interval: Duration) -> (AppState, Arc<MockRemote>) {
    let pool = setup_test_db().await;
    let remote = MockRemote::new();
    let state = AppState::new(
        pool,
        remote.clone(),
        Connectivity::new(false),
        poll_interval,
        push_timeout,
    );
    (state, remote)
}

/// Starts unreachable.
pub async fn setup() -> (AppState, Arc<MockRemote>) {
    setup_with(Duration::from_secs(5), Duration::from_secs(60)).await
}

/// Polls `check` until it holds or two seconds pass.
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..100 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}
