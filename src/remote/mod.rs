pub mod dto;

use std::env;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, Url};
use serde_json::Value;

use crate::error::AppError;
use crate::models::Payload;
use crate::query::filter::Filter;

pub use dto::RemoteRow;

#[derive(Clone, Debug)]
pub struct RemoteConfig {
    pub base_url: String,
    pub api_key: Option<String>,
}

impl RemoteConfig {
    /// `None` when no remote service is configured.
    pub fn new_from_env() -> Option<Self> {
        let base_url = env::var("REMOTE_URL").ok().filter(|url| !url.is_empty())?;
        let api_key = env::var("REMOTE_API_KEY").ok().filter(|key| !key.is_empty());

        Some(Self { base_url, api_key })
    }
}

/// CRUD endpoint per remote table. Any error is treated as "retry later".
#[async_trait]
pub trait RemoteClient: Send + Sync {
    async fn insert(&self, table: &str, payload: &Payload) -> Result<RemoteRow, AppError>;
    async fn update(&self, table: &str, remote_id: &str, payload: &Payload) -> Result<(), AppError>;
    async fn delete(&self, table: &str, remote_id: &str) -> Result<(), AppError>;
    async fn select(&self, table: &str, filter: &Filter) -> Result<Vec<Value>, AppError>;
    async fn ping(&self) -> Result<(), AppError>;
}

/// Runs a remote call, failing with [`AppError::Timeout`] once `limit` elapses.
pub async fn bounded<T, F>(limit: Duration, call: F) -> Result<T, AppError>
where
    F: Future<Output = Result<T, AppError>>,
{
    tokio::time::timeout(limit, call)
        .await
        .map_err(|_| AppError::Timeout(limit))?
}

pub struct HttpRemoteClient {
    client: Client,
    config: RemoteConfig,
}

impl HttpRemoteClient {
    pub fn new(config: RemoteConfig) -> Result<Self, AppError> {
        let client = Client::builder()
            .build()
            .map_err(|e| AppError::Config(format!("Failed to build http client: {}", e)))?;
        Ok(Self { client, config })
    }

    fn table_url(&self, table: &str) -> Result<Url, AppError> {
        let raw = format!("{}/{}", self.config.base_url.trim_end_matches('/'), table);
        Url::parse(&raw).map_err(|e| AppError::Config(format!("invalid remote url {}: {}", raw, e)))
    }

    fn row_url(&self, table: &str, remote_id: &str) -> Result<Url, AppError> {
        let mut url = self.table_url(table)?;
        url.query_pairs_mut().append_pair("id", &format!("eq.{}", remote_id));
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let builder = self.client.request(method, url);
        match &self.config.api_key {
            Some(key) => builder
                .header("apikey", key)
                .header("Authorization", format!("Bearer {}", key)),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder, context: &str) -> Result<Response, AppError> {
        let response = builder
            .send()
            .await
            .map_err(|e| AppError::remote(None, format!("{}: {}", context, e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::remote(
                Some(status.as_u16()),
                format!("{} failed with {}: {}", context, status, body),
            ));
        }

        Ok(response)
    }
}

#[async_trait]
impl RemoteClient for HttpRemoteClient {
    async fn insert(&self, table: &str, payload: &Payload) -> Result<RemoteRow, AppError> {
        let url = self.table_url(table)?;
        let builder = self
            .request(Method::POST, url)
            .header("Prefer", "return=representation")
            .json(payload);

        let response = self.send(builder, &format!("insert into {}", table)).await?;
        let rows: Vec<Value> = response
            .json()
            .await
            .map_err(|e| AppError::remote(None, format!("unreadable insert response: {}", e)))?;

        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| AppError::remote(None, format!("insert into {} returned no row", table)))?;
        RemoteRow::from_value(row)
    }

    async fn update(&self, table: &str, remote_id: &str, payload: &Payload) -> Result<(), AppError> {
        let url = self.row_url(table, remote_id)?;
        let builder = self
            .request(Method::PATCH, url)
            .header("Prefer", "return=minimal")
            .json(payload);

        self.send(builder, &format!("update {} {}", table, remote_id)).await?;
        Ok(())
    }

    async fn delete(&self, table: &str, remote_id: &str) -> Result<(), AppError> {
        let url = self.row_url(table, remote_id)?;
        self.send(
            self.request(Method::DELETE, url),
            &format!("delete {} {}", table, remote_id),
        )
        .await?;
        Ok(())
    }

    async fn select(&self, table: &str, filter: &Filter) -> Result<Vec<Value>, AppError> {
        let mut url = self.table_url(table)?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("select", "*");
            for (key, value) in filter.to_query_pairs() {
                query.append_pair(&key, &value);
            }
        }

        let response = self
            .send(self.request(Method::GET, url), &format!("select from {}", table))
            .await?;
        response
            .json()
            .await
            .map_err(|e| AppError::remote(None, format!("unreadable select response: {}", e)))
    }

    async fn ping(&self) -> Result<(), AppError> {
        let url = Url::parse(&self.config.base_url)
            .map_err(|e| AppError::Config(format!("invalid remote url: {}", e)))?;

        let response = self
            .request(Method::GET, url)
            .send()
            .await
            .map_err(|e| AppError::remote(None, e.to_string()))?;

        // any answer short of a server fault means the service is reachable
        if response.status().is_server_error() {
            return Err(AppError::remote(Some(response.status().as_u16()), "remote unhealthy"));
        }
        Ok(())
    }
}

/// Stand-in when no remote service is configured; every call fails so
/// all records stay pending locally.
pub struct OfflineRemoteClient;

#[async_trait]
impl RemoteClient for OfflineRemoteClient {
    async fn insert(&self, _table: &str, _payload: &Payload) -> Result<RemoteRow, AppError> {
        Err(AppError::remote(None, "no remote service configured"))
    }

    async fn update(&self, _table: &str, _remote_id: &str, _payload: &Payload) -> Result<(), AppError> {
        Err(AppError::remote(None, "no remote service configured"))
    }

    async fn delete(&self, _table: &str, _remote_id: &str) -> Result<(), AppError> {
        Err(AppError::remote(None, "no remote service configured"))
    }

    async fn select(&self, _table: &str, _filter: &Filter) -> Result<Vec<Value>, AppError> {
        Err(AppError::remote(None, "no remote service configured"))
    }

    async fn ping(&self) -> Result<(), AppError> {
        Err(AppError::remote(None, "no remote service configured"))
    }
}
