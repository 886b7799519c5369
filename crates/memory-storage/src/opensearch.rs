//! OpenSearch REST client.
//!
//! Talks to the document, bulk, search and index-admin endpoints over
//! reqwest. Transient failures (transport errors, 429, 5xx) are retried
//! with exponential backoff; everything else is returned immediately.
//! The scripted access increment is not idempotent, so it is sent once.

use std::time::Duration;

use async_trait::async_trait;
use backoff::{backoff::Backoff, ExponentialBackoffBuilder};
use chrono::{DateTime, Utc};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode, Url};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use tracing::{debug, error, warn};

use memory_search::{format_timestamp, ACCESS_UPDATE_SCRIPT};
use memory_types::OpenSearchSettings;

use crate::error::StorageError;
use crate::store::{MemoryStore, SearchResponse};

/// Connection settings for [`OpenSearchStore`].
#[derive(Debug, Clone)]
pub struct OpenSearchConfig {
    /// Base URL, e.g. `http://localhost:9200`
    pub url: String,
    pub username: Option<String>,
    pub password: Option<SecretString>,
    /// Per-request timeout
    pub timeout: Duration,
    /// Attempts per request, including the first
    pub max_retries: u32,
    /// First retry delay
    pub initial_backoff: Duration,
}

impl OpenSearchConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            username: None,
            password: None,
            timeout: Duration::from_secs(30),
            max_retries: 3,
            initial_backoff: Duration::from_millis(200),
        }
    }

    pub fn from_settings(settings: &OpenSearchSettings) -> Self {
        Self {
            url: settings.url.clone(),
            username: settings.username.clone(),
            password: settings.password.clone().map(SecretString::from),
            timeout: Duration::from_secs(settings.timeout_secs),
            max_retries: settings.max_retries.max(1),
            initial_backoff: Duration::from_millis(200),
        }
    }

    pub fn with_basic_auth(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = Some(username.into());
        self.password = Some(SecretString::from(password.into()));
        self
    }

    pub fn with_retries(mut self, max_retries: u32, initial_backoff: Duration) -> Self {
        self.max_retries = max_retries.max(1);
        self.initial_backoff = initial_backoff;
        self
    }
}

/// [`MemoryStore`] backed by an OpenSearch cluster.
pub struct OpenSearchStore {
    client: Client,
    base: Url,
    config: OpenSearchConfig,
}

impl OpenSearchStore {
    pub fn new(config: OpenSearchConfig) -> Result<Self, StorageError> {
        let base = Url::parse(&config.url)
            .map_err(|e| StorageError::Config(format!("invalid url '{}': {}", config.url, e)))?;
        if base.cannot_be_a_base() {
            return Err(StorageError::Config(format!(
                "url '{}' cannot be a base",
                config.url
            )));
        }
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| StorageError::Config(e.to_string()))?;

        Ok(Self {
            client,
            base,
            config,
        })
    }

    /// Base URL joined with percent-encoded path segments.
    fn url(&self, segments: &[&str]) -> Result<Url, StorageError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| StorageError::Config(format!("url '{}' cannot be a base", self.base)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let builder = self.client.request(method, url);
        match (&self.config.username, &self.config.password) {
            (Some(user), Some(pass)) => builder.basic_auth(user, Some(pass.expose_secret())),
            (Some(user), None) => builder.basic_auth(user, None::<&str>),
            _ => builder,
        }
    }

    /// Send with retry. `build` is called once per attempt.
    ///
    /// Returns the response for any non-transient status; callers decide
    /// what 404 means.
    async fn send<F>(&self, op: &str, build: F) -> Result<Response, StorageError>
    where
        F: Fn() -> RequestBuilder,
    {
        self.send_attempts(op, self.config.max_retries, build).await
    }

    /// Send exactly one attempt. For requests whose side effect must not
    /// be applied twice when a response is lost.
    async fn send_once<F>(&self, op: &str, build: F) -> Result<Response, StorageError>
    where
        F: Fn() -> RequestBuilder,
    {
        self.send_attempts(op, 1, build).await
    }

    async fn send_attempts<F>(
        &self,
        op: &str,
        max_attempts: u32,
        build: F,
    ) -> Result<Response, StorageError>
    where
        F: Fn() -> RequestBuilder,
    {
        let mut backoff = ExponentialBackoffBuilder::new()
            .with_initial_interval(self.config.initial_backoff)
            .with_max_elapsed_time(Some(self.config.timeout * max_attempts.max(1)))
            .build();

        let mut attempts = 0;

        loop {
            attempts += 1;
            debug!(op, attempt = attempts, "Sending store request");

            let e = match build().send().await {
                Ok(response) if is_transient_status(response.status()) => {
                    let status = response.status().as_u16();
                    let body = response.text().await.unwrap_or_default();
                    StorageError::Status { status, body }
                }
                Ok(response) => return Ok(response),
                Err(e) => StorageError::from(e),
            };

            if attempts >= max_attempts {
                error!(op, attempts, error = %e, "Store request failed, giving up");
                return Err(e);
            }

            match backoff.next_backoff() {
                Some(duration) => {
                    warn!(
                        op,
                        error = %e,
                        retry_in_ms = duration.as_millis() as u64,
                        "Store request failed, retrying"
                    );
                    tokio::time::sleep(duration).await;
                }
                None => {
                    error!(op, error = %e, "Backoff exhausted");
                    return Err(e);
                }
            }
        }
    }
}

fn is_transient_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// Turn a non-success response into an error, recognising missing indices.
async fn status_error(index: &str, response: Response) -> StorageError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    if status == StatusCode::NOT_FOUND && body.contains("index_not_found_exception") {
        return StorageError::IndexNotFound(index.to_string());
    }
    StorageError::Status {
        status: status.as_u16(),
        body,
    }
}

async fn read_json(response: Response) -> Result<Value, StorageError> {
    response
        .json::<Value>()
        .await
        .map_err(|e| StorageError::Serialization(e.to_string()))
}

/// NDJSON body for a bulk access update.
fn access_bulk_body(index: &str, ids: &[String], timestamp: DateTime<Utc>) -> String {
    let ts = format_timestamp(&timestamp);
    let mut body = String::new();
    for id in ids {
        let action = json!({ "update": { "_index": index, "_id": id } });
        let script = json!({
            "script": {
                "source": ACCESS_UPDATE_SCRIPT,
                "lang": "painless",
                "params": { "timestamp": ts }
            }
        });
        body.push_str(&action.to_string());
        body.push('\n');
        body.push_str(&script.to_string());
        body.push('\n');
    }
    body
}

/// Count items of a bulk response whose status is 2xx.
fn count_bulk_successes(response: &Value) -> usize {
    response
        .get("items")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter(|item| {
                    item.as_object()
                        .and_then(|obj| obj.values().next())
                        .and_then(|op| op.get("status"))
                        .and_then(Value::as_u64)
                        .map(|s| (200..300).contains(&s))
                        .unwrap_or(false)
                })
                .count()
        })
        .unwrap_or(0)
}

#[async_trait]
impl MemoryStore for OpenSearchStore {
    async fn index_document(
        &self,
        index: &str,
        id: &str,
        document: &Value,
    ) -> Result<(), StorageError> {
        let mut url = self.url(&[index, "_doc", id])?;
        url.query_pairs_mut().append_pair("refresh", "true");

        let response = self
            .send("index", || self.request(Method::PUT, url.clone()).json(document))
            .await?;
        if !response.status().is_success() {
            return Err(status_error(index, response).await);
        }
        debug!(index, id, "Indexed document");
        Ok(())
    }

    async fn get_document(&self, index: &str, id: &str) -> Result<Option<Value>, StorageError> {
        let url = self.url(&[index, "_doc", id])?;
        let response = self
            .send("get", || self.request(Method::GET, url.clone()))
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(status_error(index, response).await);
        }
        let body = read_json(response).await?;
        if body.get("found").and_then(Value::as_bool) == Some(false) {
            return Ok(None);
        }
        Ok(body.get("_source").cloned())
    }

    async fn exists(&self, index: &str, id: &str) -> Result<bool, StorageError> {
        let url = self.url(&[index, "_doc", id])?;
        let response = self
            .send("exists", || self.request(Method::HEAD, url.clone()))
            .await?;
        match response.status() {
            s if s.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            _ => Err(status_error(index, response).await),
        }
    }

    async fn update_access(
        &self,
        index: &str,
        ids: &[String],
        timestamp: DateTime<Utc>,
    ) -> Result<usize, StorageError> {
        if ids.is_empty() {
            return Ok(0);
        }
        let url = self.url(&["_bulk"])?;
        let body = access_bulk_body(index, ids, timestamp);

        let response = self
            .send_once("bulk", || {
                self.request(Method::POST, url.clone())
                    .header("Content-Type", "application/x-ndjson")
                    .body(body.clone())
            })
            .await?;
        if !response.status().is_success() {
            return Err(status_error(index, response).await);
        }
        let body = read_json(response).await?;
        let updated = count_bulk_successes(&body);
        if updated < ids.len() {
            warn!(
                index,
                requested = ids.len(),
                updated,
                "Some access updates were rejected"
            );
        }
        Ok(updated)
    }

    async fn search(&self, index: &str, body: &Value) -> Result<SearchResponse, StorageError> {
        let url = self.url(&[index, "_search"])?;
        let response = self
            .send("search", || self.request(Method::POST, url.clone()).json(body))
            .await?;
        if !response.status().is_success() {
            return Err(status_error(index, response).await);
        }
        let body = read_json(response).await?;
        SearchResponse::from_opensearch(&body)
    }

    async fn index_exists(&self, index: &str) -> Result<bool, StorageError> {
        let url = self.url(&[index])?;
        let response = self
            .send("index_exists", || self.request(Method::HEAD, url.clone()))
            .await?;
        match response.status() {
            s if s.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            _ => Err(status_error(index, response).await),
        }
    }

    async fn create_index(&self, index: &str, body: &Value) -> Result<(), StorageError> {
        let url = self.url(&[index])?;
        let response = self
            .send("create_index", || self.request(Method::PUT, url.clone()).json(body))
            .await?;
        if !response.status().is_success() {
            return Err(status_error(index, response).await);
        }
        Ok(())
    }

    async fn get_mapping(&self, index: &str) -> Result<Value, StorageError> {
        let url = self.url(&[index, "_mapping"])?;
        let response = self
            .send("get_mapping", || self.request(Method::GET, url.clone()))
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(StorageError::IndexNotFound(index.to_string()));
        }
        if !response.status().is_success() {
            return Err(status_error(index, response).await);
        }
        read_json(response).await
    }
}
