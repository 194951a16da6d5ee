//! REST operations the tracker consumes.
//!
//! [`TaskApi`] is the seam between the tracker and the task server. The
//! production implementation is [`HttpTaskApi`]; tests substitute their
//! own.
//!
//! | Operation | Request | Response |
//! |---|---|---|
//! | create | `POST {base}/tasks` with JSON params | `{ "task_id": "..." }` |
//! | status | `GET {base}/tasks/{id}` | [`Task`] |
//! | cancel | `POST {base}/tasks/{id}/cancel` | `{ "success": bool }` |

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use url::Url;

use crate::config::ApiConfig;
use crate::error::TransportError;
use crate::types::task::{CancelTaskResponse, CreateTaskResponse, Task};

/// Task server operations.
#[async_trait]
pub trait TaskApi: Send + Sync {
    /// Starts background work and returns the new task's id.
    async fn create_task(&self, params: &Value) -> Result<CreateTaskResponse, TransportError>;

    /// Fetches the current snapshot of a task.
    async fn get_task_status(&self, task_id: &str) -> Result<Task, TransportError>;

    /// Requests cancellation of a task.
    async fn cancel_task(&self, task_id: &str) -> Result<CancelTaskResponse, TransportError>;
}

/// [`TaskApi`] over HTTP with JSON bodies.
#[derive(Debug, Clone)]
pub struct HttpTaskApi {
    base_url: Url,
    client: reqwest::Client,
}

impl HttpTaskApi {
    /// Creates a client from configuration.
    ///
    /// # Errors
    ///
    /// [`TransportError::Connection`] if the HTTP client cannot be built.
    pub fn new(config: &ApiConfig) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| TransportError::classify_reqwest(&e))?;
        Ok(Self::with_client(config.base_url.clone(), client))
    }

    /// Creates a client around an existing `reqwest::Client`.
    pub fn with_client(mut base_url: Url, client: reqwest::Client) -> Self {
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Self { base_url, client }
    }

    /// Returns the API base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url, TransportError> {
        self.base_url
            .join(path)
            .map_err(|e| TransportError::Connection {
                message: format!("invalid endpoint '{path}': {e}"),
            })
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, TransportError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Http {
                status: status.as_u16(),
                body,
            });
        }
        response
            .json::<T>()
            .await
            .map_err(|e| TransportError::classify_reqwest(&e))
    }
}

#[async_trait]
impl TaskApi for HttpTaskApi {
    async fn create_task(&self, params: &Value) -> Result<CreateTaskResponse, TransportError> {
        let url = self.endpoint("tasks")?;
        let response = self
            .client
            .post(url)
            .json(params)
            .send()
            .await
            .map_err(|e| TransportError::classify_reqwest(&e))?;
        Self::decode(response).await
    }

    async fn get_task_status(&self, task_id: &str) -> Result<Task, TransportError> {
        let url = self.endpoint(&format!("tasks/{}", encode_segment(task_id)))?;
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| TransportError::classify_reqwest(&e))?;
        let mut task: Task = Self::decode(response).await?;
        if task.id.is_empty() {
            task.id = task_id.to_string();
        }
        Ok(task)
    }

    async fn cancel_task(&self, task_id: &str) -> Result<CancelTaskResponse, TransportError> {
        let url = self.endpoint(&format!("tasks/{}/cancel", encode_segment(task_id)))?;
        let response = self
            .client
            .post(url)
            .send()
            .await
            .map_err(|e| TransportError::classify_reqwest(&e))?;
        Self::decode(response).await
    }
}

/// Percent-encodes an id for use as a single path segment.
fn encode_segment(segment: &str) -> String {
    url::form_urlencoded::byte_serialize(segment.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}
