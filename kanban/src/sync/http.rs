//! Request/response sync client over HTTP.
//!
//! Every operation is a single round trip against the REST endpoints of the
//! remote store; the response body is the authoritative result. Used on its
//! own or as the fallback of [`super::hybrid::HybridSyncClient`].

use std::time::Duration;

use kanban_proto::api::{CreateTaskRequest, ErrorBody, ReorderRequest, ReorderResponse, UpdateTaskRequest};
use kanban_proto::change::ReorderEntry;
use kanban_proto::task::{Task, TaskId};
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use url::Url;

use super::{BoardSource, Delivery, SyncClient, SyncError, SyncMode};

/// HTTP client for the remote task store.
#[derive(Debug, Clone)]
pub struct HttpSyncClient {
    client: Client,
    base_url: Url,
}

impl HttpSyncClient {
    /// Creates a client for the store at `base_url` with a per-request timeout.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Transport`] if the URL is invalid or the HTTP
    /// client cannot be built.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, SyncError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| SyncError::Transport(format!("invalid base url {base_url}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(SyncError::Transport(format!(
                "base url {base_url} cannot carry a path"
            )));
        }
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(map_reqwest_error)?;
        Ok(Self { client, base_url })
    }

    /// The base URL this client talks to.
    #[must_use]
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Builds the URL of an endpoint below the base URL.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }
}

impl SyncClient for HttpSyncClient {
    async fn create(&self, request: CreateTaskRequest) -> Result<Delivery<Task>, SyncError> {
        let response = self
            .client
            .post(self.endpoint(&["tasks"]))
            .json(&request)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        let task: Task = read_json(response).await?;
        tracing::debug!(task_id = %task.id, category = %task.category, "task created");
        Ok(Delivery::Confirmed(task))
    }

    async fn update(
        &self,
        id: &TaskId,
        request: UpdateTaskRequest,
    ) -> Result<Delivery<Task>, SyncError> {
        let response = self
            .client
            .put(self.endpoint(&["tasks", id.as_str()]))
            .json(&request)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        Ok(Delivery::Confirmed(read_json(response).await?))
    }

    async fn delete(&self, id: &TaskId) -> Result<Delivery<()>, SyncError> {
        let response = self
            .client
            .delete(self.endpoint(&["tasks", id.as_str()]))
            .send()
            .await
            .map_err(map_reqwest_error)?;
        check_status(response).await?;
        Ok(Delivery::Confirmed(()))
    }

    async fn reorder(
        &self,
        user_id: &str,
        tasks: &[ReorderEntry],
    ) -> Result<Delivery<()>, SyncError> {
        let body = ReorderRequest {
            tasks: tasks.to_vec(),
        };
        let response = self
            .client
            .put(self.endpoint(&["tasks", "reorder", user_id]))
            .json(&body)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        let result: ReorderResponse = read_json(response).await?;
        if result.success {
            Ok(Delivery::Confirmed(()))
        } else {
            Err(SyncError::Conflict("store rejected the new order".to_string()))
        }
    }

    fn is_connected(&self) -> bool {
        true
    }

    fn mode(&self) -> SyncMode {
        SyncMode::Request
    }
}

impl BoardSource for HttpSyncClient {
    async fn fetch_all(&self, user_id: &str) -> Result<Vec<Task>, SyncError> {
        let response = self
            .client
            .get(self.endpoint(&["tasks", user_id]))
            .send()
            .await
            .map_err(map_reqwest_error)?;
        let tasks: Vec<Task> = read_json(response).await?;
        tracing::info!(user_id, count = tasks.len(), "fetched tasks");
        Ok(tasks)
    }
}

/// Turns a non-success response into the matching [`SyncError`].
///
/// 409 maps to [`SyncError::Conflict`]; any other failure status maps to
/// [`SyncError::Status`]. The reason comes from the `{"error": ..}` body
/// when present.
async fn check_status(response: Response) -> Result<Response, SyncError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = match serde_json::from_str::<ErrorBody>(&body) {
        Ok(parsed) => parsed.error,
        Err(_) if body.is_empty() => status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string(),
        Err(_) => body,
    };

    tracing::warn!(status = status.as_u16(), message = %message, "remote store rejected request");
    if status == StatusCode::CONFLICT {
        Err(SyncError::Conflict(message))
    } else {
        Err(SyncError::Status {
            status: status.as_u16(),
            message,
        })
    }
}

/// Checks the status and decodes a JSON body.
async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, SyncError> {
    let response = check_status(response).await?;
    let bytes = response.bytes().await.map_err(map_reqwest_error)?;
    serde_json::from_slice(&bytes).map_err(|e| SyncError::Malformed(e.to_string()))
}

/// Map a `reqwest` error to a [`SyncError`].
fn map_reqwest_error(err: reqwest::Error) -> SyncError {
    if err.is_timeout() {
        SyncError::Timeout
    } else if err.is_decode() {
        SyncError::Malformed(err.to_string())
    } else {
        SyncError::Transport(err.to_string())
    }
}
