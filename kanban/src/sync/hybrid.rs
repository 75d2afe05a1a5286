//! Hybrid sync client with fallback.
//!
//! [`HybridSyncClient`] wraps an optional push-channel client and a
//! request/response client. Each operation goes through the push channel
//! while it is connected; if the channel is absent, disconnected, or the
//! emit fails, the same operation is retried once through the fallback.

use kanban_proto::api::{CreateTaskRequest, UpdateTaskRequest};
use kanban_proto::change::ReorderEntry;
use kanban_proto::task::{Task, TaskId};

use super::{
    BoardSource, Delivery, NotificationSource, SyncClient, SyncError, SyncEvent, SyncMode,
};

/// Sync client that prefers one transport and falls back to another.
///
/// # Type Parameters
///
/// - `P`: The preferred client (e.g., the push channel).
/// - `F`: The fallback client (e.g., HTTP).
pub struct HybridSyncClient<P, F> {
    preferred: Option<P>,
    fallback: F,
}

impl<P: SyncClient, F: SyncClient> HybridSyncClient<P, F> {
    /// Create a hybrid client. `preferred` is `None` when the push channel
    /// could not be opened.
    #[must_use]
    pub const fn new(preferred: Option<P>, fallback: F) -> Self {
        Self {
            preferred,
            fallback,
        }
    }

    /// The preferred client, if present.
    pub const fn preferred(&self) -> Option<&P> {
        self.preferred.as_ref()
    }

    /// The fallback client.
    pub const fn fallback(&self) -> &F {
        &self.fallback
    }

    /// The preferred client if it can carry operations right now.
    fn active_preferred(&self) -> Option<&P> {
        self.preferred.as_ref().filter(|p| p.is_connected())
    }
}

/// Try the preferred client, then the fallback. Returns the first success
/// or the fallback's error.
macro_rules! try_each {
    ($self:ident, $op:literal, |$client:ident| $call:expr) => {{
        if let Some($client) = $self.active_preferred() {
            match $call.await {
                Ok(delivery) => return Ok(delivery),
                Err(err) => {
                    tracing::debug!(
                        op = $op,
                        mode = %$client.mode(),
                        err = %err,
                        "preferred sync client failed, trying fallback"
                    );
                }
            }
        }
        let $client = &$self.fallback;
        $call.await
    }};
}

impl<P: SyncClient, F: SyncClient> SyncClient for HybridSyncClient<P, F> {
    async fn create(&self, request: CreateTaskRequest) -> Result<Delivery<Task>, SyncError> {
        try_each!(self, "create", |client| client.create(request.clone()))
    }

    async fn update(
        &self,
        id: &TaskId,
        request: UpdateTaskRequest,
    ) -> Result<Delivery<Task>, SyncError> {
        try_each!(self, "update", |client| client.update(id, request.clone()))
    }

    async fn delete(&self, id: &TaskId) -> Result<Delivery<()>, SyncError> {
        try_each!(self, "delete", |client| client.delete(id))
    }

    async fn reorder(
        &self,
        user_id: &str,
        tasks: &[ReorderEntry],
    ) -> Result<Delivery<()>, SyncError> {
        try_each!(self, "reorder", |client| client.reorder(user_id, tasks))
    }

    fn is_connected(&self) -> bool {
        self.active_preferred().is_some() || self.fallback.is_connected()
    }

    fn mode(&self) -> SyncMode {
        self.active_preferred()
            .map_or_else(|| self.fallback.mode(), P::mode)
    }
}

impl<P, F: BoardSource> BoardSource for HybridSyncClient<P, F>
where
    P: Send + Sync,
{
    async fn fetch_all(&self, user_id: &str) -> Result<Vec<Task>, SyncError> {
        self.fallback.fetch_all(user_id).await
    }
}

impl<P: NotificationSource, F: Send + Sync> NotificationSource for HybridSyncClient<P, F> {
    async fn next_event(&self) -> Option<SyncEvent> {
        match &self.preferred {
            Some(preferred) => preferred.next_event().await,
            None => None,
        }
    }
}
