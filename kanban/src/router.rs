//! Change event router: feeds inbound notifications into the board.
//!
//! Changes are applied through the board model unconditionally. They are
//! idempotent, so echoes of this client's own intents are harmless, and the
//! last notification to arrive wins. An echo or rejection of a pushed move
//! resolves it in the session's [`PendingMoves`]; a rejected move is rolled
//! back to its snapshot. Connection events drive the degraded-connectivity
//! banner.

use std::sync::Arc;
use std::time::Duration;

use kanban_proto::change::Change;
use kanban_proto::channel::TASK_REORDER;

use crate::notice::Notices;
use crate::reconcile::{MOVE_FAILED, PendingMoves};
use crate::session::{BoardHandle, BoardSession};
use crate::sync::{ConnectionEvent, NotificationSource, SyncEvent};

/// Routes [`SyncEvent`]s to the board and notices.
#[derive(Debug, Clone)]
pub struct ChangeRouter {
    board: BoardHandle,
    notices: Notices,
    pending: PendingMoves,
    notice_ttl: Duration,
}

impl ChangeRouter {
    /// Router writing into `board` and `notices`. Server rejections are
    /// flashed for `notice_ttl`. Pushed moves are not tracked; see
    /// [`ChangeRouter::for_session`].
    #[must_use]
    pub fn new(board: BoardHandle, notices: Notices, notice_ttl: Duration) -> Self {
        Self {
            board,
            notices,
            pending: PendingMoves::new(),
            notice_ttl,
        }
    }

    /// Router for `session`, resolving the moves its controllers push.
    #[must_use]
    pub fn for_session(session: &BoardSession) -> Self {
        Self::new(
            session.board().clone(),
            session.notices().clone(),
            session.settings().notice_ttl,
        )
        .with_pending_moves(session.pending_moves().clone())
    }

    /// Resolve pushed moves against `pending`.
    #[must_use]
    pub fn with_pending_moves(mut self, pending: PendingMoves) -> Self {
        self.pending = pending;
        self
    }

    /// Handle one event.
    pub fn route(&self, event: SyncEvent) {
        match event {
            SyncEvent::Change(change) => {
                tracing::debug!(kind = change.kind(), "applying remote change");
                self.board.apply(&change);
                if let Change::Reorder { tasks } = &change {
                    if let Some(token) = self.pending.confirm(tasks) {
                        tracing::debug!(token = %token, "pushed move confirmed");
                    }
                }
            }
            SyncEvent::Connection(event) => self.route_connection(event),
            SyncEvent::Rejected { event, reason } => {
                if event.as_deref() == Some(TASK_REORDER) {
                    if let Some(staged) = self.pending.reject_oldest() {
                        tracing::warn!(token = %staged.token(), reason = %reason, "pushed move rejected, rolling back");
                        let snapshot = staged.snapshot().clone();
                        self.board.restore(snapshot);
                        self.notices.flash(MOVE_FAILED, self.notice_ttl);
                        return;
                    }
                }
                tracing::warn!(event = ?event, reason = %reason, "intent rejected");
                self.notices
                    .flash(format!("Failed to save changes: {reason}"), self.notice_ttl);
            }
        }
    }

    fn route_connection(&self, event: ConnectionEvent) {
        match event {
            ConnectionEvent::Connected => {
                tracing::info!("push channel connected");
                self.notices.set_degraded(false);
                return;
            }
            ConnectionEvent::ConnectionError(reason) => {
                tracing::warn!(reason = %reason, "push channel error");
            }
            ConnectionEvent::Disconnected => {
                tracing::warn!("push channel disconnected");
            }
            ConnectionEvent::Reconnecting {
                attempt,
                max_attempts,
            } => {
                tracing::info!(attempt, max_attempts, "push channel reconnecting");
            }
            ConnectionEvent::ReconnectFailed => {
                tracing::warn!("push channel reconnect failed");
            }
        }
        self.notices.set_degraded(true);
        // Answers to intents sent on the lost connection never arrive.
        let dropped = self.pending.clear();
        if dropped > 0 {
            tracing::warn!(dropped, "outcome of pushed moves unknown after channel loss");
        }
    }

    /// Drive `source` until it ends, routing every event.
    pub async fn run(&self, source: &impl NotificationSource) {
        while let Some(event) = source.next_event().await {
            self.route(event);
        }
        tracing::info!("notification source closed");
    }

    /// Spawn [`ChangeRouter::run`] on a tokio task.
    pub fn spawn<N>(self, source: Arc<N>) -> tokio::task::JoinHandle<()>
    where
        N: NotificationSource + 'static,
    {
        tokio::spawn(async move { self.run(source.as_ref()).await })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use kanban_proto::change::{Change, ReorderEntry};
    use kanban_proto::task::{Category, Task, TaskId};

    use super::*;
    use crate::board::Board;
    use crate::sync::memory::MemorySyncClient;

    fn router() -> (ChangeRouter, BoardHandle, Notices) {
        let board = BoardHandle::new(Board::from_tasks(vec![
            Task::new("a", "A", Category::ToDo, 0),
            Task::new("b", "B", Category::ToDo, 1),
        ]));
        let notices = Notices::new();
        let router = ChangeRouter::new(board.clone(), notices.clone(), Duration::from_secs(5));
        (router, board, notices)
    }

    #[test]
    fn remote_changes_are_applied() {
        let (router, board, _) = router();
        router.route(SyncEvent::Change(Change::Reorder {
            tasks: vec![ReorderEntry::new("a", Category::Done, 0)],
        }));
        router.route(SyncEvent::Change(Change::Delete {
            task_id: TaskId::new("b"),
        }));
        let snapshot = board.snapshot();
        assert_eq!(snapshot.lane(&Category::Done).len(), 1);
        assert!(snapshot.lane(&Category::ToDo).is_empty());
    }

    #[test]
    fn echoed_create_is_idempotent() {
        let (router, board, _) = router();
        let change = Change::Create {
            task: Task::new("c", "C", Category::ToDo, 2),
        };
        router.route(SyncEvent::Change(change.clone()));
        let once = board.snapshot();
        router.route(SyncEvent::Change(change));
        assert_eq!(board.snapshot(), once);
    }

    #[test]
    fn connection_events_drive_banner() {
        let (router, _, notices) = router();
        router.route(SyncEvent::Connection(ConnectionEvent::ConnectionError(
            "reset".to_string(),
        )));
        assert!(notices.is_degraded());
        router.route(SyncEvent::Connection(ConnectionEvent::Connected));
        assert!(!notices.is_degraded());
        router.route(SyncEvent::Connection(ConnectionEvent::Disconnected));
        assert!(notices.is_degraded());
    }

    #[tokio::test]
    async fn rejection_flashes_notice() {
        let (router, _, notices) = router();
        router.route(SyncEvent::Rejected {
            event: Some("taskDelete".to_string()),
            reason: "task ghost not found".to_string(),
        });
        assert_eq!(
            notices.transient().as_deref(),
            Some("Failed to save changes: task ghost not found")
        );
    }

    #[tokio::test]
    async fn reorder_rejection_without_pending_move_only_flashes() {
        let (router, board, notices) = router();
        let before = board.snapshot();
        router.route(SyncEvent::Rejected {
            event: Some(TASK_REORDER.to_string()),
            reason: "task ghost not found".to_string(),
        });
        assert_eq!(board.snapshot(), before);
        assert!(notices.transient().unwrap().starts_with("Failed to save changes:"));
    }

    #[test]
    fn reconnect_keeps_banner_until_connected() {
        let (router, _, notices) = router();
        router.route(SyncEvent::Connection(ConnectionEvent::Disconnected));
        router.route(SyncEvent::Connection(ConnectionEvent::Reconnecting {
            attempt: 1,
            max_attempts: 3,
        }));
        assert!(notices.is_degraded());
        router.route(SyncEvent::Connection(ConnectionEvent::Connected));
        assert!(!notices.is_degraded());
        router.route(SyncEvent::Connection(ConnectionEvent::ReconnectFailed));
        assert!(notices.is_degraded());
    }

    #[tokio::test]
    async fn spawned_router_follows_source() {
        let (router, board, _) = router();
        let source = Arc::new(MemorySyncClient::new());
        let mut changed = board.subscribe();
        let handle = router.spawn(Arc::clone(&source));

        source.inject(Change::Update {
            task: Task::new("a", "Renamed", Category::ToDo, 0),
        });
        tokio::time::timeout(Duration::from_secs(5), changed.changed())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(board.snapshot().find(&TaskId::new("a")).unwrap().title, "Renamed");
        handle.abort();
    }
}
