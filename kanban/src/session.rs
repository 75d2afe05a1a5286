//! Session-scoped board store.
//!
//! A [`BoardSession`] owns the board for one signed-in user: it bulk-loads
//! the tasks when the session starts and drops them when it ends. The
//! [`BoardHandle`] it hands out is the single mutation path shared by the
//! reconciliation controller and the change router, which also share the
//! session's [`PendingMoves`].

use std::sync::Arc;

use kanban_proto::change::Change;
use parking_lot::Mutex;
use tokio::sync::watch;

use crate::board::Board;
use crate::config::BoardSettings;
use crate::notice::Notices;
use crate::reconcile::PendingMoves;
use crate::sync::{BoardSource, SyncError};

/// Shared, lock-protected board.
///
/// Every write bumps a revision counter that watchers can follow with
/// [`BoardHandle::subscribe`]. The lock is only held for the duration of
/// one synchronous call.
#[derive(Debug, Clone)]
pub struct BoardHandle {
    board: Arc<Mutex<Board>>,
    revision: Arc<watch::Sender<u64>>,
}

impl Default for BoardHandle {
    fn default() -> Self {
        Self::new(Board::new())
    }
}

impl BoardHandle {
    /// Wrap `board`.
    #[must_use]
    pub fn new(board: Board) -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            board: Arc::new(Mutex::new(board)),
            revision: Arc::new(revision),
        }
    }

    /// Deep copy of the current board.
    #[must_use]
    pub fn snapshot(&self) -> Board {
        self.board.lock().clone()
    }

    /// Apply a change.
    pub fn apply(&self, change: &Change) {
        self.board.lock().apply(change);
        self.bump();
    }

    /// Replace the whole board, e.g. with an earlier snapshot.
    pub fn restore(&self, board: Board) {
        *self.board.lock() = board;
        self.bump();
    }

    /// Empty the board back to its three default lanes.
    pub fn clear(&self) {
        self.board.lock().clear();
        self.bump();
    }

    /// Run `f` against the current board.
    pub fn read<R>(&self, f: impl FnOnce(&Board) -> R) -> R {
        f(&self.board.lock())
    }

    /// Run `f` with the board locked for writing.
    ///
    /// Nothing else reads or writes the board until `f` returns. The
    /// revision is bumped only when `f` returns `Some`; return `None` after
    /// leaving the board as it was.
    pub fn write<R>(&self, f: impl FnOnce(&mut Board) -> Option<R>) -> Option<R> {
        let result = f(&mut self.board.lock());
        if result.is_some() {
            self.bump();
        }
        result
    }

    /// Current revision. Starts at zero and grows with every write.
    #[must_use]
    pub fn revision(&self) -> u64 {
        *self.revision.borrow()
    }

    /// Receiver that wakes on every write.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    fn bump(&self) {
        self.revision.send_modify(|rev| *rev += 1);
    }
}

/// The board and notices of one signed-in user.
#[derive(Debug, Clone)]
pub struct BoardSession {
    user_id: String,
    board: BoardHandle,
    notices: Notices,
    pending: PendingMoves,
    settings: BoardSettings,
}

impl BoardSession {
    /// Start a session: fetch the user's tasks and build the board.
    ///
    /// # Errors
    ///
    /// Returns the [`SyncError`] of the bulk fetch.
    pub async fn start(
        user_id: &str,
        source: &impl BoardSource,
        settings: BoardSettings,
    ) -> Result<Self, SyncError> {
        let tasks = source.fetch_all(user_id).await?;
        let board = Board::from_tasks(tasks);
        tracing::info!(user_id, tasks = board.len(), "board session started");
        Ok(Self {
            user_id: user_id.to_string(),
            board: BoardHandle::new(board),
            notices: Notices::new(),
            pending: PendingMoves::new(),
            settings,
        })
    }

    /// The signed-in user.
    #[must_use]
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// The shared board.
    #[must_use]
    pub const fn board(&self) -> &BoardHandle {
        &self.board
    }

    /// The shared notices.
    #[must_use]
    pub const fn notices(&self) -> &Notices {
        &self.notices
    }

    /// Pushed moves awaiting their outcome.
    #[must_use]
    pub const fn pending_moves(&self) -> &PendingMoves {
        &self.pending
    }

    /// Board settings this session was started with.
    #[must_use]
    pub const fn settings(&self) -> &BoardSettings {
        &self.settings
    }

    /// End the session: empty the board and drop every notice.
    pub fn end(&self) {
        self.board.clear();
        self.notices.reset();
        self.pending.clear();
        tracing::info!(user_id = %self.user_id, "board session ended");
    }
}
