//! User-visible notices: a self-clearing error message and the
//! degraded-connectivity banner.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

#[derive(Debug, Default)]
struct NoticeState {
    transient: Option<String>,
    generation: u64,
    degraded: bool,
}

/// Shared notice state. Clones observe the same notices.
#[derive(Debug, Clone, Default)]
pub struct Notices {
    state: Arc<Mutex<NoticeState>>,
}

impl Notices {
    /// No notices showing.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Show `message`, replacing any current transient message, and clear
    /// it after `ttl` unless a newer message replaced it first.
    ///
    /// Outside a tokio runtime the message stays until cleared explicitly.
    pub fn flash(&self, message: impl Into<String>, ttl: Duration) {
        let message = message.into();
        let generation = {
            let mut state = self.state.lock();
            state.generation += 1;
            state.transient = Some(message.clone());
            state.generation
        };
        tracing::info!(message = %message, ttl_ms = ttl.as_millis(), "transient notice");

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::debug!("no runtime, notice will not self-clear");
            return;
        };
        let state = Arc::clone(&self.state);
        runtime.spawn(async move {
            tokio::time::sleep(ttl).await;
            let mut state = state.lock();
            if state.generation == generation {
                state.transient = None;
            }
        });
    }

    /// Clear the transient message now.
    pub fn clear_transient(&self) {
        let mut state = self.state.lock();
        if state.transient.take().is_some() {
            state.generation += 1;
        }
    }

    /// The transient message, if one is showing.
    #[must_use]
    pub fn transient(&self) -> Option<String> {
        self.state.lock().transient.clone()
    }

    /// Raise or lower the degraded-connectivity banner.
    pub fn set_degraded(&self, degraded: bool) {
        let mut state = self.state.lock();
        if state.degraded != degraded {
            tracing::info!(degraded, "connectivity banner changed");
        }
        state.degraded = degraded;
    }

    /// Whether the degraded-connectivity banner is up.
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        self.state.lock().degraded
    }

    /// Drop every notice.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.transient = None;
        state.generation += 1;
        state.degraded = false;
    }
}
