use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub const SEARCH_DEBOUNCE: Duration = Duration::from_millis(500);

/// Debounce-with-cancel for keystroke-driven searches.
///
/// Each `submit` cancels the previously scheduled search if it has not fired
/// yet, then schedules the new one after the quiet period. A search whose
/// delay has elapsed runs to completion even if a newer query arrives.
pub struct SearchDebouncer {
    delay: Duration,
    pending: Mutex<Option<CancellationToken>>,
}

impl SearchDebouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: Mutex::new(None),
        }
    }

    /// Returns `None` without scheduling anything when `query` is blank.
    /// The handle resolves to `None` if the search was superseded.
    pub fn submit<F, Fut>(&self, query: &str, action: F) -> Option<JoinHandle<Option<Fut::Output>>>
    where
        F: FnOnce(String) -> Fut + Send + 'static,
        Fut: Future + Send + 'static,
        Fut::Output: Send + 'static,
    {
        let query = query.trim();
        if query.is_empty() {
            return None;
        }

        let token = CancellationToken::new();
        if let Some(previous) = self.replace_pending(Some(token.clone())) {
            previous.cancel();
        }

        let delay = self.delay;
        let query = query.to_string();
        Some(tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = token.cancelled() => {
                    debug!("Search for '{}' superseded", query);
                    None
                }
                _ = tokio::time::sleep(delay) => Some(action(query).await),
            }
        }))
    }

    /// Drops any search still waiting for its quiet period.
    pub fn cancel(&self) {
        if let Some(previous) = self.replace_pending(None) {
            previous.cancel();
        }
    }

    fn replace_pending(&self, next: Option<CancellationToken>) -> Option<CancellationToken> {
        match self.pending.lock() {
            Ok(mut guard) => std::mem::replace(&mut *guard, next),
            Err(poisoned) => std::mem::replace(&mut *poisoned.into_inner(), next),
        }
    }
}

impl Default for SearchDebouncer {
    fn default() -> Self {
        Self::new(SEARCH_DEBOUNCE)
    }
}
