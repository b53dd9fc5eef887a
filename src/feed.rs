use crate::models::MovieDetail;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// A cancellable subscription to a cache collection's live query.
///
/// The first `next` yields the current snapshot; later calls wait for the
/// next committed mutation. Cancelling the token (or calling `unsubscribe`)
/// ends the subscription and makes `next` return `None`.
pub struct Subscription<T> {
    rx: watch::Receiver<Vec<MovieDetail>>,
    project: fn(&MovieDetail) -> T,
    cancel: CancellationToken,
    primed: bool,
}

impl<T> Subscription<T> {
    pub fn new(
        rx: watch::Receiver<Vec<MovieDetail>>,
        project: fn(&MovieDetail) -> T,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            rx,
            project,
            cancel,
            primed: false,
        }
    }

    /// Latest snapshot without waiting.
    pub fn current(&self) -> Vec<T> {
        self.rx.borrow().iter().map(self.project).collect()
    }

    pub async fn next(&mut self) -> Option<Vec<T>> {
        if self.cancel.is_cancelled() {
            return None;
        }
        if !self.primed {
            self.primed = true;
            return Some(self.take());
        }
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            changed = self.rx.changed() => match changed {
                Ok(()) => Some(self.take()),
                Err(_) => None,
            },
        }
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn unsubscribe(self) {
        self.cancel.cancel();
    }

    fn take(&mut self) -> Vec<T> {
        self.rx.borrow_and_update().iter().map(self.project).collect()
    }
}
