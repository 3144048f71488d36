//! Generic bounded retry with per-attempt delays and cooperative cancellation.
//!
//! Mirrors the shape of `timeutils.Retry[T]` in the source system: a finite
//! ordered list of delays, a producer, and a classifier that decides whether
//! the outcome of an attempt warrants another try. The primitive carries no
//! policy of its own — callers supply the classifier.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

use crate::error::{GophermartError, Result};

/// Cooperative cancellation token shared between a shutdown signal and
/// anything sleeping on a retry delay or a rate-limit wait. Cheap to clone;
/// all clones observe the same cancelled flag.
#[derive(Clone)]
pub struct Cancellation {
    cancelled: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl Cancellation {
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            notify: Arc::new(Notify::new()),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    /// Sleep for `dur`, waking early (and returning `Err`) if cancelled.
    pub async fn sleep(&self, dur: Duration) -> std::result::Result<(), ()> {
        if self.is_cancelled() {
            return Err(());
        }
        tokio::select! {
            _ = tokio::time::sleep(dur) => Ok(()),
            _ = self.notify.notified() => Err(()),
        }
    }

    /// Resolve once `cancel()` has been called (or immediately if it already
    /// has been). Used by the scheduler loop to race against its ticker.
    pub async fn cancelled(&self) {
        if self.is_cancelled() {
            return;
        }
        self.notify.notified().await;
    }
}

impl Default for Cancellation {
    fn default() -> Self {
        Self::new()
    }
}

/// Call `producer` up to `delays.len()` times. Between attempts, sleep the
/// corresponding delay. Stop as soon as `classifier` returns `false` for an
/// attempt's outcome, returning that outcome verbatim. If every attempt is
/// consumed without `classifier` returning `false`, return
/// `GophermartError::AllAttemptsFailed`. If `cancel` fires while a delay is
/// pending, abort immediately with `GophermartError::Cancelled`.
pub async fn retry<T, P, Fut, C>(
    delays: &[Duration],
    cancel: &Cancellation,
    mut producer: P,
    mut classifier: C,
) -> Result<T>
where
    P: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
    C: FnMut(&Result<T>) -> bool,
{
    for (attempt, delay) in delays.iter().enumerate() {
        if cancel.is_cancelled() {
            return Err(GophermartError::Cancelled);
        }

        let outcome = producer().await;
        let needs_retry = classifier(&outcome);
        if !needs_retry {
            return outcome;
        }

        let is_last = attempt + 1 == delays.len();
        if is_last {
            break;
        }

        if cancel.sleep(*delay).await.is_err() {
            return Err(GophermartError::Cancelled);
        }
    }

    Err(GophermartError::AllAttemptsFailed)
}

/// Always requests another attempt — used by tests and by callers who only
/// want the bounded-attempt-count behavior without a real classifier.
pub fn always_retry<T>(_outcome: &Result<T>) -> bool {
    true
}
