//! Cooperative cancellation and request deadlines.
//!
//! Every network call made while answering a question is raced against a
//! [`CancelSignal`]. The signal fires when its [`CancelHandle`] is cancelled
//! or dropped (a dropped HTTP handler future drops its handle), or when the
//! request deadline passes.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

use crate::error::{AppError, AppResult};

/// Owner side of a cancellation pair. Cancels its signal when dropped.
#[derive(Debug)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    /// Request cancellation of every clone of the paired signal.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

impl Drop for CancelHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Observer side of a cancellation pair, cheap to clone.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
    deadline: Option<Instant>,
}

/// Deadline for a timeout in whole seconds; zero means no deadline.
pub fn deadline_from_secs(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

/// Create a linked handle/signal pair with an optional deadline measured from now.
pub fn cancel_pair(timeout: Option<Duration>) -> (CancelHandle, CancelSignal) {
    let (tx, rx) = watch::channel(false);
    let handle = CancelHandle { tx: Arc::new(tx) };
    let signal = CancelSignal {
        rx,
        deadline: timeout.map(|t| Instant::now() + t),
    };
    (handle, signal)
}

impl CancelSignal {
    /// A signal that never fires and has no deadline.
    pub fn never() -> Self {
        // The sender is dropped right away; a closed channel never reports `true`.
        let (_tx, rx) = watch::channel(false);
        Self { rx, deadline: None }
    }

    /// Whether cancellation was requested or the deadline has passed.
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow() || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Time left before the deadline, if one is set.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// Run `fut` unless the request is cancelled or its deadline passes first.
    ///
    /// `stage` names the pipeline step in the returned `Cancelled` error.
    pub async fn guard<T, F>(&self, stage: &str, fut: F) -> AppResult<T>
    where
        F: Future<Output = AppResult<T>>,
    {
        if *self.rx.borrow() {
            return Err(AppError::Cancelled(format!("{} cancelled", stage)));
        }

        let mut rx = self.rx.clone();
        let cancelled = async move {
            loop {
                if *rx.borrow_and_update() {
                    return;
                }
                if rx.changed().await.is_err() {
                    std::future::pending::<()>().await;
                }
            }
        };

        let deadline = self.deadline;
        let expired = async move {
            match deadline {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = cancelled => Err(AppError::Cancelled(format!("{} cancelled", stage))),
            _ = expired => Err(AppError::Cancelled(format!("{} exceeded the request deadline", stage))),
            result = fut => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_guard_passes_through_result() {
        let signal = CancelSignal::never();
        let value = signal.guard("embed", async { Ok::<_, AppError>(42) }).await;
        assert_eq!(value.unwrap(), 42);
        assert!(!signal.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancel_aborts_pending_future() {
        let (handle, signal) = cancel_pair(None);
        let waiter = tokio::spawn(async move {
            signal
                .guard("retrieve", async {
                    std::future::pending::<()>().await;
                    Ok::<_, AppError>(())
                })
                .await
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        handle.cancel();

        let result = waiter.await.unwrap();
        assert!(matches!(result, Err(AppError::Cancelled(msg)) if msg.contains("retrieve")));
    }

    #[tokio::test]
    async fn test_dropping_handle_cancels() {
        let (handle, signal) = cancel_pair(None);
        drop(handle);
        assert!(signal.is_cancelled());
        let result = signal.guard("rerank", async { Ok::<_, AppError>(()) }).await;
        assert!(matches!(result, Err(AppError::Cancelled(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_seconds_means_no_deadline() {
        assert_eq!(deadline_from_secs(0), None);
        assert_eq!(deadline_from_secs(3), Some(Duration::from_secs(3)));

        let (_handle, signal) = cancel_pair(deadline_from_secs(0));
        assert!(signal.remaining().is_none());
        let result = signal
            .guard("embed", async {
                tokio::time::sleep(Duration::from_millis(20)).await;
                Ok::<_, AppError>(1)
            })
            .await;
        assert_eq!(result.unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_expires() {
        let (_handle, signal) = cancel_pair(Some(Duration::from_secs(5)));
        let result = signal
            .guard("synthesize", async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok::<_, AppError>(())
            })
            .await;
        assert!(matches!(result, Err(AppError::Cancelled(msg)) if msg.contains("deadline")));
    }
}
