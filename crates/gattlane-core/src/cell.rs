//! One-shot completion cells bridging radio callbacks to the lane
//!
//! A cell is armed by the lane before it issues an asynchronous radio request
//! and is settled exactly once by the callback that reports the outcome. The
//! callback side never blocks: settling takes a short lock and wakes waiters.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::Notify;
use tracing::warn;

use crate::error::{BleError, Result};

struct CellInner<T> {
    label: &'static str,
    outcome: Mutex<Option<Result<T>>>,
    notify: Notify,
}

/// Write-once, read-many result holder
pub struct CompletionCell<T> {
    inner: Arc<CellInner<T>>,
}

impl<T> Clone for CompletionCell<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Clone> std::fmt::Debug for CompletionCell<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionCell")
            .field("label", &self.inner.label)
            .field("resolved", &self.slot().is_some())
            .finish()
    }
}

impl<T: Clone> CompletionCell<T> {
    /// Create an unresolved cell. `label` names the operation in log output.
    pub fn new(label: &'static str) -> Self {
        Self {
            inner: Arc::new(CellInner {
                label,
                outcome: Mutex::new(None),
                notify: Notify::new(),
            }),
        }
    }

    pub fn label(&self) -> &'static str {
        self.inner.label
    }

    /// Resolve with a value. Returns `false` if the cell was already settled.
    pub fn resolve(&self, value: T) -> bool {
        self.settle(Ok(value))
    }

    /// Resolve with an error. Returns `false` if the cell was already settled.
    pub fn reject(&self, error: BleError) -> bool {
        self.settle(Err(error))
    }

    pub fn is_resolved(&self) -> bool {
        self.slot().is_some()
    }

    /// Current outcome without waiting
    pub fn peek(&self) -> Option<Result<T>> {
        self.slot().clone()
    }

    /// Wait until the cell is settled and return its outcome
    pub async fn wait(&self) -> Result<T> {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(outcome) = self.peek() {
                return outcome;
            }
            notified.await;
        }
    }

    /// Wait with an optional upper bound
    pub async fn wait_for(&self, limit: Option<Duration>) -> Result<T> {
        let Some(limit) = limit else {
            return self.wait().await;
        };
        match tokio::time::timeout(limit, self.wait()).await {
            Ok(outcome) => outcome,
            Err(_) => Err(BleError::OperationTimedOut {
                operation: self.inner.label,
                after_ms: limit.as_millis() as u64,
            }),
        }
    }

    fn settle(&self, outcome: Result<T>) -> bool {
        let mut slot = self.slot();
        if slot.is_some() {
            drop(slot);
            warn!(
                cell = self.inner.label,
                "completion cell settled twice; keeping the first outcome"
            );
            return false;
        }
        *slot = Some(outcome);
        drop(slot);
        self.inner.notify.notify_waiters();
        true
    }

    fn slot(&self) -> MutexGuard<'_, Option<Result<T>>> {
        self.inner
            .outcome
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::GattStatus;

    #[tokio::test]
    async fn test_resolved_value_is_returned_to_every_waiter() {
        let cell = CompletionCell::new("read");
        assert!(cell.resolve(vec![1u8, 2, 3]));

        assert_eq!(cell.wait().await, Ok(vec![1, 2, 3]));
        assert_eq!(cell.clone().wait().await, Ok(vec![1, 2, 3]));
    }

    #[tokio::test]
    async fn test_second_settlement_is_ignored() {
        let cell: CompletionCell<()> = CompletionCell::new("connect");
        assert!(cell.reject(BleError::ConnectionFailed(GattStatus::Failure)));
        assert!(!cell.resolve(()));
        assert!(!cell.reject(BleError::ConnectionLost));

        assert_eq!(
            cell.wait().await,
            Err(BleError::ConnectionFailed(GattStatus::Failure))
        );
    }

    #[test]
    fn test_wait_stays_pending_until_settled() {
        let cell: CompletionCell<u8> = CompletionCell::new("read");
        let mut waiting = tokio_test::task::spawn(cell.wait());

        tokio_test::assert_pending!(waiting.poll());
        cell.resolve(4);
        assert!(waiting.is_woken());
        assert_eq!(tokio_test::assert_ready!(waiting.poll()), Ok(4));
    }

    #[tokio::test]
    async fn test_wait_unblocks_when_resolved_from_another_thread() {
        let cell: CompletionCell<u32> = CompletionCell::new("discover");
        let remote = cell.clone();

        let worker = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            remote.resolve(7);
        });

        assert_eq!(cell.wait().await, Ok(7));
        worker.join().unwrap();
    }

    #[test]
    fn test_debug_shows_label_and_resolution() {
        let cell: CompletionCell<Vec<u8>> = CompletionCell::new("read");
        assert_eq!(
            format!("{:?}", cell),
            "CompletionCell { label: \"read\", resolved: false }"
        );
        cell.resolve(vec![1]);
        assert!(format!("{:?}", cell).contains("resolved: true"));
    }

    #[tokio::test]
    async fn test_wait_for_times_out_on_silent_radio() {
        let cell: CompletionCell<()> = CompletionCell::new("advertise");
        let outcome = cell.wait_for(Some(Duration::from_millis(10))).await;
        assert!(matches!(
            outcome,
            Err(BleError::OperationTimedOut { operation: "advertise", .. })
        ));
        assert!(!cell.is_resolved());
    }
}
