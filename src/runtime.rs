//! In-process stand-in for the durable-execution substrate: saga tasks,
//! activities with timeouts and retries, and result handles.
//!
//! Crash recovery is not provided here; `HoldService::reconcile` covers holds
//! whose saga was lost.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{Instrument, info_span, warn};

use crate::domain::{Error, Id, LedgerError};
use crate::retry::RetryPolicy;

/// Handle to a running saga.
#[derive(Debug)]
pub struct SagaHandle<T> {
    id: String,
    join: JoinHandle<Result<T, Error>>,
}

impl<T> SagaHandle<T> {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Waits for the saga's terminal result.
    pub async fn result(self) -> Result<T, Error> {
        match self.join.await {
            Ok(result) => result,
            Err(e) => {
                warn!(saga_id = %self.id, error = %e, "saga task did not complete");
                Err(Error::SagaAborted(self.id))
            }
        }
    }
}

pub fn saga_id(kind: &str) -> String {
    format!("{}-{}", Id::generate(), kind)
}

/// Runs `body` as an independent saga. The body receives its own saga id.
pub fn start_saga<T, F, Fut>(kind: &str, body: F) -> SagaHandle<T>
where
    T: Send + 'static,
    F: FnOnce(String) -> Fut,
    Fut: Future<Output = Result<T, Error>> + Send + 'static,
{
    let id = saga_id(kind);
    let span = info_span!("saga", saga_id = %id, kind);
    let join = tokio::spawn(body(id.clone()).instrument(span));
    SagaHandle { id, join }
}

/// Runs one activity: each attempt is bounded by `timeout`, transient
/// failures are retried per `retry`, and the last error is returned once
/// attempts run out. Rejections are never retried.
pub async fn execute_activity<T, F, Fut>(
    name: &'static str,
    timeout: Duration,
    retry: &RetryPolicy,
    mut op: F,
) -> Result<T, LedgerError>
where
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = Result<T, LedgerError>>,
{
    let mut attempt = 0;
    loop {
        let err = match tokio::time::timeout(timeout, op(attempt)).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(err)) => err,
            Err(_) => LedgerError::Timeout(name),
        };
        attempt += 1;
        if !err.is_transient() || attempt >= retry.max_attempts {
            return Err(err);
        }
        let delay = retry.next_delay(attempt - 1);
        warn!(
            activity = name,
            attempt,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "activity failed, retrying"
        );
        tokio::time::sleep(delay).await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::domain::RejectReason;

    #[tokio::test(start_paused = true)]
    async fn retries_transient_failures() {
        let calls = Arc::new(AtomicUsize::new(0));
        let policy = RetryPolicy::new(3, 10, 100, 0.0);

        let counter = Arc::clone(&calls);
        let result = execute_activity("flaky", Duration::from_secs(1), &policy, move |_| {
            let counter = Arc::clone(&counter);
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(LedgerError::Unavailable("down".to_string()))
                } else {
                    Ok(7)
                }
            }
        })
        .await;

        assert_eq!(result, Ok(7));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_attempts() {
        let calls = Arc::new(AtomicUsize::new(0));
        let policy = RetryPolicy::new(2, 10, 100, 0.0);

        let counter = Arc::clone(&calls);
        let result: Result<(), _> =
            execute_activity("slow", Duration::from_millis(5), &policy, move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                async {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    Ok(())
                }
            })
            .await;

        assert_eq!(result, Err(LedgerError::Timeout("slow")));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn rejection_is_not_retried() {
        let calls = Arc::new(AtomicUsize::new(0));
        let policy = RetryPolicy::new(5, 1, 1, 0.0);

        let counter = Arc::clone(&calls);
        let result: Result<(), _> =
            execute_activity("reject", Duration::from_secs(1), &policy, move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Err(LedgerError::rejected(Id(1), RejectReason::ExceedsCredits)) }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn saga_result_and_id() {
        let handle = start_saga("authorization-workflow", |id| async move { Ok(id.len()) });
        let id = handle.id().to_string();
        assert!(id.ends_with("-authorization-workflow"));
        assert_eq!(handle.result().await.unwrap(), id.len());
    }
}
