//! Caller cancellation.
//!
//! Reads race the caller's token and give up with `EngineError::Cancelled`.
//! Writes check the token once, before anything is sent to the store. From
//! then on the store write and its cache invalidation run on a detached task
//! that is awaited to completion, so a cancelled or dropped caller never
//! leaves a committed write without its invalidation.

use std::future::Future;
use tablebook_core::{EngineError, EngineResult};
use tokio_util::sync::CancellationToken;

/// Fail fast if the caller has already given up.
pub fn ensure_live(cancel: &CancellationToken) -> EngineResult<()> {
    if cancel.is_cancelled() {
        Err(EngineError::Cancelled)
    } else {
        Ok(())
    }
}

/// Run a read, abandoning it as soon as `cancel` fires.
pub async fn cancellable<T, F>(cancel: &CancellationToken, fut: F) -> EngineResult<T>
where
    F: Future<Output = EngineResult<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(EngineError::Cancelled),
        result = fut => result,
    }
}

/// Run a write-then-invalidate sequence as one unit.
///
/// Checked against `cancel` before starting; once started it always
/// finishes, even if the caller's future is dropped.
pub async fn commit<T, F>(cancel: &CancellationToken, work: F) -> EngineResult<T>
where
    T: Send + 'static,
    F: Future<Output = EngineResult<T>> + Send + 'static,
{
    ensure_live(cancel)?;
    tokio::spawn(work)
        .await
        .map_err(|e| EngineError::Internal(format!("write task failed: {}", e)))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_cancelled_read_returns_cancelled() {
        let token = CancellationToken::new();
        token.cancel();
        let result: EngineResult<u32> = cancellable(&token, async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(1)
        })
        .await;
        assert!(matches!(result, Err(EngineError::Cancelled)));
    }

    #[tokio::test]
    async fn test_live_read_completes() {
        let token = CancellationToken::new();
        let result = cancellable(&token, async { Ok(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_commit_refuses_after_cancel() {
        let token = CancellationToken::new();
        token.cancel();
        let ran = Arc::new(AtomicBool::new(false));
        let flag = ran.clone();
        let result = commit(&token, async move {
            flag.store(true, Ordering::SeqCst);
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(EngineError::Cancelled)));
        assert!(!ran.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_commit_finishes_when_caller_drops() {
        let token = CancellationToken::new();
        let (tx, rx) = tokio::sync::oneshot::channel();
        let caller = commit(&token, async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            let _ = tx.send(());
            Ok(())
        });
        // Poll once so the task is spawned, then drop the caller.
        let _ = tokio::time::timeout(Duration::from_millis(1), caller).await;
        token.cancel();
        assert!(tokio::time::timeout(Duration::from_secs(1), rx).await.is_ok());
    }
}
