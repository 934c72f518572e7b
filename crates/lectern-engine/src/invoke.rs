//! Running synchronous capability calls from async stages
//!
//! Capabilities are blocking traits. Each call runs on the blocking pool under a
//! timeout; a stage's independent calls are dispatched with bounded concurrency and
//! come back in input order.

use crate::error::EngineError;
use futures::stream::{self, StreamExt};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

/// Run one capability call on the blocking pool, bounded by `call_timeout`
///
/// A timed-out call keeps running on its thread; its result is discarded.
pub(crate) async fn call_blocking<C, T, F>(
    capability: Arc<C>,
    call_timeout: Duration,
    call: F,
) -> Result<T, EngineError>
where
    C: Send + Sync + 'static + ?Sized,
    T: Send + 'static,
    F: FnOnce(&C) -> Result<T, String> + Send + 'static,
{
    let task = tokio::task::spawn_blocking(move || call(capability.as_ref()));

    match timeout(call_timeout, task).await {
        Err(_) => Err(EngineError::Timeout(call_timeout)),
        Ok(Err(join)) => Err(EngineError::Capability(format!("Task join error: {}", join))),
        Ok(Ok(result)) => result.map_err(EngineError::Capability),
    }
}

/// Dispatch one call per item, at most `limit` in flight, results in item order
///
/// Items not yet started when `cancel` fires are skipped and the whole dispatch
/// reports cancellation.
pub(crate) async fn dispatch_all<I, T, F, Fut>(
    items: Vec<I>,
    limit: usize,
    cancel: &CancellationToken,
    call: F,
) -> Result<Vec<T>, EngineError>
where
    F: Fn(I) -> Fut,
    Fut: Future<Output = T>,
{
    let call = &call;
    let results: Vec<Option<T>> = stream::iter(items)
        .map(|item| async move {
            if cancel.is_cancelled() {
                None
            } else {
                Some(call(item).await)
            }
        })
        .buffered(limit.max(1))
        .collect()
        .await;

    if cancel.is_cancelled() {
        return Err(EngineError::cancelled());
    }
    Ok(results.into_iter().flatten().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Doubler;

    #[tokio::test]
    async fn test_call_blocking_success_and_error() {
        let cap = Arc::new(Doubler);
        let ok = call_blocking(Arc::clone(&cap), Duration::from_secs(1), |_| Ok(21 * 2)).await;
        assert_eq!(ok.unwrap(), 42);

        let err: Result<u32, _> =
            call_blocking(cap, Duration::from_secs(1), |_| Err("boom".to_string())).await;
        assert!(matches!(err, Err(EngineError::Capability(m)) if m == "boom"));
    }

    #[tokio::test]
    async fn test_call_blocking_timeout() {
        let result: Result<(), _> =
            call_blocking(Arc::new(Doubler), Duration::from_millis(20), |_| {
                std::thread::sleep(Duration::from_millis(300));
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(EngineError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_dispatch_keeps_order() {
        let cancel = CancellationToken::new();
        let results = dispatch_all(vec![30u64, 1, 10], 3, &cancel, |ms| async move {
            tokio::time::sleep(Duration::from_millis(ms)).await;
            Ok::<_, EngineError>(ms)
        })
        .await
        .unwrap();
        let values: Vec<u64> = results.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(values, vec![30, 1, 10]);
    }

    #[tokio::test]
    async fn test_dispatch_stops_after_cancel() {
        let cancel = CancellationToken::new();
        let started = AtomicUsize::new(0);
        let result = dispatch_all(vec![1, 2, 3, 4], 1, &cancel, |i| {
            started.fetch_add(1, Ordering::SeqCst);
            if i == 2 {
                cancel.cancel();
            }
            async move { Ok::<_, EngineError>(i) }
        })
        .await;

        assert!(matches!(result, Err(e) if e.is_abort()));
        assert_eq!(started.load(Ordering::SeqCst), 2);
    }
}
