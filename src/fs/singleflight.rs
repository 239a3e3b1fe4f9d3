//! Keyed deduplication of concurrent calls.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use futures::future::{BoxFuture, FutureExt, Shared};
use tracing::trace;

use crate::error::{DriveError, Result};

type SharedCall<T> = Shared<BoxFuture<'static, std::result::Result<T, Arc<DriveError>>>>;

/// At most one call per key is in flight; later callers with the same key
/// await the running call and receive a clone of its result.
pub(crate) struct SingleFlight<T: Clone> {
    calls: Mutex<HashMap<String, SharedCall<T>>>,
}

impl<T> SingleFlight<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(HashMap::new()),
        }
    }

    /// Run `call` under `key`, or join the call already running under it.
    ///
    /// Errors reach every waiter as [`DriveError::Shared`].
    pub async fn run<F>(&self, key: &str, call: F) -> Result<T>
    where
        F: FnOnce() -> BoxFuture<'static, Result<T>>,
    {
        let shared = {
            let mut calls = self.calls.lock().unwrap_or_else(|e| e.into_inner());
            match calls.get(key) {
                Some(running) => {
                    trace!(key, "joining in-flight call");
                    running.clone()
                }
                None => {
                    let fut = call().map(|r| r.map_err(Arc::new)).boxed().shared();
                    calls.insert(key.to_string(), fut.clone());
                    fut
                }
            }
        };

        let result = shared.clone().await;

        // A newer call may already sit under this key; only remove our own.
        let mut calls = self.calls.lock().unwrap_or_else(|e| e.into_inner());
        if calls.get(key).is_some_and(|running| running.ptr_eq(&shared)) {
            calls.remove(key);
        }
        drop(calls);

        result.map_err(DriveError::Shared)
    }

    #[cfg(test)]
    pub fn in_flight(&self) -> usize {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_concurrent_calls_share_one_execution() {
        let flight = SingleFlight::<u32>::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let run = || {
            let calls = calls.clone();
            flight.run("root", move || {
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    Ok(7)
                }
                .boxed()
            })
        };

        let (a, b, c) = tokio::join!(run(), run(), run());
        assert_eq!((a.unwrap(), b.unwrap(), c.unwrap()), (7, 7, 7));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(flight.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_sequential_calls_run_again() {
        let flight = SingleFlight::<u32>::new();
        let calls = Arc::new(AtomicUsize::new(0));

        for _ in 0..2 {
            let calls = calls.clone();
            flight
                .run("k", move || {
                    async move { Ok(calls.fetch_add(1, Ordering::SeqCst) as u32) }.boxed()
                })
                .await
                .unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_error_reaches_every_waiter() {
        let flight = SingleFlight::<u32>::new();

        let run = || {
            flight.run("missing", || {
                async {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    Err(DriveError::NotFound("/x".to_string()))
                }
                .boxed()
            })
        };

        let (a, b) = tokio::join!(run(), run());
        assert!(a.unwrap_err().is_not_found());
        assert!(b.unwrap_err().is_not_found());
    }
}
