//! Single-flight memoized async resolution.
//!
//! [`Lazy`] wraps a resolver. The first call to [`Lazy::value`] starts it;
//! every call made before it settles awaits that same in-flight resolution,
//! so N concurrent readers of an unresolved node cause one fetch.
//!
//! # States
//!
//! ```text
//! Pending ──ok──▶ Resolved(value)   cached forever
//!    │
//!    └──err/None──▶ Error           never retried automatically
//! ```
//!
//! Failures are logged here and surface to callers as `None`; callers never
//! see an error value. Resolution runs as its own task on the current tokio
//! runtime, so a caller that is cancelled while waiting does not cancel the
//! fetch: later callers join the same in-flight task and no second fetch is
//! started.

use futures_util::FutureExt;
use futures_util::future::{self, BoxFuture, Shared};
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use tracing::warn;

type Resolver<T> = Box<dyn Fn() -> BoxFuture<'static, anyhow::Result<T>> + Send + Sync>;
type InFlight<T> = Shared<BoxFuture<'static, Option<T>>>;

/// Observable state of a [`Lazy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LazyState {
    /// Not yet settled (never started, or in flight).
    Pending,
    /// Settled with a value.
    Resolved,
    /// Settled with a failure; the value is `None` from now on.
    Error,
}

/// A value produced at most once by an async resolver.
pub struct Lazy<T> {
    label: Arc<str>,
    resolver: Option<Resolver<T>>,
    in_flight: Mutex<Option<InFlight<T>>>,
    settled: Arc<OnceLock<Option<T>>>,
}

impl<T> Lazy<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Wrap `resolver`. `label` identifies the value in logs.
    pub fn new<F, Fut>(label: impl Into<String>, resolver: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        Self {
            label: Arc::from(label.into()),
            resolver: Some(Box::new(move || resolver().boxed())),
            in_flight: Mutex::new(None),
            settled: Arc::new(OnceLock::new()),
        }
    }

    /// A lazy that is already resolved to `value`.
    pub fn resolved(label: impl Into<String>, value: T) -> Self {
        Self {
            label: Arc::from(label.into()),
            resolver: None,
            in_flight: Mutex::new(None),
            settled: Arc::new(OnceLock::from(Some(value))),
        }
    }

    /// Resolve (once) and return the value, or `None` if resolution failed.
    pub async fn value(&self) -> Option<T> {
        if let Some(settled) = self.settled.get() {
            return settled.clone();
        }
        let outcome = self.join_or_start().await;
        self.settled.get_or_init(|| outcome).clone()
    }

    /// The cached value, without starting resolution.
    pub fn get(&self) -> Option<&T> {
        self.settled.get().and_then(Option::as_ref)
    }

    pub fn state(&self) -> LazyState {
        match self.settled.get() {
            None => LazyState::Pending,
            Some(Some(_)) => LazyState::Resolved,
            Some(None) => LazyState::Error,
        }
    }

    fn join_or_start(&self) -> InFlight<T> {
        let mut slot = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        slot.get_or_insert_with(|| self.start()).clone()
    }

    fn start(&self) -> InFlight<T> {
        let Some(resolver) = &self.resolver else {
            return future::ready(None).boxed().shared();
        };

        let work = resolver();
        let label = Arc::clone(&self.label);
        let settled = Arc::clone(&self.settled);
        let settle = async move {
            let outcome = match work.await {
                Ok(value) => Some(value),
                Err(error) => {
                    warn!(lazy = %label, error = %error, "lazy resolution failed");
                    None
                }
            };
            settled.get_or_init(|| outcome).clone()
        };

        // Outside a runtime the shared future is polled by its callers
        // instead; it is still a single resolution.
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return settle.boxed().shared();
        };
        let task = runtime.spawn(settle);
        let label = Arc::clone(&self.label);
        async move {
            task.await.unwrap_or_else(|error| {
                warn!(lazy = %label, error = %error, "lazy resolver task failed");
                None
            })
        }
        .boxed()
        .shared()
    }
}

impl<T> fmt::Debug for Lazy<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.settled.get() {
            None => "pending",
            Some(Some(_)) => "resolved",
            Some(None) => "error",
        };
        f.debug_struct("Lazy")
            .field("label", &self.label)
            .field("state", &state)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn counting_lazy(calls: Arc<AtomicUsize>, fail: bool) -> Lazy<String> {
        Lazy::new("test", move || {
            let calls = Arc::clone(&calls);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                if fail {
                    anyhow::bail!("relay unreachable");
                }
                Ok("payload".to_string())
            }
        })
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_resolution() {
        let calls = Arc::new(AtomicUsize::new(0));
        let lazy = Arc::new(counting_lazy(Arc::clone(&calls), false));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let lazy = Arc::clone(&lazy);
            handles.push(tokio::spawn(async move { lazy.value().await }));
        }
        for handle in handles {
            assert_eq!(handle.await.expect("join"), Some("payload".to_string()));
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(lazy.state(), LazyState::Resolved);
        assert_eq!(lazy.get().map(String::as_str), Some("payload"));
    }

    #[tokio::test]
    async fn failure_yields_none_and_is_not_retried() {
        let calls = Arc::new(AtomicUsize::new(0));
        let lazy = counting_lazy(Arc::clone(&calls), true);

        assert_eq!(lazy.value().await, None);
        assert_eq!(lazy.value().await, None);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(lazy.state(), LazyState::Error);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_caller_does_not_restart_resolution() {
        let calls = Arc::new(AtomicUsize::new(0));
        let lazy = Arc::new(counting_lazy(Arc::clone(&calls), false));

        let first = tokio::spawn({
            let lazy = Arc::clone(&lazy);
            async move { lazy.value().await }
        });
        tokio::time::sleep(Duration::from_millis(1)).await;
        let waiting = tokio::spawn({
            let lazy = Arc::clone(&lazy);
            async move { lazy.value().await }
        });
        tokio::time::sleep(Duration::from_millis(1)).await;

        first.abort();
        assert!(first.await.expect_err("aborted").is_cancelled());
        assert_eq!(lazy.state(), LazyState::Pending);

        assert_eq!(waiting.await.expect("join"), Some("payload".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(lazy.state(), LazyState::Resolved);
    }

    #[tokio::test(start_paused = true)]
    async fn timed_out_caller_leaves_fetch_running() {
        let calls = Arc::new(AtomicUsize::new(0));
        let lazy = counting_lazy(Arc::clone(&calls), false);

        let interrupted = tokio::time::timeout(Duration::from_millis(1), lazy.value()).await;
        assert!(interrupted.is_err());

        assert_eq!(lazy.value().await, Some("payload".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn pre_resolved_value_is_returned() {
        let lazy = Lazy::resolved("root", 7_u32);
        assert_eq!(lazy.state(), LazyState::Resolved);
        assert_eq!(lazy.value().await, Some(7));
    }
}
