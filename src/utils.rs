//! Shared utilities for the cache library.

use std::any::Any;
use std::fmt::Display;
use std::future::Future;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::runtime::{Builder, Handle, RuntimeFlavor};

/// Build a composite cache key from namespace and key.
///
/// Format: `{namespace}::{key}`
pub fn build_cache_key<N: Display>(namespace: &N, key: &str) -> String {
    format!("{}::{}", namespace, key)
}

/// Get the current time in milliseconds since UNIX epoch.
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

/// Convert a duration to whole milliseconds, saturating at `i64::MAX`.
pub fn duration_ms(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

/// Simple pseudo-random number generator (0.0 to 1.0).
/// This avoids adding a dependency on rand crate.
pub fn rand_simple() -> f64 {
    use std::collections::hash_map::RandomState;
    use std::hash::{BuildHasher, Hasher};

    let state = RandomState::new();
    let mut hasher = state.build_hasher();
    hasher.write_u64(
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or_default(),
    );
    (hasher.finish() as f64) / (u64::MAX as f64)
}

/// Whether the calling thread is a worker of a multi-threaded tokio runtime.
fn on_multi_thread_runtime() -> Option<Handle> {
    Handle::try_current()
        .ok()
        .filter(|handle| handle.runtime_flavor() == RuntimeFlavor::MultiThread)
}

/// Run a blocking closure, telling a multi-threaded runtime to move its other
/// tasks off this worker first.
pub(crate) fn run_blocking<R>(f: impl FnOnce() -> R) -> R {
    if on_multi_thread_runtime().is_some() {
        tokio::task::block_in_place(f)
    } else {
        f()
    }
}

/// Drive a future to completion on the calling thread.
///
/// - Inside a multi-threaded runtime the future runs on the runtime's handle.
/// - Outside any runtime a single-threaded runtime with IO and timers is built
///   for the call, so factories may use tokio freely.
/// - Inside a current-thread runtime the future is polled without a reactor and
///   blocks that runtime until it resolves.
pub(crate) fn block_on<F: Future>(fut: F) -> F::Output {
    match Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
            tokio::task::block_in_place(move || handle.block_on(fut))
        }
        Ok(_) => futures::executor::block_on(fut),
        Err(_) => match Builder::new_current_thread().enable_all().build() {
            Ok(runtime) => runtime.block_on(fut),
            Err(err) => {
                tracing::warn!(error = %err, "failed to build a runtime, polling without one");
                futures::executor::block_on(fut)
            }
        },
    }
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_cache_key() {
        let key = build_cache_key(&"users", "user:123");
        assert_eq!(key, "users::user:123");
    }

    #[test]
    fn test_now_ms_is_positive() {
        let now = now_ms();
        assert!(now > 0);
    }

    #[test]
    fn test_duration_ms_saturates() {
        assert_eq!(duration_ms(Duration::from_millis(1500)), 1500);
        assert_eq!(duration_ms(Duration::MAX), i64::MAX);
    }

    #[test]
    fn test_rand_simple_in_range() {
        for _ in 0..100 {
            let r = rand_simple();
            assert!((0.0..=1.0).contains(&r));
        }
    }

    #[test]
    fn test_block_on_without_runtime() {
        assert_eq!(block_on(async { 7 }), 7);
    }

    #[test]
    fn test_block_on_without_runtime_drives_tokio_timers() {
        let value = block_on(async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            13
        });
        assert_eq!(value, 13);
    }

    #[test]
    fn test_panic_message() {
        let payload = std::panic::catch_unwind(|| panic!("boom")).unwrap_err();
        assert_eq!(panic_message(&*payload), "boom");

        let payload = std::panic::catch_unwind(|| panic!("code {}", 7)).unwrap_err();
        assert_eq!(panic_message(&*payload), "code 7");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_block_on_inside_multi_thread_runtime() {
        let value = block_on(async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            11
        });
        assert_eq!(value, 11);
    }
}
