use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

/// Boxed error accepted from value factories.
pub type BoxError = Box<dyn StdError + Send + Sync>;

/// Error raised by a value factory.
///
/// The underlying error is shared behind an `Arc` so a single failed invocation
/// can be handed to every caller that was waiting on it.
#[derive(Clone)]
pub struct FactoryError(Arc<dyn StdError + Send + Sync>);

impl FactoryError {
    /// Wrap any error (or message) produced by a factory.
    pub fn new(err: impl Into<BoxError>) -> Self {
        FactoryError(Arc::from(err.into()))
    }

    /// Create a factory error from a plain message.
    pub fn msg(message: impl Into<String>) -> Self {
        let message: String = message.into();
        FactoryError::new(message)
    }
}

impl fmt::Debug for FactoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

impl fmt::Display for FactoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&*self.0, f)
    }
}

impl StdError for FactoryError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.0.source()
    }
}

/// Error type for cache operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CacheError {
    /// The value factory for a foreground request failed.
    #[error("value factory for key '{key}' failed: {source}")]
    Factory {
        key: String,
        #[source]
        source: FactoryError,
    },
    /// A background revalidation failed after the stale value was served.
    #[error("background refresh for key '{key}' failed: {source}")]
    BackgroundRefresh {
        key: String,
        #[source]
        source: FactoryError,
    },
    /// A store operation failed.
    #[error("[{tier}] cache error for key '{key}': {message}")]
    Operation {
        tier: String,
        key: String,
        message: String,
    },
    /// A background task panicked instead of returning.
    #[error("background task on '{executor}' panicked: {message}")]
    BackgroundPanic { executor: String, message: String },
    /// Configuration could not be parsed.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl CacheError {
    /// Create a new factory error for `key`.
    pub fn factory(key: impl Into<String>, source: FactoryError) -> Self {
        CacheError::Factory {
            key: key.into(),
            source,
        }
    }

    /// Create a new background refresh error for `key`.
    pub fn background_refresh(key: impl Into<String>, source: FactoryError) -> Self {
        CacheError::BackgroundRefresh {
            key: key.into(),
            source,
        }
    }

    /// Create a new operation error.
    pub fn operation(
        tier: impl Into<String>,
        key: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        CacheError::Operation {
            tier: tier.into(),
            key: key.into(),
            message: message.into(),
        }
    }

    /// Create a new error for a background task that panicked on `executor`.
    pub fn background_panic(executor: impl Into<String>, message: impl Into<String>) -> Self {
        CacheError::BackgroundPanic {
            executor: executor.into(),
            message: message.into(),
        }
    }

    /// The factory error behind this error, if any.
    pub fn factory_error(&self) -> Option<&FactoryError> {
        match self {
            CacheError::Factory { source, .. } | CacheError::BackgroundRefresh { source, .. } => {
                Some(source)
            }
            CacheError::Operation { .. }
            | CacheError::BackgroundPanic { .. }
            | CacheError::Config(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factory_error_display_is_transparent() {
        let err = FactoryError::msg("oh noes");
        assert_eq!(err.to_string(), "oh noes");

        let cache_err = CacheError::factory("k", err.clone());
        assert_eq!(
            cache_err.to_string(),
            "value factory for key 'k' failed: oh noes"
        );
        assert_eq!(cache_err.factory_error().unwrap().to_string(), "oh noes");
    }

    #[test]
    fn test_operation_error_has_no_factory_error() {
        let err = CacheError::operation("moka", "k", "boom");
        assert_eq!(err.to_string(), "[moka] cache error for key 'k': boom");
        assert!(err.factory_error().is_none());
    }

    #[test]
    fn test_background_panic_display() {
        let err = CacheError::background_panic("thread", "boom");
        assert_eq!(
            err.to_string(),
            "background task on 'thread' panicked: boom"
        );
        assert!(err.factory_error().is_none());
    }
}
