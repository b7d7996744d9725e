//! Ordered fallback resolution: try each source in turn, first success wins.
//!
//! Entitlement resolution (remote → cache → none) and the vehicle feed
//! (remote → previous snapshot → static dataset) share this strategy instead of
//! nesting ad hoc error handling.
//!
//! Sources are plain futures. Futures are lazy, so a later source does no work
//! unless every earlier source failed.
//!
//! # Example
//!
//! ```rust
//! use ridesync_runtime::fallback::FallbackChain;
//! use std::time::Duration;
//!
//! # async fn example() {
//! let resolved = FallbackChain::new()
//!     .source_with_timeout("remote", Duration::from_secs(5), "timeout".to_string(), async {
//!         Err::<u32, String>("server unavailable".to_string())
//!     })
//!     .source("cache", async { Ok(7) })
//!     .resolve()
//!     .await;
//!
//! let resolved = resolved.ok().map(|r| (r.source, r.value));
//! assert_eq!(resolved, Some(("cache", 7)));
//! # }
//! ```

use futures::future::BoxFuture;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

/// A value produced by the first successful source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved<T> {
    /// The resolved value
    pub value: T,
    /// Name of the source that produced it
    pub source: &'static str,
}

/// Every source failed; failures are listed in source order.
#[derive(Debug)]
pub struct Exhausted<E> {
    /// `(source name, error)` for each failed source
    pub failures: Vec<(&'static str, E)>,
}

struct Source<'a, T, E> {
    name: &'static str,
    attempt: BoxFuture<'a, Result<T, E>>,
    deadline: Option<(Duration, E)>,
}

/// Ordered list of sources for one value.
pub struct FallbackChain<'a, T, E> {
    sources: Vec<Source<'a, T, E>>,
}

impl<T, E> Default for FallbackChain<'_, T, E> {
    fn default() -> Self {
        Self {
            sources: Vec::new(),
        }
    }
}

impl<'a, T, E> FallbackChain<'a, T, E>
where
    E: Display,
{
    /// Create an empty chain
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a source
    #[must_use]
    pub fn source<F>(mut self, name: &'static str, attempt: F) -> Self
    where
        F: Future<Output = Result<T, E>> + Send + 'a,
    {
        self.sources.push(Source {
            name,
            attempt: Box::pin(attempt),
            deadline: None,
        });
        self
    }

    /// Append a source bounded by a wall-clock budget
    ///
    /// When the budget elapses the attempt is dropped (cancelled) and
    /// `on_timeout` is recorded as its failure.
    #[must_use]
    pub fn source_with_timeout<F>(
        mut self,
        name: &'static str,
        timeout: Duration,
        on_timeout: E,
        attempt: F,
    ) -> Self
    where
        F: Future<Output = Result<T, E>> + Send + 'a,
    {
        self.sources.push(Source {
            name,
            attempt: Box::pin(attempt),
            deadline: Some((timeout, on_timeout)),
        });
        self
    }

    /// Number of sources in the chain
    #[must_use]
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    /// Returns `true` if no source was added
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Try each source in order and return the first success
    ///
    /// # Errors
    ///
    /// Returns [`Exhausted`] with every failure when no source succeeds.
    pub async fn resolve(self) -> Result<Resolved<T>, Exhausted<E>> {
        let mut failures = Vec::new();

        for Source {
            name,
            attempt,
            deadline,
        } in self.sources
        {
            let outcome = match deadline {
                Some((timeout, on_timeout)) => tokio::time::timeout(timeout, attempt)
                    .await
                    .unwrap_or(Err(on_timeout)),
                None => attempt.await,
            };

            match outcome {
                Ok(value) => {
                    tracing::debug!(source = name, "Fallback source resolved");
                    return Ok(Resolved {
                        value,
                        source: name,
                    });
                },
                Err(error) => {
                    tracing::debug!(source = name, %error, "Fallback source failed");
                    failures.push((name, error));
                },
            }
        }

        Err(Exhausted { failures })
    }

    /// Like [`FallbackChain::resolve`], but falls back to `default` when every source fails
    pub async fn resolve_or(self, default_name: &'static str, default: T) -> Resolved<T> {
        match self.resolve().await {
            Ok(resolved) => resolved,
            Err(_) => Resolved {
                value: default,
                source: default_name,
            },
        }
    }
}
