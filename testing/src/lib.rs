//! # Ridesync Testing
//!
//! Testing utilities for ridesync reducers and stores.
//!
//! This crate provides:
//! - Deterministic [`Clock`] and [`IdGenerator`] implementations
//! - A Given-When-Then harness for reducers ([`ReducerTest`])
//! - Helpers that drive returned effects to completion without a store
//!
//! ## Example
//!
//! ```
//! use ridesync_core::environment::Clock;
//! use ridesync_testing::{ManualClock, test_clock};
//! use chrono::Duration;
//!
//! let clock = ManualClock::new(test_clock().now());
//! let before = clock.now();
//! clock.advance(Duration::minutes(5));
//! assert_eq!(clock.now() - before, Duration::minutes(5));
//! ```

use chrono::{DateTime, Utc};
use ridesync_core::environment::{Clock, IdGenerator};

/// Given-When-Then harness for reducers
pub mod reducer_test;

/// Mock implementations of Environment traits
pub mod mocks {
    use super::{Clock, DateTime, IdGenerator, Utc};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU64, Ordering};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use ridesync_testing::mocks::FixedClock;
    /// use ridesync_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Clock that only moves when told to
    ///
    /// Used to cross expiry boundaries (entitlement expiry, cache age) inside
    /// a single test.
    #[derive(Debug)]
    pub struct ManualClock {
        time: Mutex<DateTime<Utc>>,
    }

    impl ManualClock {
        /// Create a clock starting at `time`
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self {
                time: Mutex::new(time),
            }
        }

        /// Move the clock forward (or backward for a negative duration)
        pub fn advance(&self, by: chrono::Duration) {
            let mut time = self.time.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            *time += by;
        }

        /// Jump to an absolute instant
        pub fn set(&self, to: DateTime<Utc>) {
            *self.time.lock().unwrap_or_else(std::sync::PoisonError::into_inner) = to;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.time.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
        }
    }

    /// Predictable ids: `{prefix}-1`, `{prefix}-2`, ...
    #[derive(Debug)]
    pub struct SequentialIdGenerator {
        prefix: String,
        next: AtomicU64,
    }

    impl SequentialIdGenerator {
        /// Create a generator whose ids start with `prefix`
        #[must_use]
        pub fn new(prefix: impl Into<String>) -> Self {
            Self {
                prefix: prefix.into(),
                next: AtomicU64::new(1),
            }
        }
    }

    impl IdGenerator for SequentialIdGenerator {
        fn next_id(&self) -> String {
            let n = self.next.fetch_add(1, Ordering::SeqCst);
            format!("{}-{n}", self.prefix)
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    ///
    /// # Panics
    ///
    /// This function will panic if the hardcoded timestamp fails to parse,
    /// which should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }
}

/// Helpers for driving reducer output without a running store
pub mod helpers {
    use futures::StreamExt;
    use ridesync_core::effect::Effect;

    /// Execute effects and collect every action they produce
    ///
    /// Futures are awaited, streams are drained and delays fire immediately,
    /// so this only suits effects that terminate on their own.
    pub async fn drain_effects<A: Send + 'static>(effects: impl IntoIterator<Item = Effect<A>>) -> Vec<A> {
        let mut produced = Vec::new();
        let mut pending: Vec<Effect<A>> = effects.into_iter().collect();
        pending.reverse();

        while let Some(effect) = pending.pop() {
            match effect {
                Effect::None => {},
                Effect::Parallel(children) | Effect::Sequential(children) => {
                    pending.extend(children.into_iter().rev());
                },
                Effect::Delay { action, .. } => produced.push(*action),
                Effect::Future(fut) => produced.extend(fut.await),
                Effect::Stream(mut stream) => {
                    while let Some(action) = stream.next().await {
                        produced.push(action);
                    }
                },
            }
        }

        produced
    }
}

// Re-export commonly used items
pub use helpers::drain_effects;
pub use mocks::{FixedClock, ManualClock, SequentialIdGenerator, test_clock};
pub use reducer_test::{ReducerTest, assertions};
