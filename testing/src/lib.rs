//! # fxpipe testing
//!
//! Testing utilities and helpers for fxpipe.
//!
//! This crate provides:
//! - A deterministic [`Clock`](fxpipe_core::Clock) for loader timestamps
//! - [`RecordingStore`], a store handle that records what middleware dispatch
//! - [`ContextBuilder`] for running middleware outside a pipe
//! - [`ReducerTest`], a Given-When-Then harness for reducers
//!
//! ## Example
//!
//! ```ignore
//! use fxpipe_testing::{ContextBuilder, RecordingStore, run_chain};
//!
//! #[tokio::test]
//! async fn cache_writes_are_queued() {
//!     let store = RecordingStore::new(AppState::default());
//!     let mut ctx = ContextBuilder::new("/users").build(&store);
//!     ctx.request = Some(Request::default().with_simple_cache(true));
//!
//!     run_chain(vec![simple_cache()], &mut ctx).await.unwrap();
//!
//!     assert_eq!(ctx.actions.len(), 1);
//! }
//! ```

use chrono::{DateTime, Utc};
use fxpipe_core::Clock;

/// Mock implementations for testing.
pub mod mocks {
    use super::{Clock, DateTime, Utc};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making loader timestamps reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use fxpipe_testing::mocks::FixedClock;
    /// use fxpipe_core::Clock;
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

/// Store handles and context builders for middleware tests.
pub mod helpers;


// Re-export commonly used items
pub use helpers::{ContextBuilder, RecordingStore, init_tracing, run_chain, wait_for_updates};
pub use mocks::{FixedClock, test_clock};
pub use reducer_test::{ReducerTest, assertions};
