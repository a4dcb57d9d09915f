//! # fxpipe core
//!
//! Core types for running asynchronous, cancelable effects on top of a
//! centralized action-dispatch store.
//!
//! ## Core Concepts
//!
//! - **Action**: a plain state-update message, a batch, or an effect call
//! - **Context**: per-invocation state threaded through a middleware chain
//! - **Middleware**: an async step `(ctx, next)` composed onion-style
//! - **Cancelable**: a future with an explicit, idempotent cancel handle
//! - **Emitter**: one-shot listeners keyed by action type, backing `ctx.take()`
//! - **`StoreHandle`**: the dispatch and `get_state` capabilities borrowed from
//!   the host store
//!
//! The pipe runtime, standard middleware and the host store live in
//! `fxpipe-runtime`.
//!
//! ## Example
//!
//! ```ignore
//! use fxpipe_core::*;
//!
//! let timing = from_fn(|ctx: &mut Context<AppState>, mut next| {
//!     Box::pin(async move {
//!         let started = std::time::Instant::now();
//!         let outcome = next.run(ctx).await;
//!         tracing::debug!(name = %ctx.name, elapsed = ?started.elapsed(), "effect finished");
//!         outcome
//!     })
//! });
//! ```

pub use chrono::{DateTime, Utc};
pub use serde::{Deserialize, Serialize};
pub use serde_json::{Value, json};

/// Messages dispatched into the host store
pub mod action;

/// Cancelable futures, delays and races
pub mod cancel;

/// Per-invocation context, request and response slots
pub mod context;

/// One-shot listeners keyed by action type
pub mod emitter;

/// Effect keys and base64 helpers
pub mod encoding;

/// Error types
pub mod error;

/// Loader records and clocks
pub mod loader;

/// Middleware trait and onion composition
pub mod middleware;

/// Reducer trait and composition
pub mod reducer;

/// Host store capabilities and effect tasks
pub mod store;

pub use action::{Action, ActionCreator, BATCH, EffectCall, FX_CALL, Message, do_it, undo};
pub use cancel::{CancelHandle, Cancelable, CancellationToken, delay, race, wrap};
pub use context::{Context, FxStatus, Optimistic, Request, Response, StatusCache};
pub use emitter::{Emitter, ListenerId};
pub use encoding::{decode_base64, effect_key, encode_base64};
pub use error::{MiddlewareResult, PipeError};
pub use loader::{Clock, LoaderMeta, LoaderPayload, LoaderState, LoadingStatus, SystemClock};
pub use middleware::{Compose, Middleware, Next, SharedMiddleware, Stack, compose, from_fn, passthrough};
pub use reducer::{CombinedReducer, Reducer, ScopedReducer, combine_reducers, scope_reducer};
pub use store::{Dispatched, EffectFn, EffectTask, StoreHandle};
