//! Onion-style middleware composition.
//!
//! A middleware receives the invocation's [`Context`] and a [`Next`]
//! continuation. Work done before `next.run(ctx).await` happens outer to
//! inner, work done after it happens inner to outer. Returning without
//! running `next` short-circuits the rest of the chain, including any outer
//! continuation.
//!
//! ```ignore
//! let log = from_fn(|ctx, mut next| {
//!     Box::pin(async move {
//!         tracing::info!(name = %ctx.name, "before");
//!         let outcome = next.run(ctx).await;
//!         tracing::info!(name = %ctx.name, "after");
//!         outcome
//!     })
//! });
//! let chain = compose(vec![log, handler])?;
//! chain.run(&mut ctx, None).await?;
//! ```

use crate::context::Context;
use crate::error::{MiddlewareResult, PipeError};
use futures::future::{self, BoxFuture};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// A step of an effect's middleware chain
pub trait Middleware<S>: Send + Sync + 'static {
    /// Run this step, optionally continuing with `next`
    fn call<'a>(&'a self, ctx: &'a mut Context<S>, next: Next<S>) -> BoxFuture<'a, MiddlewareResult>;
}

/// Shared, type-erased middleware
pub type SharedMiddleware<S> = Arc<dyn Middleware<S>>;

/// Continuation handed to a middleware
///
/// Running it more than once yields [`PipeError::NextCalledMultipleTimes`]
/// at the point of the second call.
pub struct Next<S> {
    chain: Arc<[SharedMiddleware<S>]>,
    index: usize,
    dispatched: Arc<AtomicUsize>,
    outer: Option<Box<Next<S>>>,
}

impl<S: 'static> Next<S> {
    fn start(chain: Arc<[SharedMiddleware<S>]>, outer: Option<Self>) -> Self {
        Self {
            chain,
            index: 0,
            dispatched: Arc::new(AtomicUsize::new(0)),
            outer: outer.map(Box::new),
        }
    }

    /// Run the remainder of the chain
    ///
    /// The returned future does not borrow `self`, so a middleware can keep
    /// using its context after awaiting it.
    pub fn run<'a>(&mut self, ctx: &'a mut Context<S>) -> BoxFuture<'a, MiddlewareResult> {
        if self.index < self.dispatched.load(Ordering::SeqCst) {
            return Box::pin(future::ready(Err(PipeError::NextCalledMultipleTimes)));
        }
        self.dispatched.store(self.index + 1, Ordering::SeqCst);
        let outer = self.outer.take();

        let Some(middleware) = self.chain.get(self.index).cloned() else {
            return match outer {
                Some(mut outer) => outer.run(ctx),
                None => Box::pin(future::ready(Ok(()))),
            };
        };
        let next = Self {
            chain: Arc::clone(&self.chain),
            index: self.index + 1,
            dispatched: Arc::clone(&self.dispatched),
            outer,
        };
        Box::pin(async move { middleware.call(ctx, next).await })
    }
}

impl<S> fmt::Debug for Next<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Next")
            .field("index", &self.index)
            .field("len", &self.chain.len())
            .field("has_outer", &self.outer.is_some())
            .finish()
    }
}

/// A composed middleware chain
pub struct Compose<S> {
    chain: Arc<[SharedMiddleware<S>]>,
}

impl<S: 'static> Compose<S> {
    /// Chain starting with `first`, so it can never be empty
    #[must_use]
    pub fn new(first: SharedMiddleware<S>, rest: Vec<SharedMiddleware<S>>) -> Self {
        let mut chain = Vec::with_capacity(rest.len() + 1);
        chain.push(first);
        chain.extend(rest);
        Self { chain: chain.into() }
    }

    /// Run the chain against `ctx`, then `outer` once the last step continues
    pub fn run<'a>(&self, ctx: &'a mut Context<S>, outer: Option<Next<S>>) -> BoxFuture<'a, MiddlewareResult> {
        Next::start(Arc::clone(&self.chain), outer).run(ctx)
    }

    /// Number of composed steps
    #[must_use]
    pub fn len(&self) -> usize {
        self.chain.len()
    }

    /// Always `false`; [`compose`] rejects empty chains
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.chain.is_empty()
    }
}

impl<S> Clone for Compose<S> {
    fn clone(&self) -> Self {
        Self {
            chain: Arc::clone(&self.chain),
        }
    }
}

impl<S> fmt::Debug for Compose<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Compose").field("len", &self.chain.len()).finish()
    }
}

impl<S: 'static> Middleware<S> for Compose<S> {
    fn call<'a>(&'a self, ctx: &'a mut Context<S>, next: Next<S>) -> BoxFuture<'a, MiddlewareResult> {
        self.run(ctx, Some(next))
    }
}

/// Compose middleware into a single onion-style chain
///
/// # Errors
///
/// Returns [`PipeError::EmptyStack`] when `middleware` is empty.
pub fn compose<S: 'static>(middleware: Vec<SharedMiddleware<S>>) -> Result<Compose<S>, PipeError> {
    if middleware.is_empty() {
        return Err(PipeError::EmptyStack);
    }
    Ok(Compose {
        chain: middleware.into(),
    })
}

struct FnMiddleware<F>(F);

impl<S, F> Middleware<S> for FnMiddleware<F>
where
    S: 'static,
    F: for<'a> Fn(&'a mut Context<S>, Next<S>) -> BoxFuture<'a, MiddlewareResult> + Send + Sync + 'static,
{
    fn call<'a>(&'a self, ctx: &'a mut Context<S>, next: Next<S>) -> BoxFuture<'a, MiddlewareResult> {
        (self.0)(ctx, next)
    }
}

/// Adapt a closure into middleware
pub fn from_fn<S, F>(f: F) -> SharedMiddleware<S>
where
    S: 'static,
    F: for<'a> Fn(&'a mut Context<S>, Next<S>) -> BoxFuture<'a, MiddlewareResult> + Send + Sync + 'static,
{
    Arc::new(FnMiddleware(f))
}

/// Middleware that only continues the chain
#[must_use]
pub fn passthrough<S: 'static>() -> SharedMiddleware<S> {
    from_fn(|ctx, mut next| next.run(ctx))
}

/// Per-effect middleware, either a single step or an explicit list
pub struct Stack<S>(Vec<SharedMiddleware<S>>);

impl<S> Stack<S> {
    /// The steps, in order
    #[must_use]
    pub fn into_vec(self) -> Vec<SharedMiddleware<S>> {
        self.0
    }
}

impl<S: 'static> Default for Stack<S> {
    fn default() -> Self {
        Self(vec![passthrough()])
    }
}

impl<S> From<SharedMiddleware<S>> for Stack<S> {
    fn from(middleware: SharedMiddleware<S>) -> Self {
        Self(vec![middleware])
    }
}

impl<S> From<Vec<SharedMiddleware<S>>> for Stack<S> {
    fn from(middleware: Vec<SharedMiddleware<S>>) -> Self {
        Self(middleware)
    }
}

impl<S: 'static> From<Compose<S>> for Stack<S> {
    fn from(chain: Compose<S>) -> Self {
        Self(vec![Arc::new(chain)])
    }
}

impl<S> fmt::Debug for Stack<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Stack").field(&self.0.len()).finish()
    }
}
