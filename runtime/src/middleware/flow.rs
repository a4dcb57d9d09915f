//! Flow control: duplicate suppression, throttling, optimistic updates and
//! the undo window.

use fxpipe_core::{
    Context, FxStatus, Middleware, MiddlewareResult, Next, SharedMiddleware, StatusCache, do_it, from_fn, race,
    undo,
};
use futures::future::BoxFuture;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

/// Default window of [`timer`]
pub const DEFAULT_TIMER: Duration = Duration::from_secs(60);

/// Drop invocations while an earlier one of the same effect is running
///
/// Failures of the wrapped chain are recorded as [`FxStatus::Aborted`] and
/// not propagated. An invocation dropped mid-flight (cancelled through its
/// signal, or unwound by a panic) is recorded as aborted too, so later
/// invocations are not locked out.
#[must_use]
pub fn take_leading<S: 'static>() -> SharedMiddleware<S> {
    from_fn(|ctx, next| Box::pin(lead(ctx, next)))
}

/// Marks the effect aborted in its status cache unless disarmed
struct LeadGuard {
    statuses: StatusCache,
    name: String,
    armed: bool,
}

impl LeadGuard {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for LeadGuard {
    fn drop(&mut self) {
        if self.armed {
            tracing::debug!(name = %self.name, "Leading invocation dropped before finishing");
            self.statuses.set(&self.name, FxStatus::Aborted);
        }
    }
}

async fn lead<S: 'static>(ctx: &mut Context<S>, mut next: Next<S>) -> MiddlewareResult {
    if ctx.status() == FxStatus::Running {
        tracing::debug!(name = %ctx.name, "Dropping invocation, effect already running");
        return Ok(());
    }

    ctx.set_status(FxStatus::Running);
    let guard = LeadGuard {
        statuses: ctx.status_cache().clone(),
        name: ctx.name.clone(),
        armed: true,
    };
    match next.run(ctx).await {
        Ok(()) => ctx.set_status(FxStatus::Completed),
        Err(err) => {
            tracing::debug!(name = %ctx.name, error = %err, "Leading invocation failed");
            ctx.set_status(FxStatus::Aborted);
        }
    }
    guard.disarm();
    Ok(())
}

/// Apply `ctx.optimistic` up front and revert it unless the response succeeds
#[must_use]
pub fn optimistic<S: 'static>() -> SharedMiddleware<S> {
    from_fn(|ctx, next| Box::pin(speculate(ctx, next)))
}

async fn speculate<S: 'static>(ctx: &mut Context<S>, mut next: Next<S>) -> MiddlewareResult {
    let Some(update) = ctx.optimistic.clone() else {
        return next.run(ctx).await;
    };

    ctx.dispatch(update.apply).await?;
    next.run(ctx).await?;

    if !ctx.response.as_ref().is_some_and(|response| response.ok) {
        ctx.dispatch(update.revert).await?;
    }
    Ok(())
}

/// Let at most one invocation through per `window`
///
/// Each call creates an independent window.
#[must_use]
pub fn timer<S: 'static>(window: Duration) -> SharedMiddleware<S> {
    Arc::new(Timer {
        window,
        last_allowed: Mutex::new(None),
    })
}

struct Timer {
    window: Duration,
    last_allowed: Mutex<Option<Instant>>,
}

impl Timer {
    fn admit(&self) -> bool {
        let now = Instant::now();
        let mut last_allowed = self.last_allowed.lock().unwrap_or_else(PoisonError::into_inner);
        if last_allowed.is_some_and(|last| now.duration_since(last) < self.window) {
            return false;
        }
        *last_allowed = Some(now);
        true
    }
}

impl<S: 'static> Middleware<S> for Timer {
    fn call<'a>(&'a self, ctx: &'a mut Context<S>, mut next: Next<S>) -> BoxFuture<'a, MiddlewareResult> {
        if self.admit() {
            next.run(ctx)
        } else {
            tracing::debug!(name = %ctx.name, window = ?self.window, "Throttled invocation");
            Box::pin(futures::future::ready(Ok(())))
        }
    }
}

/// Message types and timeout of the undo window
#[derive(Clone, Debug)]
pub struct UndoConfig {
    /// Type of the confirmation message
    pub do_it: String,
    /// Type of the undo message
    pub undo: String,
    /// How long to wait before proceeding anyway
    pub timeout: Duration,
}

impl UndoConfig {
    /// Set the confirmation message type
    #[must_use]
    pub fn with_do_it(mut self, kind: impl Into<String>) -> Self {
        self.do_it = kind.into();
        self
    }

    /// Set the undo message type
    #[must_use]
    pub fn with_undo(mut self, kind: impl Into<String>) -> Self {
        self.undo = kind.into();
        self
    }

    /// Set the timeout
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Default for UndoConfig {
    fn default() -> Self {
        Self {
            do_it: do_it().kind().to_owned(),
            undo: undo().kind().to_owned(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// Hold undoable invocations until confirmed, undone or timed out
///
/// Only contexts with `undoable` set are held. A confirmation or the timeout
/// lets the invocation proceed; an undo abandons it. The losing waits are
/// cancelled either way.
#[must_use]
pub fn undoer<S: 'static>(config: UndoConfig) -> SharedMiddleware<S> {
    Arc::new(Undoer { config })
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Verdict {
    Confirmed,
    Undone,
    TimedOut,
}

struct Undoer {
    config: UndoConfig,
}

impl Undoer {
    async fn handle<S: 'static>(&self, ctx: &mut Context<S>, mut next: Next<S>) -> MiddlewareResult {
        if !ctx.undoable {
            return next.run(ctx).await;
        }

        let verdict = race(vec![
            ctx.take(self.config.do_it.clone()).map(|_| Verdict::Confirmed),
            ctx.take(self.config.undo.clone()).map(|_| Verdict::Undone),
            ctx.delay(self.config.timeout).map(|()| Verdict::TimedOut),
        ])
        .await;

        tracing::debug!(name = %ctx.name, ?verdict, "Undo window closed");
        match verdict {
            None | Some(Verdict::Undone) => Ok(()),
            Some(Verdict::Confirmed | Verdict::TimedOut) => next.run(ctx).await,
        }
    }
}

impl<S: 'static> Middleware<S> for Undoer {
    fn call<'a>(&'a self, ctx: &'a mut Context<S>, next: Next<S>) -> BoxFuture<'a, MiddlewareResult> {
        Box::pin(self.handle(ctx, next))
    }
}
