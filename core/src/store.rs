//! Capabilities borrowed from the host store.
//!
//! The pipe runtime only needs to dispatch actions and read state. Dispatching
//! an effect call returns a [`Dispatched::Effect`] that can be awaited for the
//! finished [`Context`].

use crate::action::Action;
use crate::context::Context;
use crate::emitter::Emitter;
use crate::error::PipeError;
use futures::future::{self, BoxFuture};
use std::fmt;
use std::future::{Future, IntoFuture};
use std::sync::Arc;
use std::task::Poll;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

/// What an effect needs from the store it is dispatched into
pub trait StoreHandle<S>: Send + Sync {
    /// Dispatch an action through the store's middleware chain
    fn dispatch(&self, action: Action) -> Dispatched<S>;

    /// Snapshot of the current state
    fn get_state(&self) -> S;
}

/// Runs an effect against a store and an emitter
pub type EffectFn<S> =
    Arc<dyn Fn(Arc<dyn StoreHandle<S>>, Emitter) -> BoxFuture<'static, Result<Context<S>, PipeError>> + Send + Sync>;

/// Result of dispatching an action
#[must_use = "effects report their outcome through the returned value"]
pub enum Dispatched<S> {
    /// The action went to the reducer
    Reduced,

    /// The action started an effect
    Effect(EffectTask<S>),
}

impl<S> Dispatched<S> {
    /// Whether the dispatch started an effect
    pub const fn is_effect(&self) -> bool {
        matches!(self, Self::Effect(_))
    }
}

impl<S> fmt::Debug for Dispatched<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reduced => f.write_str("Reduced"),
            Self::Effect(task) => f.debug_tuple("Effect").field(task).finish(),
        }
    }
}

impl<S: 'static> IntoFuture for Dispatched<S> {
    type Output = Result<Option<Context<S>>, PipeError>;
    type IntoFuture = BoxFuture<'static, Self::Output>;

    fn into_future(self) -> Self::IntoFuture {
        match self {
            Self::Reduced => Box::pin(future::ready(Ok(None))),
            Self::Effect(task) => Box::pin(async move { task.await.map(Some) }),
        }
    }
}

/// A started effect
///
/// The effect runs synchronously up to its first suspension point inside
/// [`EffectTask::start`], so listeners it registers (for example through
/// [`Context::take`]) exist before the next dispatch. Whatever remains is
/// spawned onto the current tokio runtime.
pub enum EffectTask<S> {
    /// Completed without suspending
    Finished(Result<Context<S>, PipeError>),

    /// Suspended and spawned
    Running(JoinHandle<Result<Context<S>, PipeError>>),
}

impl<S: 'static> EffectTask<S> {
    /// Drive `effect` until it first suspends, then spawn the rest
    pub fn start(name: &str, mut effect: BoxFuture<'static, Result<Context<S>, PipeError>>) -> Self {
        let Ok(runtime) = Handle::try_current() else {
            return Self::Finished(Err(PipeError::NoRuntime(name.to_owned())));
        };
        let waker = futures::task::noop_waker();
        let mut cx = std::task::Context::from_waker(&waker);
        match effect.as_mut().poll(&mut cx) {
            Poll::Ready(outcome) => Self::Finished(outcome),
            // The spawned task polls again with a real waker.
            Poll::Pending => Self::Running(runtime.spawn(effect)),
        }
    }

    /// Whether the effect is still in flight
    #[must_use]
    pub fn is_running(&self) -> bool {
        match self {
            Self::Finished(_) => false,
            Self::Running(handle) => !handle.is_finished(),
        }
    }
}

impl<S> fmt::Debug for EffectTask<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Finished(Ok(ctx)) => f.debug_tuple("Finished").field(&ctx.name).finish(),
            Self::Finished(Err(err)) => f.debug_tuple("Failed").field(err).finish(),
            Self::Running(_) => f.write_str("Running"),
        }
    }
}

impl<S: 'static> IntoFuture for EffectTask<S> {
    type Output = Result<Context<S>, PipeError>;
    type IntoFuture = BoxFuture<'static, Self::Output>;

    fn into_future(self) -> Self::IntoFuture {
        match self {
            Self::Finished(outcome) => Box::pin(future::ready(outcome)),
            Self::Running(handle) => Box::pin(async move {
                match handle.await {
                    Ok(outcome) => outcome,
                    Err(err) => Err(PipeError::TaskFailed(err.to_string())),
                }
            }),
        }
    }
}
