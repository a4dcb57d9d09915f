//! Named effects backed by middleware.
//!
//! A [`Pipe`] holds a global middleware chain and a registry of per-effect
//! stacks. [`Pipe::create`] registers an effect and returns an
//! [`EffectCreator`]; its actions do nothing until dispatched through a store
//! carrying the [`EffectBridge`](crate::bridge::EffectBridge), which then runs
//! the global chain against a fresh [`Context`]. Per-effect stacks run where
//! the global chain installs [`Pipe::actions`].
//!
//! ```ignore
//! let pipe = Pipe::<AppState>::new();
//! pipe.use_middleware(request_monitor(None));
//! pipe.use_middleware(pipe.actions());
//!
//! let fetch_users = pipe.create("/users", from_fn(|ctx, mut next| Box::pin(async move {
//!     ctx.response = Some(Response::success(200, json!({ "users": [] })));
//!     next.run(ctx).await
//! })));
//!
//! store.dispatch(fetch_users.action()).await?;
//! ```

use crate::metrics::EffectMetrics;
use fxpipe_core::{
    Action, CancellationToken, Compose, Context, EffectCall, EffectFn, Emitter, FxStatus, Middleware,
    MiddlewareResult, Next, PipeError, SharedMiddleware, Stack, StatusCache, StoreHandle, effect_key, wrap,
};
use futures::future::BoxFuture;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;
use tracing::Instrument;

type Registry<S> = Arc<RwLock<HashMap<String, Vec<SharedMiddleware<S>>>>>;

/// Registry of named effects and the middleware wrapping all of them
pub struct Pipe<S> {
    middleware: Arc<RwLock<Vec<SharedMiddleware<S>>>>,
    effects: Registry<S>,
    statuses: StatusCache,
}

impl<S: 'static> Pipe<S> {
    /// Create an empty pipe
    #[must_use]
    pub fn new() -> Self {
        Self {
            middleware: Arc::default(),
            effects: Arc::default(),
            statuses: StatusCache::new(),
        }
    }

    /// Append middleware to the global chain
    pub fn use_middleware(&self, middleware: SharedMiddleware<S>) {
        self.middleware
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(middleware);
    }

    /// Middleware running the current effect's own stack
    ///
    /// Continues with `next` when the effect has no registered stack.
    #[must_use]
    pub fn actions(&self) -> SharedMiddleware<S> {
        Arc::new(EffectRouter {
            effects: Arc::clone(&self.effects),
        })
    }

    /// Register an effect under `name`
    ///
    /// Registering the same name again replaces its stack.
    pub fn create(&self, name: impl Into<String>, stack: impl Into<Stack<S>>) -> EffectCreator<S> {
        let name = name.into();
        self.effects
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.clone(), stack.into().into_vec());
        tracing::debug!(name = %name, "Registered effect");
        EffectCreator {
            name,
            pipe: self.clone(),
        }
    }

    /// Last recorded status of the effect `name`
    #[must_use]
    pub fn status(&self, name: &str) -> FxStatus {
        self.statuses.get(name)
    }

    /// Whether an effect is registered under `name`
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.effects
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    /// Run one invocation of `name` against `store`
    fn run(
        &self,
        name: String,
        payload: Value,
        key: String,
        store: Arc<dyn StoreHandle<S>>,
        emitter: Emitter,
    ) -> BoxFuture<'static, Result<Context<S>, PipeError>> {
        let signal = CancellationToken::new();
        let status = self.statuses.get(&name);
        let mut ctx = Context::new(name, payload, store, emitter)
            .with_key(key)
            .with_status(status)
            .with_status_cache(self.statuses.clone())
            .with_signal(signal.clone());

        let global = self.middleware.read().unwrap_or_else(PoisonError::into_inner).clone();
        let span = tracing::debug_span!("effect", name = %ctx.name, key = %ctx.key);

        let invocation = wrap(
            async move {
                // An empty global chain runs nothing.
                if let Some((first, rest)) = global.split_first() {
                    let chain = Compose::new(Arc::clone(first), rest.to_vec());
                    chain.run(&mut ctx, None).await?;
                }
                Ok::<_, PipeError>(ctx)
            },
            Some(&signal),
        );

        Box::pin(
            async move {
                EffectMetrics::record_started();
                let started = Instant::now();
                match invocation.await {
                    Ok(ctx) => {
                        EffectMetrics::record_completed(started.elapsed());
                        tracing::debug!(status = %ctx.status(), "Effect finished");
                        Ok(ctx)
                    }
                    Err(err) if err.is_aborted() => {
                        EffectMetrics::record_aborted(started.elapsed());
                        tracing::debug!("Effect aborted");
                        Err(err)
                    }
                    Err(err) => {
                        EffectMetrics::record_failed(started.elapsed());
                        tracing::warn!(error = %err, "Effect failed");
                        Err(err)
                    }
                }
            }
            .instrument(span),
        )
    }
}

impl<S: 'static> Default for Pipe<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> Clone for Pipe<S> {
    fn clone(&self) -> Self {
        Self {
            middleware: Arc::clone(&self.middleware),
            effects: Arc::clone(&self.effects),
            statuses: self.statuses.clone(),
        }
    }
}

impl<S> fmt::Debug for Pipe<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let effects: Vec<String> = self
            .effects
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        f.debug_struct("Pipe").field("effects", &effects).finish_non_exhaustive()
    }
}

struct EffectRouter<S> {
    effects: Registry<S>,
}

impl<S: 'static> Middleware<S> for EffectRouter<S> {
    fn call<'a>(&'a self, ctx: &'a mut Context<S>, mut next: Next<S>) -> BoxFuture<'a, MiddlewareResult> {
        let stack = self
            .effects
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&ctx.name)
            .cloned();
        match stack.as_deref().and_then(<[SharedMiddleware<S>]>::split_first) {
            Some((first, rest)) => Compose::new(Arc::clone(first), rest.to_vec()).run(ctx, Some(next)),
            None => next.run(ctx),
        }
    }
}

/// Creates the actions that trigger one registered effect
pub struct EffectCreator<S> {
    name: String,
    pipe: Pipe<S>,
}

impl<S: 'static> EffectCreator<S> {
    /// Registered effect name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Effect call without a payload
    #[must_use]
    pub fn action(&self) -> Action {
        self.action_with(Value::Null)
    }

    /// Effect call carrying `payload`
    #[must_use]
    pub fn action_with(&self, payload: Value) -> Action {
        let key = effect_key(&self.name, &payload);
        let runner: EffectFn<S> = {
            let pipe = self.pipe.clone();
            let name = self.name.clone();
            let payload = payload.clone();
            let key = key.clone();
            Arc::new(move |store, emitter| pipe.run(name.clone(), payload.clone(), key.clone(), store, emitter))
        };
        Action::Call(EffectCall::new(self.name.clone(), payload, key, runner))
    }

    /// Effect call carrying any serializable payload
    ///
    /// # Errors
    ///
    /// Returns [`PipeError::Json`] if the payload cannot be represented as JSON.
    pub fn action_from<P: Serialize>(&self, payload: &P) -> Result<Action, PipeError> {
        Ok(self.action_with(serde_json::to_value(payload)?))
    }
}

impl<S> Clone for EffectCreator<S> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            pipe: self.pipe.clone(),
        }
    }
}

impl<S> fmt::Display for EffectCreator<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl<S> fmt::Debug for EffectCreator<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("EffectCreator").field(&self.name).finish()
    }
}
