//! Host state container.
//!
//! A [`Store`] owns the application state, reduces plain and batched actions
//! into it and runs every dispatch through an ordered list of
//! [`StoreMiddleware`]. Installing the [`EffectBridge`](crate::bridge::EffectBridge)
//! as the first middleware turns effect calls into running effects.
//!
//! State is guarded by a synchronous lock: reducers never await, and effects
//! read state through [`StoreHandle::get_state`] from inside their middleware.

use crate::metrics::StoreMetrics;
use fxpipe_core::{Action, Dispatched, Reducer, StoreHandle};
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::broadcast;

/// A step of the store's dispatch chain
///
/// Call `next` to continue with the remaining middleware and, at the end,
/// the reducer. Returning without calling it swallows the action.
pub trait StoreMiddleware<S>: Send + Sync {
    /// Handle one dispatched action
    fn handle(&self, store: &Store<S>, action: Action, next: &dyn Fn(Action) -> Dispatched<S>) -> Dispatched<S>;
}

/// Configuration for [`Store`] instances
///
/// # Example
///
/// ```ignore
/// let store = Store::builder(AppState::default(), reducer)
///     .with_config(StoreConfig::default().with_broadcast_capacity(256))
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Buffered actions per observer of [`Store::subscribe`]
    pub broadcast_capacity: usize,
}

impl StoreConfig {
    /// Set the action broadcast capacity
    #[must_use]
    pub const fn with_broadcast_capacity(mut self, capacity: usize) -> Self {
        self.broadcast_capacity = capacity;
        self
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { broadcast_capacity: 16 }
    }
}

struct StoreInner<S> {
    state: RwLock<S>,
    reducer: Box<dyn Reducer<S>>,
    middleware: Vec<Arc<dyn StoreMiddleware<S>>>,
    actions: broadcast::Sender<Action>,
}

/// The host store
pub struct Store<S> {
    inner: Arc<StoreInner<S>>,
}

impl<S: Send + Sync + 'static> Store<S> {
    /// Start building a store
    pub fn builder<R: Reducer<S> + 'static>(initial_state: S, reducer: R) -> StoreBuilder<S> {
        StoreBuilder {
            initial_state,
            reducer: Box::new(reducer),
            middleware: Vec::new(),
            config: StoreConfig::default(),
        }
    }

    /// Store without middleware and with the default configuration
    pub fn new<R: Reducer<S> + 'static>(initial_state: S, reducer: R) -> Self {
        Self::builder(initial_state, reducer).build()
    }

    /// Run `action` through the middleware chain
    pub fn dispatch(&self, action: Action) -> Dispatched<S> {
        self.dispatch_at(0, action)
    }

    fn dispatch_at(&self, index: usize, action: Action) -> Dispatched<S> {
        match self.inner.middleware.get(index) {
            Some(middleware) => {
                let next = |action: Action| self.dispatch_at(index + 1, action);
                middleware.handle(self, action, &next)
            }
            None => {
                self.reduce(&action);
                Dispatched::Reduced
            }
        }
    }

    fn reduce(&self, action: &Action) {
        {
            let mut state = self.inner.state.write().unwrap_or_else(PoisonError::into_inner);
            self.apply(&mut state, action);
        }
        StoreMetrics::record_action();
        // No receivers is fine.
        let _ = self.inner.actions.send(action.clone());
    }

    fn apply(&self, state: &mut S, action: &Action) {
        match action {
            Action::Batch(actions) => {
                for inner in actions {
                    self.apply(state, inner);
                }
            }
            Action::Message(_) => self.inner.reducer.reduce(state, action),
            Action::Call(call) => {
                tracing::warn!(name = call.name(), "Effect call reached the reducer; is the effect bridge installed?");
            }
        }
    }

    /// Read the state through `f` without cloning it
    pub fn state<F, T>(&self, f: F) -> T
    where
        F: FnOnce(&S) -> T,
    {
        let state = self.inner.state.read().unwrap_or_else(PoisonError::into_inner);
        f(&state)
    }

    /// Observe every reduced action
    ///
    /// A batch is delivered once, as the batch.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Action> {
        self.inner.actions.subscribe()
    }
}

impl<S: Clone + Send + Sync + 'static> Store<S> {
    /// Snapshot of the current state
    #[must_use]
    pub fn get_state(&self) -> S {
        self.state(S::clone)
    }
}

impl<S: Clone + Send + Sync + 'static> StoreHandle<S> for Store<S> {
    fn dispatch(&self, action: Action) -> Dispatched<S> {
        Self::dispatch(self, action)
    }

    fn get_state(&self) -> S {
        Self::get_state(self)
    }
}

impl<S> Clone for Store<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S> fmt::Debug for Store<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("middleware", &self.inner.middleware.len())
            .field("observers", &self.inner.actions.receiver_count())
            .finish_non_exhaustive()
    }
}

/// Builder for [`Store`]
pub struct StoreBuilder<S> {
    initial_state: S,
    reducer: Box<dyn Reducer<S>>,
    middleware: Vec<Arc<dyn StoreMiddleware<S>>>,
    config: StoreConfig,
}

impl<S: Send + Sync + 'static> StoreBuilder<S> {
    /// Append one middleware to the dispatch chain
    #[must_use]
    pub fn with_middleware(mut self, middleware: Arc<dyn StoreMiddleware<S>>) -> Self {
        self.middleware.push(middleware);
        self
    }

    /// Append several middleware to the dispatch chain, in order
    #[must_use]
    pub fn with_middleware_list(mut self, middleware: Vec<Arc<dyn StoreMiddleware<S>>>) -> Self {
        self.middleware.extend(middleware);
        self
    }

    /// Replace the configuration
    #[must_use]
    pub fn with_config(mut self, config: StoreConfig) -> Self {
        self.config = config;
        self
    }

    /// Build the store
    #[must_use]
    pub fn build(self) -> Store<S> {
        let (actions, _) = broadcast::channel(self.config.broadcast_capacity.max(1));
        Store {
            inner: Arc::new(StoreInner {
                state: RwLock::new(self.initial_state),
                reducer: self.reducer,
                middleware: self.middleware,
                actions,
            }),
        }
    }
}

impl<S> fmt::Debug for StoreBuilder<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreBuilder")
            .field("middleware", &self.middleware.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
