use fxpipe_core::{
    Action, CancellationToken, Compose, Context, Dispatched, Emitter, FxStatus, MiddlewareResult, SharedMiddleware,
    StoreHandle,
};
use serde_json::Value;
use std::sync::{Arc, Mutex, PoisonError};

/// Store handle that records every dispatched action
///
/// Dispatches are emitted on the store's [`Emitter`] first, like the effect
/// bridge does, so `ctx.take()` waits resolve. State never changes.
pub struct RecordingStore<S> {
    state: Mutex<S>,
    dispatched: Mutex<Vec<Action>>,
    emitter: Emitter,
}

impl<S: Clone + Send + 'static> RecordingStore<S> {
    /// Store holding `state`
    #[must_use]
    pub fn new(state: S) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(state),
            dispatched: Mutex::new(Vec::new()),
            emitter: Emitter::new(),
        })
    }

    /// Replace the state returned by `get_state`
    pub fn set_state(&self, state: S) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    /// Emitter fed by `dispatch`
    #[must_use]
    pub const fn emitter(&self) -> &Emitter {
        &self.emitter
    }

    /// Every dispatched action, in order
    #[must_use]
    pub fn dispatched(&self) -> Vec<Action> {
        self.dispatched.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Types of every dispatched action, with batches flattened
    #[must_use]
    pub fn dispatched_kinds(&self) -> Vec<String> {
        fn flatten(action: &Action, kinds: &mut Vec<String>) {
            match action {
                Action::Batch(actions) => actions.iter().for_each(|inner| flatten(inner, kinds)),
                other => kinds.push(other.kind().to_owned()),
            }
        }

        let mut kinds = Vec::new();
        for action in &self.dispatched() {
            flatten(action, &mut kinds);
        }
        kinds
    }

    /// Forget the recorded actions
    pub fn clear(&self) {
        self.dispatched.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }
}

impl<S: Clone + Send + 'static> StoreHandle<S> for RecordingStore<S> {
    fn dispatch(&self, action: Action) -> Dispatched<S> {
        self.emitter.emit(&action);
        self.dispatched
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(action);
        Dispatched::Reduced
    }

    fn get_state(&self) -> S {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl<S> std::fmt::Debug for RecordingStore<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordingStore")
            .field("emitter", &self.emitter)
            .finish_non_exhaustive()
    }
}

/// Builds a [`Context`] bound to a [`RecordingStore`]
#[derive(Debug, Clone)]
pub struct ContextBuilder {
    name: String,
    payload: Value,
    status: FxStatus,
    undoable: bool,
    signal: Option<CancellationToken>,
}

impl ContextBuilder {
    /// Context for effect `name` without a payload
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            payload: Value::Null,
            status: FxStatus::Idle,
            undoable: false,
            signal: None,
        }
    }

    /// Set the payload
    #[must_use]
    pub fn payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    /// Start from `status`
    #[must_use]
    pub const fn status(mut self, status: FxStatus) -> Self {
        self.status = status;
        self
    }

    /// Mark the invocation undoable
    #[must_use]
    pub const fn undoable(mut self) -> Self {
        self.undoable = true;
        self
    }

    /// Bind the invocation to `signal`
    #[must_use]
    pub fn signal(mut self, signal: CancellationToken) -> Self {
        self.signal = Some(signal);
        self
    }

    /// Build the context
    #[must_use]
    pub fn build<S: Clone + Send + 'static>(self, store: &Arc<RecordingStore<S>>) -> Context<S> {
        let handle: Arc<dyn StoreHandle<S>> = Arc::clone(store) as Arc<dyn StoreHandle<S>>;
        let mut ctx = Context::new(self.name, self.payload, handle, store.emitter().clone()).with_status(self.status);
        if let Some(signal) = self.signal {
            ctx = ctx.with_signal(signal);
        }
        ctx.undoable = self.undoable;
        ctx
    }
}

/// Run `middleware` as one chain against `ctx`
///
/// An empty list is treated as a chain that does nothing.
pub async fn run_chain<S: 'static>(middleware: Vec<SharedMiddleware<S>>, ctx: &mut Context<S>) -> MiddlewareResult {
    let mut steps = middleware.into_iter();
    let Some(first) = steps.next() else {
        return Ok(());
    };
    Compose::new(first, steps.collect()).run(ctx, None).await
}

/// Yield to the runtime until spawned effects had a chance to progress
pub async fn wait_for_updates() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}

/// Install a `tracing` subscriber honouring `RUST_LOG`, once per process
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
