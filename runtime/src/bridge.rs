//! Store middleware connecting the host store to effect pipes.

use crate::store::{Store, StoreMiddleware};
use fxpipe_core::{Action, Dispatched, EffectTask, Emitter};
use std::sync::Arc;

/// Store middleware that runs effect calls
///
/// Every dispatched action is first emitted so that pending
/// [`Context::take`](fxpipe_core::Context::take) waits resolve before the
/// dispatch returns. Effect calls are then intercepted and started against
/// the store; everything else continues down the chain.
#[derive(Clone, Debug, Default)]
pub struct EffectBridge {
    emitter: Emitter,
}

impl EffectBridge {
    /// Emitter fed by this bridge
    #[must_use]
    pub const fn emitter(&self) -> &Emitter {
        &self.emitter
    }
}

/// Create the bridge with a fresh emitter
#[must_use]
pub fn create_middleware() -> EffectBridge {
    EffectBridge::default()
}

impl<S: Clone + Send + Sync + 'static> StoreMiddleware<S> for EffectBridge {
    fn handle(&self, store: &Store<S>, action: Action, next: &dyn Fn(Action) -> Dispatched<S>) -> Dispatched<S> {
        self.emitter.emit(&action);

        let Action::Call(call) = action else {
            return next(action);
        };

        tracing::debug!(name = call.name(), key = call.key(), "Starting effect");
        match call.start(Arc::new(store.clone()), self.emitter.clone()) {
            Ok(effect) => Dispatched::Effect(EffectTask::start(call.name(), effect)),
            Err(err) => {
                tracing::error!(name = call.name(), error = %err, "Could not start effect");
                Dispatched::Effect(EffectTask::Finished(Err(err)))
            }
        }
    }
}
