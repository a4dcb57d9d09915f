//! Loader table and simple data cache mounted in the host state.
//!
//! The standard middleware record loading progress and cached responses
//! through the actions created here. Host states expose the two tables
//! through [`HasQueryState`]; [`prepare_store`] wires the reducer and the
//! effect bridge together.

use crate::bridge::{EffectBridge, create_middleware};
use crate::store::{Store, StoreMiddleware};
use fxpipe_core::{
    Action, Clock, CombinedReducer, LoaderPayload, LoaderState, LoadingStatus, Reducer, SystemClock,
    combine_reducers, scope_reducer,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// Key of the loader table in the host state
pub const LOADERS_NAME: &str = "@@fxpipe/loaders";

/// Key of the data cache in the host state
pub const DATA_NAME: &str = "@@fxpipe/data";

/// Action types handled by [`QueryReducer`]
pub mod kinds {
    /// Mark a loader as loading
    pub const LOADER_LOADING: &str = "@@fxpipe/loaders/loading";
    /// Mark a loader as successful
    pub const LOADER_SUCCESS: &str = "@@fxpipe/loaders/success";
    /// Mark a loader as failed
    pub const LOADER_ERROR: &str = "@@fxpipe/loaders/error";
    /// Reset one loader to idle
    pub const LOADER_RESET_BY_ID: &str = "@@fxpipe/loaders/resetById";
    /// Remove loaders
    pub const LOADER_REMOVE: &str = "@@fxpipe/loaders/remove";
    /// Clear the loader table
    pub const LOADER_RESET_ALL: &str = "@@fxpipe/loaders/resetAll";
    /// Insert or replace cache entries
    pub const DATA_ADD: &str = "@@fxpipe/data/add";
    /// Replace the whole cache
    pub const DATA_SET: &str = "@@fxpipe/data/set";
    /// Remove cache entries
    pub const DATA_REMOVE: &str = "@@fxpipe/data/remove";
    /// Merge fields into cache entries
    pub const DATA_PATCH: &str = "@@fxpipe/data/patch";
    /// Clear the cache
    pub const DATA_RESET: &str = "@@fxpipe/data/reset";
}

/// Loader table and data cache
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryState {
    /// Loader records keyed by id
    #[serde(rename = "@@fxpipe/loaders", default)]
    pub loaders: HashMap<String, LoaderState>,

    /// Cached response data keyed by effect key
    #[serde(rename = "@@fxpipe/data", default)]
    pub data: Map<String, Value>,
}

/// Host states carrying a [`QueryState`]
pub trait HasQueryState {
    /// The query tables
    fn query(&self) -> &QueryState;

    /// The query tables, mutably
    fn query_mut(&mut self) -> &mut QueryState;
}

impl HasQueryState for QueryState {
    fn query(&self) -> &QueryState {
        self
    }

    fn query_mut(&mut self) -> &mut QueryState {
        self
    }
}

// ============================================================================
// Action creators
// ============================================================================

/// Mark `payload.id` as loading
#[must_use]
pub fn set_loader_start(payload: &LoaderPayload) -> Action {
    Action::new(kinds::LOADER_LOADING, payload.to_value())
}

/// Mark `payload.id` as successful
#[must_use]
pub fn set_loader_success(payload: &LoaderPayload) -> Action {
    Action::new(kinds::LOADER_SUCCESS, payload.to_value())
}

/// Mark `payload.id` as failed
#[must_use]
pub fn set_loader_error(payload: &LoaderPayload) -> Action {
    Action::new(kinds::LOADER_ERROR, payload.to_value())
}

/// Reset loader `id` to idle
#[must_use]
pub fn reset_loader_by_id(id: &str) -> Action {
    Action::new(kinds::LOADER_RESET_BY_ID, Value::String(id.to_owned()))
}

/// Remove the loaders `ids`
#[must_use]
pub fn remove_loaders(ids: &[&str]) -> Action {
    Action::new(kinds::LOADER_REMOVE, Value::from(ids.to_vec()))
}

/// Clear the loader table
#[must_use]
pub fn reset_loaders() -> Action {
    Action::new(kinds::LOADER_RESET_ALL, Value::Null)
}

/// Insert or replace cache entries
#[must_use]
pub fn add_data(entries: Map<String, Value>) -> Action {
    Action::new(kinds::DATA_ADD, Value::Object(entries))
}

/// Replace the whole cache
#[must_use]
pub fn set_data(entries: Map<String, Value>) -> Action {
    Action::new(kinds::DATA_SET, Value::Object(entries))
}

/// Remove cache entries
#[must_use]
pub fn remove_data(keys: &[&str]) -> Action {
    Action::new(kinds::DATA_REMOVE, Value::from(keys.to_vec()))
}

/// Merge fields into existing cache entries
#[must_use]
pub fn patch_data(patches: Map<String, Value>) -> Action {
    Action::new(kinds::DATA_PATCH, Value::Object(patches))
}

/// Clear the cache
#[must_use]
pub fn reset_data() -> Action {
    Action::new(kinds::DATA_RESET, Value::Null)
}

// ============================================================================
// Reducer
// ============================================================================

/// Reduces loader and cache actions into a [`QueryState`]
pub struct QueryReducer {
    clock: Arc<dyn Clock>,
}

impl QueryReducer {
    /// Reducer timestamping with the wall clock
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Reducer timestamping with `clock`
    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    fn timestamp(&self, payload: &LoaderPayload) -> i64 {
        payload
            .timestamp
            .filter(|timestamp| *timestamp != 0)
            .unwrap_or_else(|| self.clock.now_millis())
    }

    fn loader(&self, state: &mut QueryState, kind: &str, payload: LoaderPayload) {
        let prior = state.loaders.get(&payload.id);
        let last_run = prior.map_or(0, |loader| loader.last_run);
        let last_success = prior.map_or(0, |loader| loader.last_success);

        let (status, last_run, last_success) = match kind {
            kinds::LOADER_LOADING => (LoadingStatus::Loading, self.timestamp(&payload), last_success),
            kinds::LOADER_SUCCESS => (LoadingStatus::Success, last_run, self.timestamp(&payload)),
            _ => (LoadingStatus::Error, last_run, last_success),
        };

        state.loaders.insert(
            payload.id,
            LoaderState {
                status,
                message: payload.message.unwrap_or_default(),
                last_run,
                last_success,
                meta: payload.meta.unwrap_or_default(),
            },
        );
    }
}

impl Default for QueryReducer {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for QueryReducer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryReducer").finish_non_exhaustive()
    }
}

fn decode<T: DeserializeOwned>(kind: &str, payload: &Value) -> Option<T> {
    match T::deserialize(payload) {
        Ok(decoded) => Some(decoded),
        Err(err) => {
            tracing::warn!(kind, error = %err, "Ignoring action with an unexpected payload");
            None
        }
    }
}

impl Reducer<QueryState> for QueryReducer {
    fn reduce(&self, state: &mut QueryState, action: &Action) {
        let Action::Message(message) = action else {
            return;
        };
        let payload = &message.payload;

        match message.kind.as_str() {
            kind @ (kinds::LOADER_LOADING | kinds::LOADER_SUCCESS | kinds::LOADER_ERROR) => {
                if let Some(loader) = decode::<LoaderPayload>(kind, payload) {
                    self.loader(state, kind, loader);
                }
            }
            kinds::LOADER_RESET_BY_ID => {
                if let Some(id) = decode::<String>(kinds::LOADER_RESET_BY_ID, payload) {
                    state.loaders.insert(id, LoaderState::default());
                }
            }
            kinds::LOADER_REMOVE => {
                for id in decode::<Vec<String>>(kinds::LOADER_REMOVE, payload).unwrap_or_default() {
                    state.loaders.remove(&id);
                }
            }
            kinds::LOADER_RESET_ALL => state.loaders.clear(),
            kinds::DATA_ADD => {
                if let Some(entries) = payload.as_object() {
                    state.data.extend(entries.clone());
                }
            }
            kinds::DATA_SET => {
                if let Some(entries) = payload.as_object() {
                    state.data.clone_from(entries);
                }
            }
            kinds::DATA_REMOVE => {
                for key in decode::<Vec<String>>(kinds::DATA_REMOVE, payload).unwrap_or_default() {
                    state.data.remove(&key);
                }
            }
            kinds::DATA_PATCH => {
                let Some(patches) = payload.as_object() else {
                    return;
                };
                for (id, patch) in patches {
                    let (Some(fields), Some(entry)) = (patch.as_object(), state.data.get_mut(id)) else {
                        continue;
                    };
                    match entry {
                        Value::Object(existing) => existing.extend(fields.clone()),
                        other => *other = Value::Object(fields.clone()),
                    }
                }
            }
            kinds::DATA_RESET => state.data.clear(),
            _ => {}
        }
    }
}

// ============================================================================
// Selectors
// ============================================================================

/// The loader table
#[must_use]
pub fn select_loaders<S: HasQueryState>(state: &S) -> &HashMap<String, LoaderState> {
    &state.query().loaders
}

/// Loader `id`, idle when it never ran
#[must_use]
pub fn select_loader_by_id<S: HasQueryState>(state: &S, id: &str) -> LoaderState {
    state.query().loaders.get(id).cloned().unwrap_or_default()
}

/// The data cache
#[must_use]
pub fn select_data<S: HasQueryState>(state: &S) -> &Map<String, Value> {
    &state.query().data
}

/// Cache entry `key`
#[must_use]
pub fn select_data_by_id<'s, S: HasQueryState>(state: &'s S, key: &str) -> Option<&'s Value> {
    state.query().data.get(key)
}

// ============================================================================
// Store setup
// ============================================================================

/// Root reducer and store middleware for a host state
pub struct PreparedStore<S> {
    /// Query slice reducer followed by the application reducer
    pub reducer: CombinedReducer<S>,
    /// Store middleware, starting with the effect bridge
    pub middleware: Vec<Arc<dyn StoreMiddleware<S>>>,
    /// The installed bridge
    pub bridge: EffectBridge,
}

impl<S> std::fmt::Debug for PreparedStore<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreparedStore")
            .field("middleware", &self.middleware.len())
            .field("bridge", &self.bridge)
            .finish_non_exhaustive()
    }
}

/// Combine `reducer` with the query slice and create the effect bridge
pub fn prepare_store<S, R>(reducer: R) -> PreparedStore<S>
where
    S: HasQueryState + Clone + Send + Sync + 'static,
    R: Reducer<S> + 'static,
{
    prepare_store_with_clock(reducer, Arc::new(SystemClock))
}

/// [`prepare_store`] with loader timestamps taken from `clock`
pub fn prepare_store_with_clock<S, R>(reducer: R, clock: Arc<dyn Clock>) -> PreparedStore<S>
where
    S: HasQueryState + Clone + Send + Sync + 'static,
    R: Reducer<S> + 'static,
{
    let query: Box<dyn Reducer<S>> = Box::new(scope_reducer(QueryReducer::with_clock(clock), S::query_mut));
    let bridge = create_middleware();
    PreparedStore {
        reducer: combine_reducers(vec![query, Box::new(reducer)]),
        middleware: vec![Arc::new(bridge.clone())],
        bridge,
    }
}

/// Build a store with the query slice and the effect bridge installed
pub fn setup_store<S, R>(initial_state: S, reducer: R) -> Store<S>
where
    S: HasQueryState + Clone + Send + Sync + 'static,
    R: Reducer<S> + 'static,
{
    let prepared = prepare_store(reducer);
    Store::builder(initial_state, prepared.reducer)
        .with_middleware_list(prepared.middleware)
        .build()
}
