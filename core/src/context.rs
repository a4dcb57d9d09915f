//! Per-invocation state threaded through an effect's middleware chain.

use crate::action::Action;
use crate::cancel::{self, Cancelable, CancellationToken};
use crate::emitter::Emitter;
use crate::encoding::effect_key;
use crate::error::PipeError;
use crate::loader::LoaderMeta;
use crate::store::{Dispatched, StoreHandle};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Lifecycle of one effect invocation
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FxStatus {
    /// Not started
    #[default]
    Idle,
    /// Downstream middleware in flight
    Running,
    /// Cancelled through [`Context::cancel`]
    Cancelled,
    /// Downstream middleware failed
    Aborted,
    /// Downstream middleware finished normally
    Completed,
}

impl fmt::Display for FxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Cancelled => "cancelled",
            Self::Aborted => "aborted",
            Self::Completed => "completed",
        };
        f.write_str(label)
    }
}

/// Last known status of each effect name, shared by a pipe and its contexts
#[derive(Clone, Debug, Default)]
pub struct StatusCache {
    inner: Arc<Mutex<HashMap<String, FxStatus>>>,
}

impl StatusCache {
    /// Create an empty cache
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Status recorded for `name`, `Idle` if none
    #[must_use]
    pub fn get(&self, name: &str) -> FxStatus {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .copied()
            .unwrap_or_default()
    }

    /// Record the status of `name`
    pub fn set(&self, name: &str, status: FxStatus) {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_owned(), status);
    }
}

/// Request slot filled in by request-shaped middleware
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    /// Target URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// HTTP method
    #[serde(default, skip_serializing_if = "Option::is_none", with = "method_serde")]
    pub method: Option<http::Method>,

    /// Serialized request body
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,

    /// Structured body, serialized into `body` by the URL parser
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,

    /// Store the response data in the simple cache
    #[serde(default)]
    pub simple_cache: bool,
}

impl Request {
    /// Set the HTTP method
    #[must_use]
    pub fn with_method(mut self, method: http::Method) -> Self {
        self.method = Some(method);
        self
    }

    /// Set the URL
    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Set the raw body
    #[must_use]
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Set the structured body
    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Toggle caching of the response data
    #[must_use]
    pub const fn with_simple_cache(mut self, simple_cache: bool) -> Self {
        self.simple_cache = simple_cache;
        self
    }

    /// Copy every field set on `other` onto this request
    pub fn merge(&mut self, other: &Self) {
        if other.url.is_some() {
            self.url.clone_from(&other.url);
        }
        if other.method.is_some() {
            self.method.clone_from(&other.method);
        }
        if other.body.is_some() {
            self.body.clone_from(&other.body);
        }
        if other.data.is_some() {
            self.data.clone_from(&other.data);
        }
        if other.simple_cache {
            self.simple_cache = true;
        }
    }
}

mod method_serde {
    use serde::{Deserialize, Deserializer, Serializer};

    #[allow(clippy::ref_option)]
    pub fn serialize<Ser: Serializer>(method: &Option<http::Method>, serializer: Ser) -> Result<Ser::Ok, Ser::Error> {
        match method {
            Some(method) => serializer.serialize_some(method.as_str()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<http::Method>, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        raw.map(|raw| http::Method::from_bytes(raw.to_uppercase().as_bytes()).map_err(serde::de::Error::custom))
            .transpose()
    }
}

/// Response slot filled in by the transport middleware
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// Transport status code
    pub status: u16,
    /// Whether the request succeeded
    pub ok: bool,
    /// Response body
    pub data: Value,
}

impl Response {
    /// Successful response
    #[must_use]
    pub const fn success(status: u16, data: Value) -> Self {
        Self { status, ok: true, data }
    }

    /// Failed response
    #[must_use]
    pub const fn failure(status: u16, data: Value) -> Self {
        Self { status, ok: false, data }
    }
}

/// Speculative update applied before an effect and reverted if it fails
#[derive(Clone, Debug)]
pub struct Optimistic {
    /// Dispatched before the rest of the chain runs
    pub apply: Action,
    /// Dispatched when the response is not a success
    pub revert: Action,
}

/// State of one effect invocation
///
/// Owned by exactly one invocation. Middleware read and fill in the public
/// slots; the store, emitter and cancellation token are borrowed from the
/// surrounding pipe for the lifetime of the run.
pub struct Context<S> {
    /// Registered effect name
    pub name: String,
    /// Deterministic key of `{name, payload}`
    pub key: String,
    /// Caller-supplied argument
    pub payload: Value,
    /// Request slot
    pub request: Option<Request>,
    /// Response slot, `None` when the request never completed
    pub response: Option<Response>,
    /// Pending state updates, flushed as one batch
    pub actions: Vec<Action>,
    /// Extra loader fields merged into the success or error update
    pub loader: Option<LoaderMeta>,
    /// Speculative update handled by the optimistic middleware
    pub optimistic: Option<Optimistic>,
    /// Gate the effect behind the undo window
    pub undoable: bool,
    status: FxStatus,
    statuses: StatusCache,
    store: Arc<dyn StoreHandle<S>>,
    emitter: Emitter,
    signal: CancellationToken,
}

impl<S> Context<S> {
    /// Fresh context for invoking `name` with `payload`
    pub fn new(name: impl Into<String>, payload: Value, store: Arc<dyn StoreHandle<S>>, emitter: Emitter) -> Self {
        let name = name.into();
        let key = effect_key(&name, &payload);
        Self {
            name,
            key,
            payload,
            request: None,
            response: None,
            actions: Vec::new(),
            loader: None,
            optimistic: None,
            undoable: false,
            status: FxStatus::Idle,
            statuses: StatusCache::new(),
            store,
            emitter,
            signal: CancellationToken::new(),
        }
    }

    /// Override the derived key
    #[must_use]
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    /// Start from a previously recorded status
    #[must_use]
    pub const fn with_status(mut self, status: FxStatus) -> Self {
        self.status = status;
        self
    }

    /// Report status changes to `statuses`
    #[must_use]
    pub fn with_status_cache(mut self, statuses: StatusCache) -> Self {
        self.statuses = statuses;
        self
    }

    /// Bind the invocation to `signal`
    #[must_use]
    pub fn with_signal(mut self, signal: CancellationToken) -> Self {
        self.signal = signal;
        self
    }

    /// Current status
    #[must_use]
    pub const fn status(&self) -> FxStatus {
        self.status
    }

    /// Cache the status is reported to, shared with the owning pipe
    #[must_use]
    pub const fn status_cache(&self) -> &StatusCache {
        &self.statuses
    }

    /// Update the status, recording it for the effect name
    pub fn set_status(&mut self, status: FxStatus) {
        self.status = status;
        self.statuses.set(&self.name, status);
    }

    /// Cancel the invocation and every operation bound to its signal
    pub fn cancel(&mut self) {
        self.set_status(FxStatus::Cancelled);
        self.signal.cancel();
    }

    /// Cancellation token of this invocation
    #[must_use]
    pub const fn signal(&self) -> &CancellationToken {
        &self.signal
    }

    /// Wait for the next dispatched action of type `kind`
    ///
    /// The wait is bound to a child of the invocation's signal; cancelling it
    /// removes the listener from the emitter.
    pub fn take(&self, kind: impl Into<String>) -> Cancelable<Action> {
        let kind = kind.into();
        let emitter = self.emitter.clone();
        let token = self.signal.child_token();
        Cancelable::from_executor(
            move |resolver, on_cancel| {
                let id = emitter.sub(kind.clone(), move |action| resolver.resolve(action.clone()));
                on_cancel.register(move || emitter.unsub(&kind, id));
            },
            Some(&token),
        )
    }

    /// Cancelable sleep bound to a child of the invocation's signal
    pub fn delay(&self, duration: Duration) -> Cancelable<()> {
        cancel::delay_with(duration, self.signal.child_token())
    }

    /// Dispatch into the host store
    pub fn dispatch(&self, action: Action) -> Dispatched<S> {
        self.store.dispatch(action)
    }

    /// Snapshot of the host store's state
    #[must_use]
    pub fn get_state(&self) -> S {
        self.store.get_state()
    }

    /// Emitter fed by the store bridge
    #[must_use]
    pub const fn emitter(&self) -> &Emitter {
        &self.emitter
    }

    /// Decode the payload into `T`
    ///
    /// # Errors
    ///
    /// Returns [`PipeError::Json`] if the payload does not match `T`.
    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<T, PipeError> {
        Ok(T::deserialize(&self.payload)?)
    }
}

impl<S> fmt::Debug for Context<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("name", &self.name)
            .field("key", &self.key)
            .field("status", &self.status)
            .field("payload", &self.payload)
            .field("request", &self.request)
            .field("response", &self.response)
            .field("actions", &self.actions)
            .field("loader", &self.loader)
            .field("optimistic", &self.optimistic)
            .field("undoable", &self.undoable)
            .finish_non_exhaustive()
    }
}
