//! Messages flowing through the host store.
//!
//! An [`Action`] is either a plain state-update [`Message`], a batch of actions
//! applied as one unit, or an [`EffectCall`] that the effect bridge intercepts
//! and turns into a middleware run.

use crate::context::Context;
use crate::emitter::Emitter;
use crate::error::PipeError;
use crate::store::{EffectFn, StoreHandle};
use futures::future::BoxFuture;
use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use serde_json::Value;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Sentinel type of effect-trigger actions
pub const FX_CALL: &str = "@@fxpipe/call";

/// Type of batched actions
pub const BATCH: &str = "@@fxpipe/batch";

/// A message dispatched into the host store
#[derive(Clone, Debug)]
pub enum Action {
    /// Plain state-update message
    Message(Message),

    /// Actions reduced in order as a single dispatch
    Batch(Vec<Action>),

    /// Effect trigger, never forwarded to reducers by the bridge
    Call(EffectCall),
}

impl Action {
    /// Create a plain message action
    #[must_use]
    pub fn new(kind: impl Into<String>, payload: Value) -> Self {
        Self::Message(Message {
            kind: kind.into(),
            payload,
        })
    }

    /// Create a plain message action from any serializable payload
    ///
    /// # Errors
    ///
    /// Returns [`PipeError::Json`] if the payload cannot be represented as JSON.
    pub fn from_payload<P: Serialize>(kind: impl Into<String>, payload: &P) -> Result<Self, PipeError> {
        Ok(Self::new(kind, serde_json::to_value(payload)?))
    }

    /// Wrap actions into a single batched dispatch
    #[must_use]
    pub const fn batch(actions: Vec<Self>) -> Self {
        Self::Batch(actions)
    }

    /// Discriminant used by reducers and the event emitter
    #[must_use]
    pub fn kind(&self) -> &str {
        match self {
            Self::Message(message) => &message.kind,
            Self::Batch(_) => BATCH,
            Self::Call(_) => FX_CALL,
        }
    }

    /// Payload of a plain message
    #[must_use]
    pub const fn payload(&self) -> Option<&Value> {
        match self {
            Self::Message(message) => Some(&message.payload),
            Self::Batch(_) | Self::Call(_) => None,
        }
    }

    /// Whether this action triggers an effect
    #[must_use]
    pub const fn is_call(&self) -> bool {
        matches!(self, Self::Call(_))
    }
}

impl Serialize for Action {
    fn serialize<Ser: Serializer>(&self, serializer: Ser) -> Result<Ser::Ok, Ser::Error> {
        let mut out = serializer.serialize_struct("Action", 2)?;
        out.serialize_field("type", self.kind())?;
        match self {
            Self::Message(message) => out.serialize_field("payload", &message.payload)?,
            Self::Batch(actions) => out.serialize_field("payload", actions)?,
            Self::Call(call) => out.serialize_field("payload", call)?,
        }
        out.end()
    }
}

/// Plain `{type, payload}` message
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Message {
    /// Message type
    #[serde(rename = "type")]
    pub kind: String,
    /// Message payload
    pub payload: Value,
}

/// Payload of an effect-trigger action
///
/// Carries everything needed to run the effect once a store picks it up. The
/// runner is stored type-erased so that [`Action`] stays independent of the
/// store's state type; [`EffectCall::start`] recovers it.
#[derive(Clone)]
pub struct EffectCall {
    name: String,
    payload: Value,
    key: String,
    runner: Arc<dyn Any + Send + Sync>,
}

impl EffectCall {
    /// Create an effect call around a typed runner
    #[must_use]
    pub fn new<S: 'static>(name: String, payload: Value, key: String, runner: EffectFn<S>) -> Self {
        Self {
            name,
            payload,
            key,
            runner: Arc::new(runner),
        }
    }

    /// Registered effect name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Caller-supplied payload
    #[must_use]
    pub const fn payload(&self) -> &Value {
        &self.payload
    }

    /// Deterministic key of `{name, payload}`
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Build the effect future against a store
    ///
    /// # Errors
    ///
    /// Returns [`PipeError::StoreMismatch`] when the effect was created for a
    /// different state type than the store's.
    pub fn start<S: 'static>(
        &self,
        store: Arc<dyn StoreHandle<S>>,
        emitter: Emitter,
    ) -> Result<BoxFuture<'static, Result<Context<S>, PipeError>>, PipeError> {
        let runner = self
            .runner
            .downcast_ref::<EffectFn<S>>()
            .ok_or_else(|| PipeError::StoreMismatch(self.name.clone()))?;
        Ok(runner(store, emitter))
    }
}

impl fmt::Debug for EffectCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectCall")
            .field("name", &self.name)
            .field("payload", &self.payload)
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

impl Serialize for EffectCall {
    fn serialize<Ser: Serializer>(&self, serializer: Ser) -> Result<Ser::Ok, Ser::Error> {
        let mut out = serializer.serialize_struct("EffectCall", 3)?;
        out.serialize_field("name", &self.name)?;
        out.serialize_field("payload", &self.payload)?;
        out.serialize_field("key", &self.key)?;
        out.end()
    }
}

/// Creator of plain message actions of a single type
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ActionCreator {
    kind: String,
}

impl ActionCreator {
    /// Create a creator for the given type
    #[must_use]
    pub fn new(kind: impl Into<String>) -> Self {
        Self { kind: kind.into() }
    }

    /// The type string of created actions
    #[must_use]
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Create an action without payload
    #[must_use]
    pub fn action(&self) -> Action {
        Action::new(self.kind.clone(), Value::Null)
    }

    /// Create an action carrying `payload`
    #[must_use]
    pub fn action_with(&self, payload: Value) -> Action {
        Action::new(self.kind.clone(), payload)
    }

    /// Whether `action` was created by this creator
    #[must_use]
    pub fn matches(&self, action: &Action) -> bool {
        action.kind() == self.kind
    }
}

impl fmt::Display for ActionCreator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.kind)
    }
}

/// Confirmation message for undoable effects
#[must_use]
pub fn do_it() -> ActionCreator {
    ActionCreator::new("DO_IT")
}

/// Undo message for undoable effects
#[must_use]
pub fn undo() -> ActionCreator {
    ActionCreator::new("UNDO")
}
