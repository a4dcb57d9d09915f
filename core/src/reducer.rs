//! Host-store reducers and their composition.
//!
//! Reducers are plain synchronous state transitions over [`Action`]s. Effects
//! never reach them: the store bridge intercepts effect calls, and batches
//! are unwrapped by the store before reducing.
//!
//! ```
//! use fxpipe_core::{Action, Reducer, combine_reducers};
//! use serde_json::json;
//!
//! #[derive(Default)]
//! struct Counter {
//!     hits: u32,
//!     last: String,
//! }
//!
//! let hits = |state: &mut Counter, action: &Action| {
//!     if action.kind() == "hit" {
//!         state.hits += 1;
//!     }
//! };
//! let last = |state: &mut Counter, action: &Action| state.last = action.kind().to_owned();
//!
//! let reducers: Vec<Box<dyn Reducer<Counter>>> = vec![Box::new(hits), Box::new(last)];
//! let combined = combine_reducers(reducers);
//! let mut state = Counter::default();
//! combined.reduce(&mut state, &Action::new("hit", json!(null)));
//! assert_eq!(state.hits, 1);
//! assert_eq!(state.last, "hit");
//! ```

use crate::action::Action;
use std::marker::PhantomData;

/// A synchronous state transition
pub trait Reducer<S>: Send + Sync {
    /// Apply `action` to `state`
    fn reduce(&self, state: &mut S, action: &Action);
}

impl<S, F> Reducer<S> for F
where
    F: Fn(&mut S, &Action) + Send + Sync,
{
    fn reduce(&self, state: &mut S, action: &Action) {
        self(state, action);
    }
}

/// Run several reducers over the same state, in order
#[must_use]
pub fn combine_reducers<S>(reducers: Vec<Box<dyn Reducer<S>>>) -> CombinedReducer<S> {
    CombinedReducer { reducers }
}

/// Reducers run in sequence
///
/// Created by [`combine_reducers`].
pub struct CombinedReducer<S> {
    reducers: Vec<Box<dyn Reducer<S>>>,
}

impl<S> CombinedReducer<S> {
    /// Append another reducer
    pub fn push(&mut self, reducer: Box<dyn Reducer<S>>) {
        self.reducers.push(reducer);
    }
}

impl<S> Reducer<S> for CombinedReducer<S> {
    fn reduce(&self, state: &mut S, action: &Action) {
        for reducer in &self.reducers {
            reducer.reduce(state, action);
        }
    }
}

/// Focus a reducer on the part of the state returned by `focus`
pub fn scope_reducer<S, Sub, R>(reducer: R, focus: fn(&mut S) -> &mut Sub) -> ScopedReducer<S, Sub, R>
where
    R: Reducer<Sub>,
{
    ScopedReducer {
        reducer,
        focus,
        _state: PhantomData,
    }
}

/// A reducer over part of a larger state
///
/// Created by [`scope_reducer`].
pub struct ScopedReducer<S, Sub, R> {
    reducer: R,
    focus: fn(&mut S) -> &mut Sub,
    _state: PhantomData<fn(&mut S, &mut Sub)>,
}

impl<S, Sub, R> Reducer<S> for ScopedReducer<S, Sub, R>
where
    R: Reducer<Sub>,
{
    fn reduce(&self, state: &mut S, action: &Action) {
        self.reducer.reduce((self.focus)(state), action);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Default)]
    struct Totals {
        count: i64,
        names: Vec<String>,
    }

    #[derive(Default)]
    struct App {
        totals: Totals,
    }

    fn count(state: &mut Totals, action: &Action) {
        match action.kind() {
            "increment" => state.count += 1,
            "decrement" => state.count -= 1,
            _ => {}
        }
    }

    fn names(state: &mut Totals, action: &Action) {
        if let Some(name) = action.payload().and_then(|payload| payload["name"].as_str()) {
            state.names.push(name.to_owned());
        }
    }

    #[test]
    fn combined_reducers_run_in_order() {
        let reducers: Vec<Box<dyn Reducer<Totals>>> = vec![Box::new(count), Box::new(names)];
        let combined = combine_reducers(reducers);
        let mut state = Totals::default();

        combined.reduce(&mut state, &Action::new("increment", json!({ "name": "alice" })));
        combined.reduce(&mut state, &Action::new("decrement", json!(null)));

        assert_eq!(state.count, 0);
        assert_eq!(state.names, vec!["alice".to_owned()]);
    }

    #[test]
    fn scoped_reducer_only_sees_its_slice() {
        let scoped = scope_reducer(count, |app: &mut App| &mut app.totals);
        let mut state = App::default();

        scoped.reduce(&mut state, &Action::new("increment", json!(null)));

        assert_eq!(state.totals.count, 1);
    }
}
