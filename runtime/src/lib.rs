//! # fxpipe runtime
//!
//! Effect pipes, the standard middleware set and a host store for
//! [`fxpipe_core`].
//!
//! ## Pieces
//!
//! - [`Pipe`] registers named effects and the global middleware chain
//! - [`Api`] adds URI and HTTP verb registration on top of a pipe
//! - [`middleware`] holds the standard middleware (`request_monitor`,
//!   `take_leading`, `undoer`, ...)
//! - [`Store`] is the host state container; [`EffectBridge`] connects it to
//!   the pipes
//! - [`slice`] holds the loader table and simple data cache reducers
//!
//! ## Example
//!
//! ```ignore
//! use fxpipe_runtime::prelude::*;
//!
//! let api = Api::<AppState>::new();
//! api.use_middleware(request_monitor(None));
//! api.use_middleware(api.actions());
//! api.use_middleware(request_parser());
//! api.use_middleware(transport);
//!
//! let create_user = api.post("/users", from_fn(|ctx, mut next| Box::pin(async move {
//!     next.run(ctx).await?;
//!     ctx.actions.push(add_users(ctx.response.as_ref()));
//!     Ok(())
//! })));
//!
//! let store = setup_store(AppState::default(), app_reducer);
//! store.dispatch(create_user.action_with(json!({ "name": "ada" }))).await?;
//! ```

/// HTTP-flavoured effect registration
pub mod api;

/// Store middleware running effect calls
pub mod bridge;

/// Prometheus metrics
pub mod metrics;

/// Standard middleware
pub mod middleware;

/// Named effects and the global middleware chain
pub mod pipe;

/// Loader table and simple data cache
pub mod slice;

/// Host state container
pub mod store;

pub use api::{Api, Uri, strip_verb};
pub use bridge::{EffectBridge, create_middleware};
pub use pipe::{EffectCreator, Pipe};
pub use slice::{
    DATA_NAME, HasQueryState, LOADERS_NAME, PreparedStore, QueryReducer, QueryState, prepare_store,
    prepare_store_with_clock, setup_store,
};
pub use store::{Store, StoreBuilder, StoreConfig, StoreMiddleware};

/// Everything needed to define effects and wire a store
pub mod prelude {
    pub use crate::api::{Api, Uri};
    pub use crate::bridge::{EffectBridge, create_middleware};
    pub use crate::middleware::*;
    pub use crate::pipe::{EffectCreator, Pipe};
    pub use crate::slice::{
        HasQueryState, QueryState, add_data, reset_data, select_data, select_data_by_id, select_loader_by_id,
        select_loaders, set_loader_error, set_loader_start, set_loader_success, setup_store,
    };
    pub use crate::store::{Store, StoreConfig};
    pub use fxpipe_core::{
        Action, ActionCreator, Context, FxStatus, LoaderMeta, Next, Optimistic, PipeError, Request, Response,
        SharedMiddleware, Stack, from_fn, json,
    };
}
