//! Standard middleware.
//!
//! Each function returns an independent [`SharedMiddleware`]; the host
//! decides the order. The conventional wrapper for HTTP-shaped effects is
//!
//! ```ignore
//! api.use_middleware(request_monitor(None));
//! api.use_middleware(api.actions());
//! api.use_middleware(request_parser());
//! api.use_middleware(transport);
//! ```
//!
//! [`SharedMiddleware`]: fxpipe_core::SharedMiddleware

mod flow;
mod loading;
mod request;

pub use flow::{DEFAULT_TIMER, UndoConfig, optimistic, take_leading, timer, undoer};
pub use loading::{ErrorMessageFn, dispatch_actions, error_handler, loading_monitor, request_monitor};
pub use request::{query_ctx, request_parser, simple_cache, url_parser};
