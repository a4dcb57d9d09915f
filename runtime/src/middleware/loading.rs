//! Failure logging, loader tracking and batched state updates.

use crate::middleware::request::query_ctx;
use crate::slice::{reset_loader_by_id, set_loader_error, set_loader_start, set_loader_success};
use fxpipe_core::{
    Action, Compose, Context, LoaderPayload, Middleware, MiddlewareResult, Next, SharedMiddleware, from_fn,
};
use futures::future::BoxFuture;
use serde_json::Value;
use std::sync::Arc;

/// Derives the loader message of a failed response
pub type ErrorMessageFn<S> = Arc<dyn Fn(&Context<S>) -> String + Send + Sync>;

/// Log downstream failures with the effect name, then propagate them
#[must_use]
pub fn error_handler<S: 'static>() -> SharedMiddleware<S> {
    from_fn(|ctx, next| Box::pin(log_failure(ctx, next)))
}

async fn log_failure<S: 'static>(ctx: &mut Context<S>, mut next: Next<S>) -> MiddlewareResult {
    let outcome = next.run(ctx).await;
    match &outcome {
        Err(err) if err.is_aborted() => tracing::debug!(name = %ctx.name, "Effect aborted"),
        Err(err) => tracing::error!(
            name = %ctx.name,
            error = %err,
            "Error: {err}. Check the endpoint [{}]",
            ctx.name
        ),
        Ok(()) => {}
    }
    outcome
}

/// Dispatch the queued `ctx.actions` as one batch once the chain has run
#[must_use]
pub fn dispatch_actions<S: 'static>() -> SharedMiddleware<S> {
    from_fn(|ctx, next| Box::pin(flush_actions(ctx, next)))
}

async fn flush_actions<S: 'static>(ctx: &mut Context<S>, mut next: Next<S>) -> MiddlewareResult {
    next.run(ctx).await?;
    if ctx.actions.is_empty() {
        return Ok(());
    }
    ctx.dispatch(Action::batch(ctx.actions.clone())).await?;
    Ok(())
}

/// Track the effect in the loader table
///
/// The loading transition is dispatched right away. Afterwards a missing
/// response resets the loader, a failed one records an error with the
/// message from `error_message` (default: `response.data.message`), and a
/// successful one records success. Fields set on `ctx.loader` override the
/// derived ones.
#[must_use]
pub fn loading_monitor<S: 'static>(error_message: Option<ErrorMessageFn<S>>) -> SharedMiddleware<S> {
    Arc::new(LoadingMonitor { error_message })
}

struct LoadingMonitor<S> {
    error_message: Option<ErrorMessageFn<S>>,
}

impl<S: 'static> LoadingMonitor<S> {
    fn message(&self, ctx: &Context<S>) -> String {
        if let Some(derive) = &self.error_message {
            return derive(ctx);
        }
        ctx.response
            .as_ref()
            .and_then(|response| response.data.get("message"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned()
    }

    async fn handle(&self, ctx: &mut Context<S>, mut next: Next<S>) -> MiddlewareResult {
        ctx.dispatch(set_loader_start(&LoaderPayload::new(ctx.name.clone()))).await?;

        next.run(ctx).await?;

        let outcome = match &ctx.response {
            None => reset_loader_by_id(&ctx.name),
            Some(response) if !response.ok => {
                let payload = LoaderPayload::new(ctx.name.clone()).with_message(self.message(ctx));
                set_loader_error(&payload.merged(ctx.loader.as_ref()))
            }
            Some(_) => set_loader_success(&LoaderPayload::new(ctx.name.clone()).merged(ctx.loader.as_ref())),
        };
        ctx.actions.push(outcome);
        Ok(())
    }
}

impl<S: 'static> Middleware<S> for LoadingMonitor<S> {
    fn call<'a>(&'a self, ctx: &'a mut Context<S>, next: Next<S>) -> BoxFuture<'a, MiddlewareResult> {
        Box::pin(self.handle(ctx, next))
    }
}

/// `error_handler`, `query_ctx`, `dispatch_actions` and `loading_monitor`, in
/// that order
#[must_use]
pub fn request_monitor<S: 'static>(error_message: Option<ErrorMessageFn<S>>) -> SharedMiddleware<S> {
    Arc::new(Compose::new(
        error_handler(),
        vec![query_ctx(), dispatch_actions(), loading_monitor(error_message)],
    ))
}
