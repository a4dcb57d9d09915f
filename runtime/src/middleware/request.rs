//! Request-shaped middleware: defaults, URL derivation and response caching.

use crate::api::strip_verb;
use crate::slice::add_data;
use fxpipe_core::{Compose, Context, MiddlewareResult, Next, PipeError, Request, SharedMiddleware, from_fn};
use serde_json::{Map, Value};

fn request_mut<S>(ctx: &mut Context<S>) -> Result<&mut Request, PipeError> {
    ctx.request.as_mut().ok_or(PipeError::MissingRequest)
}

/// Ensure `ctx.request` exists before the rest of the chain runs
///
/// A missing request becomes an empty `GET` request. `ctx.response` stays
/// `None` until the transport fills it in.
#[must_use]
pub fn query_ctx<S: 'static>() -> SharedMiddleware<S> {
    from_fn(|ctx, mut next| {
        if ctx.request.is_none() {
            ctx.request = Some(Request::default().with_method(http::Method::GET));
        }
        next.run(ctx)
    })
}

/// Derive `request.url` and `request.method` from the effect name
///
/// Runs when the payload is an object (or absent). Without a URL, each
/// `:param` placeholder in the name is replaced with the payload value under
/// the same key, and a `[VERB]` marker in the name is stripped and becomes
/// the method, replacing the `GET` default of [`query_ctx`]. A request still
/// lacking a method takes it from a marker left in a preset URL. A
/// structured `data` body is serialized into `body` when no raw body exists.
#[must_use]
pub fn url_parser<S: 'static>() -> SharedMiddleware<S> {
    from_fn(|ctx, next| Box::pin(parse_url(ctx, next)))
}

async fn parse_url<S: 'static>(ctx: &mut Context<S>, mut next: Next<S>) -> MiddlewareResult {
    let params = match &ctx.payload {
        Value::Object(params) => params.clone(),
        Value::Null => Map::new(),
        _ => return next.run(ctx).await,
    };
    let name = ctx.name.clone();
    let request = request_mut(ctx)?;

    if request.url.as_deref().is_none_or(str::is_empty) {
        let (url, verb) = strip_verb(&fill_params(&name, &params));
        request.url = Some(url);
        if verb.is_some() {
            request.method = verb;
        }
    }

    if request.body.is_none() {
        if let Some(data) = &request.data {
            request.body = Some(serde_json::to_string(data)?);
        }
    }

    if request.method.is_none() {
        request.method = request.url.as_deref().and_then(|url| strip_verb(url).1);
    }

    next.run(ctx).await
}

fn fill_params(name: &str, params: &Map<String, Value>) -> String {
    // Longest names first, so `:id` cannot eat the front of `:idx`.
    let mut entries: Vec<(&String, &Value)> = params.iter().collect();
    entries.sort_by(|(a, _), (b, _)| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
    entries.into_iter().fold(name.to_owned(), |url, (key, value)| {
        let text = match value {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        };
        url.replacen(&format!(":{key}"), &text, 1)
    })
}

/// Cache the response data under the effect key
///
/// Only requests flagged with `simple_cache` are cached. The write is queued
/// on `ctx.actions` after the rest of the chain has run.
#[must_use]
pub fn simple_cache<S: 'static>() -> SharedMiddleware<S> {
    from_fn(|ctx, next| Box::pin(cache_response(ctx, next)))
}

async fn cache_response<S: 'static>(ctx: &mut Context<S>, mut next: Next<S>) -> MiddlewareResult {
    next.run(ctx).await?;
    if !ctx.request.as_ref().is_some_and(|request| request.simple_cache) {
        return Ok(());
    }
    let data = ctx.response.as_ref().map_or(Value::Null, |response| response.data.clone());
    let mut entry = Map::new();
    entry.insert(ctx.key.clone(), data);
    ctx.actions.push(add_data(entry));
    Ok(())
}

/// [`url_parser`] followed by [`simple_cache`]
#[must_use]
pub fn request_parser<S: 'static>() -> SharedMiddleware<S> {
    std::sync::Arc::new(Compose::new(url_parser(), vec![simple_cache()]))
}
