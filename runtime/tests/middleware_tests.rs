//! Tests for the standard middleware, run outside a pipe against a recording store

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

use fxpipe_core::{
    Action, Context, FxStatus, LoaderMeta, Next, Optimistic, PipeError, Request, Response, SharedMiddleware,
    StoreHandle, do_it, undo,
};
use fxpipe_runtime::QueryState;
use fxpipe_runtime::middleware::{
    DEFAULT_TIMER, ErrorMessageFn, UndoConfig, dispatch_actions, error_handler, loading_monitor, optimistic,
    query_ctx, simple_cache, take_leading, timer, undoer, url_parser,
};
use fxpipe_runtime::slice::kinds;
use fxpipe_testing::assertions::assert_kinds;
use fxpipe_testing::{ContextBuilder, RecordingStore, run_chain};
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

// ============================================================================
// Test Fixtures
// ============================================================================

type Store = Arc<RecordingStore<QueryState>>;

fn recording() -> Store {
    RecordingStore::new(QueryState::default())
}

fn counter(hits: &Arc<AtomicUsize>) -> SharedMiddleware<QueryState> {
    let hits = Arc::clone(hits);
    fxpipe_core::from_fn(move |ctx: &mut Context<QueryState>, mut next: Next<QueryState>| {
        hits.fetch_add(1, Ordering::SeqCst);
        next.run(ctx)
    })
}

fn respond(response: Response) -> SharedMiddleware<QueryState> {
    fxpipe_core::from_fn(move |ctx: &mut Context<QueryState>, mut next: Next<QueryState>| {
        ctx.response = Some(response.clone());
        next.run(ctx)
    })
}

fn fail(message: &'static str) -> SharedMiddleware<QueryState> {
    fxpipe_core::from_fn(move |_ctx: &mut Context<QueryState>, _next: Next<QueryState>| {
        Box::pin(async move { Err::<(), _>(PipeError::handler(message)) })
    })
}

fn hits(counter: &Arc<AtomicUsize>) -> usize {
    counter.load(Ordering::SeqCst)
}

// ============================================================================
// query_ctx / url_parser / simple_cache
// ============================================================================

#[tokio::test]
async fn test_query_ctx_defaults_to_a_get_request() {
    let store = recording();
    let mut ctx = ContextBuilder::new("/users").build(&store);

    run_chain(vec![query_ctx()], &mut ctx).await.unwrap();

    assert_eq!(ctx.request.unwrap().method, Some(http::Method::GET));
    assert!(ctx.response.is_none());
    assert!(ctx.actions.is_empty());
}

#[tokio::test]
async fn test_query_ctx_keeps_an_existing_request() {
    let store = recording();
    let mut ctx = ContextBuilder::new("/users").build(&store);
    ctx.request = Some(Request::default().with_url("/custom"));

    run_chain(vec![query_ctx()], &mut ctx).await.unwrap();

    let request = ctx.request.unwrap();
    assert_eq!(request.url.as_deref(), Some("/custom"));
    assert_eq!(request.method, None);
}

#[tokio::test]
async fn test_url_parser_substitutes_params_and_strips_the_verb() {
    let store = recording();
    let mut ctx = ContextBuilder::new("/users/:id [PATCH]")
        .payload(json!({ "id": "7" }))
        .build(&store);

    run_chain(vec![query_ctx(), url_parser()], &mut ctx).await.unwrap();

    let request = ctx.request.unwrap();
    assert_eq!(request.url.as_deref(), Some("/users/7"));
    assert_eq!(request.method, Some(http::Method::PATCH));
}

#[tokio::test]
async fn test_url_parser_serializes_structured_bodies() {
    let store = recording();
    let mut ctx = ContextBuilder::new("/users/:id [PATCH]")
        .payload(json!({ "id": "7" }))
        .build(&store);
    ctx.request = Some(Request::default().with_data(json!({ "name": "ada" })));

    run_chain(vec![url_parser()], &mut ctx).await.unwrap();

    let request = ctx.request.unwrap();
    assert_eq!(request.url.as_deref(), Some("/users/7"));
    assert_eq!(request.method, Some(http::Method::PATCH));
    assert_eq!(request.body.as_deref(), Some(r#"{"name":"ada"}"#));
}

#[tokio::test]
async fn test_url_parser_leaves_a_preset_url_alone() {
    let store = recording();
    let mut ctx = ContextBuilder::new("/users [POST]").build(&store);
    ctx.request = Some(Request::default().with_url("/v2/users").with_body("raw"));

    run_chain(vec![url_parser()], &mut ctx).await.unwrap();

    let request = ctx.request.unwrap();
    assert_eq!(request.url.as_deref(), Some("/v2/users"));
    assert_eq!(request.method, None);
    assert_eq!(request.body.as_deref(), Some("raw"));
}

#[tokio::test]
async fn test_url_parser_reads_the_method_from_a_preset_url() {
    let store = recording();
    let mut ctx = ContextBuilder::new("sync").build(&store);
    ctx.request = Some(Request::default().with_url("/v2/users [PUT]"));

    run_chain(vec![url_parser()], &mut ctx).await.unwrap();

    assert_eq!(ctx.request.unwrap().method, Some(http::Method::PUT));
}

#[tokio::test]
async fn test_url_parser_skips_non_object_payloads() {
    let store = recording();
    let mut ctx = ContextBuilder::new("/users [POST]").payload(json!([1, 2])).build(&store);

    run_chain(vec![url_parser()], &mut ctx).await.unwrap();

    assert!(ctx.request.is_none());
}

#[tokio::test]
async fn test_url_parser_requires_a_request() {
    let store = recording();
    let mut ctx = ContextBuilder::new("/users [POST]").build(&store);

    let err = run_chain(vec![url_parser()], &mut ctx).await.unwrap_err();

    assert!(matches!(err, PipeError::MissingRequest));
}

#[tokio::test]
async fn test_simple_cache_queues_the_response_under_the_key() {
    let store = recording();
    let mut ctx = ContextBuilder::new("/users").build(&store);
    ctx.request = Some(Request::default().with_simple_cache(true));

    run_chain(
        vec![simple_cache(), respond(Response::success(200, json!({ "users": [] })))],
        &mut ctx,
    )
    .await
    .unwrap();

    assert_eq!(ctx.actions.len(), 1);
    assert_eq!(ctx.actions[0].kind(), kinds::DATA_ADD);
    assert_eq!(ctx.actions[0].payload().unwrap()[&ctx.key], json!({ "users": [] }));
}

#[tokio::test]
async fn test_simple_cache_ignores_unflagged_requests() {
    let store = recording();
    let mut ctx = ContextBuilder::new("/users").build(&store);
    ctx.request = Some(Request::default());

    run_chain(vec![simple_cache(), respond(Response::success(200, json!(1)))], &mut ctx)
        .await
        .unwrap();

    assert!(ctx.actions.is_empty());
}

// ============================================================================
// error_handler / dispatch_actions / loading_monitor
// ============================================================================

#[tokio::test]
async fn test_error_handler_rethrows_the_original_error() {
    let store = recording();
    let mut ctx = ContextBuilder::new("/users").build(&store);

    let err = run_chain(vec![error_handler(), fail("some error")], &mut ctx)
        .await
        .unwrap_err();

    assert_eq!(err.to_string(), "some error");
}

#[tokio::test]
async fn test_dispatch_actions_sends_one_batch() {
    let store = recording();
    let mut ctx = ContextBuilder::new("/users").build(&store);
    ctx.actions.push(Action::new("a", json!(1)));
    ctx.actions.push(Action::new("b", json!(2)));

    run_chain(vec![dispatch_actions()], &mut ctx).await.unwrap();

    let dispatched = store.dispatched();
    assert_eq!(dispatched.len(), 1);
    assert!(matches!(&dispatched[0], Action::Batch(inner) if inner.len() == 2));
}

#[tokio::test]
async fn test_dispatch_actions_skips_empty_batches() {
    let store = recording();
    let mut ctx = ContextBuilder::new("/users").build(&store);

    run_chain(vec![dispatch_actions()], &mut ctx).await.unwrap();

    assert!(store.dispatched().is_empty());
}

#[tokio::test]
async fn test_loading_monitor_dispatches_start_and_queues_success() {
    let store = recording();
    let mut ctx = ContextBuilder::new("/users").build(&store);

    run_chain(
        vec![loading_monitor(None), respond(Response::success(200, json!({})))],
        &mut ctx,
    )
    .await
    .unwrap();

    assert_kinds(&store.dispatched_kinds(), &[kinds::LOADER_LOADING]);
    assert_eq!(ctx.actions.len(), 1);
    assert_eq!(ctx.actions[0].kind(), kinds::LOADER_SUCCESS);
    assert_eq!(ctx.actions[0].payload().unwrap()["id"], "/users");
}

#[tokio::test]
async fn test_loading_monitor_records_the_response_message_on_failure() {
    let store = recording();
    let mut ctx = ContextBuilder::new("/users").build(&store);

    run_chain(
        vec![
            loading_monitor(None),
            respond(Response::failure(500, json!({ "message": "boom" }))),
        ],
        &mut ctx,
    )
    .await
    .unwrap();

    assert_eq!(ctx.actions[0].kind(), kinds::LOADER_ERROR);
    assert_eq!(ctx.actions[0].payload().unwrap()["message"], "boom");
}

#[tokio::test]
async fn test_loading_monitor_uses_the_custom_error_message() {
    let store = recording();
    let mut ctx = ContextBuilder::new("/users").build(&store);
    let message: ErrorMessageFn<QueryState> =
        Arc::new(|ctx: &Context<QueryState>| format!("{} failed", ctx.name));

    run_chain(
        vec![
            loading_monitor(Some(message)),
            respond(Response::failure(404, json!(null))),
        ],
        &mut ctx,
    )
    .await
    .unwrap();

    assert_eq!(ctx.actions[0].payload().unwrap()["message"], "/users failed");
}

#[tokio::test]
async fn test_loading_monitor_resets_when_no_response_arrived() {
    let store = recording();
    let mut ctx = ContextBuilder::new("/users").build(&store);

    run_chain(vec![loading_monitor(None)], &mut ctx).await.unwrap();

    assert_eq!(ctx.actions[0].kind(), kinds::LOADER_RESET_BY_ID);
    assert_eq!(ctx.actions[0].payload().unwrap(), &json!("/users"));
}

#[tokio::test]
async fn test_loading_monitor_merges_handler_loader_meta() {
    let store = recording();
    let mut ctx = ContextBuilder::new("/users").build(&store);
    ctx.loader = Some(LoaderMeta {
        message: Some("saved".to_owned()),
        timestamp: Some(5),
        meta: Some(json!({ "id": "1" }).as_object().cloned().unwrap()),
    });

    run_chain(
        vec![loading_monitor(None), respond(Response::success(201, json!({})))],
        &mut ctx,
    )
    .await
    .unwrap();

    let payload = ctx.actions[0].payload().unwrap();
    assert_eq!(payload["message"], "saved");
    assert_eq!(payload["timestamp"], 5);
    assert_eq!(payload["meta"], json!({ "id": "1" }));
}

// ============================================================================
// take_leading / optimistic / timer
// ============================================================================

#[tokio::test]
async fn test_take_leading_drops_invocations_while_running() {
    let store = recording();
    let calls = Arc::new(AtomicUsize::new(0));
    let mut ctx = ContextBuilder::new("lead").status(FxStatus::Running).build(&store);

    run_chain(vec![take_leading(), counter(&calls)], &mut ctx).await.unwrap();

    assert_eq!(hits(&calls), 0);
    assert_eq!(ctx.status(), FxStatus::Running);
}

#[tokio::test]
async fn test_take_leading_absorbs_failures_as_aborted() {
    let store = recording();
    let mut ctx = ContextBuilder::new("lead").build(&store);

    run_chain(vec![take_leading(), fail("boom")], &mut ctx).await.unwrap();

    assert_eq!(ctx.status(), FxStatus::Aborted);
}

fn optimistic_update() -> Optimistic {
    Optimistic {
        apply: Action::new("users/patch", json!({ "1": { "name": "new" } })),
        revert: Action::new("users/patch", json!({ "1": { "name": "old" } })),
    }
}

#[tokio::test]
async fn test_optimistic_reverts_failed_responses() {
    let store = recording();
    let mut ctx = ContextBuilder::new("/users/:id [PATCH]").build(&store);
    ctx.optimistic = Some(optimistic_update());

    run_chain(vec![optimistic(), respond(Response::failure(500, json!(null)))], &mut ctx)
        .await
        .unwrap();

    let dispatched = store.dispatched();
    assert_eq!(dispatched.len(), 2);
    assert_eq!(dispatched[1].payload().unwrap()["1"]["name"], "old");
}

#[tokio::test]
async fn test_optimistic_leaves_successful_updates_standing() {
    let store = recording();
    let mut ctx = ContextBuilder::new("/users/:id [PATCH]").build(&store);
    ctx.optimistic = Some(optimistic_update());

    run_chain(vec![optimistic(), respond(Response::success(200, json!(null)))], &mut ctx)
        .await
        .unwrap();

    assert_eq!(store.dispatched().len(), 1);
}

#[tokio::test]
async fn test_optimistic_passes_through_without_an_update() {
    let store = recording();
    let mut ctx = ContextBuilder::new("/users").build(&store);

    run_chain(vec![optimistic(), respond(Response::failure(500, json!(null)))], &mut ctx)
        .await
        .unwrap();

    assert!(store.dispatched().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_timer_drops_calls_inside_the_window() {
    let store = recording();
    let calls = Arc::new(AtomicUsize::new(0));
    let throttle = timer(Duration::from_secs(10));

    for _ in 0..3 {
        let mut ctx = ContextBuilder::new("poll").build(&store);
        run_chain(vec![Arc::clone(&throttle), counter(&calls)], &mut ctx).await.unwrap();
    }
    assert_eq!(hits(&calls), 1);

    tokio::time::advance(Duration::from_secs(10)).await;
    let mut ctx = ContextBuilder::new("poll").build(&store);
    run_chain(vec![Arc::clone(&throttle), counter(&calls)], &mut ctx).await.unwrap();
    assert_eq!(hits(&calls), 2);

    // A fresh timer has its own window.
    let mut ctx = ContextBuilder::new("poll").build(&store);
    run_chain(vec![timer(DEFAULT_TIMER), counter(&calls)], &mut ctx).await.unwrap();
    assert_eq!(hits(&calls), 3);
}

// ============================================================================
// undoer
// ============================================================================

#[tokio::test]
async fn test_undoer_passes_through_when_not_undoable() {
    let store = recording();
    let calls = Arc::new(AtomicUsize::new(0));
    let mut ctx = ContextBuilder::new("remove").build(&store);

    run_chain(vec![undoer(UndoConfig::default()), counter(&calls)], &mut ctx)
        .await
        .unwrap();

    assert_eq!(hits(&calls), 1);
    assert!(!store.emitter().has("DO_IT"));
}

#[tokio::test(start_paused = true)]
async fn test_undoer_proceeds_after_the_timeout() {
    let store = recording();
    let calls = Arc::new(AtomicUsize::new(0));
    let mut ctx = ContextBuilder::new("remove").undoable().build(&store);
    let config = UndoConfig::default().with_timeout(Duration::from_millis(500));

    let started = tokio::time::Instant::now();
    run_chain(vec![undoer(config), counter(&calls)], &mut ctx).await.unwrap();

    assert_eq!(hits(&calls), 1);
    assert!(started.elapsed() >= Duration::from_millis(500));
    assert!(!store.emitter().has("DO_IT"));
    assert!(!store.emitter().has("UNDO"));
}

#[tokio::test(start_paused = true)]
async fn test_undoer_abandons_on_undo() {
    let store = recording();
    let calls = Arc::new(AtomicUsize::new(0));
    let mut ctx = ContextBuilder::new("remove").undoable().build(&store);

    let chain = run_chain(vec![undoer(UndoConfig::default()), counter(&calls)], &mut ctx);
    let user = async {
        tokio::task::yield_now().await;
        let _ = store.dispatch(undo().action());
    };
    let (outcome, ()) = tokio::join!(chain, user);

    outcome.unwrap();
    assert_eq!(hits(&calls), 0);
    assert!(!store.emitter().has("DO_IT"));
}

#[tokio::test(start_paused = true)]
async fn test_undoer_proceeds_on_confirmation() {
    let store = recording();
    let calls = Arc::new(AtomicUsize::new(0));
    let mut ctx = ContextBuilder::new("remove").undoable().build(&store);

    let started = tokio::time::Instant::now();
    let chain = run_chain(vec![undoer(UndoConfig::default()), counter(&calls)], &mut ctx);
    let user = async {
        tokio::task::yield_now().await;
        let _ = store.dispatch(do_it().action());
    };
    let (outcome, ()) = tokio::join!(chain, user);

    outcome.unwrap();
    assert_eq!(hits(&calls), 1);
    assert!(started.elapsed() < Duration::from_secs(30));
    assert!(!store.emitter().has("UNDO"));
}

#[tokio::test(start_paused = true)]
async fn test_undoer_honours_custom_message_types() {
    let store = recording();
    let calls = Arc::new(AtomicUsize::new(0));
    let mut ctx = ContextBuilder::new("remove").undoable().build(&store);
    let config = UndoConfig::default().with_do_it("CONFIRM").with_undo("CANCEL");

    let chain = run_chain(vec![undoer(config), counter(&calls)], &mut ctx);
    let user = async {
        tokio::task::yield_now().await;
        let _ = store.dispatch(Action::new("CANCEL", json!(null)));
    };
    let (outcome, ()) = tokio::join!(chain, user);

    outcome.unwrap();
    assert_eq!(hits(&calls), 0);
    assert!(!store.emitter().has("CONFIRM"));
}
