//! Integration tests for onion-style middleware composition

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

use fxpipe_core::{
    Action, Context, Dispatched, Emitter, Next, PipeError, SharedMiddleware, StoreHandle, compose, from_fn,
    passthrough,
};
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ============================================================================
// Test Fixtures
// ============================================================================

struct NullStore;

impl StoreHandle<()> for NullStore {
    fn dispatch(&self, _action: Action) -> Dispatched<()> {
        Dispatched::Reduced
    }

    fn get_state(&self) {}
}

type Log = Arc<Mutex<Vec<String>>>;

fn context() -> Context<()> {
    Context::new("/users [POST]", json!({}), Arc::new(NullStore), Emitter::new())
}

fn entries(log: &Log) -> String {
    log.lock().unwrap().concat()
}

/// Logs `before`, sleeps, runs the rest of the chain, then logs `after`
fn step(log: &Log, before: &'static str, after: &'static str, delay_ms: u64) -> SharedMiddleware<()> {
    let log = Arc::clone(log);
    from_fn(move |ctx: &mut Context<()>, mut next: Next<()>| {
        let log = Arc::clone(&log);
        Box::pin(async move {
            log.lock().unwrap().push(before.to_owned());
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            next.run(ctx).await?;
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            log.lock().unwrap().push(after.to_owned());
            Ok::<(), PipeError>(())
        })
    })
}

// ============================================================================
// Ordering
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_onion_order_holds_with_uneven_delays() {
    let log = Log::default();
    let chain = compose(vec![
        step(&log, "a", "g", 30),
        step(&log, "b", "f", 1),
        step(&log, "c", "e", 15),
    ])
    .unwrap();
    let inner = {
        let log = Arc::clone(&log);
        from_fn(move |_ctx: &mut Context<()>, _next: Next<()>| {
            let log = Arc::clone(&log);
            Box::pin(async move {
                log.lock().unwrap().push("d".to_owned());
                Ok::<(), PipeError>(())
            })
        })
    };
    let outer = compose(vec![Arc::new(chain) as SharedMiddleware<()>, inner]).unwrap();

    outer.run(&mut context(), None).await.unwrap();

    assert_eq!(entries(&log), "abcdefg");
}

#[tokio::test]
async fn test_outer_next_runs_after_the_last_step() {
    let log = Log::default();
    let first = compose(vec![step(&log, "a", "d", 0)]).unwrap();
    let second = compose(vec![step(&log, "b", "c", 0)]).unwrap();

    let chained = compose(vec![Arc::new(first) as SharedMiddleware<()>, Arc::new(second)]).unwrap();
    chained.run(&mut context(), None).await.unwrap();

    assert_eq!(entries(&log), "abcd");
}

#[tokio::test]
async fn test_skipping_next_short_circuits_the_chain() {
    let log = Log::default();
    let gate = from_fn(|_ctx: &mut Context<()>, _next: Next<()>| Box::pin(async { Ok::<(), PipeError>(()) }));
    let chain = compose(vec![step(&log, "a", "b", 0), gate, step(&log, "x", "y", 0)]).unwrap();

    chain.run(&mut context(), None).await.unwrap();

    assert_eq!(entries(&log), "ab");
}

#[tokio::test]
async fn test_passthrough_only_continues() {
    let log = Log::default();
    let chain = compose(vec![passthrough(), step(&log, "a", "b", 0), passthrough()]).unwrap();

    chain.run(&mut context(), None).await.unwrap();

    assert_eq!(entries(&log), "ab");
}

// ============================================================================
// Misuse and errors
// ============================================================================

#[test]
fn test_compose_rejects_an_empty_stack() {
    assert!(matches!(compose::<()>(Vec::new()), Err(PipeError::EmptyStack)));
}

#[tokio::test]
async fn test_calling_next_twice_fails_at_the_second_call() {
    let log = Log::default();
    let twice = from_fn(|ctx: &mut Context<()>, mut next: Next<()>| {
        Box::pin(async move {
            next.run(ctx).await?;
            next.run(ctx).await
        })
    });
    let chain = compose(vec![twice, step(&log, "inner-", "done", 0)]).unwrap();

    let err = chain.run(&mut context(), None).await.unwrap_err();

    assert!(matches!(err, PipeError::NextCalledMultipleTimes));
    assert_eq!(err.to_string(), "next() called multiple times");
    assert_eq!(entries(&log), "inner-done");
}

#[tokio::test]
async fn test_errors_reach_every_enclosing_middleware_unmodified() {
    let seen = Log::default();
    let observe = |seen: &Log| {
        let seen = Arc::clone(seen);
        from_fn(move |ctx: &mut Context<()>, mut next: Next<()>| {
            let seen = Arc::clone(&seen);
            Box::pin(async move {
                let outcome = next.run(ctx).await;
                if let Err(err) = &outcome {
                    seen.lock().unwrap().push(err.to_string());
                }
                outcome
            })
        })
    };
    let failing = from_fn(|_ctx: &mut Context<()>, _next: Next<()>| {
        Box::pin(async { Err::<(), PipeError>(PipeError::handler("some error")) })
    });
    let chain = compose(vec![observe(&seen), observe(&seen), failing]).unwrap();

    let err = chain.run(&mut context(), None).await.unwrap_err();

    assert_eq!(err.to_string(), "some error");
    assert_eq!(*seen.lock().unwrap(), vec!["some error".to_owned(), "some error".to_owned()]);
}

#[tokio::test]
async fn test_middleware_can_mutate_the_context() {
    let set_response = from_fn(|ctx: &mut Context<()>, mut next: Next<()>| {
        Box::pin(async move {
            ctx.payload = json!({ "id": "1" });
            next.run(ctx).await
        })
    });
    let read_payload = from_fn(|ctx: &mut Context<()>, _next: Next<()>| {
        Box::pin(async move {
            ctx.actions.push(Action::new("seen", ctx.payload.clone()));
            Ok::<(), PipeError>(())
        })
    });
    let chain = compose(vec![set_response, read_payload]).unwrap();
    let mut ctx = context();

    chain.run(&mut ctx, None).await.unwrap();

    assert_eq!(ctx.actions.len(), 1);
    assert_eq!(ctx.actions[0].payload(), Some(&json!({ "id": "1" })));
}
