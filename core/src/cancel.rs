//! Cancelable operations.
//!
//! A [`Cancelable`] is a future paired with a [`CancelHandle`]. Cancelling
//! fires the registered `on_cancel` hook (only if the operation has not
//! settled yet) and makes the future resolve to [`PipeError::Aborted`].
//! Operations may share a parent [`CancellationToken`], so cancelling one
//! member of a family cancels all of them; derive a child token to scope
//! cancellation more narrowly.

use crate::error::PipeError;
use futures::future::{self, BoxFuture, Either, FutureExt};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::oneshot;
pub use tokio_util::sync::CancellationToken;

type CancelHook = Box<dyn FnOnce() + Send>;

#[derive(Default)]
struct Settlement {
    settled: AtomicBool,
    cancelled: AtomicBool,
    hook: Mutex<Option<CancelHook>>,
}

impl Settlement {
    /// Returns `true` for the caller that settled the operation
    fn settle(&self) -> bool {
        !self.settled.swap(true, Ordering::SeqCst)
    }

    fn is_settled(&self) -> bool {
        self.settled.load(Ordering::SeqCst)
    }

    fn register(&self, hook: CancelHook) {
        *self.hook.lock().unwrap_or_else(PoisonError::into_inner) = Some(hook);
    }

    /// Whether cancellation, rather than a result, settled the operation
    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    fn fire(&self) {
        if !self.settle() {
            return;
        }
        self.cancelled.store(true, Ordering::SeqCst);
        let hook = self.hook.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(hook) = hook {
            hook();
        }
    }
}

/// Cancels the operation it was taken from
#[derive(Clone)]
pub struct CancelHandle {
    token: CancellationToken,
    settlement: Arc<Settlement>,
}

impl CancelHandle {
    /// Cancel the operation
    ///
    /// Fires the `on_cancel` hook if the operation is still pending and
    /// triggers the token. Calling it again, or after settlement, never fires
    /// the hook.
    pub fn cancel(&self) {
        self.settlement.fire();
        self.token.cancel();
    }

    /// Whether the operation resolved, rejected or was cancelled
    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.settlement.is_settled()
    }

    /// Token backing this operation
    #[must_use]
    pub const fn token(&self) -> &CancellationToken {
        &self.token
    }
}

impl fmt::Debug for CancelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelHandle")
            .field("cancelled", &self.token.is_cancelled())
            .field("settled", &self.is_settled())
            .finish()
    }
}

/// Settles an executor-style [`Cancelable`]
pub struct Resolver<T> {
    sender: oneshot::Sender<Result<T, PipeError>>,
    settlement: Arc<Settlement>,
}

impl<T> Resolver<T> {
    /// Resolve with a value
    pub fn resolve(self, value: T) {
        self.settle(Ok(value));
    }

    /// Reject with an error
    pub fn reject(self, error: PipeError) {
        self.settle(Err(error));
    }

    fn settle(self, outcome: Result<T, PipeError>) {
        if self.settlement.settle() {
            // The receiver is gone once the operation was dropped.
            let _ = self.sender.send(outcome);
        }
    }
}

/// Registers the cleanup hook of an executor-style [`Cancelable`]
pub struct OnCancel {
    settlement: Arc<Settlement>,
}

impl OnCancel {
    /// Run `hook` if the operation is cancelled before it settles
    pub fn register<F>(&self, hook: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.settlement.register(Box::new(hook));
    }
}

/// A future that can be cancelled through its [`CancelHandle`]
#[must_use = "futures do nothing unless awaited"]
pub struct Cancelable<T> {
    future: BoxFuture<'static, Result<T, PipeError>>,
    handle: CancelHandle,
}

impl<T: Send + 'static> Cancelable<T> {
    /// Make `future` cancelable with its own token
    pub fn new<F>(future: F) -> Self
    where
        F: Future<Output = Result<T, PipeError>> + Send + 'static,
    {
        Self::with_token(future, CancellationToken::new())
    }

    /// Make `future` cancelable through `token`
    ///
    /// Cancelling the returned value cancels `token`, and with it every other
    /// operation sharing that token.
    pub fn with_token<F>(future: F, token: CancellationToken) -> Self
    where
        F: Future<Output = Result<T, PipeError>> + Send + 'static,
    {
        let settlement = Arc::new(Settlement::default());
        Self::assemble(future.boxed(), token, settlement)
    }

    /// Build a cancelable from an executor receiving a resolver and a hook registrar
    ///
    /// The executor runs immediately. Pass `parent` to join an existing
    /// cancellation family.
    pub fn from_executor<E>(executor: E, parent: Option<&CancellationToken>) -> Self
    where
        E: FnOnce(Resolver<T>, OnCancel),
    {
        let token = parent.cloned().unwrap_or_default();
        let settlement = Arc::new(Settlement::default());
        let (sender, receiver) = oneshot::channel();

        executor(
            Resolver {
                sender,
                settlement: Arc::clone(&settlement),
            },
            OnCancel {
                settlement: Arc::clone(&settlement),
            },
        );

        let future = async move { receiver.await.unwrap_or(Err(PipeError::Abandoned)) };
        Self::assemble(future.boxed(), token, settlement)
    }

    fn assemble(
        inner: BoxFuture<'static, Result<T, PipeError>>,
        token: CancellationToken,
        settlement: Arc<Settlement>,
    ) -> Self {
        let handle = CancelHandle {
            token: token.clone(),
            settlement: Arc::clone(&settlement),
        };
        let future = async move {
            // `select` polls the cancellation side first.
            match future::select(Box::pin(token.cancelled()), inner).await {
                Either::Left(((), inner)) => {
                    settlement.fire();
                    if settlement.is_cancelled() {
                        Err(PipeError::Aborted)
                    } else {
                        // Settled before the cancel; the result stands.
                        inner.await
                    }
                }
                Either::Right((outcome, _)) => {
                    settlement.settle();
                    outcome
                }
            }
        };
        Self {
            future: future.boxed(),
            handle,
        }
    }

    /// Handle that cancels this operation
    #[must_use]
    pub fn handle(&self) -> CancelHandle {
        self.handle.clone()
    }

    /// Cancel this operation
    pub fn cancel(&self) {
        self.handle.cancel();
    }

    /// Transform the resolved value, keeping the same cancellation handle
    pub fn map<U, F>(self, f: F) -> Cancelable<U>
    where
        U: Send + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        Cancelable {
            future: self.future.map(|outcome| outcome.map(f)).boxed(),
            handle: self.handle,
        }
    }
}

impl<T> Future for Cancelable<T> {
    type Output = Result<T, PipeError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.future.as_mut().poll(cx)
    }
}

impl<T> fmt::Debug for Cancelable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cancelable")
            .field("handle", &self.handle)
            .finish_non_exhaustive()
    }
}

/// Adapt an ordinary future into a [`Cancelable`], optionally joining `parent`
pub fn wrap<T, F>(future: F, parent: Option<&CancellationToken>) -> Cancelable<T>
where
    T: Send + 'static,
    F: Future<Output = Result<T, PipeError>> + Send + 'static,
{
    Cancelable::with_token(future, parent.cloned().unwrap_or_default())
}

/// Cancelable sleep
pub fn delay(duration: Duration) -> Cancelable<()> {
    delay_with(duration, CancellationToken::new())
}

/// Cancelable sleep bound to `token`
pub fn delay_with(duration: Duration, token: CancellationToken) -> Cancelable<()> {
    // Dropping the sleep on cancellation releases its timer entry.
    Cancelable::with_token(
        async move {
            tokio::time::sleep(duration).await;
            Ok(())
        },
        token,
    )
}

/// Wait for the first contender to settle, then cancel all of them
///
/// Returns `None` when there are no contenders or when the first one to
/// settle rejected.
pub async fn race<T: Send + 'static>(contenders: Vec<Cancelable<T>>) -> Option<T> {
    if contenders.is_empty() {
        return None;
    }
    let handles: Vec<CancelHandle> = contenders.iter().map(Cancelable::handle).collect();
    let (winner, _, _losers) = futures::future::select_all(contenders).await;
    for handle in &handles {
        handle.cancel();
    }
    winner.ok()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counting_hook(count: &Arc<AtomicUsize>) -> impl FnOnce() + Send + 'static {
        let count = Arc::clone(count);
        move || {
            count.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn resolves_with_the_executor_value() {
        let op = Cancelable::from_executor(|resolve, _| resolve.resolve(7), None);
        assert_eq!(op.await.unwrap(), 7);
    }

    #[tokio::test]
    async fn cancel_fires_the_hook_and_rejects_with_aborted() {
        let fired = Arc::new(AtomicUsize::new(0));
        let op: Cancelable<()> = Cancelable::from_executor(
            |_resolve, on_cancel| on_cancel.register(counting_hook(&fired)),
            None,
        );

        op.cancel();
        let outcome = op.await;

        assert!(outcome.unwrap_err().is_aborted());
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancel_after_settlement_is_a_no_op() {
        let fired = Arc::new(AtomicUsize::new(0));
        let op = Cancelable::from_executor(
            |resolve, on_cancel| {
                on_cancel.register(counting_hook(&fired));
                resolve.resolve("done");
            },
            None,
        );
        let handle = op.handle();

        assert_eq!(op.await.unwrap(), "done");
        handle.cancel();
        handle.cancel();

        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert!(handle.is_settled());
    }

    #[tokio::test]
    async fn cancel_between_settlement_and_await_keeps_the_value() {
        let fired = Arc::new(AtomicUsize::new(0));
        let op = Cancelable::from_executor(
            |resolve, on_cancel| {
                on_cancel.register(counting_hook(&fired));
                resolve.resolve(7);
            },
            None,
        );
        let handle = op.handle();
        assert!(handle.is_settled());

        handle.cancel();

        assert_eq!(op.await.unwrap(), 7);
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn parent_cancel_after_resolution_keeps_the_value() {
        let parent = CancellationToken::new();
        let op = Cancelable::from_executor(|resolve, _| resolve.resolve("kept"), Some(&parent));

        parent.cancel();

        assert_eq!(op.await.unwrap(), "kept");
    }

    #[tokio::test]
    async fn second_cancel_does_not_refire_the_hook() {
        let fired = Arc::new(AtomicUsize::new(0));
        let op: Cancelable<()> = Cancelable::from_executor(
            |_resolve, on_cancel| on_cancel.register(counting_hook(&fired)),
            None,
        );
        let handle = op.handle();

        handle.cancel();
        handle.cancel();
        assert!(op.await.unwrap_err().is_aborted());
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn parent_token_cancels_the_whole_family() {
        let parent = CancellationToken::new();
        let first = wrap(futures::future::pending::<Result<(), PipeError>>(), Some(&parent));
        let second = delay_with(Duration::from_secs(60), parent.clone());

        first.cancel();

        assert!(second.await.unwrap_err().is_aborted());
    }

    #[tokio::test(start_paused = true)]
    async fn race_returns_the_first_winner_and_cancels_the_rest() {
        let slow = delay(Duration::from_secs(10)).map(|()| "slow");
        let fast = delay(Duration::from_millis(10)).map(|()| "fast");
        let slow_handle = slow.handle();

        let winner = race(vec![slow, fast]).await;

        assert_eq!(winner, Some("fast"));
        assert!(slow_handle.token().is_cancelled());
    }

    #[tokio::test]
    async fn race_yields_none_when_the_winner_rejects() {
        let failing: Cancelable<u8> = Cancelable::new(async { Err(PipeError::handler("boom")) });
        let pending = Cancelable::new(futures::future::pending::<Result<u8, PipeError>>());

        assert_eq!(race(vec![failing, pending]).await, None);
        assert_eq!(race(Vec::<Cancelable<u8>>::new()).await, None);
    }
}
