//! Task combinators.
//!
//! A [`Task`] is a boxed future resolving to `Result<T, E>`. Futures are lazy
//! (nothing runs until polled) and resolve exactly once, so the combinators
//! here only have to decide how errors travel: [`sequence`] stops at the first
//! failure, [`concurrent`] waits for every task and reports the first failure
//! it observed, [`intercept`] lets a handler turn selected errors into values,
//! and [`Memo`] shares one run of a computation between every caller that
//! asks while it is pending.

use std::fmt::Display;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::error;

/// A pending computation.
pub type Task<T, E> = BoxFuture<'static, Result<T, E>>;

/// Lifts a plain fallible computation into a task. `f` runs when the task is
/// first polled.
pub fn lazy<T, E, F>(f: F) -> Task<T, E>
where
    F: FnOnce() -> Result<T, E> + Send + 'static,
{
    async move { f() }.boxed()
}

/// Runs `task`, then feeds its value to `next`. A failure of either resolves
/// the whole task with that failure.
pub fn sequence<T, U, E, F, Fut>(task: Task<T, E>, next: F) -> Task<U, E>
where
    T: Send + 'static,
    E: Send + 'static,
    F: FnOnce(T) -> Fut + Send + 'static,
    Fut: Future<Output = Result<U, E>> + Send + 'static,
{
    async move {
        let value = task.await?;
        next(value).await
    }
    .boxed()
}

/// Starts every task and waits for all of them.
///
/// Values come back in input order. If any task fails, the first failure
/// observed resolves the whole task; the other results are discarded.
pub fn concurrent<T, E>(tasks: Vec<Task<T, E>>) -> Task<Vec<T>, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    async move {
        let len = tasks.len();
        let mut pending: FuturesUnordered<_> = tasks
            .into_iter()
            .enumerate()
            .map(|(i, task)| task.map(move |result| (i, result)))
            .collect();

        let mut values: Vec<Option<T>> = std::iter::repeat_with(|| None).take(len).collect();
        let mut first_error = None;

        while let Some((i, result)) = pending.next().await {
            match result {
                Ok(value) => values[i] = Some(value),
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(values.into_iter().flatten().collect()),
        }
    }
    .boxed()
}

/// Recovers from errors: `handler` gets every error and either returns a
/// substitute value or passes the error on.
pub fn intercept<T, E, H>(task: Task<T, E>, handler: H) -> Task<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
    H: FnOnce(E) -> Result<T, E> + Send + 'static,
{
    async move { task.await.or_else(handler) }.boxed()
}

/// Drives `task` in the background for its side effects. A failure is
/// logged when the task resolves.
pub fn run<T, E>(task: Task<T, E>) -> JoinHandle<Option<T>>
where
    T: Send + 'static,
    E: Display + Send + 'static,
{
    tokio::spawn(async move {
        match task.await {
            Ok(value) => Some(value),
            Err(e) => {
                error!(error = %e, "background task failed");
                None
            }
        }
    })
}

/// The computation behind a [`Memo`] stopped before producing a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interrupted;

impl Display for Interrupted {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("memoized computation was interrupted")
    }
}

type Waiters<T, E> = Arc<Mutex<Vec<oneshot::Sender<Result<T, E>>>>>;

enum Slot<T, E> {
    Empty,
    Pending(Waiters<T, E>),
    Ready(T),
}

struct State<T, E> {
    slot: Slot<T, E>,
    /// Bumped by every invalidation; a computation only publishes into the
    /// generation it started in.
    generation: u64,
}

/// A memoized computation.
///
/// The first [`Memo::get_or_run`] spawns the computation; calls made while
/// it is pending wait for the same result. Success is cached until
/// [`Memo::invalidate`]; failure is delivered to every waiter and then
/// forgotten, so the next call runs the computation again.
pub struct Memo<T, E> {
    state: Arc<Mutex<State<T, E>>>,
}

impl<T, E> Clone for Memo<T, E> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<T, E> Default for Memo<T, E> {
    fn default() -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                slot: Slot::Empty,
                generation: 0,
            })),
        }
    }
}

impl<T, E> std::fmt::Debug for Memo<T, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = lock(&self.state);
        let slot = match state.slot {
            Slot::Empty => "empty",
            Slot::Pending(_) => "pending",
            Slot::Ready(_) => "ready",
        };
        f.debug_struct("Memo")
            .field("state", &slot)
            .field("generation", &state.generation)
            .finish()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<T, E> Memo<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + From<Interrupted> + Send + 'static,
{
    /// Creates an empty memo.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached value, if any.
    #[must_use]
    pub fn get(&self) -> Option<T> {
        match &lock(&self.state).slot {
            Slot::Ready(value) => Some(value.clone()),
            _ => None,
        }
    }

    /// Returns the cached value, joins a pending computation, or spawns
    /// `compute` and waits for it.
    pub async fn get_or_run<F, Fut>(&self, compute: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        {
            let mut state = lock(&self.state);
            match &state.slot {
                Slot::Ready(value) => return Ok(value.clone()),
                Slot::Pending(waiters) => lock(waiters).push(tx),
                Slot::Empty => {
                    let waiters = Arc::new(Mutex::new(vec![tx]));
                    state.slot = Slot::Pending(Arc::clone(&waiters));
                    let resolver = Resolver {
                        state: Arc::clone(&self.state),
                        generation: state.generation,
                        waiters,
                        done: false,
                    };
                    let fut = compute();
                    tokio::spawn(async move {
                        let result = fut.await;
                        resolver.resolve(result);
                    });
                }
            }
        }

        rx.await.unwrap_or_else(|_| Err(E::from(Interrupted)))
    }

    /// Forgets the cached value or the pending computation; the next call
    /// computes afresh.
    ///
    /// A pending computation keeps running and still answers the callers
    /// that joined it, but its result is not cached.
    pub fn invalidate(&self) {
        let mut state = lock(&self.state);
        state.slot = Slot::Empty;
        state.generation = state.generation.wrapping_add(1);
    }
}

/// Publishes a memo's result to the callers that joined its computation.
/// Dropped unresolved (the computation panicked or the runtime shut down),
/// it fails those callers and empties the slot.
struct Resolver<T, E> {
    state: Arc<Mutex<State<T, E>>>,
    generation: u64,
    waiters: Waiters<T, E>,
    done: bool,
}

impl<T: Clone, E: Clone> Resolver<T, E> {
    fn resolve(mut self, result: Result<T, E>) {
        self.done = true;
        let waiters = {
            let mut state = lock(&self.state);
            if state.generation == self.generation {
                state.slot = match &result {
                    Ok(value) => Slot::Ready(value.clone()),
                    Err(_) => Slot::Empty,
                };
            }
            std::mem::take(&mut *lock(&self.waiters))
        };
        for waiter in waiters {
            // A waiter that went away no longer needs the result.
            let _ = waiter.send(result.clone());
        }
    }
}

impl<T, E> Drop for Resolver<T, E> {
    fn drop(&mut self) {
        if self.done {
            return;
        }
        let mut state = lock(&self.state);
        if state.generation == self.generation {
            state.slot = Slot::Empty;
        }
        lock(&self.waiters).clear();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use proptest::prelude::*;

    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct Boom(&'static str);

    impl Display for Boom {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str(self.0)
        }
    }

    impl From<Interrupted> for Boom {
        fn from(_: Interrupted) -> Self {
            Self("interrupted")
        }
    }

    fn ok(n: u32) -> Task<u32, Boom> {
        lazy(move || Ok(n))
    }

    fn fail() -> Task<u32, Boom> {
        lazy(|| Err(Boom("fail")))
    }

    #[tokio::test]
    async fn sequence_stops_at_first_failure() {
        let reached = Arc::new(AtomicUsize::new(0));
        let r = Arc::clone(&reached);
        let task = sequence(fail(), move |n| {
            r.fetch_add(1, Ordering::SeqCst);
            ok(n + 1)
        });
        assert_eq!(task.await, Err(Boom("fail")));
        assert_eq!(reached.load(Ordering::SeqCst), 0);

        assert_eq!(sequence(ok(1), |n| ok(n * 10)).await, Ok(10));
    }

    #[tokio::test]
    async fn lazy_does_nothing_until_polled() {
        let ran = Arc::new(AtomicUsize::new(0));
        let r = Arc::clone(&ran);
        let task: Task<(), Boom> = lazy(move || {
            r.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        assert_eq!(ran.load(Ordering::SeqCst), 0);
        task.await.unwrap();
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn concurrent_waits_for_all_and_keeps_order() {
        let finished = Arc::new(AtomicUsize::new(0));
        let tasks = (1u32..=3)
            .map(|n| {
                let f = Arc::clone(&finished);
                async move {
                    tokio::time::sleep(Duration::from_millis(u64::from(4 - n))).await;
                    f.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, Boom>(n)
                }
                .boxed()
            })
            .collect();
        assert_eq!(concurrent(tasks).await, Ok(vec![1, 2, 3]));
        assert_eq!(finished.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn concurrent_reports_one_failure_after_all_finish() {
        let finished = Arc::new(AtomicUsize::new(0));
        let f = Arc::clone(&finished);
        let slow = async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            f.fetch_add(1, Ordering::SeqCst);
            Ok(1)
        }
        .boxed();
        assert_eq!(concurrent(vec![fail(), slow]).await, Err(Boom("fail")));
        assert_eq!(finished.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn intercept_recovers_selected_errors() {
        let recovered = intercept(fail(), |e| if e.0 == "fail" { Ok(0) } else { Err(e) });
        assert_eq!(recovered.await, Ok(0));

        let passed = intercept(lazy(|| Err(Boom("other"))), |e: Boom| {
            if e.0 == "fail" { Ok(0) } else { Err(e) }
        });
        assert_eq!(passed.await, Err(Boom("other")));
    }

    #[tokio::test]
    async fn run_returns_value_or_none() {
        assert_eq!(run(ok(5)).await.unwrap(), Some(5));
        assert_eq!(run(fail()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn memo_failure_is_not_cached() {
        let memo: Memo<u32, Boom> = Memo::new();
        let runs = Arc::new(AtomicUsize::new(0));

        let r = Arc::clone(&runs);
        let first = memo
            .get_or_run(move || async move {
                r.fetch_add(1, Ordering::SeqCst);
                Err(Boom("down"))
            })
            .await;
        assert_eq!(first, Err(Boom("down")));
        assert!(memo.get().is_none());

        let r = Arc::clone(&runs);
        let second = memo
            .get_or_run(move || async move {
                r.fetch_add(1, Ordering::SeqCst);
                Ok(9)
            })
            .await;
        assert_eq!(second, Ok(9));
        assert_eq!(runs.load(Ordering::SeqCst), 2);
        assert_eq!(memo.get(), Some(9));
    }

    #[tokio::test]
    async fn memo_invalidate_recomputes() {
        let memo: Memo<u32, Boom> = Memo::new();
        assert_eq!(memo.get_or_run(|| async { Ok(1) }).await, Ok(1));
        assert_eq!(memo.get_or_run(|| async { Ok(2) }).await, Ok(1));
        memo.invalidate();
        assert_eq!(memo.get_or_run(|| async { Ok(3) }).await, Ok(3));
    }

    #[tokio::test]
    async fn memo_invalidate_while_pending_starts_fresh() {
        let memo: Memo<u32, Boom> = Memo::new();
        let (release, gate) = oneshot::channel::<()>();

        let stale = {
            let memo = memo.clone();
            tokio::spawn(async move {
                memo.get_or_run(|| async move {
                    gate.await.ok();
                    Ok(1)
                })
                .await
            })
        };
        while !format!("{memo:?}").contains("pending") {
            tokio::task::yield_now().await;
        }

        memo.invalidate();
        let runs = Arc::new(AtomicUsize::new(0));
        let r = Arc::clone(&runs);
        let fresh = memo
            .get_or_run(move || async move {
                r.fetch_add(1, Ordering::SeqCst);
                Ok(2)
            })
            .await;
        assert_eq!(fresh, Ok(2));
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        release.send(()).unwrap();
        assert_eq!(stale.await.unwrap(), Ok(1));
        assert_eq!(memo.get(), Some(2));
    }

    #[tokio::test]
    async fn memo_panicking_computation_fails_waiters() {
        let memo: Memo<u32, Boom> = Memo::new();
        let result = memo
            .get_or_run(|| async {
                tokio::task::yield_now().await;
                let exploded = true;
                assert!(!exploded, "computation exploded");
                Ok(0)
            })
            .await;
        assert_eq!(result, Err(Boom("interrupted")));
        assert_eq!(memo.get_or_run(|| async { Ok(4) }).await, Ok(4));
    }

    /// Arbitrary combinator trees.
    #[derive(Debug, Clone)]
    enum Tree {
        Value(u32),
        Fail,
        Seq(Box<Tree>, Box<Tree>),
        All(Vec<Tree>),
        Recover(Box<Tree>),
    }

    fn tree() -> impl Strategy<Value = Tree> {
        let leaf = prop_oneof![(0u32..100).prop_map(Tree::Value), Just(Tree::Fail)];
        leaf.prop_recursive(4, 32, 4, |inner| {
            prop_oneof![
                (inner.clone(), inner.clone())
                    .prop_map(|(a, b)| Tree::Seq(Box::new(a), Box::new(b))),
                prop::collection::vec(inner.clone(), 0..4).prop_map(Tree::All),
                inner.prop_map(|t| Tree::Recover(Box::new(t))),
            ]
        })
    }

    fn expected(tree: &Tree) -> Result<u32, Boom> {
        match tree {
            Tree::Value(n) => Ok(*n),
            Tree::Fail => Err(Boom("fail")),
            Tree::Seq(a, b) => {
                let x = expected(a)?;
                Ok(x.wrapping_add(expected(b)?))
            }
            Tree::All(children) => children
                .iter()
                .map(expected)
                .try_fold(0u32, |acc, r| r.map(|v| acc.wrapping_add(v))),
            Tree::Recover(t) => expected(t).or(Ok(0)),
        }
    }

    fn build(tree: Tree) -> Task<u32, Boom> {
        match tree {
            Tree::Value(n) => ok(n),
            Tree::Fail => fail(),
            Tree::Seq(a, b) => {
                let b = build(*b);
                sequence(build(*a), move |x| sequence(b, move |y| ok(x.wrapping_add(y))))
            }
            Tree::All(children) => sequence(
                concurrent(children.into_iter().map(build).collect()),
                |values| ok(values.into_iter().fold(0u32, u32::wrapping_add)),
            ),
            Tree::Recover(t) => intercept(build(*t), |_| Ok(0)),
        }
    }

    fn runtime() -> tokio::runtime::Runtime {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("runtime")
    }

    proptest! {
        #[test]
        fn every_tree_resolves_once(tree in tree()) {
            let want = expected(&tree);
            let resolutions = Arc::new(AtomicUsize::new(0));
            let count = Arc::clone(&resolutions);

            let got = runtime().block_on(async move {
                let result = build(tree).await;
                count.fetch_add(1, Ordering::SeqCst);
                result
            });

            prop_assert_eq!(got, want);
            prop_assert_eq!(resolutions.load(Ordering::SeqCst), 1);
        }

        #[test]
        fn memo_runs_once_for_concurrent_callers(callers in 1usize..16) {
            let runs = Arc::new(AtomicUsize::new(0));
            let memo: Memo<u32, Boom> = Memo::new();

            let results = runtime().block_on(async {
                let calls = (0..callers).map(|_| {
                    let memo = memo.clone();
                    let runs = Arc::clone(&runs);
                    async move {
                        memo.get_or_run(move || async move {
                            runs.fetch_add(1, Ordering::SeqCst);
                            tokio::task::yield_now().await;
                            Ok(42)
                        })
                        .await
                    }
                });
                futures::future::join_all(calls).await
            });

            prop_assert_eq!(runs.load(Ordering::SeqCst), 1);
            prop_assert!(results.iter().all(|r| *r == Ok(42)));
        }
    }
}
