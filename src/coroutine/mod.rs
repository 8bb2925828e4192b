//! Stepwise resumable computations and the one-shot values they suspend on.
//!
//! A task computation is an `async` block. Each poll of it is one suspension-step. Before
//! returning [Poll::Pending], whatever suspended the computation reports what it yielded, so the
//! scheduler knows how to requeue the task:
//! * [crate::task::yield_now] yields nothing.
//! * [Suspension] yields itself along with its [Hint].
//! * Any other future yields an external value resolved through its [std::task::Waker].

mod suspension;

use std::cell::{Cell, RefCell};
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::task::{Context, Poll, Waker};

pub(crate) use self::suspension::Retry;
pub use self::suspension::{suspension, Hint, Probe, Resumption, Suspension};
use crate::error::{BoxError, PanicError, TaskError};
use crate::task::TaskOutput;

thread_local! {
    static RESUMING: Cell<bool> = const { Cell::new(false) };
    static YIELDED: RefCell<Option<Yield>> = const { RefCell::new(None) };
}

/// What a suspended step yielded.
#[derive(Debug)]
pub(crate) enum Yield {
    Nothing,
    Suspension(Hint),
}

/// Records yielded value of running step. It is a no-op outside scheduler steps.
pub(crate) fn yielded(value: Yield) {
    if RESUMING.with(|resuming| resuming.get()) {
        YIELDED.with(|slot| *slot.borrow_mut() = Some(value));
    }
}

struct Scope {}

impl Scope {
    fn enter() -> Scope {
        RESUMING.with(|resuming| {
            assert!(!resuming.get(), "running coroutine not exited");
            resuming.set(true);
        });
        YIELDED.with(|slot| slot.borrow_mut().take());
        Scope {}
    }

    fn take(&self) -> Option<Yield> {
        YIELDED.with(|slot| slot.borrow_mut().take())
    }
}

impl Drop for Scope {
    fn drop(&mut self) {
        RESUMING.with(|resuming| resuming.set(false));
        YIELDED.with(|slot| slot.borrow_mut().take());
    }
}

/// Outcome of one suspension-step.
#[derive(Debug)]
pub(crate) enum Step {
    Suspended(Yield),
    Completed,
    Failed(TaskError),
}

type Computation = Pin<Box<dyn Future<Output = Result<(), BoxError>>>>;

pub(crate) struct Coroutine {
    computation: Computation,
}

impl Coroutine {
    pub fn new<F>(f: F) -> Coroutine
    where
        F: Future + 'static,
        F::Output: TaskOutput,
    {
        Coroutine { computation: Box::pin(async move { f.await.into_result() }) }
    }

    /// Runs computation to its next suspension point.
    pub fn resume(&mut self, waker: &Waker) -> Step {
        let scope = Scope::enter();
        let mut cx = Context::from_waker(waker);
        let computation = &mut self.computation;
        let poll = panic::catch_unwind(AssertUnwindSafe(|| computation.as_mut().poll(&mut cx)));
        let yielded = scope.take();
        match poll {
            Ok(Poll::Ready(Ok(()))) => Step::Completed,
            Ok(Poll::Ready(Err(err))) => Step::Failed(TaskError::Failed(err)),
            Ok(Poll::Pending) => Step::Suspended(yielded.unwrap_or(Yield::Suspension(Hint::Deferred))),
            Err(panicked) => Step::Failed(TaskError::Panicked(PanicError::new(panicked))),
        }
    }
}
