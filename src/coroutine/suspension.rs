use std::cell::RefCell;
use std::fmt;
use std::future::Future;
use std::mem;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

use static_assertions::assert_not_impl_any;

use super::Yield;

type Callback<T> = Box<dyn FnOnce(T)>;

enum SuspensionState<T: 'static> {
    Empty,
    Value(T),
    Watching(Waker),
    Chained(Callback<T>),
    Abandoned,
    Broken,
    Taken,
}

struct SuspensionJoint<T: 'static> {
    state: RefCell<SuspensionState<T>>,
}

impl<T> SuspensionJoint<T> {
    fn new() -> Rc<SuspensionJoint<T>> {
        Rc::new(SuspensionJoint { state: RefCell::new(SuspensionState::Empty) })
    }

    fn is_ready(&self) -> bool {
        matches!(&*self.state.borrow(), SuspensionState::Value(_) | SuspensionState::Broken)
    }

    fn is_abandoned(&self) -> bool {
        matches!(&*self.state.borrow(), SuspensionState::Abandoned)
    }

    fn wake(&self, value: T) -> Result<(), T> {
        let mut state = self.state.borrow_mut();
        match mem::replace(&mut *state, SuspensionState::Taken) {
            SuspensionState::Empty => {
                *state = SuspensionState::Value(value);
                Ok(())
            },
            SuspensionState::Watching(waker) => {
                *state = SuspensionState::Value(value);
                drop(state);
                waker.wake();
                Ok(())
            },
            SuspensionState::Chained(callback) => {
                drop(state);
                callback(value);
                Ok(())
            },
            previous => {
                *state = previous;
                Err(value)
            },
        }
    }

    // Resumption dropped without value.
    fn fault(&self) {
        let mut state = self.state.borrow_mut();
        match mem::replace(&mut *state, SuspensionState::Broken) {
            SuspensionState::Watching(waker) => {
                drop(state);
                waker.wake();
            },
            SuspensionState::Chained(callback) => {
                drop(state);
                drop(callback);
            },
            SuspensionState::Empty => {},
            previous => *state = previous,
        }
    }

    fn abandon(&self) {
        let mut state = self.state.borrow_mut();
        if matches!(&*state, SuspensionState::Empty | SuspensionState::Watching(_) | SuspensionState::Value(_)) {
            let previous = mem::replace(&mut *state, SuspensionState::Abandoned);
            drop(state);
            drop(previous);
        }
    }

    fn watch(&self, waker: &Waker) {
        let mut state = self.state.borrow_mut();
        if matches!(&*state, SuspensionState::Empty | SuspensionState::Watching(_)) {
            *state = SuspensionState::Watching(waker.clone());
        } else if matches!(&*state, SuspensionState::Value(_) | SuspensionState::Broken) {
            drop(state);
            waker.wake_by_ref();
        }
    }

    fn take(&self) -> Option<T> {
        let mut state = self.state.borrow_mut();
        match mem::replace(&mut *state, SuspensionState::Taken) {
            SuspensionState::Value(value) => Some(value),
            SuspensionState::Broken => {
                *state = SuspensionState::Broken;
                drop(state);
                panic!("suspension: no resumption");
            },
            previous => {
                *state = previous;
                None
            },
        }
    }

    fn chain(&self, callback: Callback<T>) {
        let mut state = self.state.borrow_mut();
        match mem::replace(&mut *state, SuspensionState::Taken) {
            SuspensionState::Value(value) => {
                drop(state);
                callback(value);
            },
            SuspensionState::Empty | SuspensionState::Watching(_) => *state = SuspensionState::Chained(callback),
            previous => {
                *state = previous;
                drop(state);
                drop(callback);
            },
        }
    }
}

/// Retry probe installed by a blocked select.
pub(crate) trait Retry {
    /// Returns true if some clause could proceed now.
    fn is_ready(&self) -> bool;

    /// Performs a ready clause if any. Returns true if the owner could be resumed on next tick.
    fn retry(&mut self) -> bool;
}

/// Re-evaluates readiness of a blocked select on behalf of the scheduler.
pub struct Probe {
    retry: Box<dyn Retry>,
}

impl Probe {
    pub(crate) fn new<R: Retry + 'static>(retry: R) -> Self {
        Probe { retry: Box::new(retry) }
    }

    /// Returns true if a retry would succeed.
    pub fn is_ready(&self) -> bool {
        self.retry.is_ready()
    }

    pub(crate) fn retry(&mut self) -> bool {
        self.retry.retry()
    }
}

impl fmt::Debug for Probe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Probe").field("ready", &self.is_ready()).finish()
    }
}

/// Tells the scheduler how soon the owner of a [Suspension] could be resumed.
#[derive(Debug)]
pub enum Hint {
    /// Operation completed without contention, retry owner on very next tick.
    Immediate,
    /// Wait for resolution from elsewhere.
    Deferred,
    /// Blocked in select. Scheduler polls the probe while owner is not ready.
    Blocked(Probe),
}

impl Hint {
    pub fn is_immediate(&self) -> bool {
        matches!(self, Hint::Immediate)
    }

    pub fn is_blocked(&self) -> bool {
        matches!(self, Hint::Blocked(_))
    }
}

/// One-shot value awaited by a task. Awaiting always suspends the task once, even if the value
/// is already there.
pub struct Suspension<T: 'static> {
    joint: Rc<SuspensionJoint<T>>,
    hint: Hint,
    yielded: bool,
}

/// Resolves paired [Suspension].
pub struct Resumption<T: 'static> {
    joint: Option<Rc<SuspensionJoint<T>>>,
}

assert_not_impl_any!(Suspension<()>: Send, Sync);
assert_not_impl_any!(Resumption<()>: Send, Sync);

impl<T> Suspension<T> {
    /// Constructs a suspension already resolved with given value.
    pub fn resolved(value: T) -> Self {
        let joint = SuspensionJoint::new();
        *joint.state.borrow_mut() = SuspensionState::Value(value);
        Suspension { joint, hint: Hint::Immediate, yielded: false }
    }

    pub(crate) fn with_hint(mut self, hint: Hint) -> Self {
        self.hint = hint;
        self
    }

    /// Checks readiness.
    pub fn is_ready(&self) -> bool {
        self.joint.is_ready()
    }

    pub fn hint(&self) -> &Hint {
        &self.hint
    }

    /// Runs `f` with the value once resolved, right away if already resolved.
    pub fn then<F>(self, f: F)
    where
        F: FnOnce(T) + 'static,
    {
        self.joint.chain(Box::new(f));
    }

    /// Chains `f` after resolution. Returned suspension keeps the hint of this one and
    /// resolves after `f` ran.
    pub fn map<U, F>(mut self, f: F) -> Suspension<U>
    where
        U: 'static,
        F: FnOnce(T) -> U + 'static,
    {
        let hint = mem::replace(&mut self.hint, Hint::Deferred);
        let (suspension, resumption) = suspension();
        self.then(move |value| {
            resumption.resume(f(value));
        });
        suspension.with_hint(hint)
    }
}

impl<T> Drop for Suspension<T> {
    fn drop(&mut self) {
        self.joint.abandon();
    }
}

impl<T> Future for Suspension<T> {
    type Output = T;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<T> {
        if self.yielded {
            if let Some(value) = self.joint.take() {
                return Poll::Ready(value);
            }
        }
        self.yielded = true;
        let hint = mem::replace(&mut self.hint, Hint::Deferred);
        self.joint.watch(cx.waker());
        super::yielded(Yield::Suspension(hint));
        Poll::Pending
    }
}

impl<T> fmt::Debug for Suspension<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Suspension").field("ready", &self.is_ready()).field("hint", &self.hint).finish()
    }
}

impl<T> Resumption<T> {
    /// Resumes suspending peer. Returns false if peer has gone or been resolved.
    pub fn resume(self, value: T) -> bool {
        self.send(value).is_ok()
    }

    /// Sends value to peer, returns it back if peer has gone.
    pub fn send(mut self, value: T) -> Result<(), T> {
        match self.joint.take() {
            Some(joint) => joint.wake(value),
            None => Err(value),
        }
    }

    /// Returns true if paired [Suspension] was dropped before resolution.
    pub fn is_abandoned(&self) -> bool {
        self.joint.as_ref().map_or(true, |joint| joint.is_abandoned())
    }
}

impl<T> Drop for Resumption<T> {
    fn drop(&mut self) {
        if let Some(joint) = self.joint.take() {
            joint.fault();
        }
    }
}

/// Constructs a pending [Suspension] and its [Resumption].
pub fn suspension<T: 'static>() -> (Suspension<T>, Resumption<T>) {
    let joint = SuspensionJoint::new();
    let suspension = Suspension { joint: joint.clone(), hint: Hint::Deferred, yielded: false };
    (suspension, Resumption { joint: Some(joint) })
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::task::Wake;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::error::{JoinError, TaskError};
    use crate::runtime::Runtime;

    #[derive(Default)]
    struct Flag(AtomicBool);

    impl Wake for Flag {
        fn wake(self: Arc<Self>) {
            self.0.store(true, Ordering::Relaxed);
        }
    }

    fn poll<T>(suspension: &mut Suspension<T>, flag: &Arc<Flag>) -> Poll<T> {
        let waker = Waker::from(flag.clone());
        let mut cx = Context::from_waker(&waker);
        Pin::new(suspension).poll(&mut cx)
    }

    #[test]
    fn resolved_suspends_once() {
        let flag = Arc::new(Flag::default());
        let mut suspension = Suspension::resolved(5);
        assert!(suspension.is_ready());
        assert!(suspension.hint().is_immediate());
        assert_eq!(poll(&mut suspension, &flag), Poll::Pending);
        assert!(flag.0.load(Ordering::Relaxed));
        assert_eq!(poll(&mut suspension, &flag), Poll::Ready(5));
    }

    #[test]
    fn resumption_wakes_watcher() {
        let flag = Arc::new(Flag::default());
        let (mut suspension, resumption) = suspension::<i32>();
        assert!(!suspension.hint().is_immediate());
        assert_eq!(poll(&mut suspension, &flag), Poll::Pending);
        assert!(!flag.0.load(Ordering::Relaxed));
        assert_eq!(poll(&mut suspension, &flag), Poll::Pending);
        assert!(resumption.resume(6));
        assert!(flag.0.load(Ordering::Relaxed));
        assert_eq!(poll(&mut suspension, &flag), Poll::Ready(6));
    }

    #[test]
    fn suspension_dropped() {
        let (suspension, resumption) = suspension::<i32>();
        assert!(!resumption.is_abandoned());
        drop(suspension);
        assert!(resumption.is_abandoned());
        assert_eq!(resumption.send(5), Err(5));
    }

    #[test]
    fn then_after_resolution() {
        let (suspension, resumption) = suspension::<i32>();
        let seen = Rc::new(Cell::new(0));
        suspension.then({
            let seen = seen.clone();
            move |value| seen.set(value)
        });
        assert_eq!(seen.get(), 0);
        assert!(resumption.resume(7));
        assert_eq!(seen.get(), 7);
    }

    #[test]
    fn then_on_resolved() {
        let seen = Rc::new(Cell::new(0));
        Suspension::resolved(3).then({
            let seen = seen.clone();
            move |value| seen.set(value)
        });
        assert_eq!(seen.get(), 3);
    }

    #[test]
    fn map_keeps_hint() {
        let flag = Arc::new(Flag::default());
        let mut mapped = Suspension::resolved(2).map(|v| v * 10);
        assert!(mapped.hint().is_immediate());
        assert!(mapped.is_ready());
        assert_eq!(poll(&mut mapped, &flag), Poll::Pending);
        assert_eq!(poll(&mut mapped, &flag), Poll::Ready(20));

        let (suspension, resumption) = suspension::<i32>();
        let mapped = suspension.map(|v| v + 1);
        assert!(!mapped.hint().is_immediate());
        assert!(!mapped.is_ready());
        resumption.resume(1);
        assert!(mapped.is_ready());
    }

    #[test]
    fn resumption_dropped_breaks_chain() {
        let (suspension, resumption) = suspension::<i32>();
        let mapped = suspension.map(|v| v + 1);
        drop(resumption);
        assert!(mapped.is_ready());
    }

    #[test]
    fn resumption_dropped() {
        let runtime = Runtime::new();
        let err = runtime
            .block_on(async {
                let (suspension, resumption) = suspension::<i32>();
                drop(resumption);
                suspension.await
            })
            .unwrap_err();
        match err {
            JoinError::Failed(TaskError::Panicked(err)) => assert_eq!(err.as_str(), Some("suspension: no resumption")),
            err => panic!("unexpected error: {:?}", err),
        }
    }
}
