//! Cooperatively scheduled tasks.

use std::cell::Cell;
use std::fmt;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll, Wake, Waker};

use crate::coroutine::{self, Coroutine, Probe, Step, Yield};
use crate::error::{BoxError, PanicError, TaskError};
use crate::runtime::Scheduler;

thread_local! {
    static TASK: Cell<Option<TaskId>> = const { Cell::new(None) };
}

/// Returns id of running task if any.
pub fn try_id() -> Option<TaskId> {
    TASK.with(|cell| cell.get())
}

/// Returns id of running task.
///
/// # Panics
/// Panic if called outside task.
pub fn id() -> TaskId {
    try_id().expect("no running task")
}

struct Scope {
    id: TaskId,
}

impl Scope {
    fn enter(id: TaskId) -> Self {
        TASK.with(|cell| {
            assert!(cell.get().is_none(), "running task not exited");
            cell.set(Some(id));
        });
        Scope { id }
    }
}

impl Drop for Scope {
    fn drop(&mut self) {
        TASK.with(|cell| {
            let id = cell.replace(None).expect("no running task");
            assert!(self.id == id, "running task changed");
        });
    }
}

/// Unique identifier of spawned task. Ids increase monotonically in spawning order.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(u64);

impl TaskId {
    pub(crate) fn new(id: u64) -> Self {
        TaskId(id)
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Output of task computation. `Err` is reported as task failure.
pub trait TaskOutput {
    fn into_result(self) -> Result<(), BoxError>;
}

impl TaskOutput for () {
    fn into_result(self) -> Result<(), BoxError> {
        Ok(())
    }
}

impl<E> TaskOutput for Result<(), E>
where
    E: Into<BoxError>,
{
    fn into_result(self) -> Result<(), BoxError> {
        self.map_err(Into::into)
    }
}

// Ready flag flipped by resolution of yielded value.
#[derive(Default)]
struct Readiness {
    ready: AtomicBool,
}

impl Wake for Readiness {
    fn wake(self: Arc<Self>) {
        self.wake_by_ref();
    }

    fn wake_by_ref(self: &Arc<Self>) {
        self.ready.store(true, Ordering::Release);
    }
}

pub(crate) struct Task {
    id: TaskId,
    name: Option<Rc<str>>,
    coroutine: Coroutine,
    readiness: Arc<Readiness>,
    waker: Waker,
    probe: Option<Probe>,
}

impl Task {
    pub fn new(id: TaskId, name: Option<Rc<str>>, coroutine: Coroutine) -> Task {
        let readiness = Arc::new(Readiness { ready: AtomicBool::new(true) });
        let waker = Waker::from(readiness.clone());
        Task { id, name, coroutine, readiness, waker, probe: None }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn name(&self) -> Option<&Rc<str>> {
        self.name.as_ref()
    }

    pub fn is_ready(&self) -> bool {
        self.readiness.ready.load(Ordering::Acquire)
    }

    pub fn is_blocked(&self) -> bool {
        self.probe.is_some()
    }

    /// Returns true if this task could not make progress on next tick.
    pub fn is_stalled(&self) -> bool {
        !self.is_ready() && self.probe.as_ref().map_or(true, |probe| !probe.is_ready())
    }

    /// Executes one suspension-step. A select blocked step leaves its probe in task.
    pub fn step(&mut self) -> Step {
        let _scope = Scope::enter(self.id);
        self.probe = None;
        self.readiness.ready.store(false, Ordering::Release);
        let step = self.coroutine.resume(&self.waker);
        match step {
            Step::Suspended(Yield::Suspension(coroutine::Hint::Blocked(probe))) => {
                self.probe = Some(probe);
                Step::Suspended(Yield::Suspension(coroutine::Hint::Deferred))
            },
            step => step,
        }
    }

    /// Retries blocked select. Clause callback performed by a ready case may panic, which fails
    /// this task the same way a panicking step does.
    pub fn retry(&mut self) -> Retried {
        let _scope = Scope::enter(self.id);
        let Some(probe) = self.probe.as_mut() else {
            return Retried::Blocked;
        };
        match panic::catch_unwind(AssertUnwindSafe(|| probe.retry())) {
            Ok(false) => Retried::Blocked,
            Ok(true) => {
                self.probe = None;
                Retried::Resumed
            },
            Err(panicked) => {
                self.probe = None;
                Retried::Failed(TaskError::Panicked(PanicError::new(panicked)))
            },
        }
    }
}

/// Outcome of retrying a blocked select.
pub(crate) enum Retried {
    /// Resumable on next tick.
    Resumed,
    Blocked,
    Failed(TaskError),
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("ready", &self.is_ready())
            .field("blocked", &self.is_blocked())
            .finish()
    }
}

/// Builder for task.
#[derive(Default)]
pub struct Builder<'a> {
    name: Option<Rc<str>>,
    scheduler: Option<&'a Scheduler>,
}

impl Builder<'_> {
    /// Constructs a new task builder.
    pub fn new() -> Builder<'static> {
        Builder { name: None, scheduler: None }
    }

    pub(crate) fn with_scheduler(scheduler: &Scheduler) -> Builder<'_> {
        Builder { name: None, scheduler: Some(scheduler) }
    }

    /// Names task in logs and failure reports.
    pub fn name(&mut self, name: impl Into<String>) -> &mut Self {
        self.name = Some(Rc::from(name.into()));
        self
    }

    /// Spawns a task and returns its id.
    ///
    /// # Panics
    /// Panic if there is no scheduler specified and no running task.
    pub fn spawn<F>(&mut self, f: F) -> TaskId
    where
        F: Future + 'static,
        F::Output: TaskOutput,
    {
        match self.scheduler {
            Some(scheduler) => scheduler.spawn_named(self.name.clone(), f),
            None => Scheduler::current().expect("no runtime").spawn_named(self.name.clone(), f),
        }
    }
}

/// Spawns a task in scheduler of running task.
///
/// The task never runs within this call. It runs on some later tick.
///
/// # Panics
/// Panic if called outside task.
pub fn spawn<F>(f: F) -> TaskId
where
    F: Future + 'static,
    F::Output: TaskOutput,
{
    Builder::new().spawn(f)
}

/// Discards all tasks of running scheduler including the calling one. Calling task will not be
/// resumed after its current step.
///
/// # Panics
/// Panic if called outside task.
pub fn clear() {
    Scheduler::current().expect("no runtime").clear();
}

/// Future returned from [yield_now].
#[derive(Debug, Default)]
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct YieldNow {
    yielded: bool,
}

impl Future for YieldNow {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.yielded {
            return Poll::Ready(());
        }
        self.yielded = true;
        cx.waker().wake_by_ref();
        coroutine::yielded(Yield::Nothing);
        Poll::Pending
    }
}

/// Suspends running task without waiting for anything. It is requeued behind all other tasks.
pub fn yield_now() -> YieldNow {
    YieldNow::default()
}
