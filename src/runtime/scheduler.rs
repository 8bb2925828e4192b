use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::mem;
use std::rc::Rc;

use log::{debug, trace};

use super::host::EventLoop;
use crate::coroutine::{Coroutine, Step, Yield};
use crate::error::TaskError;
use crate::select::RandomSource;
use crate::task::{self, Retried, Task, TaskId, TaskOutput};

thread_local! {
    static SCHEDULER: RefCell<Option<Scheduler>> = const { RefCell::new(None) };
}

struct Scope {}

impl Scope {
    fn enter(scheduler: &Scheduler) -> Scope {
        SCHEDULER.with(|cell| {
            let mut current = cell.borrow_mut();
            assert!(current.is_none(), "runtime scheduler existed");
            *current = Some(scheduler.clone());
        });
        Scope {}
    }
}

impl Drop for Scope {
    fn drop(&mut self) {
        let scheduler = SCHEDULER.with(|cell| cell.borrow_mut().take());
        assert!(scheduler.is_some(), "runtime scheduler does not exist");
    }
}

/// Uncaught failure of a task reported to error hook.
#[derive(Debug)]
pub struct TaskFailure {
    task_id: TaskId,
    name: Option<Rc<str>>,
    error: TaskError,
}

impl TaskFailure {
    pub fn task_id(&self) -> TaskId {
        self.task_id
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn error(&self) -> &TaskError {
        &self.error
    }

    pub fn into_error(self) -> TaskError {
        self.error
    }
}

impl fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name.as_deref() {
            None => write!(f, "task {}: {}", self.task_id, self.error),
            Some(name) => write!(f, "task {}({}): {}", self.task_id, name, self.error),
        }
    }
}

/// Hook observing uncaught task failures.
pub type ErrorHook = Rc<dyn Fn(TaskFailure)>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, strum::IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
enum Placement {
    // Behind all other tasks.
    Head,
    // Next tick.
    Tail,
    Discard,
}

struct SchedulerState {
    // Popped from back, requeued to front or back.
    tasks: VecDeque<Task>,
    next_id: u64,
    tick_pending: bool,
    clear_requested: bool,
}

impl SchedulerState {
    fn new() -> Self {
        SchedulerState { tasks: VecDeque::with_capacity(64), next_id: 1, tick_pending: false, clear_requested: false }
    }
}

struct SchedulerInner {
    state: RefCell<SchedulerState>,
    hook: RefCell<Option<ErrorHook>>,
    random: RandomSource,
    host: Rc<EventLoop>,
}

/// Scheduler advances live tasks one suspension-step per tick.
///
/// Each tick pops the most recently queued task from back. A task that yielded nothing or is
/// waiting for resolution is requeued at front, so every other task gets its turn first. A task
/// whose yielded value resolved without contention is requeued at back to run on very next tick.
/// Ticks are separated by deferral to host loop, so timers interleave with tasks.
#[derive(Clone)]
pub struct Scheduler {
    inner: Rc<SchedulerInner>,
}

impl Scheduler {
    pub(crate) fn new(host: Rc<EventLoop>, random: RandomSource) -> Scheduler {
        let inner = SchedulerInner {
            state: RefCell::new(SchedulerState::new()),
            hook: RefCell::new(None),
            random,
            host,
        };
        Scheduler { inner: Rc::new(inner) }
    }

    /// Returns scheduler of running task.
    pub(crate) fn current() -> Option<Scheduler> {
        SCHEDULER.with(|cell| cell.borrow().clone())
    }

    pub(crate) fn host(&self) -> &Rc<EventLoop> {
        &self.inner.host
    }

    pub(crate) fn random(&self) -> &RandomSource {
        &self.inner.random
    }

    /// Constructs a task builder to spawn task.
    pub fn builder(&self) -> task::Builder<'_> {
        task::Builder::with_scheduler(self)
    }

    /// Spawns a task and returns its id. The task runs on some later tick, never within this
    /// call.
    pub fn spawn<F>(&self, f: F) -> TaskId
    where
        F: Future + 'static,
        F::Output: TaskOutput,
    {
        self.spawn_named(None, f)
    }

    /// Spawns task from computation `f` applied to `args`.
    pub fn spawn_with<A, F, Fut>(&self, f: F, args: A) -> TaskId
    where
        F: FnOnce(A) -> Fut,
        Fut: Future + 'static,
        Fut::Output: TaskOutput,
    {
        self.spawn(f(args))
    }

    pub(crate) fn spawn_named<F>(&self, name: Option<Rc<str>>, f: F) -> TaskId
    where
        F: Future + 'static,
        F::Output: TaskOutput,
    {
        let coroutine = Coroutine::new(f);
        let mut state = self.inner.state.borrow_mut();
        let id = TaskId::new(state.next_id);
        state.next_id += 1;
        debug!("task {} spawned, name: {:?}", id, name);
        state.tasks.push_back(Task::new(id, name, coroutine));
        let schedule = !state.tick_pending;
        state.tick_pending = true;
        drop(state);
        if schedule {
            self.schedule();
        }
        id
    }

    /// Discards all live tasks. It is safe to call from running task, which will also be
    /// discarded after its current step.
    pub fn clear(&self) {
        let tasks = {
            let mut state = self.inner.state.borrow_mut();
            state.clear_requested = true;
            mem::take(&mut state.tasks)
        };
        debug!("clear {} tasks", tasks.len());
        drop(tasks);
    }

    /// Registers hook for uncaught task failures. Failures are silently discarded if there is no
    /// hook.
    pub fn set_error_hook<F>(&self, hook: F)
    where
        F: Fn(TaskFailure) + 'static,
    {
        self.replace_error_hook(Some(Rc::new(hook)));
    }

    /// Unregisters error hook.
    pub fn take_error_hook(&self) -> Option<ErrorHook> {
        self.inner.hook.borrow_mut().take()
    }

    pub(crate) fn replace_error_hook(&self, hook: Option<ErrorHook>) -> Option<ErrorHook> {
        mem::replace(&mut *self.inner.hook.borrow_mut(), hook)
    }

    /// Number of live tasks.
    pub fn len(&self) -> usize {
        self.inner.state.borrow().tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns true if no live task could make progress without outside resolution.
    pub fn is_stalled(&self) -> bool {
        self.inner.state.borrow().tasks.iter().all(Task::is_stalled)
    }

    fn schedule(&self) {
        let inner = Rc::downgrade(&self.inner);
        self.inner.host.defer(move || {
            if let Some(inner) = inner.upgrade() {
                Scheduler { inner }.tick();
            }
        });
    }

    fn tick(&self) {
        let _scope = Scope::enter(self);
        let mut state = self.inner.state.borrow_mut();
        state.clear_requested = false;
        let task = state.tasks.pop_back();
        let Some(mut task) = task else {
            state.tick_pending = false;
            return;
        };
        drop(state);

        let placement = if task.is_ready() {
            self.step(&mut task)
        } else if task.is_blocked() {
            self.retry(&mut task)
        } else {
            Placement::Head
        };

        let mut state = self.inner.state.borrow_mut();
        if state.clear_requested {
            trace!("task {} aborted by clear", task.id());
            // Tasks spawned after clear in the same step still deserve ticks.
            let schedule = !state.tasks.is_empty();
            state.tick_pending = schedule;
            drop(state);
            drop(task);
            if schedule {
                self.schedule();
            }
            return;
        }
        trace!("task {} placed at {}", task.id(), <&'static str>::from(placement));
        let discarded = match placement {
            Placement::Head => {
                state.tasks.push_front(task);
                None
            },
            Placement::Tail => {
                state.tasks.push_back(task);
                None
            },
            Placement::Discard => Some(task),
        };
        drop(state);
        drop(discarded);
        self.schedule();
    }

    fn step(&self, task: &mut Task) -> Placement {
        match task.step() {
            Step::Completed => {
                debug!("task {} completed", task.id());
                Placement::Discard
            },
            Step::Failed(error) => {
                self.fail(task, error);
                Placement::Discard
            },
            Step::Suspended(Yield::Nothing) => Placement::Head,
            Step::Suspended(Yield::Suspension(hint)) if hint.is_immediate() => Placement::Tail,
            Step::Suspended(Yield::Suspension(_)) => Placement::Head,
        }
    }

    fn retry(&self, task: &mut Task) -> Placement {
        match task.retry() {
            Retried::Resumed => Placement::Tail,
            Retried::Blocked => Placement::Head,
            Retried::Failed(error) => {
                self.fail(task, error);
                Placement::Discard
            },
        }
    }

    fn fail(&self, task: &Task, error: TaskError) {
        let failure = TaskFailure { task_id: task.id(), name: task.name().cloned(), error };
        let hook = self.inner.hook.borrow().clone();
        match hook {
            None => debug!("{}, no error hook", failure),
            Some(hook) => {
                debug!("{}", failure);
                hook(failure);
            },
        }
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.borrow();
        f.debug_struct("Scheduler")
            .field("tasks", &state.tasks)
            .field("tick_pending", &state.tick_pending)
            .field("clear_requested", &state.clear_requested)
            .finish()
    }
}
