//! Runtime drives scheduler ticks and timers on a single thread.

mod host;
mod scheduler;

use std::cell::RefCell;
use std::future::Future;
use std::rc::Rc;
use std::time::Duration;

use log::debug;

pub(crate) use self::host::EventLoop;
pub use self::scheduler::{ErrorHook, Scheduler, TaskFailure};
use crate::error::JoinError;
use crate::select::RandomSource;
use crate::task::{self, TaskId, TaskOutput};

const DEFAULT_IDLE_SLEEP: Duration = Duration::from_millis(10);

/// Builder for [Runtime].
#[derive(Default)]
pub struct Builder {
    random: Option<RandomSource>,
    idle_sleep: Option<Duration>,
}

impl Builder {
    /// Specifies random source to break ties among ready select clauses.
    pub fn random(&mut self, random: RandomSource) -> &mut Self {
        self.random = Some(random);
        self
    }

    /// Seeds random source to break ties among ready select clauses.
    pub fn seed(&mut self, seed: u64) -> &mut Self {
        self.random(RandomSource::new(fastrand::Rng::with_seed(seed)))
    }

    /// Specifies the longest single sleep while waiting for timers.
    pub fn idle_sleep(&mut self, duration: Duration) -> &mut Self {
        assert!(!duration.is_zero(), "idle sleep must not be zero");
        self.idle_sleep = Some(duration);
        self
    }

    /// Constructs an [Runtime] to spawn and schedule tasks.
    pub fn build(&mut self) -> Runtime {
        let host = EventLoop::new();
        let random = self.random.clone().unwrap_or_default();
        let scheduler = Scheduler::new(host.clone(), random);
        Runtime { host, scheduler, idle_sleep: self.idle_sleep.unwrap_or(DEFAULT_IDLE_SLEEP) }
    }
}

/// Runtime encapsulates host loop and task scheduler to serve spawned tasks.
///
/// Nothing runs until one of [Runtime::run], [Runtime::run_until_stalled] or
/// [Runtime::block_on] is called. [Runtime::drop] discards all live tasks.
pub struct Runtime {
    host: Rc<EventLoop>,
    scheduler: Scheduler,
    idle_sleep: Duration,
}

impl Runtime {
    /// Constructs an runtime to serve spawned tasks.
    pub fn new() -> Runtime {
        Builder::default().build()
    }

    /// Constructs a task builder to spawn task.
    pub fn builder(&self) -> task::Builder<'_> {
        task::Builder::with_scheduler(&self.scheduler)
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Spawns a task and returns its id.
    ///
    /// See [Scheduler::spawn] for more details.
    pub fn spawn<F>(&self, f: F) -> TaskId
    where
        F: Future + 'static,
        F::Output: TaskOutput,
    {
        self.scheduler.spawn(f)
    }

    /// Spawns task from computation `f` applied to `args`.
    pub fn spawn_with<A, F, Fut>(&self, f: F, args: A) -> TaskId
    where
        F: FnOnce(A) -> Fut,
        Fut: Future + 'static,
        Fut::Output: TaskOutput,
    {
        self.scheduler.spawn_with(f, args)
    }

    /// Discards all live tasks.
    pub fn clear(&self) {
        self.scheduler.clear()
    }

    /// See [Scheduler::set_error_hook].
    pub fn set_error_hook<F>(&self, hook: F)
    where
        F: Fn(TaskFailure) + 'static,
    {
        self.scheduler.set_error_hook(hook)
    }

    /// Runs queued jobs and timers till there are none. Tasks blocked forever keep ticks going.
    pub fn run(&self) {
        self.drive(|| false, false);
    }

    /// Runs till no task could make progress without outside resolution and no timer is pending.
    pub fn run_until_stalled(&self) {
        self.drive(|| false, true);
    }

    /// Spawns `f` as a task and runs till it completes.
    ///
    /// Failure of other tasks are forwarded to error hook as usual.
    pub fn block_on<F>(&self, f: F) -> Result<F::Output, JoinError>
    where
        F: Future + 'static,
    {
        let output = Rc::new(RefCell::new(None));
        let id = self.scheduler.spawn({
            let output = output.clone();
            async move {
                let value = f.await;
                *output.borrow_mut() = Some(value);
            }
        });

        let failure = Rc::new(RefCell::new(None));
        let previous = self.scheduler.replace_error_hook(None);
        let hook: ErrorHook = {
            let failure = failure.clone();
            let previous = previous.clone();
            Rc::new(move |task_failure: TaskFailure| {
                if task_failure.task_id() == id {
                    *failure.borrow_mut() = Some(task_failure.into_error());
                } else if let Some(previous) = previous.as_ref() {
                    previous(task_failure);
                }
            })
        };
        self.scheduler.replace_error_hook(Some(hook));
        let _guard = scopeguard::guard(previous, |previous| {
            self.scheduler.replace_error_hook(previous);
        });

        self.drive(|| output.borrow().is_some() || failure.borrow().is_some(), true);
        if let Some(err) = failure.borrow_mut().take() {
            return Err(JoinError::Failed(err));
        }
        let value = output.borrow_mut().take();
        value.ok_or_else(|| {
            debug!("task {} stalled, {} tasks alive", id, self.scheduler.len());
            JoinError::Stalled
        })
    }

    // Returns true if done.
    fn drive(&self, done: impl Fn() -> bool, until_stalled: bool) -> bool {
        loop {
            if done() {
                return true;
            }
            self.host.run_due_timers();
            if done() {
                return true;
            }
            let deadline = self.host.next_deadline();
            if self.scheduler.is_stalled() {
                match deadline {
                    None if until_stalled => return false,
                    Some(deadline) => {
                        self.host.sleep_until(deadline, self.idle_sleep);
                        continue;
                    },
                    None => {},
                }
            }
            if self.host.run_next() {
                continue;
            }
            match deadline {
                None => return false,
                Some(deadline) => self.host.sleep_until(deadline, self.idle_sleep),
            }
        }
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Runtime::new()
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        self.scheduler.clear();
    }
}
