use std::cell::RefCell;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, VecDeque};
use std::rc::Rc;
use std::thread;
use std::time::{Duration, Instant};

use slab::Slab;

pub(crate) type Job = Box<dyn FnOnce()>;

#[derive(Default)]
struct Timers {
    sequence: u64,
    deadlines: BinaryHeap<Reverse<(Instant, u64, usize)>>,
    jobs: Slab<Job>,
}

impl Timers {
    fn insert(&mut self, deadline: Instant, job: Job) {
        let key = self.jobs.insert(job);
        self.sequence += 1;
        self.deadlines.push(Reverse((deadline, self.sequence, key)));
    }

    fn pop_due(&mut self, now: Instant) -> Option<Job> {
        match self.deadlines.peek() {
            Some(Reverse((deadline, _, _))) if *deadline <= now => {},
            _ => return None,
        }
        let Reverse((_, _, key)) = self.deadlines.pop()?;
        self.jobs.try_remove(key)
    }

    fn next_deadline(&self) -> Option<Instant> {
        self.deadlines.peek().map(|Reverse((deadline, _, _))| *deadline)
    }
}

/// Single threaded host loop. Queued jobs run one at a time in FIFO order, due timers run
/// between them.
#[derive(Default)]
pub(crate) struct EventLoop {
    jobs: RefCell<VecDeque<Job>>,
    timers: RefCell<Timers>,
}

impl EventLoop {
    pub fn new() -> Rc<EventLoop> {
        Rc::new(EventLoop::default())
    }

    /// Queues job to run after all queued jobs.
    pub fn defer(&self, job: impl FnOnce() + 'static) {
        self.jobs.borrow_mut().push_back(Box::new(job));
    }

    /// Runs job after given delay.
    pub fn defer_after(&self, delay: Duration, job: impl FnOnce() + 'static) {
        let deadline = Instant::now() + delay;
        self.timers.borrow_mut().insert(deadline, Box::new(job));
    }

    /// Runs next queued job. Returns false if there is none.
    pub fn run_next(&self) -> bool {
        let job = self.jobs.borrow_mut().pop_front();
        match job {
            None => false,
            Some(job) => {
                job();
                true
            },
        }
    }

    /// Runs all due timers. Returns number of fired timers.
    pub fn run_due_timers(&self) -> usize {
        let now = Instant::now();
        let mut fired = 0;
        loop {
            let job = self.timers.borrow_mut().pop_due(now);
            match job {
                None => break fired,
                Some(job) => {
                    job();
                    fired += 1;
                },
            }
        }
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.borrow().next_deadline()
    }

    #[cfg(test)]
    pub fn has_jobs(&self) -> bool {
        !self.jobs.borrow().is_empty()
    }

    /// Sleeps till deadline but no longer than `limit`.
    pub fn sleep_until(&self, deadline: Instant, limit: Duration) {
        let timeout = deadline.saturating_duration_since(Instant::now()).min(limit);
        if !timeout.is_zero() {
            thread::sleep(timeout);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::time::{Duration, Instant};

    use more_asserts::assert_ge;
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn jobs_in_order() {
        let host = EventLoop::new();
        let order = Rc::new(RefCell::new(Vec::new()));
        for i in 0..3 {
            let order = order.clone();
            host.defer(move || order.borrow_mut().push(i));
        }
        assert!(host.has_jobs());
        while host.run_next() {}
        assert_eq!(*order.borrow(), vec![0, 1, 2]);
        assert!(!host.has_jobs());
    }

    #[test]
    fn timers_by_deadline() {
        let host = EventLoop::new();
        let order = Rc::new(RefCell::new(Vec::new()));
        let start = Instant::now();
        for (i, millis) in [(0, 20), (1, 5), (2, 5)] {
            let order = order.clone();
            host.defer_after(Duration::from_millis(millis), move || order.borrow_mut().push(i));
        }
        while let Some(deadline) = host.next_deadline() {
            host.sleep_until(deadline, Duration::from_secs(1));
            host.run_due_timers();
        }
        assert_ge!(start.elapsed(), Duration::from_millis(20));
        assert_eq!(*order.borrow(), vec![1, 2, 0]);
    }
}
