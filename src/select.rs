//! Select one ready channel operation among several, or fall back to default.
//!
//! [select] checks every case clause. If some are ready, one of them is chosen through a
//! [RandomSource] and performed, its callback runs once the operation resolves. If none is ready,
//! the default clause runs right away. Without default clause, the returned [Suspension] blocks
//! and the scheduler retries the select on every tick till some clause becomes ready.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::channel::{Channel, Operation};
use crate::coroutine::{self, Hint, Probe, Resumption, Retry, Suspension};
use crate::error::SelectError;
use crate::runtime::Scheduler;

/// Strategy to pick one of ready clauses.
pub trait Random {
    /// Returns an index in `0..len`. `len` is never zero.
    fn choose(&mut self, len: usize) -> usize;
}

impl Random for fastrand::Rng {
    fn choose(&mut self, len: usize) -> usize {
        self.usize(..len)
    }
}

struct FromFn<F>(F);

impl<F> Random for FromFn<F>
where
    F: FnMut(usize) -> usize,
{
    fn choose(&mut self, len: usize) -> usize {
        (self.0)(len)
    }
}

// Cycles through given indices.
struct Sequence {
    indices: Vec<usize>,
    next: usize,
}

impl Random for Sequence {
    fn choose(&mut self, _len: usize) -> usize {
        let index = self.indices[self.next];
        self.next = (self.next + 1) % self.indices.len();
        index
    }
}

/// Shared and substitutable random source used by [select].
///
/// Out of range choices are wrapped around, so a deterministic source needs not to know how many
/// clauses are ready.
#[derive(Clone)]
pub struct RandomSource {
    random: Rc<RefCell<dyn Random>>,
}

impl RandomSource {
    pub fn new<R: Random + 'static>(random: R) -> Self {
        RandomSource { random: Rc::new(RefCell::new(random)) }
    }

    /// Constructs random source from closure which receives number of ready clauses.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: FnMut(usize) -> usize + 'static,
    {
        RandomSource::new(FromFn(f))
    }

    /// Constructs random source cycling through given choices.
    ///
    /// # Panics
    /// Panic if `indices` is empty.
    pub fn sequence(indices: impl Into<Vec<usize>>) -> Self {
        let indices = indices.into();
        assert!(!indices.is_empty(), "empty random sequence");
        RandomSource::new(Sequence { indices, next: 0 })
    }

    /// Chooses an index in `0..len`.
    pub fn choose(&self, len: usize) -> usize {
        assert!(len > 0, "choose from nothing");
        self.random.borrow_mut().choose(len) % len
    }
}

impl Default for RandomSource {
    fn default() -> Self {
        RandomSource::new(fastrand::Rng::new())
    }
}

impl fmt::Debug for RandomSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RandomSource")
    }
}

// Random source of running scheduler, or a fresh one outside runtime.
fn current_random() -> RandomSource {
    Scheduler::current().map(|scheduler| scheduler.random().clone()).unwrap_or_default()
}

trait Case<R> {
    fn operation(&self) -> Operation;

    fn can_proceed(&self) -> bool;

    /// Performs channel operation and chains callback after it.
    fn perform(self: Box<Self>) -> Suspension<R>;
}

struct GetCase<T: 'static, F> {
    channel: Channel<T>,
    callback: F,
}

impl<T, R, F> Case<R> for GetCase<T, F>
where
    T: 'static,
    R: 'static,
    F: FnOnce(T) -> R + 'static,
{
    fn operation(&self) -> Operation {
        Operation::Get
    }

    fn can_proceed(&self) -> bool {
        self.channel.can_proceed(Operation::Get)
    }

    fn perform(self: Box<Self>) -> Suspension<R> {
        let GetCase { channel, callback } = *self;
        channel.get().map(callback)
    }
}

struct SendCase<T: 'static, F> {
    channel: Channel<T>,
    value: T,
    callback: F,
}

impl<T, R, F> Case<R> for SendCase<T, F>
where
    T: 'static,
    R: 'static,
    F: FnOnce() -> R + 'static,
{
    fn operation(&self) -> Operation {
        Operation::Send
    }

    fn can_proceed(&self) -> bool {
        self.channel.can_proceed(Operation::Send)
    }

    fn perform(self: Box<Self>) -> Suspension<R> {
        let SendCase { channel, value, callback } = *self;
        channel.send(value).map(move |()| callback())
    }
}

enum ClauseKind<R> {
    Case(Box<dyn Case<R>>),
    Default(Box<dyn FnOnce() -> R>),
}

/// Clause of [select], either a channel operation with callback or a default callback.
pub struct Clause<R: 'static> {
    kind: ClauseKind<R>,
}

impl<R: 'static> Clause<R> {
    /// Case to get a value from channel. `callback` receives the value.
    pub fn get<T, F>(channel: &Channel<T>, callback: F) -> Self
    where
        T: 'static,
        F: FnOnce(T) -> R + 'static,
    {
        let case = GetCase { channel: channel.clone(), callback };
        Clause { kind: ClauseKind::Case(Box::new(case)) }
    }

    /// Case to send `value` to channel. `callback` runs after value sent.
    pub fn send<T, F>(channel: &Channel<T>, value: T, callback: F) -> Self
    where
        T: 'static,
        F: FnOnce() -> R + 'static,
    {
        let case = SendCase { channel: channel.clone(), value, callback };
        Clause { kind: ClauseKind::Case(Box::new(case)) }
    }

    /// Default clause runs `callback` if no case is ready.
    pub fn default_case<F>(callback: F) -> Self
    where
        F: FnOnce() -> R + 'static,
    {
        Clause { kind: ClauseKind::Default(Box::new(callback)) }
    }

    /// Case from textual operation kind: `get`/`<-` or `send`/`->`.
    ///
    /// `callback` receives the got value for get case and `None` for send case. `value` is
    /// required for send case and ignored for get case.
    pub fn case<T, F>(kind: &str, channel: &Channel<T>, value: Option<T>, callback: F) -> Result<Self, SelectError>
    where
        T: 'static,
        F: FnOnce(Option<T>) -> R + 'static,
    {
        match Operation::parse(kind)? {
            Operation::Get => Ok(Clause::get(channel, move |value| callback(Some(value)))),
            Operation::Send => {
                let value = value.ok_or(SelectError::MissingValue)?;
                Ok(Clause::send(channel, value, move || callback(None)))
            },
        }
    }

    /// Channel operation of this clause, `None` for default clause.
    pub fn operation(&self) -> Option<Operation> {
        match &self.kind {
            ClauseKind::Case(case) => Some(case.operation()),
            ClauseKind::Default(_) => None,
        }
    }

    pub fn is_default(&self) -> bool {
        matches!(self.kind, ClauseKind::Default(_))
    }
}

impl<R: 'static> fmt::Debug for Clause<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.operation() {
            None => f.write_str("Clause::Default"),
            Some(operation) => write!(f, "Clause::Case({})", operation),
        }
    }
}

type Cases<R> = Vec<Box<dyn Case<R>>>;

type DefaultCallback<R> = Box<dyn FnOnce() -> R>;

fn classify<R: 'static>(
    clauses: impl IntoIterator<Item = Clause<R>>,
) -> Result<(Cases<R>, Option<DefaultCallback<R>>), SelectError> {
    let mut cases = Vec::new();
    let mut default = None;
    for clause in clauses {
        match clause.kind {
            ClauseKind::Case(case) => cases.push(case),
            ClauseKind::Default(_) if default.is_some() => return Err(SelectError::DuplicateDefault),
            ClauseKind::Default(callback) => default = Some(callback),
        }
    }
    Ok((cases, default))
}

// Removes a randomly chosen ready case.
fn choose<R: 'static>(cases: &mut Cases<R>, random: &RandomSource) -> Option<Box<dyn Case<R>>> {
    let ready: Vec<usize> = cases.iter().enumerate().filter(|(_, case)| case.can_proceed()).map(|(i, _)| i).collect();
    if ready.is_empty() {
        return None;
    }
    let index = ready[random.choose(ready.len())];
    Some(cases.swap_remove(index))
}

struct SelectRetry<R: 'static> {
    cases: Cases<R>,
    resumption: Option<Resumption<R>>,
    random: RandomSource,
}

impl<R: 'static> Retry for SelectRetry<R> {
    fn is_ready(&self) -> bool {
        self.resumption.is_some() && self.cases.iter().any(|case| case.can_proceed())
    }

    fn retry(&mut self) -> bool {
        if self.resumption.is_none() {
            return false;
        }
        let Some(case) = choose(&mut self.cases, &self.random) else {
            return false;
        };
        let Some(resumption) = self.resumption.take() else {
            return false;
        };
        let operation = case.perform();
        let immediate = operation.hint().is_immediate();
        operation.then(move |value| {
            resumption.resume(value);
        });
        immediate
    }
}

/// Selects one clause using random source of running runtime.
///
/// See [select_with] for details.
pub fn select<R: 'static>(clauses: impl IntoIterator<Item = Clause<R>>) -> Result<Suspension<R>, SelectError> {
    select_with(&current_random(), clauses)
}

/// Selects one clause to run.
///
/// * If some cases are ready, one of them is chosen by `random` and performed. Returned
///   suspension resolves to its callback result and carries hint of channel operation.
/// * Otherwise, default clause runs immediately if present.
/// * Otherwise, returned suspension blocks till some case becomes ready. Scheduler retries it on
///   every tick.
///
/// # Errors
/// [SelectError::DuplicateDefault] if there are two default clauses.
pub fn select_with<R: 'static>(
    random: &RandomSource,
    clauses: impl IntoIterator<Item = Clause<R>>,
) -> Result<Suspension<R>, SelectError> {
    let (mut cases, default) = classify(clauses)?;
    if let Some(case) = choose(&mut cases, random) {
        return Ok(case.perform());
    }
    if let Some(callback) = default {
        return Ok(Suspension::resolved(callback()));
    }
    let (suspension, resumption) = coroutine::suspension();
    let retry = SelectRetry { cases, resumption: Some(resumption), random: random.clone() };
    Ok(suspension.with_hint(Hint::Blocked(Probe::new(retry))))
}
