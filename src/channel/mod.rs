//! Channel for communication across tasks.
//!
//! A channel is a FIFO handoff of values. Unbuffered channel pairs each send with a get, buffered
//! channel lets up to `capacity` values wait unattended. Both [Channel::get] and [Channel::send]
//! return [Suspension]s for tasks to await.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;
use std::str::FromStr;

use derive_where::derive_where;
use ignore_result::Ignore;
use static_assertions::assert_not_impl_any;

use crate::coroutine::{self, Resumption, Suspension};
use crate::error::SelectError;

/// Channel operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
pub enum Operation {
    /// Retrieves a value.
    #[strum(to_string = "get", serialize = "<-")]
    Get,
    /// Sends a value.
    #[strum(to_string = "send", serialize = "->")]
    Send,
}

impl Operation {
    /// Parses textual operation kind, either `get`/`<-` or `send`/`->`.
    pub fn parse(kind: &str) -> Result<Operation, SelectError> {
        Operation::from_str(kind).map_err(|_| SelectError::UnknownOperation(kind.to_string()))
    }
}

// Value sent but not yet retrieved. `sender` exists only if sending task is blocked.
struct Pending<T> {
    value: T,
    sender: Option<Resumption<()>>,
}

struct State<T: 'static> {
    capacity: usize,
    sends: VecDeque<Pending<T>>,
    receives: VecDeque<Resumption<T>>,
}

impl<T> State<T> {
    // Getters whose tasks have gone could not take values anymore.
    fn prune_receivers(&mut self) {
        self.receives.retain(|receiver| !receiver.is_abandoned());
    }

    fn can_proceed(&mut self, operation: Operation) -> bool {
        match operation {
            Operation::Get => !self.sends.is_empty(),
            Operation::Send => {
                self.prune_receivers();
                !self.receives.is_empty() || self.sends.len() < self.capacity
            },
        }
    }
}

/// FIFO channel with optional buffering. Cloned channels share same queues.
#[derive_where(Clone)]
pub struct Channel<T: 'static> {
    state: Rc<RefCell<State<T>>>,
}

assert_not_impl_any!(Channel<()>: Send, Sync);

impl<T: 'static> Channel<T> {
    /// Constructs a channel with given buffer capacity. Zero capacity means unbuffered.
    pub fn new(capacity: usize) -> Self {
        let state = State { capacity, sends: VecDeque::new(), receives: VecDeque::new() };
        Channel { state: Rc::new(RefCell::new(state)) }
    }

    pub fn capacity(&self) -> usize {
        self.state.borrow().capacity
    }

    /// Number of sent but not yet retrieved values, including ones of blocked senders.
    pub fn len(&self) -> usize {
        self.state.borrow().sends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns true if given operation could complete without blocking.
    pub fn can_proceed(&self, operation: Operation) -> bool {
        self.state.borrow_mut().can_proceed(operation)
    }

    /// Retrieves earliest sent value.
    ///
    /// Returned suspension is resolved if there is a sent value, otherwise it resolves on next
    /// send.
    pub fn get(&self) -> Suspension<T> {
        let mut state = self.state.borrow_mut();
        let pending = state.sends.pop_front();
        let Some(Pending { value, sender }) = pending else {
            let (suspension, resumption) = coroutine::suspension();
            state.receives.push_back(resumption);
            return suspension;
        };
        // Blocked sender shifted into buffer.
        let capacity = state.capacity;
        let shifted =
            if capacity > 0 && state.sends.len() >= capacity { state.sends[capacity - 1].sender.take() } else { None };
        drop(state);
        if let Some(sender) = sender {
            sender.send(()).ignore();
        }
        if let Some(sender) = shifted {
            sender.send(()).ignore();
        }
        Suspension::resolved(value)
    }

    /// Sends a value.
    ///
    /// Returned suspension is resolved if there is a waiting getter or free buffer slot,
    /// otherwise it resolves once this value is retrieved or shifted into buffer.
    pub fn send(&self, value: T) -> Suspension<()> {
        let mut value = value;
        loop {
            let receiver = self.state.borrow_mut().receives.pop_front();
            match receiver {
                None => break,
                Some(receiver) => match receiver.send(value) {
                    Ok(()) => return Suspension::resolved(()),
                    Err(returned) => value = returned,
                },
            }
        }
        let mut state = self.state.borrow_mut();
        if state.sends.len() < state.capacity {
            state.sends.push_back(Pending { value, sender: None });
            return Suspension::resolved(());
        }
        let (suspension, resumption) = coroutine::suspension();
        state.sends.push_back(Pending { value, sender: Some(resumption) });
        suspension
    }
}

impl<T: 'static> Default for Channel<T> {
    fn default() -> Self {
        Channel::new(0)
    }
}

impl<T: 'static> fmt::Debug for Channel<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("Channel")
            .field("capacity", &state.capacity)
            .field("sends", &state.sends.len())
            .field("receives", &state.receives.len())
            .finish()
    }
}
