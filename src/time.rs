//! Timers of host loop.

use std::time::Duration;

use ignore_result::Ignore;

use crate::coroutine::{self, Suspension};
use crate::runtime::Scheduler;

/// Returns a suspension resolved after given duration elapsed.
///
/// Other tasks keep running while awaiting it.
///
/// # Panics
/// Panic if called outside runtime.
pub fn sleep(duration: Duration) -> Suspension<()> {
    let scheduler = Scheduler::current().expect("no runtime");
    let (suspension, resumption) = coroutine::suspension();
    scheduler.host().defer_after(duration, move || resumption.send(()).ignore());
    suspension
}
