#![allow(clippy::needless_doctest_main)]

//! # Cooperative tasks communicating through channels
//! `cospawn` provides a single threaded runtime to serve cooperatively scheduled tasks which
//! communicate through [channel::Channel]s and choose among them with [select!].
//!
//! ## Usage
//! Construct an [runtime::Runtime] to [runtime::Runtime::spawn] tasks, then drive them with
//! [runtime::Runtime::run], [runtime::Runtime::run_until_stalled] or [runtime::Runtime::block_on].
//!
//! ### Task
//! * A task is an `async` computation. Every `.await` that suspends is one step of it.
//! * Use [task::spawn] to spawn new task in running task. The spawned task never runs before the
//!   spawning task suspends.
//! * Use [task::yield_now] to let other tasks run.
//! * Use [task::clear] to discard all tasks including the calling one.
//! * Use [runtime::Scheduler::set_error_hook] to observe task failures. Failures are discarded
//!   silently if there is no hook.
//!
//! ### Channel
//! * Use [channel::Channel::new] to construct unbuffered or buffered channel.
//! * Await [channel::Channel::get] and [channel::Channel::send] to communicate.
//!
//! ### Select
//! * Use [select!] or [select::select] to choose one ready channel operation, or default.
//! * Use [runtime::Builder::random] to substitute tie-break among ready operations.
//!
//! ## Example
//! ```rust
//! use cospawn::channel::Channel;
//! use cospawn::{select, task};
//!
//! #[cospawn::main]
//! async fn main() {
//!     let requests = Channel::new(0);
//!     let responses = Channel::new(0);
//!
//!     task::spawn({
//!         let requests = requests.clone();
//!         let responses = responses.clone();
//!         async move {
//!             for _ in 0..4 {
//!                 let value: i32 = requests.get().await;
//!                 responses.send(value - 1).await;
//!             }
//!         }
//!     });
//!
//!     let mut tasks = vec![6, 6, 6, 6];
//!     let mut pending = 0;
//!     let mut sum = 0;
//!     while !tasks.is_empty() || pending != 0 {
//!         let value = tasks.last().copied().unwrap_or_default();
//!         let sent = if tasks.is_empty() {
//!             select! { n = <-responses => Some(n) }
//!         } else {
//!             select! {
//!                 n = <-responses => Some(n),
//!                 _ = requests<-value => None,
//!             }
//!         };
//!         match sent.unwrap().await {
//!             Some(n) => {
//!                 sum += n;
//!                 pending -= 1;
//!             },
//!             None => {
//!                 tasks.pop();
//!                 pending += 1;
//!             },
//!         }
//!     }
//!     println!("sum: {}", sum);
//!     assert_eq!(sum, 20);
//! }
//! ```

pub mod channel;
pub mod coroutine;
mod error;
pub mod runtime;
pub mod select;
mod select_macro;
pub mod task;
pub mod time;

#[cfg(not(test))]
pub use cospawn_macros::main;
pub use cospawn_macros::test;

pub use self::error::{BoxError, JoinError, PanicError, SelectError, TaskError};
