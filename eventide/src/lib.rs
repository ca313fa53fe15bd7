//! Eventide is a composable asynchronous computation library: a single
//! algebra for one-shot eventuals and multi-shot streams, with precise rules
//! for success, failure, cancellation, and scheduler affinity.
//!
//! Computations are described as values and composed into a pipeline before
//! anything runs:
//!
//! ```
//! use eventide::{just, then, terminate};
//!
//! let e = just(20).pipe(then(|n: i32| just(n * 2 + 2)));
//! let (future, chain) = terminate(e);
//! chain.start();
//! assert_eq!(future.get().unwrap(), 42);
//! ```
//!
//! The pieces:
//!
//! - **Combinators** (`just`, `raise`, `then`, [`If`], [`Catch`], the stream
//!   operators) build graphs; [`terminate`] binds a graph to a terminal and
//!   [`Future::get`] awaits it.
//! - **Interrupts** flow orthogonally to values: trigger one [`Interrupt`]
//!   and every suspended leaf observes it, answering with `stop`.
//! - **Schedulers** ([`StaticThreadPool`], the [`EventLoop`]) decide where
//!   continuations run; `reschedule`/`reschedule_after` hop between them
//!   explicitly.
//! - **The event loop** integrates timers, socket readiness, and URL
//!   transfers into graphs without blocking any scheduler, and its
//!   [`Clock`](clock::Clock) can be paused and advanced for deterministic
//!   tests.

#![warn(missing_docs)]

pub use eventide_core::*;

mod catch;
mod conditional;
mod just;
mod raise;
mod registered;
mod resolver;
mod task;
mod then;
mod type_check;

pub mod stream;

pub mod clock;
pub mod event_loop;
pub mod http;
pub mod tcp;
pub mod timer;

pub use catch::Catch;
pub use conditional::If;
pub use just::just;
pub use raise::raise;
pub use resolver::{eventual, eventual_interruptible, Resolver};
pub use task::Task;
pub use then::then;
pub use type_check::type_check;

pub use stream::{
    iterate, repeat, Collect, Concurrent, Drain, FlatMap, ForEach, Map, Parallel, Reduce, Until,
};

pub use clock::Clock;
pub use event_loop::{EventLoop, Readiness};
pub use timer::timer;
