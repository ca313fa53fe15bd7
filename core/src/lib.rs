//! The composition substrate for eventide.
//!
//! This crate defines the continuation-passing protocol that eventide's
//! combinators speak, the one-shot [`Interrupt`] that carries cancellation
//! orthogonally to values, the [`Scheduler`] abstraction with thread-local
//! execution contexts, a static thread pool, and the terminal layer that
//! converts a composed graph into a blocking-waitable [`Future`].
//!
//! The layering follows the two-layer design: a typed descriptor layer
//! ([`Eventual`] and [`EventualStream`]) that threads value types through
//! composition at compile time, and an erased runtime layer (the
//! [`Continuation`] trait) whose nodes exchange `start`/`fail`/`stop` and the
//! stream signals `begin`/`body`/`ended`.

#![warn(missing_docs)]

pub mod callback;
pub mod continuation;
pub mod eventual;
pub mod interrupt;
pub mod pool;
pub mod scheduler;
pub mod terminal;

pub use callback::Callback;
pub use continuation::{expect, unit, Continuation, Fault, Source, StreamControl, Value};
pub use eventual::{Eventual, EventualStream, IntoEventual};
pub use interrupt::{Installed, Interrupt};
pub use pool::{Member, StaticThreadPool};
pub use scheduler::{
    reschedule, reschedule_after, Context, ContextGuard, InlineScheduler, Pinned, Scheduler,
};
pub use terminal::{terminate, Aborted, Chain, Future};
