//! The multi-shot half of the algebra: stream sources, transformers, and the
//! loop terminators that consume a stream back down to a single value.
//!
//! Operators follow the extension-trait convention: each module defines one
//! trait implemented for [`EventualStream`](eventide_core::EventualStream).

mod concurrent;
mod flat_map;
mod iterate;
mod map;
mod parallel;
mod sink;
mod until;

pub use concurrent::Concurrent;
pub use flat_map::FlatMap;
pub use iterate::{iterate, repeat};
pub use map::Map;
pub use parallel::Parallel;
pub use sink::{Collect, Drain, ForEach, Reduce};
pub use until::Until;
