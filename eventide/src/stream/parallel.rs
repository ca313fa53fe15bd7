//! Parallel stream transformation on the shared thread pool.

use eventide_core::{reschedule, EventualStream, IntoEventual, Pinned, StaticThreadPool};

use super::concurrent::concurrency;

/// Extension trait: dispatch each element to a worker eventual running on
/// the shared static thread pool.
pub trait Parallel<In, Out> {
    /// Like [`concurrent`](super::Concurrent::concurrent), but each worker
    /// is rescheduled onto a pool worker, ingress is bounded by the pool's
    /// worker count, and outputs arrive in completion order.
    fn parallel<Mapped, R, F>(self, f: F) -> EventualStream<In, Mapped>
    where
        Mapped: Send + 'static,
        R: IntoEventual<(), Out = Mapped>,
        F: FnMut(Out) -> R + Send + 'static;
}

impl<In, Out> Parallel<In, Out> for EventualStream<In, Out>
where
    In: Send + 'static,
    Out: Send + 'static,
{
    fn parallel<Mapped, R, F>(self, mut f: F) -> EventualStream<In, Mapped>
    where
        Mapped: Send + 'static,
        R: IntoEventual<(), Out = Mapped>,
        F: FnMut(Out) -> R + Send + 'static,
    {
        let pool = StaticThreadPool::shared().clone();
        let workers = pool.workers();
        let mut round = 0usize;
        concurrency(self, false, workers, move |element| {
            let context = pool.context(format!("parallel [{round}]"), Pinned(round % workers));
            round += 1;
            reschedule::<()>(context).pipe(f(element))
        })
    }
}
