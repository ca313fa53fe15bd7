//! A static thread pool: a fixed worker set with per-worker FIFO queues.

use std::cell::Cell;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, OnceLock};
use std::thread::{self, JoinHandle};

use tracing::trace;

use crate::callback::Callback;
use crate::eventual::{Eventual, IntoEventual};
use crate::scheduler::{reschedule, Context, Pinned, Scheduler};

static POOL_ID: AtomicUsize = AtomicUsize::new(0);

thread_local! {
    static WORKER: Cell<Option<(usize, usize)>> = const { Cell::new(None) };
}

struct Job {
    callback: Callback,
    context: Context,
}

/// A fixed set of workers, each pinned to a nominal CPU index and draining
/// its own FIFO queue. Submissions route by the context's [`Pinned`]
/// requirement.
pub struct StaticThreadPool {
    id: usize,
    senders: Vec<Sender<Job>>,
    threads: Mutex<Vec<JoinHandle<()>>>,
}

impl StaticThreadPool {
    /// Spawns a pool of `workers` threads (at least one).
    pub fn new(workers: usize) -> Arc<Self> {
        let workers = workers.max(1);
        let id = POOL_ID.fetch_add(1, Ordering::Relaxed);
        let mut senders = Vec::with_capacity(workers);
        let mut threads = Vec::with_capacity(workers);
        for index in 0..workers {
            let (sender, receiver) = mpsc::channel::<Job>();
            senders.push(sender);
            threads.push(
                thread::Builder::new()
                    .name(format!("eventide-worker-{index}"))
                    .spawn(move || Self::work(id, index, receiver))
                    .expect("failed to spawn pool worker"),
            );
        }
        Arc::new(StaticThreadPool { id, senders, threads: Mutex::new(threads) })
    }

    /// The process-wide pool, sized by available parallelism. Never torn
    /// down; used by `parallel`.
    pub fn shared() -> &'static Arc<StaticThreadPool> {
        static SHARED: OnceLock<Arc<StaticThreadPool>> = OnceLock::new();
        SHARED.get_or_init(|| {
            StaticThreadPool::new(thread::available_parallelism().map_or(1, |n| n.get()))
        })
    }

    /// Number of workers.
    pub fn workers(&self) -> usize {
        self.senders.len()
    }

    /// Creates a context pinned to worker `pinned`.
    pub fn context(self: &Arc<Self>, name: impl Into<String>, pinned: Pinned) -> Context {
        assert!(pinned.0 < self.senders.len(), "pinned worker {} out of range", pinned.0);
        Context::pinned(self.clone(), name, pinned)
    }

    /// Creates a schedulable member bound to worker `pinned`; its
    /// [`Member::schedule`] hops onto that worker before running a
    /// composable.
    pub fn member(self: &Arc<Self>, name: impl Into<String>, pinned: Pinned) -> Member {
        Member { context: self.context(name, pinned) }
    }

    fn work(pool: usize, index: usize, receiver: Receiver<Job>) {
        WORKER.with(|worker| worker.set(Some((pool, index))));
        trace!(worker = index, "pool worker running");
        while let Ok(job) = receiver.recv() {
            job.context.unblock();
            job.context.acquire();
            let guard = job.context.enter();
            job.callback.invoke();
            drop(guard);
            job.context.release();
        }
        trace!(worker = index, "pool worker done");
    }

    fn on_worker(&self, pinned: Pinned) -> bool {
        WORKER.with(|worker| worker.get()) == Some((self.id, pinned.0))
    }
}

impl Scheduler for StaticThreadPool {
    fn submit(&self, callback: Callback, context: &Context, defer: bool) {
        let pinned = context
            .requirement()
            .expect("thread pool submissions require a pinned context");
        if !defer && self.on_worker(pinned) {
            let _guard = context.enter();
            callback.invoke();
            return;
        }
        context.block();
        self.senders[pinned.0]
            .send(Job { callback, context: context.clone() })
            .expect("pool worker has shut down");
    }

    fn continuable(&self, context: &Context) -> bool {
        context.requirement().is_some_and(|pinned| self.on_worker(pinned))
    }
}

impl Drop for StaticThreadPool {
    fn drop(&mut self) {
        self.senders.clear();
        for thread in self.threads.lock().unwrap().drain(..) {
            thread.join().expect("pool worker panicked");
        }
    }
}

/// A handle carrying a pinned context; work scheduled through it always
/// executes on that worker.
pub struct Member {
    context: Context,
}

impl Member {
    /// The member's pinned context.
    pub fn context(&self) -> &Context {
        &self.context
    }

    /// Composes `e` behind a hop onto this member's worker.
    pub fn schedule<In, R>(&self, e: R) -> Eventual<In, R::Out>
    where
        In: Send + 'static,
        R: IntoEventual<In>,
    {
        reschedule::<In>(self.context.clone()).pipe(e)
    }
}
