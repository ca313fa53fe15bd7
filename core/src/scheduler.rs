//! Scheduler abstraction and per-task execution contexts.
//!
//! A [`Context`] names the execution resource a piece of work belongs to and
//! carries the bookkeeping (`blocked`, `in_use`) that lets schedulers borrow
//! it safely across a submission. A thread-local current context is swapped
//! with a scoped guard so nested submissions always observe the right pair
//! of scheduler and context.

use std::cell::RefCell;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use crate::callback::Callback;
use crate::continuation::{Continuation, Fault, Value};
use crate::eventual::Eventual;
use crate::interrupt::Interrupt;

/// An execution resource that accepts work.
pub trait Scheduler: Send + Sync + 'static {
    /// Enqueues `callback` to run on `context`.
    ///
    /// When `defer` is false and the calling thread is already executing on
    /// `context`, the callback runs inline instead of being enqueued.
    fn submit(&self, callback: Callback, context: &Context, defer: bool);

    /// May the current thread keep executing on `context` directly?
    fn continuable(&self, context: &Context) -> bool;
}

/// A nominal worker index a submission must execute on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Pinned(pub usize);

struct ContextInner {
    name: String,
    blocked: AtomicBool,
    in_use: AtomicUsize,
    requirement: Option<Pinned>,
    scheduler: Arc<dyn Scheduler>,
}

/// Per-running-task execution context, borrowed for the duration of a
/// scheduled submission.
#[derive(Clone)]
pub struct Context {
    inner: Arc<ContextInner>,
}

impl Context {
    /// Creates a context owned by `scheduler`.
    pub fn new(scheduler: Arc<dyn Scheduler>, name: impl Into<String>) -> Self {
        Context {
            inner: Arc::new(ContextInner {
                name: name.into(),
                blocked: AtomicBool::new(false),
                in_use: AtomicUsize::new(0),
                requirement: None,
                scheduler,
            }),
        }
    }

    /// Creates a context that must execute on worker `pinned`.
    pub fn pinned(scheduler: Arc<dyn Scheduler>, name: impl Into<String>, pinned: Pinned) -> Self {
        Context {
            inner: Arc::new(ContextInner {
                name: name.into(),
                blocked: AtomicBool::new(false),
                in_use: AtomicUsize::new(0),
                requirement: Some(pinned),
                scheduler,
            }),
        }
    }

    /// The context's human-readable name.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// The worker this context is pinned to, if any.
    pub fn requirement(&self) -> Option<Pinned> {
        self.inner.requirement
    }

    /// The scheduler that owns this context.
    pub fn scheduler(&self) -> Arc<dyn Scheduler> {
        self.inner.scheduler.clone()
    }

    /// Marks the context as having a submission outstanding.
    pub fn block(&self) {
        self.inner.blocked.store(true, Ordering::SeqCst);
    }

    /// Clears the outstanding-submission mark.
    pub fn unblock(&self) {
        self.inner.blocked.store(false, Ordering::SeqCst);
    }

    /// True while a submission is outstanding.
    pub fn blocked(&self) -> bool {
        self.inner.blocked.load(Ordering::SeqCst)
    }

    /// Takes a re-entrancy borrow for the duration of a callback.
    pub fn acquire(&self) {
        self.inner.in_use.fetch_add(1, Ordering::SeqCst);
    }

    /// Releases a re-entrancy borrow.
    pub fn release(&self) {
        let previous = self.inner.in_use.fetch_sub(1, Ordering::SeqCst);
        assert!(previous > 0, "context released without a matching acquire");
    }

    /// How many callbacks are currently executing on this context.
    pub fn in_use(&self) -> usize {
        self.inner.in_use.load(Ordering::SeqCst)
    }

    /// The context the current thread is executing on; falls back to the
    /// process-wide inline context when none has been entered.
    pub fn current() -> Context {
        CURRENT
            .with(|current| current.borrow().clone())
            .unwrap_or_else(|| inline_context().clone())
    }

    /// Makes this the current context until the guard drops, restoring the
    /// previous one on exit.
    pub fn enter(&self) -> ContextGuard {
        let previous = CURRENT.with(|current| current.borrow_mut().replace(self.clone()));
        ContextGuard { previous }
    }
}

thread_local! {
    static CURRENT: RefCell<Option<Context>> = const { RefCell::new(None) };
}

/// Restores the previously current context when dropped.
pub struct ContextGuard {
    previous: Option<Context>,
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        let previous = self.previous.take();
        CURRENT.with(|current| *current.borrow_mut() = previous);
    }
}

/// Runs every submission immediately on the calling thread.
pub struct InlineScheduler;

impl Scheduler for InlineScheduler {
    fn submit(&self, callback: Callback, context: &Context, _defer: bool) {
        let _guard = context.enter();
        callback.invoke();
    }

    fn continuable(&self, _context: &Context) -> bool {
        true
    }
}

fn inline_context() -> &'static Context {
    static INLINE: OnceLock<Context> = OnceLock::new();
    INLINE.get_or_init(|| Context::new(Arc::new(InlineScheduler), "inline"))
}

/// A composable that re-enters `context` before forwarding each signal
/// downstream.
pub fn reschedule<V: Send + 'static>(context: Context) -> Eventual<V, V> {
    Eventual::new(move |k| Box::new(Reschedule { context, k: Some(k) }))
}

struct Reschedule {
    context: Context,
    k: Option<Box<dyn Continuation>>,
}

impl Reschedule {
    fn resubmit(&mut self, deliver: impl FnOnce(&mut Box<dyn Continuation>) + Send + 'static) {
        let mut k = self.k.take().expect("reschedule received a second signal");
        let context = self.context.clone();
        let scheduler = context.scheduler();
        if scheduler.continuable(&context) {
            let _guard = context.enter();
            deliver(&mut k);
        } else {
            scheduler.submit(
                Callback::new(move || deliver(&mut k)),
                &context,
                /* defer */ false,
            );
        }
    }
}

impl Continuation for Reschedule {
    fn start(&mut self, value: Value) {
        self.resubmit(move |k| k.start(value));
    }

    fn fail(&mut self, fault: Fault) {
        self.resubmit(move |k| k.fail(fault));
    }

    fn stop(&mut self) {
        self.resubmit(|k| k.stop());
    }

    fn register(&mut self, interrupt: &Interrupt) {
        if let Some(k) = self.k.as_mut() {
            k.register(interrupt);
        }
    }
}

/// Captures the scheduler context current when started and re-enters it
/// after `e` settles, so downstream continues where the caller was running.
pub fn reschedule_after<In, Out>(e: Eventual<In, Out>) -> Eventual<In, Out>
where
    In: Send + 'static,
    Out: Send + 'static,
{
    Eventual::new(move |k| {
        Box::new(RescheduleAfter { e: Some(e), k: Some(k), interrupt: None })
    })
}

struct RescheduleAfter<In, Out> {
    e: Option<Eventual<In, Out>>,
    k: Option<Box<dyn Continuation>>,
    interrupt: Option<Interrupt>,
}

impl<In, Out> RescheduleAfter<In, Out>
where
    In: Send + 'static,
    Out: Send + 'static,
{
    fn splice(&mut self) -> Box<dyn Continuation> {
        let e = self.e.take().expect("reschedule_after received a second signal");
        let k = self.k.take().expect("reschedule_after received a second signal");
        let context = Context::current();
        let mut chain = e.bind(Box::new(Reschedule { context, k: Some(k) }));
        if let Some(interrupt) = &self.interrupt {
            chain.register(interrupt);
        }
        chain
    }
}

impl<In, Out> Continuation for RescheduleAfter<In, Out>
where
    In: Send + 'static,
    Out: Send + 'static,
{
    fn start(&mut self, value: Value) {
        self.splice().start(value);
    }

    fn fail(&mut self, fault: Fault) {
        self.splice().fail(fault);
    }

    fn stop(&mut self) {
        self.splice().stop();
    }

    fn register(&mut self, interrupt: &Interrupt) {
        self.interrupt = Some(interrupt.clone());
    }
}
