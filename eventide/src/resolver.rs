//! Hand-rolled leaves: computations whose completion is delivered through a
//! one-shot resolver.
//!
//! This is the escape hatch every event-loop leaf is built on: the start
//! closure stashes the [`Resolver`] wherever the eventual completion will
//! come from (a timer callback, a socket readiness event, another thread)
//! and returns immediately.

use std::marker::PhantomData;
use std::sync::{Arc, Mutex};

use eventide_core::{Continuation, Eventual, Fault, Interrupt, Value};

/// Delivers the terminal signal of a hand-rolled leaf.
///
/// Cloneable so that completion and cancellation paths can race: whichever
/// clone resolves first wins, and every later delivery is a no-op.
pub struct Resolver<V> {
    slot: Arc<Mutex<Option<Box<dyn Continuation>>>>,
    marker: PhantomData<fn(V)>,
}

impl<V> Clone for Resolver<V> {
    fn clone(&self) -> Self {
        Resolver { slot: self.slot.clone(), marker: PhantomData }
    }
}

impl<V: Send + 'static> Resolver<V> {
    /// Succeeds the leaf with `value`.
    pub fn resolve(&self, value: V) {
        if let Some(mut k) = self.take() {
            k.start(Box::new(value));
        }
    }

    /// Fails the leaf.
    pub fn fail(&self, fault: impl Into<Fault>) {
        if let Some(mut k) = self.take() {
            k.fail(fault.into());
        }
    }

    /// Stops the leaf, propagating cooperative cancellation.
    pub fn stop(&self) {
        if let Some(mut k) = self.take() {
            k.stop();
        }
    }

    fn take(&self) -> Option<Box<dyn Continuation>> {
        self.slot.lock().unwrap().take()
    }
}

/// Creates a leaf whose start logic is supplied as a closure receiving a
/// [`Resolver`] for the eventual outcome.
pub fn eventual<V, F>(start: F) -> Eventual<(), V>
where
    V: Send + 'static,
    F: FnOnce(Resolver<V>) + Send + 'static,
{
    eventual_interruptible(move |resolver, _interrupt| start(resolver))
}

/// Like [`eventual`], but the closure also receives the graph's
/// [`Interrupt`] so it can install a cancellation handler.
///
/// When no interrupt was registered on the graph the closure receives a
/// fresh one that never triggers.
pub fn eventual_interruptible<V, F>(start: F) -> Eventual<(), V>
where
    V: Send + 'static,
    F: FnOnce(Resolver<V>, Interrupt) + Send + 'static,
{
    Eventual::new(move |k| {
        Box::new(Leaf { start: Some(start), k: Some(k), interrupt: None, marker: PhantomData })
    })
}

struct Leaf<F, V> {
    start: Option<F>,
    k: Option<Box<dyn Continuation>>,
    interrupt: Option<Interrupt>,
    marker: PhantomData<fn(V)>,
}

impl<V, F> Continuation for Leaf<F, V>
where
    V: Send + 'static,
    F: FnOnce(Resolver<V>, Interrupt) + Send + 'static,
{
    fn start(&mut self, _value: Value) {
        let start = self.start.take().expect("leaf received a second signal");
        let k = self.k.take().expect("leaf received a second signal");
        let resolver =
            Resolver { slot: Arc::new(Mutex::new(Some(k))), marker: PhantomData };
        let interrupt = self.interrupt.clone().unwrap_or_default();
        start(resolver, interrupt);
    }

    fn fail(&mut self, fault: Fault) {
        let mut k = self.k.take().expect("leaf received a second signal");
        k.fail(fault);
    }

    fn stop(&mut self) {
        let mut k = self.k.take().expect("leaf received a second signal");
        k.stop();
    }

    fn register(&mut self, interrupt: &Interrupt) {
        self.interrupt = Some(interrupt.clone());
        if let Some(k) = self.k.as_mut() {
            k.register(interrupt);
        }
    }
}
