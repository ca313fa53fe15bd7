//! Terminal sinks: converting a composed graph into a waitable future.

use std::sync::{Arc, Condvar, Mutex};

use thiserror::Error;

use crate::continuation::{expect, unit, Continuation, Fault, Value};
use crate::eventual::IntoEventual;
use crate::interrupt::Interrupt;

/// Why a computation terminated without producing a value.
#[derive(Debug, Error)]
pub enum Aborted {
    /// A fault reached the terminal.
    #[error("computation failed: {0}")]
    Failed(Fault),
    /// Cooperative cancellation reached the terminal. Distinct from
    /// [`Aborted::Failed`] by design: stopping is not an error.
    #[error("computation stopped")]
    Stopped,
}

impl Aborted {
    /// True when the computation was stopped rather than failed.
    pub fn is_stopped(&self) -> bool {
        matches!(self, Aborted::Stopped)
    }

    /// The fault, when the computation failed.
    pub fn fault(&self) -> Option<&Fault> {
        match self {
            Aborted::Failed(fault) => Some(fault),
            Aborted::Stopped => None,
        }
    }
}

struct Shared<V> {
    slot: Mutex<Option<Result<V, Aborted>>>,
    ready: Condvar,
}

/// Awaits the terminal signal of a composed graph.
pub struct Future<V> {
    shared: Arc<Shared<V>>,
}

impl<V> Future<V> {
    /// Blocks the calling thread until the graph terminates.
    ///
    /// This is the library's only synchronous wait, intended for tests and
    /// top-level drivers.
    pub fn get(self) -> Result<V, Aborted> {
        let mut slot = self.shared.slot.lock().unwrap();
        while slot.is_none() {
            slot = self.shared.ready.wait(slot).unwrap();
        }
        slot.take().unwrap()
    }

    /// True once a terminal signal has been delivered.
    pub fn ready(&self) -> bool {
        self.shared.slot.lock().unwrap().is_some()
    }
}

struct Terminal<V> {
    shared: Arc<Shared<V>>,
}

impl<V> Terminal<V> {
    fn fulfill(&self, outcome: Result<V, Aborted>) {
        let mut slot = self.shared.slot.lock().unwrap();
        assert!(slot.is_none(), "terminal received a second signal");
        *slot = Some(outcome);
        self.shared.ready.notify_all();
    }
}

impl<V: Send + 'static> Continuation for Terminal<V> {
    fn start(&mut self, value: Value) {
        self.fulfill(Ok(expect::<V>(value)));
    }

    fn fail(&mut self, fault: Fault) {
        self.fulfill(Err(Aborted::Failed(fault)));
    }

    fn stop(&mut self) {
        self.fulfill(Err(Aborted::Stopped));
    }

    fn register(&mut self, _interrupt: &Interrupt) {}
}

/// The composed continuation of a terminated graph, ready to run.
pub struct Chain {
    root: Box<dyn Continuation>,
}

impl Chain {
    /// Threads `interrupt` through the whole chain; call before `start`.
    pub fn register(&mut self, interrupt: &Interrupt) {
        self.root.register(interrupt);
    }

    /// Initiates the graph.
    pub fn start(mut self) {
        self.root.start(unit());
    }

    /// Initiates the graph along its failure path.
    pub fn fail(mut self, fault: Fault) {
        self.root.fail(fault);
    }

    /// Initiates the graph along its cancellation path.
    pub fn stop(mut self) {
        self.root.stop();
    }
}

/// Binds `e` to a fresh terminal. Starting the returned [`Chain`] initiates
/// the graph; the [`Future`] resolves with its terminal signal.
pub fn terminate<V, E>(e: E) -> (Future<V>, Chain)
where
    V: Send + 'static,
    E: IntoEventual<(), Out = V>,
{
    let shared = Arc::new(Shared { slot: Mutex::new(None), ready: Condvar::new() });
    let future = Future { shared: shared.clone() };
    let root = e.into_eventual().bind(Box::new(Terminal { shared }));
    (future, Chain { root })
}
