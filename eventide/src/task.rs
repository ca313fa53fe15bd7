//! Type-erased tasks.

use eventide_core::{expect, terminate, unit, Aborted, Continuation, Eventual, Fault, Interrupt, IntoEventual, Value};

/// A type-erased owning box for a composable of result type `V`.
///
/// The composable itself is built lazily from the stored callable; the bound
/// continuation lives on the heap and surfaces its terminal signal through
/// the three callbacks plugged in at each use. A task is used once.
pub struct Task<V> {
    factory: Option<Box<dyn FnOnce() -> Eventual<(), V> + Send + 'static>>,
    bound: Option<Box<dyn Continuation>>,
}

impl<V: Send + 'static> Task<V> {
    /// Wraps `f`, deferring graph construction until the task is used.
    pub fn new<R, F>(f: F) -> Self
    where
        R: IntoEventual<(), Out = V>,
        F: FnOnce() -> R + Send + 'static,
    {
        Task { factory: Some(Box::new(move || f().into_eventual())), bound: None }
    }

    /// Starts the task; the terminal signal arrives through exactly one of
    /// the three callbacks.
    pub fn start(
        &mut self,
        interrupt: &Interrupt,
        on_value: impl FnOnce(V) + Send + 'static,
        on_fail: impl FnOnce(Fault) + Send + 'static,
        on_stop: impl FnOnce() + Send + 'static,
    ) {
        let chain = self.bind(interrupt, on_value, on_fail, on_stop);
        chain.start(unit());
    }

    /// Drives the task along its failure path.
    pub fn fail(
        &mut self,
        interrupt: &Interrupt,
        fault: Fault,
        on_value: impl FnOnce(V) + Send + 'static,
        on_fail: impl FnOnce(Fault) + Send + 'static,
        on_stop: impl FnOnce() + Send + 'static,
    ) {
        let chain = self.bind(interrupt, on_value, on_fail, on_stop);
        chain.fail(fault);
    }

    /// Drives the task along its cancellation path.
    pub fn stop(
        &mut self,
        interrupt: &Interrupt,
        on_value: impl FnOnce(V) + Send + 'static,
        on_fail: impl FnOnce(Fault) + Send + 'static,
        on_stop: impl FnOnce() + Send + 'static,
    ) {
        let chain = self.bind(interrupt, on_value, on_fail, on_stop);
        chain.stop();
    }

    /// Terminates the task and blocks the calling thread for its outcome.
    pub fn wait(mut self) -> Result<V, Aborted> {
        let factory = self.factory.take().expect("task used more than once");
        let (future, chain) = terminate(factory());
        chain.start();
        future.get()
    }

    fn bind(
        &mut self,
        interrupt: &Interrupt,
        on_value: impl FnOnce(V) + Send + 'static,
        on_fail: impl FnOnce(Fault) + Send + 'static,
        on_stop: impl FnOnce() + Send + 'static,
    ) -> &mut Box<dyn Continuation> {
        let factory = self.factory.take().expect("task used more than once");
        let adaptor = Adaptor {
            on_value: Some(Box::new(move |value| on_value(expect::<V>(value)))),
            on_fail: Some(Box::new(on_fail)),
            on_stop: Some(Box::new(on_stop)),
        };
        let mut chain = factory().bind(Box::new(adaptor));
        chain.register(interrupt);
        self.bound.insert(chain)
    }
}

impl<V: Send + 'static> IntoEventual<()> for Task<V> {
    type Out = V;

    fn into_eventual(mut self) -> Eventual<(), V> {
        let factory = self.factory.take().expect("task used more than once");
        Eventual::new(move |k| factory().bind(k))
    }
}

struct Adaptor {
    on_value: Option<Box<dyn FnOnce(Value) + Send + 'static>>,
    on_fail: Option<Box<dyn FnOnce(Fault) + Send + 'static>>,
    on_stop: Option<Box<dyn FnOnce() + Send + 'static>>,
}

impl Adaptor {
    fn spend<T>(slot: &mut Option<T>) -> T {
        slot.take().expect("task adaptor received a second signal")
    }
}

impl Continuation for Adaptor {
    fn start(&mut self, value: Value) {
        Self::spend(&mut self.on_value)(value);
    }

    fn fail(&mut self, fault: Fault) {
        Self::spend(&mut self.on_fail)(fault);
    }

    fn stop(&mut self) {
        Self::spend(&mut self.on_stop)();
    }

    fn register(&mut self, _interrupt: &Interrupt) {}
}
