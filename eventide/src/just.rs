//! A composable that succeeds immediately with a fixed value.

use eventide_core::{Continuation, Eventual, Fault, Interrupt, Value};

/// Succeeds with `value` as soon as it is started, ignoring its input.
///
/// ```
/// use eventide::{just, terminate};
///
/// let (future, chain) = terminate(just("hello"));
/// chain.start();
/// assert_eq!(future.get().unwrap(), "hello");
/// ```
pub fn just<In, Out>(value: Out) -> Eventual<In, Out>
where
    In: Send + 'static,
    Out: Send + 'static,
{
    Eventual::new(move |k| Box::new(Just { value: Some(value), k }))
}

struct Just<Out> {
    value: Option<Out>,
    k: Box<dyn Continuation>,
}

impl<Out: Send + 'static> Continuation for Just<Out> {
    fn start(&mut self, _value: Value) {
        let value = self.value.take().expect("just received a second signal");
        self.k.start(Box::new(value));
    }

    fn fail(&mut self, fault: Fault) {
        self.k.fail(fault);
    }

    fn stop(&mut self) {
        self.k.stop();
    }

    fn register(&mut self, interrupt: &Interrupt) {
        self.k.register(interrupt);
    }
}
