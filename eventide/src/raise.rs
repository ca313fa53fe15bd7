//! A composable that fails immediately.

use eventide_core::{Continuation, Eventual, Fault, Interrupt, Value};

/// Fails with `fault` as soon as it is started.
///
/// Anything convertible into a boxed error works, including strings and
/// `thiserror`-derived types; [`Catch`](crate::Catch) recovers the concrete
/// type by downcast.
pub fn raise<In, Out>(fault: impl Into<Fault>) -> Eventual<In, Out>
where
    In: Send + 'static,
    Out: Send + 'static,
{
    let fault = fault.into();
    Eventual::new(move |k| Box::new(Raise { fault: Some(fault), k }))
}

struct Raise {
    fault: Option<Fault>,
    k: Box<dyn Continuation>,
}

impl Continuation for Raise {
    fn start(&mut self, _value: Value) {
        let fault = self.fault.take().expect("raise received a second signal");
        self.k.fail(fault);
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
