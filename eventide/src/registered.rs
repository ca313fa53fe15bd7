//! A relay marking the boundary of a dynamic splice.
//!
//! Combinators that compose a sub-graph at runtime (`then`, `If`, `Catch`)
//! must thread the interrupt into the freshly built nodes without
//! re-registering their already-registered downstream. Binding the splice to
//! this relay makes `register` stop at the boundary while every other signal
//! passes through.

use eventide_core::{Continuation, Fault, Interrupt, StreamControl, Value};

pub(crate) struct Registered {
    k: Box<dyn Continuation>,
}

impl Registered {
    pub(crate) fn new(k: Box<dyn Continuation>) -> Box<dyn Continuation> {
        Box::new(Registered { k })
    }
}

impl Continuation for Registered {
    fn start(&mut self, value: Value) {
        self.k.start(value);
    }

    fn fail(&mut self, fault: Fault) {
        self.k.fail(fault);
    }

    fn stop(&mut self) {
        self.k.stop();
    }

    fn register(&mut self, _interrupt: &Interrupt) {}

    fn begin(&mut self, stream: StreamControl) {
        self.k.begin(stream);
    }

    fn body(&mut self, value: Value) {
        self.k.body(value);
    }

    fn ended(&mut self) {
        self.k.ended();
    }
}
