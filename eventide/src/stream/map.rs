//! Per-element stream transformation.

use std::marker::PhantomData;

use eventide_core::{
    expect, Continuation, EventualStream, Fault, Interrupt, StreamControl, Value,
};

/// Extension trait: transform each stream element.
pub trait Map<In, Out> {
    /// Replaces each element with `f(element)`; end-of-stream, faults, and
    /// stops pass through.
    fn map<Mapped, F>(self, f: F) -> EventualStream<In, Mapped>
    where
        Mapped: Send + 'static,
        F: FnMut(Out) -> Mapped + Send + 'static;
}

impl<In, Out> Map<In, Out> for EventualStream<In, Out>
where
    In: Send + 'static,
    Out: Send + 'static,
{
    fn map<Mapped, F>(self, f: F) -> EventualStream<In, Mapped>
    where
        Mapped: Send + 'static,
        F: FnMut(Out) -> Mapped + Send + 'static,
    {
        EventualStream::new(move |k| self.bind(Box::new(MapNode { f, k, marker: PhantomData })))
    }
}

struct MapNode<Out, Mapped, F> {
    f: F,
    k: Box<dyn Continuation>,
    marker: PhantomData<fn(Out) -> Mapped>,
}

impl<Out, Mapped, F> Continuation for MapNode<Out, Mapped, F>
where
    Out: Send + 'static,
    Mapped: Send + 'static,
    F: FnMut(Out) -> Mapped + Send + 'static,
{
    fn start(&mut self, _value: Value) {
        panic!("stream transformer started without an upstream stream");
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

    fn begin(&mut self, stream: StreamControl) {
        self.k.begin(stream);
    }

    fn body(&mut self, value: Value) {
        let mapped = (self.f)(expect::<Out>(value));
        self.k.body(Box::new(mapped));
    }

    fn ended(&mut self) {
        self.k.ended();
    }
}
