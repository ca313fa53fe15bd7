//! Bounding a stream with a predicate.

use std::marker::PhantomData;

use eventide_core::{
    expect, Continuation, EventualStream, Fault, Interrupt, StreamControl, Value,
};

/// Extension trait: end a stream when a predicate holds.
pub trait Until<In, Out> {
    /// Ends the stream (without emitting the triggering element) as soon as
    /// `predicate` returns true.
    fn until<F>(self, predicate: F) -> EventualStream<In, Out>
    where
        F: FnMut(&Out) -> bool + Send + 'static;
}

impl<In, Out> Until<In, Out> for EventualStream<In, Out>
where
    In: Send + 'static,
    Out: Send + 'static,
{
    fn until<F>(self, predicate: F) -> EventualStream<In, Out>
    where
        F: FnMut(&Out) -> bool + Send + 'static,
    {
        EventualStream::new(move |k| {
            self.bind(Box::new(UntilNode { predicate, k, upstream: None, marker: PhantomData }))
        })
    }
}

struct UntilNode<Out, F> {
    predicate: F,
    k: Box<dyn Continuation>,
    upstream: Option<StreamControl>,
    marker: PhantomData<fn(Out)>,
}

impl<Out, F> Continuation for UntilNode<Out, F>
where
    Out: Send + 'static,
    F: FnMut(&Out) -> bool + Send + 'static,
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
        self.upstream = Some(stream.clone());
        self.k.begin(stream);
    }

    fn body(&mut self, value: Value) {
        let value = expect::<Out>(value);
        if (self.predicate)(&value) {
            self.upstream
                .as_ref()
                .expect("stream delivered a body before begin")
                .done();
        } else {
            self.k.body(Box::new(value));
        }
    }

    fn ended(&mut self) {
        self.k.ended();
    }
}
