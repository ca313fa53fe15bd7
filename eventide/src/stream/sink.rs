//! Loop terminators: consume a stream down to a single value.

use std::marker::PhantomData;

use eventide_core::{
    expect, unit, Continuation, Eventual, EventualStream, Fault, Interrupt, StreamControl, Value,
};

use super::Map;

/// Extension trait: run a stream to completion, discarding its elements.
pub trait Drain<In> {
    /// Requests every element in order, discards them, and completes with
    /// `()` on end-of-stream.
    fn drain(self) -> Eventual<In, ()>;
}

/// Extension trait: run `f` over every element, then complete.
pub trait ForEach<In, Out> {
    /// `map(f)` followed by [`drain`](Drain::drain).
    fn for_each<F>(self, f: F) -> Eventual<In, ()>
    where
        F: FnMut(Out) + Send + 'static;
}

/// Extension trait: accumulate a stream into a collection.
pub trait Collect<In, Out> {
    /// Extends a `C::default()` with every element in encounter order and
    /// yields it on end-of-stream.
    ///
    /// ```
    /// use eventide::{iterate, terminate, Collect};
    ///
    /// let (future, chain) = terminate(iterate(vec![5, 12]).collect::<Vec<i32>>());
    /// chain.start();
    /// assert_eq!(future.get().unwrap(), vec![5, 12]);
    /// ```
    fn collect<C>(self) -> Eventual<In, C>
    where
        C: Default + Extend<Out> + Send + 'static;
}

/// Extension trait: fold a stream with early exit.
pub trait Reduce<In, Out> {
    /// Applies `reducer(&mut acc, element)` per element; returning false
    /// ends the stream early. Yields the accumulator.
    fn reduce<Acc, F>(self, seed: Acc, reducer: F) -> Eventual<In, Acc>
    where
        Acc: Send + 'static,
        F: FnMut(&mut Acc, Out) -> bool + Send + 'static;
}

impl<In: Send + 'static> Drain<In> for EventualStream<In, ()> {
    fn drain(self) -> Eventual<In, ()> {
        Eventual::new(move |k| self.bind(Box::new(DrainNode { k, upstream: None })))
    }
}

impl<In, Out> ForEach<In, Out> for EventualStream<In, Out>
where
    In: Send + 'static,
    Out: Send + 'static,
{
    fn for_each<F>(self, mut f: F) -> Eventual<In, ()>
    where
        F: FnMut(Out) + Send + 'static,
    {
        self.map(move |element| f(element)).drain()
    }
}

impl<In, Out> Collect<In, Out> for EventualStream<In, Out>
where
    In: Send + 'static,
    Out: Send + 'static,
{
    fn collect<C>(self) -> Eventual<In, C>
    where
        C: Default + Extend<Out> + Send + 'static,
    {
        Eventual::new(move |k| {
            self.bind(Box::new(CollectNode {
                items: C::default(),
                k,
                upstream: None,
                marker: PhantomData,
            }))
        })
    }
}

impl<In, Out> Reduce<In, Out> for EventualStream<In, Out>
where
    In: Send + 'static,
    Out: Send + 'static,
{
    fn reduce<Acc, F>(self, seed: Acc, reducer: F) -> Eventual<In, Acc>
    where
        Acc: Send + 'static,
        F: FnMut(&mut Acc, Out) -> bool + Send + 'static,
    {
        Eventual::new(move |k| {
            self.bind(Box::new(ReduceNode {
                acc: Some(seed),
                reducer,
                k,
                upstream: None,
                marker: PhantomData,
            }))
        })
    }
}

struct DrainNode {
    k: Box<dyn Continuation>,
    upstream: Option<StreamControl>,
}

impl Continuation for DrainNode {
    fn start(&mut self, _value: Value) {
        panic!("loop terminator started without an upstream stream");
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
        stream.next();
    }

    fn body(&mut self, _value: Value) {
        self.upstream
            .as_ref()
            .expect("stream delivered a body before begin")
            .next();
    }

    fn ended(&mut self) {
        self.k.start(unit());
    }
}

struct CollectNode<C, Out> {
    items: C,
    k: Box<dyn Continuation>,
    upstream: Option<StreamControl>,
    marker: PhantomData<fn(Out)>,
}

impl<C, Out> Continuation for CollectNode<C, Out>
where
    C: Default + Extend<Out> + Send + 'static,
    Out: Send + 'static,
{
    fn start(&mut self, _value: Value) {
        panic!("loop terminator started without an upstream stream");
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
        stream.next();
    }

    fn body(&mut self, value: Value) {
        self.items.extend(std::iter::once(expect::<Out>(value)));
        self.upstream
            .as_ref()
            .expect("stream delivered a body before begin")
            .next();
    }

    fn ended(&mut self) {
        let items = std::mem::take(&mut self.items);
        self.k.start(Box::new(items));
    }
}

struct ReduceNode<Acc, Out, F> {
    acc: Option<Acc>,
    reducer: F,
    k: Box<dyn Continuation>,
    upstream: Option<StreamControl>,
    marker: PhantomData<fn(Out)>,
}

impl<Acc, Out, F> Continuation for ReduceNode<Acc, Out, F>
where
    Acc: Send + 'static,
    Out: Send + 'static,
    F: FnMut(&mut Acc, Out) -> bool + Send + 'static,
{
    fn start(&mut self, _value: Value) {
        panic!("loop terminator started without an upstream stream");
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
        stream.next();
    }

    fn body(&mut self, value: Value) {
        let acc = self.acc.as_mut().expect("reduce received a body after its result");
        let proceed = (self.reducer)(acc, expect::<Out>(value));
        let upstream = self
            .upstream
            .as_ref()
            .expect("stream delivered a body before begin");
        if proceed {
            upstream.next();
        } else {
            upstream.done();
        }
    }

    fn ended(&mut self) {
        let acc = self.acc.take().expect("reduce received a second end-of-stream");
        self.k.start(Box::new(acc));
    }
}
