//! Stream flat-mapping: replace each element with a sub-stream.

use std::marker::PhantomData;
use std::sync::{Arc, Mutex};

use eventide_core::{
    expect, unit, Continuation, EventualStream, Fault, Interrupt, Source, StreamControl, Value,
};

/// Extension trait: per-element sub-streams.
pub trait FlatMap<In, Out> {
    /// Builds `f(element)` for each upstream element and relays that
    /// sub-stream's elements downstream; when a sub-stream ends, the outer
    /// stream advances. Output order is the concatenation of the
    /// sub-streams in upstream order.
    fn flat_map<Mapped, F>(self, f: F) -> EventualStream<In, Mapped>
    where
        Mapped: Send + 'static,
        F: FnMut(Out) -> EventualStream<(), Mapped> + Send + 'static;
}

impl<In, Out> FlatMap<In, Out> for EventualStream<In, Out>
where
    In: Send + 'static,
    Out: Send + 'static,
{
    fn flat_map<Mapped, F>(self, f: F) -> EventualStream<In, Mapped>
    where
        Mapped: Send + 'static,
        F: FnMut(Out) -> EventualStream<(), Mapped> + Send + 'static,
    {
        EventualStream::new(move |k| {
            let shared = Arc::new(Shared {
                core: Mutex::new(Core {
                    k: Some(k),
                    f,
                    outer: None,
                    inner: None,
                    interrupt: None,
                    closing: false,
                    finished: false,
                    marker: PhantomData,
                }),
            });
            self.bind(Box::new(FlatMapNode { shared }))
        })
    }
}

struct Core<Out, Mapped, F> {
    k: Option<Box<dyn Continuation>>,
    f: F,
    outer: Option<StreamControl>,
    inner: Option<StreamControl>,
    interrupt: Option<Interrupt>,
    // Downstream asked the whole stream to end; stop advancing the outer
    // stream when the live sub-stream ends.
    closing: bool,
    finished: bool,
    marker: PhantomData<fn(Out) -> Mapped>,
}

struct Shared<Out, Mapped, F> {
    core: Mutex<Core<Out, Mapped, F>>,
}

impl<Out, Mapped, F> Shared<Out, Mapped, F>
where
    Out: Send + 'static,
    Mapped: Send + 'static,
    F: FnMut(Out) -> EventualStream<(), Mapped> + Send + 'static,
{
    // Forwards one signal to the downstream continuation with the core
    // unlocked, so the downstream may immediately issue another request.
    fn deliver(&self, deliver: impl FnOnce(&mut Box<dyn Continuation>)) {
        let k = self.core.lock().unwrap().k.take();
        let Some(mut k) = k else { return };
        deliver(&mut k);
        self.core.lock().unwrap().k = Some(k);
    }

    fn finish(&self, deliver: impl FnOnce(&mut Box<dyn Continuation>)) {
        let k = {
            let mut core = self.core.lock().unwrap();
            if core.finished {
                return;
            }
            core.finished = true;
            core.k.take()
        };
        if let Some(mut k) = k {
            deliver(&mut k);
        }
    }
}

struct FlatMapNode<Out, Mapped, F> {
    shared: Arc<Shared<Out, Mapped, F>>,
}

impl<Out, Mapped, F> Continuation for FlatMapNode<Out, Mapped, F>
where
    Out: Send + 'static,
    Mapped: Send + 'static,
    F: FnMut(Out) -> EventualStream<(), Mapped> + Send + 'static,
{
    fn start(&mut self, _value: Value) {
        panic!("stream transformer started without an upstream stream");
    }

    fn fail(&mut self, fault: Fault) {
        self.shared.finish(move |k| k.fail(fault));
    }

    fn stop(&mut self) {
        self.shared.finish(|k| k.stop());
    }

    fn register(&mut self, interrupt: &Interrupt) {
        let mut core = self.shared.core.lock().unwrap();
        core.interrupt = Some(interrupt.clone());
        if let Some(k) = core.k.as_mut() {
            k.register(interrupt);
        }
    }

    fn begin(&mut self, stream: StreamControl) {
        self.shared.core.lock().unwrap().outer = Some(stream);
        let control = StreamControl::new(Arc::new(Control { shared: self.shared.clone() }));
        self.shared.deliver(move |k| k.begin(control));
    }

    fn body(&mut self, value: Value) {
        let (sub, interrupt) = {
            let mut core = self.shared.core.lock().unwrap();
            ((core.f)(expect::<Out>(value)), core.interrupt.clone())
        };
        let mut chain = sub.bind(Box::new(Relay { shared: self.shared.clone() }));
        if let Some(interrupt) = &interrupt {
            chain.register(interrupt);
        }
        chain.start(unit());
    }

    fn ended(&mut self) {
        self.shared.finish(|k| k.ended());
    }
}

// The downstream's request handle: requests route to the live sub-stream
// when there is one, otherwise to the outer stream.
struct Control<Out, Mapped, F> {
    shared: Arc<Shared<Out, Mapped, F>>,
}

impl<Out, Mapped, F> Source for Control<Out, Mapped, F>
where
    Out: Send + 'static,
    Mapped: Send + 'static,
    F: FnMut(Out) -> EventualStream<(), Mapped> + Send + 'static,
{
    fn next(&self) {
        let target = {
            let core = self.shared.core.lock().unwrap();
            if core.finished {
                None
            } else {
                core.inner.clone().or_else(|| core.outer.clone())
            }
        };
        if let Some(target) = target {
            target.next();
        }
    }

    fn done(&self) {
        let (inner, outer) = {
            let mut core = self.shared.core.lock().unwrap();
            core.closing = true;
            (core.inner.take(), core.outer.clone())
        };
        if let Some(inner) = inner {
            inner.done();
        }
        if let Some(outer) = outer {
            outer.done();
        }
    }
}

// The sub-stream's downstream: relays bodies and advances the outer stream
// when the sub-stream ends.
struct Relay<Out, Mapped, F> {
    shared: Arc<Shared<Out, Mapped, F>>,
}

impl<Out, Mapped, F> Continuation for Relay<Out, Mapped, F>
where
    Out: Send + 'static,
    Mapped: Send + 'static,
    F: FnMut(Out) -> EventualStream<(), Mapped> + Send + 'static,
{
    fn start(&mut self, _value: Value) {
        panic!("stream transformer started without an upstream stream");
    }

    fn fail(&mut self, fault: Fault) {
        self.shared.finish(move |k| k.fail(fault));
    }

    fn stop(&mut self) {
        self.shared.finish(|k| k.stop());
    }

    fn register(&mut self, _interrupt: &Interrupt) {}

    fn begin(&mut self, stream: StreamControl) {
        self.shared.core.lock().unwrap().inner = Some(stream.clone());
        stream.next();
    }

    fn body(&mut self, value: Value) {
        self.shared.deliver(move |k| k.body(value));
    }

    fn ended(&mut self) {
        let outer = {
            let mut core = self.shared.core.lock().unwrap();
            core.inner = None;
            if core.closing {
                None
            } else {
                core.outer.clone()
            }
        };
        if let Some(outer) = outer {
            outer.next();
        }
    }
}
