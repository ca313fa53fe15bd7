//! Concurrent stream transformation: one worker eventual per element.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use eventide_core::{
    expect, unit, Continuation, Eventual, EventualStream, Fault, Interrupt, IntoEventual, Source,
    StreamControl, Value,
};

/// Extension trait: dispatch each element to its own worker eventual.
pub trait Concurrent<In, Out> {
    /// Runs `f(element)`'s eventual for every element, emitting worker
    /// outputs downstream *in completion order*.
    ///
    /// A worker failure fails the stream and interrupts the outstanding
    /// workers; an upstream fault or stop does the same and then propagates.
    fn concurrent<Mapped, R, F>(self, f: F) -> EventualStream<In, Mapped>
    where
        Mapped: Send + 'static,
        R: IntoEventual<(), Out = Mapped>,
        F: FnMut(Out) -> R + Send + 'static;

    /// Like [`concurrent`](Concurrent::concurrent), but buffers outputs so
    /// they are emitted in ingress order.
    fn concurrent_ordered<Mapped, R, F>(self, f: F) -> EventualStream<In, Mapped>
    where
        Mapped: Send + 'static,
        R: IntoEventual<(), Out = Mapped>,
        F: FnMut(Out) -> R + Send + 'static;
}

impl<In, Out> Concurrent<In, Out> for EventualStream<In, Out>
where
    In: Send + 'static,
    Out: Send + 'static,
{
    fn concurrent<Mapped, R, F>(self, mut f: F) -> EventualStream<In, Mapped>
    where
        Mapped: Send + 'static,
        R: IntoEventual<(), Out = Mapped>,
        F: FnMut(Out) -> R + Send + 'static,
    {
        concurrency(self, false, usize::MAX, move |element| f(element).into_eventual())
    }

    fn concurrent_ordered<Mapped, R, F>(self, mut f: F) -> EventualStream<In, Mapped>
    where
        Mapped: Send + 'static,
        R: IntoEventual<(), Out = Mapped>,
        F: FnMut(Out) -> R + Send + 'static,
    {
        concurrency(self, true, usize::MAX, move |element| f(element).into_eventual())
    }
}

/// Shared engine behind `concurrent`, `concurrent_ordered`, and `parallel`:
/// pulls ingress eagerly up to `limit` outstanding workers and relays worker
/// terminals back into the stream.
pub(crate) fn concurrency<In, Out, Mapped, F>(
    stream: EventualStream<In, Out>,
    ordered: bool,
    limit: usize,
    mut factory: F,
) -> EventualStream<In, Mapped>
where
    In: Send + 'static,
    Out: Send + 'static,
    Mapped: Send + 'static,
    F: FnMut(Out) -> Eventual<(), Mapped> + Send + 'static,
{
    let spawn: SpawnFn = Box::new(move |value, terminal| {
        factory(expect::<Out>(value)).bind(terminal)
    });
    EventualStream::new(move |k| {
        let shared = Arc::new(Shared {
            core: Mutex::new(Core {
                k: Some(k),
                upstream: None,
                spawn,
                ordered,
                limit: limit.max(1),
                spawned: 0,
                emitted: 0,
                in_flight: 0,
                ready: VecDeque::new(),
                requests: 0,
                delivering: false,
                pulled: false,
                ingress_done: false,
                closing: false,
                fault: None,
                stopped: false,
                finished: false,
                workers: Interrupt::new(),
            }),
        });
        stream.bind(Box::new(Ingress { shared }))
    })
}

type SpawnFn = Box<dyn FnMut(Value, Box<dyn Continuation>) -> Box<dyn Continuation> + Send + 'static>;

struct Core {
    k: Option<Box<dyn Continuation>>,
    upstream: Option<StreamControl>,
    spawn: SpawnFn,
    ordered: bool,
    limit: usize,
    spawned: usize,
    emitted: usize,
    in_flight: usize,
    ready: VecDeque<(usize, Value)>,
    requests: usize,
    delivering: bool,
    // An ingress request is outstanding; cleared by the next ingress signal.
    pulled: bool,
    ingress_done: bool,
    // Downstream ended the stream early; worker outcomes are discarded and
    // the stream ends once the workers wind down.
    closing: bool,
    fault: Option<Fault>,
    stopped: bool,
    finished: bool,
    workers: Interrupt,
}

struct Shared {
    core: Mutex<Core>,
}

enum Step {
    Body(Box<dyn Continuation>, Value),
    Ended(Box<dyn Continuation>),
    Fail(Box<dyn Continuation>, Fault),
    Stop(Box<dyn Continuation>),
    Pull(StreamControl),
    Idle,
}

impl Shared {
    // The single place deliveries and ingress pulls are decided. Runs the
    // decision loop with the core unlocked around every downstream call so
    // re-entrant requests queue instead of recursing.
    fn advance(self: &Arc<Self>) {
        let mut core = self.core.lock().unwrap();
        if core.delivering {
            return;
        }
        core.delivering = true;
        loop {
            let step = Self::decide(&mut core);
            match step {
                Step::Idle => break,
                Step::Body(mut k, value) => {
                    drop(core);
                    k.body(value);
                    core = self.core.lock().unwrap();
                    core.k = Some(k);
                }
                Step::Ended(mut k) => {
                    drop(core);
                    k.ended();
                    core = self.core.lock().unwrap();
                    break;
                }
                Step::Fail(mut k, fault) => {
                    drop(core);
                    k.fail(fault);
                    core = self.core.lock().unwrap();
                    break;
                }
                Step::Stop(mut k) => {
                    drop(core);
                    k.stop();
                    core = self.core.lock().unwrap();
                    break;
                }
                Step::Pull(upstream) => {
                    drop(core);
                    upstream.next();
                    core = self.core.lock().unwrap();
                }
            }
        }
        core.delivering = false;
    }

    fn decide(core: &mut Core) -> Step {
        if core.finished {
            return Step::Idle;
        }
        let draining = core.fault.is_some() || core.stopped || core.closing;
        if draining {
            if core.in_flight > 0 {
                return Step::Idle;
            }
            let Some(k) = core.k.take() else { return Step::Idle };
            core.finished = true;
            return match (core.fault.take(), core.stopped) {
                (Some(fault), _) => Step::Fail(k, fault),
                (None, true) => Step::Stop(k),
                (None, false) => Step::Ended(k),
            };
        }
        if core.requests > 0 {
            let deliverable = if core.ordered {
                core.ready.front().is_some_and(|(index, _)| *index == core.emitted)
            } else {
                !core.ready.is_empty()
            };
            if deliverable {
                let Some(k) = core.k.take() else { return Step::Idle };
                let (index, value) = core.ready.pop_front().unwrap();
                core.requests -= 1;
                core.emitted = index + 1;
                return Step::Body(k, value);
            }
            if core.ingress_done && core.in_flight == 0 && core.ready.is_empty() {
                let Some(k) = core.k.take() else { return Step::Idle };
                core.finished = true;
                return Step::Ended(k);
            }
        }
        if !core.ingress_done && !core.pulled && core.in_flight < core.limit {
            if let Some(upstream) = core.upstream.clone() {
                core.pulled = true;
                return Step::Pull(upstream);
            }
        }
        Step::Idle
    }

    fn ingress_terminal(self: &Arc<Self>, fault: Option<Fault>, stopped: bool) {
        let workers = {
            let mut core = self.core.lock().unwrap();
            core.pulled = false;
            core.ingress_done = true;
            if core.fault.is_none() && !core.stopped {
                core.fault = fault;
                core.stopped = stopped;
            }
            core.workers.clone()
        };
        workers.trigger();
        self.advance();
    }
}

struct Ingress {
    shared: Arc<Shared>,
}

impl Continuation for Ingress {
    fn start(&mut self, _value: Value) {
        panic!("stream transformer started without an upstream stream");
    }

    fn fail(&mut self, fault: Fault) {
        self.shared.ingress_terminal(Some(fault), false);
    }

    fn stop(&mut self) {
        self.shared.ingress_terminal(None, true);
    }

    fn register(&mut self, interrupt: &Interrupt) {
        let workers = {
            let mut core = self.shared.core.lock().unwrap();
            if let Some(k) = core.k.as_mut() {
                k.register(interrupt);
            }
            core.workers.clone()
        };
        // Bridge the graph's interrupt to the workers' so triggering one
        // reaches every outstanding worker exactly once.
        interrupt.install(move || workers.trigger());
    }

    fn begin(&mut self, stream: StreamControl) {
        {
            let mut core = self.shared.core.lock().unwrap();
            core.upstream = Some(stream);
        }
        let control = StreamControl::new(Arc::new(Control { shared: self.shared.clone() }));
        let k = self.shared.core.lock().unwrap().k.take();
        if let Some(mut k) = k {
            k.begin(control);
            self.shared.core.lock().unwrap().k = Some(k);
        }
        self.shared.advance();
    }

    fn body(&mut self, value: Value) {
        let chain = {
            let mut core = self.shared.core.lock().unwrap();
            core.pulled = false;
            if core.fault.is_some() || core.stopped || core.closing {
                None
            } else {
                let index = core.spawned;
                core.spawned += 1;
                core.in_flight += 1;
                let terminal = Box::new(WorkerTerminal {
                    shared: self.shared.clone(),
                    index,
                });
                let mut chain = (core.spawn)(value, terminal);
                chain.register(&core.workers);
                Some(chain)
            }
        };
        if let Some(mut chain) = chain {
            chain.start(unit());
        }
        self.shared.advance();
    }

    fn ended(&mut self) {
        {
            let mut core = self.shared.core.lock().unwrap();
            core.pulled = false;
            core.ingress_done = true;
        }
        self.shared.advance();
    }
}

struct Control {
    shared: Arc<Shared>,
}

impl Source for Control {
    fn next(&self) {
        self.shared.core.lock().unwrap().requests += 1;
        self.shared.advance();
    }

    fn done(&self) {
        let (upstream, workers) = {
            let mut core = self.shared.core.lock().unwrap();
            core.closing = true;
            (core.upstream.clone(), core.workers.clone())
        };
        if let Some(upstream) = upstream {
            upstream.done();
        }
        workers.trigger();
        self.shared.advance();
    }
}

struct WorkerTerminal {
    shared: Arc<Shared>,
    index: usize,
}

impl WorkerTerminal {
    fn output(&self, value: Value) {
        {
            let mut core = self.shared.core.lock().unwrap();
            core.in_flight -= 1;
            if !core.closing {
                // Ordered mode keeps the buffer sorted by ingress index so
                // the head is always the next emittable output.
                let at = if core.ordered {
                    core.ready
                        .iter()
                        .position(|(index, _)| *index > self.index)
                        .unwrap_or(core.ready.len())
                } else {
                    core.ready.len()
                };
                core.ready.insert(at, (self.index, value));
            }
        }
        self.shared.advance();
    }

    // A worker terminal other than success: record it, interrupt the rest,
    // and stop pulling ingress.
    fn abort(&self, fault: Option<Fault>) {
        let (workers, upstream) = {
            let mut core = self.shared.core.lock().unwrap();
            core.in_flight -= 1;
            if !core.closing && core.fault.is_none() && !core.stopped {
                match fault {
                    Some(fault) => core.fault = Some(fault),
                    None => core.stopped = true,
                }
            }
            (core.workers.clone(), core.upstream.clone())
        };
        workers.trigger();
        if let Some(upstream) = upstream {
            upstream.done();
        }
        self.shared.advance();
    }
}

impl Continuation for WorkerTerminal {
    fn start(&mut self, value: Value) {
        self.output(value);
    }

    fn fail(&mut self, fault: Fault) {
        self.abort(Some(fault));
    }

    fn stop(&mut self) {
        self.abort(None);
    }

    fn register(&mut self, _interrupt: &Interrupt) {}
}
