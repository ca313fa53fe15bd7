//! Stream sources over owned collections and iterators.

use std::sync::{Arc, Mutex};

use eventide_core::{
    Continuation, EventualStream, Fault, Interrupt, Source, StreamControl, Value,
};

/// Emits the elements of a moved-in collection (or any iterator) in its
/// natural order.
///
/// Ranges work directly: `iterate(0..3)` emits `0, 1, 2`.
pub fn iterate<I>(items: I) -> EventualStream<(), I::Item>
where
    I: IntoIterator + Send + 'static,
    I::IntoIter: Send + 'static,
    I::Item: Send + 'static,
{
    EventualStream::new(move |k| Box::new(Iterate { items: Some(items), k: Some(k) }))
}

/// Emits `()` endlessly on each request; pair with
/// [`until`](crate::stream::Until::until) to bound it.
pub fn repeat() -> EventualStream<(), ()> {
    iterate(std::iter::repeat(()))
}

struct Iterate<I> {
    items: Option<I>,
    k: Option<Box<dyn Continuation>>,
}

impl<I> Continuation for Iterate<I>
where
    I: IntoIterator + Send + 'static,
    I::IntoIter: Send + 'static,
    I::Item: Send + 'static,
{
    fn start(&mut self, _value: Value) {
        let items = self.items.take().expect("iterate received a second signal");
        let k = self.k.take().expect("iterate received a second signal");
        let source = Arc::new(Pump::new(items.into_iter(), k));
        let control = StreamControl::new(source.clone());
        // Announce the stream with the core's continuation taken out so a
        // re-entrant next() from inside begin() queues instead of recursing.
        let mut k = source.core.lock().unwrap().k.take().expect("stream already announced");
        k.begin(control);
        source.core.lock().unwrap().k = Some(k);
        source.pump();
    }

    fn fail(&mut self, fault: Fault) {
        let mut k = self.k.take().expect("iterate received a second signal");
        k.fail(fault);
    }

    fn stop(&mut self) {
        let mut k = self.k.take().expect("iterate received a second signal");
        k.stop();
    }

    fn register(&mut self, interrupt: &Interrupt) {
        if let Some(k) = self.k.as_mut() {
            k.register(interrupt);
        }
    }
}

struct PumpCore<It> {
    k: Option<Box<dyn Continuation>>,
    iter: It,
    requests: usize,
    pumping: bool,
    done: bool,
    ended: bool,
}

struct Pump<It> {
    core: Mutex<PumpCore<It>>,
}

impl<It> Pump<It>
where
    It: Iterator + Send + 'static,
    It::Item: Send + 'static,
{
    fn new(iter: It, k: Box<dyn Continuation>) -> Self {
        Pump {
            core: Mutex::new(PumpCore {
                k: Some(k),
                iter,
                requests: 0,
                pumping: false,
                done: false,
                ended: false,
            }),
        }
    }

    // Drains outstanding requests one element at a time. The continuation is
    // taken out of the core around each delivery so the downstream may issue
    // the next request from inside `body` without re-entering the pump.
    fn pump(&self) {
        let mut core = self.core.lock().unwrap();
        if core.pumping || core.ended {
            return;
        }
        core.pumping = true;
        while core.requests > 0 && !core.ended {
            let Some(mut k) = core.k.take() else {
                break;
            };
            core.requests -= 1;
            let item = if core.done { None } else { core.iter.next() };
            let finished = item.is_none();
            drop(core);
            match item {
                Some(item) => k.body(Box::new(item)),
                None => k.ended(),
            }
            core = self.core.lock().unwrap();
            if finished {
                core.ended = true;
            } else {
                core.k = Some(k);
            }
        }
        core.pumping = false;
    }
}

impl<It> Source for Pump<It>
where
    It: Iterator + Send + 'static,
    It::Item: Send + 'static,
{
    fn next(&self) {
        {
            let mut core = self.core.lock().unwrap();
            core.requests += 1;
            if core.pumping {
                return;
            }
        }
        self.pump();
    }

    fn done(&self) {
        {
            let mut core = self.core.lock().unwrap();
            core.done = true;
            core.requests += 1;
            if core.pumping {
                return;
            }
        }
        self.pump();
    }
}
