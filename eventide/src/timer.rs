//! Timer leaves.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use eventide_core::{unit, Callback, Continuation, Eventual, Fault, Interrupt, Value};

use crate::event_loop::EventLoop;

/// A leaf that completes after `delay` on the default event loop.
///
/// With the loop's clock paused the timer is recorded rather than armed and
/// fires when the clock is advanced past its delay or resumed.
pub fn timer(delay: Duration) -> Eventual<(), ()> {
    EventLoop::default_loop().timer(delay)
}

impl EventLoop {
    /// A leaf that completes after `delay` on this loop.
    pub fn timer(&self, delay: Duration) -> Eventual<(), ()> {
        let loop_ = self.clone();
        Eventual::new(move |k| {
            Box::new(TimerNode { loop_, delay, k: Some(k), interrupt: None })
        })
    }
}

struct TimerNode {
    loop_: EventLoop,
    delay: Duration,
    k: Option<Box<dyn Continuation>>,
    interrupt: Option<Interrupt>,
}

struct TimerState {
    k: Option<Box<dyn Continuation>>,
    timer: Option<u64>,
    interrupted: bool,
}

impl Continuation for TimerNode {
    fn start(&mut self, _value: Value) {
        let k = self.k.take().expect("timer received a second signal");
        let shared = Arc::new(Mutex::new(TimerState {
            k: Some(k),
            timer: None,
            interrupted: false,
        }));

        if let Some(interrupt) = &self.interrupt {
            let shared = shared.clone();
            let loop_ = self.loop_.clone();
            interrupt.install(move || {
                let context = loop_.context("timer (interrupt)");
                let inner = loop_.clone();
                loop_.submit(
                    Callback::new(move || {
                        let mut state = shared.lock().unwrap();
                        state.interrupted = true;
                        if let Some(id) = state.timer.take() {
                            inner.cancel_timer(id);
                        }
                        if let Some(mut k) = state.k.take() {
                            drop(state);
                            k.stop();
                        }
                    }),
                    &context,
                );
            });
        }

        let loop_ = self.loop_.clone();
        let delay = self.delay;
        let context = loop_.context("timer (start)");
        let inner = loop_.clone();
        loop_.submit(
            Callback::new(move || {
                {
                    let state = shared.lock().unwrap();
                    if state.interrupted || state.k.is_none() {
                        return;
                    }
                }
                let clock = inner.clock();
                if clock.paused() {
                    let loop_ = inner.clone();
                    let shared = shared.clone();
                    clock.enqueue(delay, move |residual| {
                        // Fired from whichever thread advanced the clock;
                        // hop back onto the loop to deliver.
                        let context = loop_.context("timer (fire)");
                        let inner = loop_.clone();
                        loop_.submit(
                            Callback::new(move || arm_or_deliver(inner, shared, residual)),
                            &context,
                        );
                    });
                } else {
                    arm_or_deliver(inner, shared, delay);
                }
            }),
            &context,
        );
    }

    fn fail(&mut self, fault: Fault) {
        let mut k = self.k.take().expect("timer received a second signal");
        k.fail(fault);
    }

    fn stop(&mut self) {
        let mut k = self.k.take().expect("timer received a second signal");
        k.stop();
    }

    fn register(&mut self, interrupt: &Interrupt) {
        self.interrupt = Some(interrupt.clone());
        if let Some(k) = self.k.as_mut() {
            k.register(interrupt);
        }
    }
}

// Runs on the loop thread: deliver immediately for a zero delay, otherwise
// arm a real loop timer.
fn arm_or_deliver(loop_: EventLoop, shared: Arc<Mutex<TimerState>>, delay: Duration) {
    if delay.is_zero() {
        deliver(&loop_, &shared);
        return;
    }
    let mut state = shared.lock().unwrap();
    if state.k.is_none() {
        return;
    }
    let fire_loop = loop_.clone();
    let fire_shared = shared.clone();
    let id = loop_.add_timer(
        delay,
        Callback::new(move || {
            fire_shared.lock().unwrap().timer = None;
            deliver(&fire_loop, &fire_shared);
        }),
    );
    state.timer = Some(id);
}

fn deliver(loop_: &EventLoop, shared: &Arc<Mutex<TimerState>>) {
    let k = shared.lock().unwrap().k.take();
    if let Some(mut k) = k {
        let context = loop_.context("timer (fire)");
        let _guard = context.enter();
        k.start(unit());
    }
}
