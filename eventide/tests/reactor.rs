//! Event loop behavior: timers, the virtual clock, interrupts, and the
//! default-loop lifecycle.

use std::time::{Duration, Instant};

use eventide::{just, terminate, then, EventLoop, Interrupt};

#[test]
fn fresh_loop_is_idle() {
    let loop_ = EventLoop::new();
    let started = Instant::now();
    loop_.run();
    assert!(started.elapsed() < Duration::from_secs(1));
}

#[test]
fn timer_fires_and_continues_the_pipeline() {
    let loop_ = EventLoop::new();
    let e = loop_.timer(Duration::from_millis(10)).pipe(then(|_| just(7)));
    let (future, chain) = terminate(e);
    chain.start();
    loop_.run_until(&future);
    assert_eq!(future.get().unwrap(), 7);
}

#[test]
fn timers_fire_in_deadline_order() {
    let loop_ = EventLoop::new();
    let slow = loop_.timer(Duration::from_millis(30)).pipe(then(|_| just("slow")));
    let fast = loop_.timer(Duration::from_millis(5)).pipe(then(|_| just("fast")));

    let (slow_future, slow_chain) = terminate(slow);
    let (fast_future, fast_chain) = terminate(fast);
    slow_chain.start();
    fast_chain.start();

    loop_.run_until(&fast_future);
    assert_eq!(fast_future.get().unwrap(), "fast");
    assert!(!slow_future.ready());
    loop_.run_until(&slow_future);
    assert_eq!(slow_future.get().unwrap(), "slow");
}

#[test]
fn paused_clock_defers_timers_until_advanced() {
    let loop_ = EventLoop::new();
    let clock = loop_.clock();
    clock.pause();

    let e = loop_.timer(Duration::from_millis(100)).pipe(then(|_| just(7)));
    let (future, chain) = terminate(e);
    chain.start();

    clock.advance(Duration::from_millis(100));
    loop_.run_until(&future);
    assert_eq!(future.get().unwrap(), 7);
}

#[test]
fn advancing_less_than_the_delay_keeps_the_timer_pending() {
    let loop_ = EventLoop::new();
    let clock = loop_.clock();
    clock.pause();

    let e = loop_.timer(Duration::from_millis(100)).pipe(then(|_| just(7)));
    let (future, chain) = terminate(e);
    chain.start();

    clock.advance(Duration::from_millis(40));
    loop_.run();
    assert!(!future.ready());

    clock.advance(Duration::from_millis(60));
    loop_.run_until(&future);
    assert_eq!(future.get().unwrap(), 7);
}

#[test]
fn resume_rearms_the_residual_delay() {
    let loop_ = EventLoop::new();
    let clock = loop_.clock();
    clock.pause();

    let e = loop_.timer(Duration::from_millis(20)).pipe(then(|_| just("late")));
    let (future, chain) = terminate(e);
    chain.start();
    // Register the pending entry before resuming.
    loop_.run();

    clock.advance(Duration::from_millis(15));
    clock.resume();
    loop_.run_until(&future);
    assert_eq!(future.get().unwrap(), "late");
}

#[test]
fn paused_clock_reports_virtual_time() {
    let loop_ = EventLoop::new();
    let clock = loop_.clock();
    clock.pause();
    let before = clock.now();
    clock.advance(Duration::from_secs(5));
    assert_eq!(clock.now() - before, Duration::from_secs(5));
}

#[test]
fn interrupt_cancels_an_armed_timer() {
    let loop_ = EventLoop::new();
    let e = loop_.timer(Duration::from_secs(3600)).pipe(then(|_| just(())));
    let (future, mut chain) = terminate(e);
    let interrupt = Interrupt::new();
    chain.register(&interrupt);
    chain.start();

    interrupt.trigger();
    loop_.run_until(&future);
    assert!(future.get().unwrap_err().is_stopped());
}

#[test]
fn interrupt_before_the_loop_runs_stops_the_timer() {
    let loop_ = EventLoop::new();
    let e = loop_.timer(Duration::from_millis(1));
    let (future, mut chain) = terminate(e);
    let interrupt = Interrupt::new();
    chain.register(&interrupt);
    interrupt.trigger();
    chain.start();
    loop_.run_until(&future);
    assert!(future.get().unwrap_err().is_stopped());
}

#[test]
fn default_loop_lifecycle() {
    assert!(!EventLoop::has_default());
    EventLoop::construct_default();
    assert!(EventLoop::has_default());

    let e = eventide::timer(Duration::from_millis(5)).pipe(then(|_| just("default")));
    let (future, chain) = terminate(e);
    chain.start();
    EventLoop::default_loop().run_until(&future);
    assert_eq!(future.get().unwrap(), "default");

    EventLoop::destruct_default();
    assert!(!EventLoop::has_default());
}
