//! Scheduler behavior: context swapping, pool routing, and ordering.

use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;

use eventide_core::{Callback, Context, InlineScheduler, Pinned, Scheduler, StaticThreadPool};

#[test]
fn current_context_nests_and_restores() {
    let scheduler = Arc::new(InlineScheduler);
    let outer = Context::new(scheduler.clone(), "outer");
    let inner = Context::new(scheduler, "inner");

    assert_eq!(Context::current().name(), "inline");
    {
        let _outer = outer.enter();
        assert_eq!(Context::current().name(), "outer");
        {
            let _inner = inner.enter();
            assert_eq!(Context::current().name(), "inner");
        }
        assert_eq!(Context::current().name(), "outer");
    }
    assert_eq!(Context::current().name(), "inline");
}

#[test]
fn submissions_to_one_worker_run_in_order() {
    let pool = StaticThreadPool::new(2);
    let context = pool.context("ordering", Pinned(0));
    let order = Arc::new(Mutex::new(Vec::new()));
    let (sender, receiver) = mpsc::channel();

    for index in 0..16 {
        let order = order.clone();
        let sender = sender.clone();
        pool.submit(
            Callback::new(move || {
                order.lock().unwrap().push(index);
                sender.send(()).unwrap();
            }),
            &context,
            true,
        );
    }
    for _ in 0..16 {
        receiver.recv().unwrap();
    }
    assert_eq!(*order.lock().unwrap(), (0..16).collect::<Vec<_>>());
}

#[test]
fn workers_observe_their_own_context() {
    let pool = StaticThreadPool::new(2);
    let context = pool.context("observer", Pinned(1));
    let (sender, receiver) = mpsc::channel();

    let submitted = context.clone();
    pool.submit(
        Callback::new(move || {
            sender.send((Context::current().name().to_string(), submitted.in_use())).unwrap();
        }),
        &context,
        true,
    );

    let (name, in_use) = receiver.recv().unwrap();
    assert_eq!(name, "observer");
    assert_eq!(in_use, 1);
}

#[test]
fn undeferred_submission_from_the_worker_runs_inline() {
    let pool = StaticThreadPool::new(1);
    let context = pool.context("inline-on-worker", Pinned(0));
    let (sender, receiver) = mpsc::channel();

    let resubmit_pool = pool.clone();
    let resubmit_context = context.clone();
    pool.submit(
        Callback::new(move || {
            let worker = thread::current().id();
            let inner_sender = sender.clone();
            resubmit_pool.submit(
                Callback::new(move || {
                    inner_sender.send(thread::current().id() == worker).unwrap();
                }),
                &resubmit_context,
                false,
            );
        }),
        &context,
        true,
    );

    assert!(receiver.recv().unwrap());
}

#[test]
fn continuable_only_on_the_pinned_worker() {
    let pool = StaticThreadPool::new(2);
    let context = pool.context("continuable", Pinned(0));
    assert!(!pool.continuable(&context));

    let (sender, receiver) = mpsc::channel();
    let probe_pool = pool.clone();
    let probe_context = context.clone();
    pool.submit(
        Callback::new(move || {
            sender.send(probe_pool.continuable(&probe_context)).unwrap();
        }),
        &context,
        true,
    );
    assert!(receiver.recv().unwrap());
}
