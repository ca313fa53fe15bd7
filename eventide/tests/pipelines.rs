//! One-shot pipeline behavior: value delivery, fault recovery, branching,
//! interrupts, and tasks.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;

use eventide::{
    eventual, eventual_interruptible, just, raise, terminate, then, type_check, Catch, If,
    IntoEventual, Interrupt, Resolver, Task,
};

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
struct TestError(&'static str);

#[derive(Debug, thiserror::Error)]
#[error("other")]
struct OtherError;

#[test]
fn just_delivers_its_value() {
    let (future, chain) = terminate(just(42));
    chain.start();
    assert_eq!(future.get().unwrap(), 42);
}

#[test]
fn then_splices_dynamically() {
    let e = just(20).pipe(then(|n: i32| just(n * 2 + 2)));
    let (future, chain) = terminate(e);
    chain.start();
    assert_eq!(future.get().unwrap(), 42);
}

#[test]
fn raise_reaches_the_terminal() {
    let (future, chain) = terminate(just(1).pipe(raise::<i32, i32>(TestError("m"))));
    chain.start();
    let aborted = future.get().unwrap_err();
    let fault = aborted.fault().expect("expected a failure");
    assert_eq!(fault.downcast_ref::<TestError>().unwrap().0, "m");
}

#[test]
fn catch_recovers_a_matching_fault() {
    // The wrong handler would yield -1 and fail the final assertion.
    let e = just(1)
        >> raise(TestError("m"))
        >> Catch::new()
            .raised(|_: OtherError| just(-1))
            .raised(|error: TestError| {
                assert_eq!(error.0, "m");
                just(100)
            });
    let (future, chain) = terminate(e);
    chain.start();
    assert_eq!(future.get().unwrap(), 100);
}

#[test]
fn catch_all_takes_the_leftovers() {
    let e = just(500)
        .pipe(raise(TestError("10")))
        .pipe(
            Catch::new()
                .raised(|_: OtherError| just(10))
                .all(|fault| {
                    assert_eq!(fault.downcast_ref::<TestError>().unwrap().0, "10");
                    just(100)
                }),
        )
        .pipe(then(|value: i32| just(value)));
    let (future, chain) = terminate(e);
    chain.start();
    assert_eq!(future.get().unwrap(), 100);
}

#[test]
fn catch_without_a_match_propagates() {
    let e = just(1)
        .pipe(raise(TestError("unhandled")))
        .pipe(Catch::new().raised(|_: OtherError| just(1)));
    let (future, chain) = terminate(e);
    chain.start();
    let aborted = future.get().unwrap_err();
    let fault = aborted.fault().expect("expected a failure");
    assert_eq!(fault.downcast_ref::<TestError>().unwrap().0, "unhandled");
}

#[test]
fn catch_handler_may_reraise() {
    let e = just(1)
        .pipe(raise(TestError("10")))
        .pipe(Catch::new().raised(|error: TestError| {
            assert_eq!(error.0, "10");
            raise::<(), i32>(TestError("1"))
        }))
        .pipe(then(|_: i32| just(200)))
        .pipe(Catch::new().raised(|error: TestError| {
            assert_eq!(error.0, "1");
            just(10)
        }));
    let (future, chain) = terminate(e);
    chain.start();
    assert_eq!(future.get().unwrap(), 10);
}

#[test]
fn conditional_takes_the_matching_branch() {
    for (input, expected) in [(1, "yes"), (0, "no")] {
        let e = just(input)
            .pipe(then(|n: i32| If::new(n == 1).yes(just("yes")).no(just("no"))));
        let (future, chain) = terminate(e);
        chain.start();
        assert_eq!(future.get().unwrap(), expected);
    }
}

#[test]
fn conditional_branch_may_raise() {
    let e = just(1)
        .pipe(then(|n: i32| If::new(n == 1).yes(just(n)).no(raise(TestError("raise")))));
    let (future, chain) = terminate(e);
    chain.start();
    assert_eq!(future.get().unwrap(), 1);
}

#[test]
fn upstream_fault_skips_the_conditional() {
    let e = just(0)
        .pipe(raise(TestError("error")))
        .pipe(then(|n: i32| If::new(n == 1).yes(just("yes")).no(just("no"))));
    let (future, chain) = terminate(e);
    chain.start();
    assert!(future.get().is_err());
}

#[test]
fn type_check_is_identity() {
    let (future, chain) = terminate(type_check::<i32, ()>(just(1)));
    chain.start();
    assert_eq!(future.get().unwrap(), 1);
}

#[test]
fn leaf_resolves_from_another_thread() {
    let e = eventual(|resolver: Resolver<i32>| {
        thread::spawn(move || resolver.resolve(7));
    });
    let (future, chain) = terminate(e);
    chain.start();
    assert_eq!(future.get().unwrap(), 7);
}

#[test]
fn interrupt_stops_a_suspended_leaf() {
    let started = Arc::new(AtomicBool::new(false));
    let observed = started.clone();
    let e = just(1).pipe(then(move |n: i32| {
        If::new(n == 1)
            .yes(eventual_interruptible(move |resolver: Resolver<&'static str>, interrupt| {
                let resolver = resolver.clone();
                interrupt.install(move || resolver.stop());
                observed.store(true, Ordering::SeqCst);
            }))
            .no(just("no"))
    }));
    let (future, mut chain) = terminate(e);
    let interrupt = Interrupt::new();
    chain.register(&interrupt);
    chain.start();
    assert!(started.load(Ordering::SeqCst));
    assert!(!future.ready());
    interrupt.trigger();
    assert!(future.get().unwrap_err().is_stopped());
}

#[test]
fn interrupt_before_start_stops_without_running() {
    let e = eventual_interruptible(|resolver: Resolver<i32>, interrupt: Interrupt| {
        let stop = resolver.clone();
        interrupt.install(move || stop.stop());
    });
    let (future, mut chain) = terminate(e);
    let interrupt = Interrupt::new();
    chain.register(&interrupt);
    interrupt.trigger();
    chain.start();
    assert!(future.get().unwrap_err().is_stopped());
}

#[test]
fn chain_can_be_stopped_at_the_root() {
    let (future, chain) = terminate(just(1));
    chain.stop();
    assert!(future.get().unwrap_err().is_stopped());
}

#[test]
fn task_waits_for_its_value() {
    let task = Task::new(|| just(42));
    assert_eq!(task.wait().unwrap(), 42);
}

#[test]
fn task_composes_like_any_eventual() {
    let task = Task::new(|| just(2));
    let (future, chain) = terminate(task.into_eventual().pipe(then(|n: i32| just(n + 40))));
    chain.start();
    assert_eq!(future.get().unwrap(), 42);
}

#[test]
fn task_surfaces_terminals_through_callbacks() {
    let (sender, receiver) = mpsc::channel();
    let mut task = Task::new(|| just("done"));
    let interrupt = Interrupt::new();
    let fail_sender = sender.clone();
    let stop_sender = sender.clone();
    task.start(
        &interrupt,
        move |value| sender.send(format!("value: {value}")).unwrap(),
        move |fault| fail_sender.send(format!("fault: {fault}")).unwrap(),
        move || stop_sender.send(String::from("stopped")).unwrap(),
    );
    assert_eq!(receiver.recv().unwrap(), "value: done");
}
