//! Stream behavior: sources, transformers, terminators, and ordering.

use std::collections::BTreeSet;

use eventide::{
    iterate, just, repeat, terminate, then, Collect, Drain, FlatMap, ForEach, Map, Reduce, Until,
};

#[test]
fn iterate_collects_in_order() {
    let (future, chain) = terminate(iterate(vec![5, 12]).collect::<Vec<i32>>());
    chain.start();
    assert_eq!(future.get().unwrap(), vec![5, 12]);
}

#[test]
fn iterate_collects_into_sets() {
    let (future, chain) = terminate(iterate([5, 12]).collect::<BTreeSet<i32>>());
    chain.start();
    assert_eq!(future.get().unwrap(), BTreeSet::from([5, 12]));
}

#[test]
fn map_transforms_each_element() {
    let (future, chain) =
        terminate(iterate(0..3).map(|n| n * 2).collect::<Vec<i32>>());
    chain.start();
    assert_eq!(future.get().unwrap(), vec![0, 2, 4]);
}

#[test]
fn drain_discards_and_completes() {
    let (future, chain) = terminate(iterate(0..100).map(|_| ()).drain());
    chain.start();
    assert!(future.get().is_ok());
}

#[test]
fn for_each_observes_every_element() {
    let (sender, receiver) = std::sync::mpsc::channel();
    let (future, chain) =
        terminate(iterate(1..=3).for_each(move |n: i32| sender.send(n).unwrap()));
    chain.start();
    future.get().unwrap();
    assert_eq!(receiver.try_iter().collect::<Vec<_>>(), vec![1, 2, 3]);
}

#[test]
fn flat_map_concatenates_sub_streams() {
    let (future, chain) = terminate(
        iterate(0..2).flat_map(|_| iterate(0..2)).collect::<Vec<i32>>(),
    );
    chain.start();
    assert_eq!(future.get().unwrap(), vec![0, 1, 0, 1]);
}

#[test]
fn flat_map_then_map() {
    let (future, chain) = terminate(
        iterate(0..2)
            .flat_map(|_| iterate(vec![1, 2, 3]))
            .map(|n| n + 1)
            .collect::<Vec<i32>>(),
    );
    chain.start();
    assert_eq!(future.get().unwrap(), vec![2, 3, 4, 2, 3, 4]);
}

#[test]
fn flat_map_nests() {
    let (future, chain) = terminate(
        iterate(0..2)
            .flat_map(|_| iterate(0..2).flat_map(|_| iterate(0..2)))
            .collect::<Vec<i32>>(),
    );
    chain.start();
    assert_eq!(future.get().unwrap(), vec![0, 1, 0, 1, 0, 1, 0, 1]);
}

#[test]
fn flat_map_carries_the_outer_element() {
    let (future, chain) = terminate(
        iterate(0..3)
            .flat_map(|x| iterate(1..3).map(move |y| x + y))
            .collect::<Vec<i32>>(),
    );
    chain.start();
    assert_eq!(future.get().unwrap(), vec![1, 2, 2, 3, 3, 4]);
}

#[test]
fn reduce_accumulates() {
    let (future, chain) = terminate(iterate(1..=4).reduce(0, |acc, n| {
        *acc += n;
        true
    }));
    chain.start();
    assert_eq!(future.get().unwrap(), 10);
}

#[test]
fn reduce_stops_early() {
    let (future, chain) = terminate(iterate(1..).reduce(Vec::new(), |acc: &mut Vec<i32>, n| {
        acc.push(n);
        acc.len() < 3
    }));
    chain.start();
    assert_eq!(future.get().unwrap(), vec![1, 2, 3]);
}

#[test]
fn repeat_until_bounds_an_endless_stream() {
    let mut count = 0;
    let (future, chain) = terminate(
        repeat()
            .map(move |_| {
                count += 1;
                count
            })
            .until(|n| *n > 5)
            .collect::<Vec<i32>>(),
    );
    chain.start();
    assert_eq!(future.get().unwrap(), vec![1, 2, 3, 4, 5]);
}

#[test]
fn terminator_result_keeps_composing() {
    let e = iterate(1..=3)
        .collect::<Vec<i32>>()
        .pipe(then(|values: Vec<i32>| just(values.into_iter().sum::<i32>())));
    let (future, chain) = terminate(e);
    chain.start();
    assert_eq!(future.get().unwrap(), 6);
}
