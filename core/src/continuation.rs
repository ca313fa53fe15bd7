//! The erased runtime protocol spoken between composed computations.
//!
//! A running graph is a chain of [`Continuation`] nodes, each owning its
//! downstream. One-shot signals (`start`, `fail`, `stop`) travel down the
//! chain; stream signals (`begin`, `body`, `ended`) extend the protocol for
//! multi-shot producers, with element requests travelling back up through a
//! [`StreamControl`].

use std::any::Any;
use std::error::Error;
use std::sync::Arc;

use crate::interrupt::Interrupt;

/// An erased value travelling along a continuation chain.
///
/// The typed descriptor layer guarantees that a node only ever receives the
/// type it was composed with; a mismatch past that layer is a contract
/// violation and fatal.
pub type Value = Box<dyn Any + Send>;

/// An erased fault travelling along a continuation chain.
///
/// Faults move by value across scheduler and thread boundaries, preserving
/// their concrete type for downcast-based handling.
pub type Fault = Box<dyn Error + Send + Sync>;

/// The unit value, delivered by leaves that produce no data.
pub fn unit() -> Value {
    Box::new(())
}

/// Recovers the typed value a node was composed with.
pub fn expect<T: 'static>(value: Value) -> T {
    match value.downcast::<T>() {
        Ok(value) => *value,
        Err(_) => panic!(
            "continuation received a value that is not a {}",
            std::any::type_name::<T>()
        ),
    }
}

/// A running node in a composed graph, bound to its downstream.
///
/// Exactly one of a terminal `start`, `fail`, or `stop` eventually reaches
/// the end of the chain. `register` is called at most once, before any other
/// signal. The stream signals have panicking defaults so that one-shot nodes
/// need not mention them.
pub trait Continuation: Send + 'static {
    /// Upstream succeeded with `value`; begin this node's work.
    fn start(&mut self, value: Value);

    /// Upstream failed; propagate or transform the fault.
    fn fail(&mut self, fault: Fault);

    /// Upstream observed cancellation; propagate it.
    fn stop(&mut self);

    /// Installs the graph's interrupt before any signal fires.
    fn register(&mut self, interrupt: &Interrupt);

    /// A stream upstream announces itself; `stream` requests its elements.
    fn begin(&mut self, stream: StreamControl) {
        let _ = stream;
        misuse("begin");
    }

    /// One stream element.
    fn body(&mut self, value: Value) {
        let _ = value;
        misuse("body");
    }

    /// The stream is out of elements.
    fn ended(&mut self) {
        misuse("ended");
    }
}

fn misuse(signal: &str) -> ! {
    panic!("stream signal '{signal}' delivered to a non-stream continuation");
}

/// The upstream face of a stream: consumers ask for elements and end the
/// stream early through this trait.
///
/// Implementations must tolerate re-entrant calls issued from inside their
/// own `body` deliveries; the conventional shape is a request counter
/// drained by a single non-recursive pump.
pub trait Source: Send + Sync + 'static {
    /// Requests the next element; answered by exactly one of `body`,
    /// `ended`, `fail`, or `stop`.
    fn next(&self);

    /// Ends the stream early; the source answers with `ended`.
    fn done(&self);
}

/// A cloneable handle to a stream's [`Source`], handed to the consumer in
/// `begin`.
#[derive(Clone)]
pub struct StreamControl {
    source: Arc<dyn Source>,
}

impl StreamControl {
    /// Wraps a source for delivery downstream.
    pub fn new(source: Arc<dyn Source>) -> Self {
        StreamControl { source }
    }

    /// Requests the next element.
    pub fn next(&self) {
        self.source.next();
    }

    /// Ends the stream early.
    pub fn done(&self) {
        self.source.done();
    }
}
