//! Typed descriptors of composable computations.
//!
//! [`Eventual<In, Out>`] describes a one-shot computation consuming `In` and
//! producing `Out`; [`EventualStream<In, Out>`] describes a producer of zero
//! or more `Out` elements. Both are immutable once composed and used exactly
//! once: composing or binding consumes the descriptor.
//!
//! Streams are deliberately not [`IntoEventual`]: only a loop terminator
//! (`drain`, `collect`, `reduce`) turns a stream back into an eventual, so
//! composing a stream with a non-stream combinator fails to type check.

use std::marker::PhantomData;
use std::ops::Shr;

use crate::continuation::Continuation;

type Factory = Box<dyn FnOnce(Box<dyn Continuation>) -> Box<dyn Continuation> + Send + 'static>;

/// A one-shot composable computation with input type `In` and result type
/// `Out`.
pub struct Eventual<In, Out> {
    factory: Factory,
    marker: PhantomData<fn(In) -> Out>,
}

impl<In, Out> Eventual<In, Out>
where
    In: Send + 'static,
    Out: Send + 'static,
{
    /// Creates a composable from a raw continuation factory.
    ///
    /// This is the extension point leaves are built on: the factory receives
    /// the downstream continuation and returns the node that will run this
    /// computation bound to it.
    pub fn new(
        factory: impl FnOnce(Box<dyn Continuation>) -> Box<dyn Continuation> + Send + 'static,
    ) -> Self {
        Eventual { factory: Box::new(factory), marker: PhantomData }
    }

    /// Binds this descriptor to its downstream continuation, producing the
    /// runnable chain.
    pub fn bind(self, k: Box<dyn Continuation>) -> Box<dyn Continuation> {
        (self.factory)(k)
    }

    /// Pipeline composition: the result consumes `In` and produces whatever
    /// `next` produces from this computation's `Out`.
    pub fn pipe<R>(self, next: R) -> Eventual<In, R::Out>
    where
        R: IntoEventual<Out>,
    {
        let next = next.into_eventual();
        Eventual::new(move |k| self.bind(next.bind(k)))
    }
}

/// Conversion into an [`Eventual`]; implemented by `Eventual` itself and by
/// builders (`If`, `Catch`, `Task`) so they compose without an explicit
/// finishing call.
pub trait IntoEventual<In> {
    /// The composed computation's result type.
    type Out: Send + 'static;

    /// Finishes the builder into a composable.
    fn into_eventual(self) -> Eventual<In, Self::Out>;
}

impl<In, Out> IntoEventual<In> for Eventual<In, Out>
where
    In: Send + 'static,
    Out: Send + 'static,
{
    type Out = Out;

    fn into_eventual(self) -> Eventual<In, Out> {
        self
    }
}

impl<In, Mid, R> Shr<R> for Eventual<In, Mid>
where
    In: Send + 'static,
    Mid: Send + 'static,
    R: IntoEventual<Mid>,
{
    type Output = Eventual<In, R::Out>;

    fn shr(self, next: R) -> Self::Output {
        self.pipe(next)
    }
}

/// A composable stream: produces zero or more `Out` elements followed by an
/// end-of-stream, a fault, or a stop.
pub struct EventualStream<In, Out> {
    factory: Factory,
    marker: PhantomData<fn(In) -> Out>,
}

impl<In, Out> EventualStream<In, Out>
where
    In: Send + 'static,
    Out: Send + 'static,
{
    /// Creates a stream from a raw continuation factory; the counterpart of
    /// [`Eventual::new`] for multi-shot producers.
    pub fn new(
        factory: impl FnOnce(Box<dyn Continuation>) -> Box<dyn Continuation> + Send + 'static,
    ) -> Self {
        EventualStream { factory: Box::new(factory), marker: PhantomData }
    }

    /// Binds this stream to its downstream continuation.
    pub fn bind(self, k: Box<dyn Continuation>) -> Box<dyn Continuation> {
        (self.factory)(k)
    }
}
