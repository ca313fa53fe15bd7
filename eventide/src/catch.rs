//! Fault handling with typed downcast matching.

use std::error::Error;

use eventide_core::{unit, Continuation, Eventual, Fault, Interrupt, IntoEventual, Value};

use crate::registered::Registered;

type Matcher<Out> = Box<dyn FnOnce(Fault) -> Result<Eventual<(), Out>, Fault> + Send + 'static>;
type CatchAll<Out> = Box<dyn FnOnce(Fault) -> Eventual<(), Out> + Send + 'static>;

/// Recovers from upstream faults.
///
/// Handlers are tried in registration order against the concrete fault type;
/// the first match's composable is spliced into the pipeline. An optional
/// [`all`](Catch::all) handler takes anything left over, and unmatched
/// faults keep propagating. Successful values pass through untouched.
///
/// ```
/// use eventide::{just, raise, terminate, Catch};
///
/// #[derive(Debug, thiserror::Error)]
/// #[error("boom")]
/// struct Boom;
///
/// let e = just(1)
///     .pipe(raise(Boom))
///     .pipe(Catch::new().raised(|_: Boom| just(100)));
/// let (future, chain) = terminate(e);
/// chain.start();
/// assert_eq!(future.get().unwrap(), 100);
/// ```
pub struct Catch<Out> {
    matchers: Vec<Matcher<Out>>,
    all: Option<CatchAll<Out>>,
}

impl<Out: Send + 'static> Catch<Out> {
    /// Starts building a catch.
    pub fn new() -> Self {
        Catch { matchers: Vec::new(), all: None }
    }

    /// Handles faults whose concrete type is `E`.
    pub fn raised<E, R, F>(mut self, handler: F) -> Self
    where
        E: Error + Send + Sync + 'static,
        R: IntoEventual<(), Out = Out>,
        F: FnOnce(E) -> R + Send + 'static,
    {
        self.matchers.push(Box::new(move |fault| match fault.downcast::<E>() {
            Ok(error) => Ok(handler(*error).into_eventual()),
            Err(fault) => Err(fault),
        }));
        self
    }

    /// Handles any fault no [`raised`](Catch::raised) handler matched.
    pub fn all<R, F>(mut self, handler: F) -> Self
    where
        R: IntoEventual<(), Out = Out>,
        F: FnOnce(Fault) -> R + Send + 'static,
    {
        self.all = Some(Box::new(move |fault| handler(fault).into_eventual()));
        self
    }
}

impl<Out: Send + 'static> Default for Catch<Out> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Out: Send + 'static> IntoEventual<Out> for Catch<Out> {
    type Out = Out;

    fn into_eventual(self) -> Eventual<Out, Out> {
        let Catch { matchers, all } = self;
        Eventual::new(move |k| {
            Box::new(CatchNode { matchers, all, k: Some(k), interrupt: None })
        })
    }
}

struct CatchNode<Out> {
    matchers: Vec<Matcher<Out>>,
    all: Option<CatchAll<Out>>,
    k: Option<Box<dyn Continuation>>,
    interrupt: Option<Interrupt>,
}

impl<Out: Send + 'static> CatchNode<Out> {
    fn splice(&mut self, recovery: Eventual<(), Out>, k: Box<dyn Continuation>) {
        let mut chain = recovery.bind(Registered::new(k));
        if let Some(interrupt) = &self.interrupt {
            chain.register(interrupt);
        }
        chain.start(unit());
    }
}

impl<Out: Send + 'static> Continuation for CatchNode<Out> {
    fn start(&mut self, value: Value) {
        let mut k = self.k.take().expect("catch received a second signal");
        k.start(value);
    }

    fn fail(&mut self, fault: Fault) {
        let mut k = self.k.take().expect("catch received a second signal");
        let mut fault = fault;
        for matcher in std::mem::take(&mut self.matchers) {
            match matcher(fault) {
                Ok(recovery) => {
                    self.splice(recovery, k);
                    return;
                }
                Err(unmatched) => fault = unmatched,
            }
        }
        if let Some(all) = self.all.take() {
            let recovery = all(fault);
            self.splice(recovery, k);
            return;
        }
        k.fail(fault);
    }

    fn stop(&mut self) {
        let mut k = self.k.take().expect("catch received a second signal");
        k.stop();
    }

    fn register(&mut self, interrupt: &Interrupt) {
        self.interrupt = Some(interrupt.clone());
        if let Some(k) = self.k.as_mut() {
            k.register(interrupt);
        }
    }
}
