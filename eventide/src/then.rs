//! Sequencing: feed a result into a function producing the next composable.

use std::marker::PhantomData;

use eventide_core::{expect, unit, Continuation, Eventual, Fault, Interrupt, IntoEventual, Value};

use crate::registered::Registered;

/// Runs `f` on the upstream value and splices the composable it returns into
/// the pipeline. Lift plain values with [`just`](crate::just):
///
/// ```
/// use eventide::{just, then, terminate};
///
/// let e = just(1).pipe(then(|n: i32| just(n + 1)));
/// let (future, chain) = terminate(e);
/// chain.start();
/// assert_eq!(future.get().unwrap(), 2);
/// ```
pub fn then<In, R, F>(f: F) -> Eventual<In, R::Out>
where
    In: Send + 'static,
    R: IntoEventual<()> + 'static,
    F: FnOnce(In) -> R + Send + 'static,
{
    Eventual::new(move |k| {
        Box::new(Then { f: Some(f), k: Some(k), interrupt: None, marker: PhantomData })
    })
}

struct Then<In, R, F> {
    f: Option<F>,
    k: Option<Box<dyn Continuation>>,
    interrupt: Option<Interrupt>,
    marker: PhantomData<fn(In) -> R>,
}

impl<In, R, F> Continuation for Then<In, R, F>
where
    In: Send + 'static,
    R: IntoEventual<()> + 'static,
    F: FnOnce(In) -> R + Send + 'static,
{
    fn start(&mut self, value: Value) {
        let f = self.f.take().expect("then received a second signal");
        let k = self.k.take().expect("then received a second signal");
        let input = expect::<In>(value);
        let mut chain = f(input).into_eventual().bind(Registered::new(k));
        if let Some(interrupt) = &self.interrupt {
            chain.register(interrupt);
        }
        chain.start(unit());
    }

    fn fail(&mut self, fault: Fault) {
        let mut k = self.k.take().expect("then received a second signal");
        k.fail(fault);
    }

    fn stop(&mut self) {
        let mut k = self.k.take().expect("then received a second signal");
        k.stop();
    }

    fn register(&mut self, interrupt: &Interrupt) {
        self.interrupt = Some(interrupt.clone());
        if let Some(k) = self.k.as_mut() {
            k.register(interrupt);
        }
    }
}
