//! One-shot branching between two composables.

use eventide_core::{unit, Continuation, Eventual, Fault, Interrupt, IntoEventual, Value};

use crate::registered::Registered;

/// Chooses between two composables when started.
///
/// Both branches must produce the same result type; the unchosen branch is
/// dropped without running.
///
/// ```
/// use eventide::{just, then, terminate, If};
///
/// let e = just(1).pipe(then(|n: i32| If::new(n == 1).yes(just("yes")).no(just("no"))));
/// let (future, chain) = terminate(e);
/// chain.start();
/// assert_eq!(future.get().unwrap(), "yes");
/// ```
pub struct If {
    condition: bool,
}

impl If {
    /// Starts building a conditional on `condition`.
    pub fn new(condition: bool) -> Self {
        If { condition }
    }

    /// Supplies the composable to run when the condition holds.
    pub fn yes<R: IntoEventual<()>>(self, yes: R) -> IfYes<R::Out> {
        IfYes { condition: self.condition, yes: yes.into_eventual() }
    }
}

/// A conditional with its `yes` branch supplied; finish with
/// [`no`](IfYes::no).
pub struct IfYes<Out> {
    condition: bool,
    yes: Eventual<(), Out>,
}

impl<Out: Send + 'static> IfYes<Out> {
    /// Supplies the composable to run when the condition does not hold,
    /// finishing the conditional.
    pub fn no<R: IntoEventual<(), Out = Out>>(self, no: R) -> Eventual<(), Out> {
        let IfYes { condition, yes } = self;
        let branch = if condition { yes } else { no.into_eventual() };
        Eventual::new(move |k| {
            Box::new(Conditional { branch: Some(branch), k: Some(k), interrupt: None })
        })
    }
}

struct Conditional<Out> {
    branch: Option<Eventual<(), Out>>,
    k: Option<Box<dyn Continuation>>,
    interrupt: Option<Interrupt>,
}

impl<Out: Send + 'static> Continuation for Conditional<Out> {
    fn start(&mut self, _value: Value) {
        let branch = self.branch.take().expect("conditional received a second signal");
        let k = self.k.take().expect("conditional received a second signal");
        let mut chain = branch.bind(Registered::new(k));
        if let Some(interrupt) = &self.interrupt {
            chain.register(interrupt);
        }
        chain.start(unit());
    }

    fn fail(&mut self, fault: Fault) {
        let mut k = self.k.take().expect("conditional received a second signal");
        k.fail(fault);
    }

    fn stop(&mut self) {
        let mut k = self.k.take().expect("conditional received a second signal");
        k.stop();
    }

    fn register(&mut self, interrupt: &Interrupt) {
        self.interrupt = Some(interrupt.clone());
        if let Some(k) = self.k.as_mut() {
            k.register(interrupt);
        }
    }
}
