//! One-shot cancellation tokens.

use std::sync::{Arc, Mutex};

use smallvec::SmallVec;

type Handler = Box<dyn FnOnce() + Send + 'static>;

/// Outcome of [`Interrupt::install`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Installed {
    /// The handler was registered and will run when the interrupt triggers.
    Armed,
    /// The interrupt had already triggered; the handler ran synchronously
    /// before `install` returned.
    AlreadyTriggered,
}

/// A one-shot cancellation signal threaded through a continuation chain
/// before any other signal fires.
///
/// Cloning produces another handle to the same signal. Triggering is
/// idempotent: handlers run at most once, most recently installed first.
#[derive(Clone, Default)]
pub struct Interrupt {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    triggered: bool,
    handlers: SmallVec<[Handler; 2]>,
}

impl Interrupt {
    /// Creates a fresh, untriggered interrupt.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` to run on trigger.
    ///
    /// When the interrupt has already triggered the handler is invoked
    /// synchronously before this returns, and the caller learns so from the
    /// result.
    pub fn install(&self, handler: impl FnOnce() + Send + 'static) -> Installed {
        let mut state = self.inner.state.lock().unwrap();
        if state.triggered {
            drop(state);
            handler();
            Installed::AlreadyTriggered
        } else {
            state.handlers.push(Box::new(handler));
            Installed::Armed
        }
    }

    /// Fires the interrupt. Subsequent triggers coalesce into this one.
    pub fn trigger(&self) {
        let handlers = {
            let mut state = self.inner.state.lock().unwrap();
            if state.triggered {
                return;
            }
            state.triggered = true;
            std::mem::take(&mut state.handlers)
        };
        for handler in handlers.into_iter().rev() {
            handler();
        }
    }

    /// True once [`trigger`](Self::trigger) has been called.
    pub fn triggered(&self) -> bool {
        self.inner.state.lock().unwrap().triggered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn handlers_fire_once_in_reverse_order() {
        let interrupt = Interrupt::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for label in ["inner", "outer"] {
            let order = order.clone();
            interrupt.install(move || order.lock().unwrap().push(label));
        }

        interrupt.trigger();
        interrupt.trigger();

        assert_eq!(*order.lock().unwrap(), vec!["outer", "inner"]);
    }

    #[test]
    fn install_after_trigger_runs_synchronously() {
        let interrupt = Interrupt::new();
        interrupt.trigger();

        let fired = Arc::new(AtomicUsize::new(0));
        let handle = fired.clone();
        let installed = interrupt.install(move || {
            handle.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(installed, Installed::AlreadyTriggered);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }
}
