//! A type-erased one-shot invocable.

/// A boxed `FnOnce` that can be handed across threads and invoked exactly
/// once. Schedulers and the event loop traffic exclusively in these.
pub struct Callback(Box<dyn FnOnce() + Send + 'static>);

impl Callback {
    /// Wraps `f` for later invocation.
    pub fn new(f: impl FnOnce() + Send + 'static) -> Self {
        Callback(Box::new(f))
    }

    /// Invokes the callback, consuming it.
    pub fn invoke(self) {
        (self.0)()
    }
}

impl std::fmt::Debug for Callback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Callback")
    }
}
