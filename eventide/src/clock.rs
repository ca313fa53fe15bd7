//! A pauseable, advanceable time source for deterministic tests.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::event_loop::EventLoop;

struct Pending {
    remaining: Duration,
    // Receives the residual delay: zero fires immediately, anything else
    // re-arms a real timer for the remainder.
    fire: Box<dyn FnOnce(Duration) + Send + 'static>,
}

#[derive(Default)]
struct State {
    paused_at: Option<Instant>,
    advanced: Duration,
    pending: Vec<Pending>,
}

pub(crate) struct ClockCore {
    state: Mutex<State>,
}

impl ClockCore {
    pub(crate) fn new() -> Self {
        ClockCore { state: Mutex::new(State::default()) }
    }
}

/// Handle to an event loop's clock.
///
/// While paused, timers submitted through the loop are recorded rather than
/// armed; [`advance`](Clock::advance) fires those whose delay has
/// accumulated and [`resume`](Clock::resume) re-arms the rest with their
/// residual delay.
pub struct Clock {
    core: Arc<ClockCore>,
    loop_: EventLoop,
}

impl Clock {
    pub(crate) fn new(core: Arc<ClockCore>, loop_: EventLoop) -> Self {
        Clock { core, loop_ }
    }

    /// True while the clock is paused.
    pub fn paused(&self) -> bool {
        self.core.state.lock().unwrap().paused_at.is_some()
    }

    /// The clock's notion of now: wall time while running, the pause point
    /// plus the advanced offset while paused.
    pub fn now(&self) -> Instant {
        let state = self.core.state.lock().unwrap();
        match state.paused_at {
            Some(instant) => instant + state.advanced,
            None => Instant::now(),
        }
    }

    /// Pauses the clock. Fatal when already paused or when timers are
    /// already armed on the loop, since those cannot be virtualized
    /// retroactively.
    pub fn pause(&self) {
        let mut state = self.core.state.lock().unwrap();
        assert!(state.paused_at.is_none(), "clock is already paused");
        assert_eq!(
            self.loop_.armed_timers(),
            0,
            "pausing the clock with outstanding timers is unsupported"
        );
        state.paused_at = Some(Instant::now());
        state.advanced = Duration::ZERO;
    }

    /// Advances the paused clock by `duration`, firing every pending timer
    /// whose accumulated due time has elapsed.
    pub fn advance(&self, duration: Duration) {
        let fired = {
            let mut state = self.core.state.lock().unwrap();
            assert!(state.paused_at.is_some(), "clock is not paused");
            state.advanced += duration;
            let advanced = state.advanced;
            let mut fired = Vec::new();
            let mut index = 0;
            while index < state.pending.len() {
                if state.pending[index].remaining <= advanced {
                    fired.push(state.pending.swap_remove(index));
                } else {
                    index += 1;
                }
            }
            fired
        };
        for pending in fired {
            (pending.fire)(Duration::ZERO);
        }
        // Wake the loop in case waiters became runnable.
        self.loop_.interrupt();
    }

    /// Resumes the clock, re-arming every remaining pending timer with its
    /// residual delay relative to the advanced offset.
    pub fn resume(&self) {
        let (advanced, pending) = {
            let mut state = self.core.state.lock().unwrap();
            assert!(state.paused_at.is_some(), "clock is not paused");
            state.paused_at = None;
            (state.advanced, std::mem::take(&mut state.pending))
        };
        for entry in pending {
            (entry.fire)(entry.remaining.saturating_sub(advanced));
        }
        self.loop_.interrupt();
    }

    // Records a timer while paused. Registration after enough advancement
    // fires immediately.
    pub(crate) fn enqueue(&self, remaining: Duration, fire: impl FnOnce(Duration) + Send + 'static) {
        let fire: Box<dyn FnOnce(Duration) + Send + 'static> = Box::new(fire);
        let immediate = {
            let mut state = self.core.state.lock().unwrap();
            assert!(state.paused_at.is_some(), "clock is not paused");
            if state.advanced >= remaining {
                Some(fire)
            } else {
                state.pending.push(Pending { remaining, fire });
                None
            }
        };
        if let Some(fire) = immediate {
            fire(Duration::ZERO);
        }
    }
}
