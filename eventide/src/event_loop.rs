//! A single-threaded reactor: timers, poll handles, cross-thread work
//! submission, and a virtualizable clock.
//!
//! The loop owns a `mio::Poll`. Work arrives from other threads through
//! [`EventLoop::submit`], which pushes a waiter onto a lock-free LIFO and
//! signals the loop's waker; each iteration's post-phase drains the LIFO in
//! FIFO order. Timers, poll handles, and transfer state are touched only
//! from the loop thread.

use std::collections::{BinaryHeap, HashMap, HashSet};
use std::os::fd::RawFd;
use std::ptr;
use std::sync::atomic::{AtomicPtr, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

use mio::unix::SourceFd;
use mio::{Events, Interest, Poll, Token, Waker};
use smallvec::SmallVec;
use tracing::warn;

use eventide_core::{Callback, Context, Future, Scheduler};

use crate::clock::{Clock, ClockCore};

const WAKER_TOKEN: Token = Token(usize::MAX);

// How many non-blocking iterations teardown tolerates between warnings
// about still-active handles.
const TEARDOWN_WARN_ITERATIONS: usize = 100_000;

/// Readiness observed on a registered file descriptor.
#[derive(Clone, Copy, Debug, Default)]
pub struct Readiness {
    /// The descriptor is readable.
    pub readable: bool,
    /// The descriptor is writable.
    pub writable: bool,
    /// The descriptor is in an error or hang-up state.
    pub error: bool,
}

struct Waiter {
    callback: Option<Callback>,
    context: Context,
    next: *mut Waiter,
}

struct TimerEntry {
    deadline: Instant,
    id: u64,
    callback: Option<Callback>,
}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.id == other.id
    }
}

impl Eq for TimerEntry {}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimerEntry {
    // Reversed so the binary heap pops the earliest deadline first.
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        other.deadline.cmp(&self.deadline).then_with(|| other.id.cmp(&self.id))
    }
}

struct FdEntry {
    fd: RawFd,
    callback: Box<dyn FnMut(Readiness) + Send + 'static>,
}

struct LoopState {
    poll: Poll,
    events: Events,
    timers: BinaryHeap<TimerEntry>,
    cancelled: HashSet<u64>,
    armed: usize,
    sources: HashMap<Token, FdEntry>,
    // Tokens deregistered while their entry was checked out for dispatch.
    dead: HashSet<Token>,
    token_counter: usize,
}

struct Inner {
    waker: Waker,
    waiters: AtomicPtr<Waiter>,
    state: Mutex<LoopState>,
    clock: Arc<ClockCore>,
    timer_ids: AtomicU64,
    running: Mutex<Option<ThreadId>>,
}

/// A handle to a single-threaded reactor. Cloning shares the same loop.
#[derive(Clone)]
pub struct EventLoop {
    inner: Arc<Inner>,
}

static DEFAULT: Mutex<Option<EventLoop>> = Mutex::new(None);

impl EventLoop {
    /// Creates a fresh, independent event loop.
    pub fn new() -> EventLoop {
        let poll = Poll::new().expect("failed to create an I/O poller");
        let waker =
            Waker::new(poll.registry(), WAKER_TOKEN).expect("failed to create a loop waker");
        EventLoop {
            inner: Arc::new(Inner {
                waker,
                waiters: AtomicPtr::new(ptr::null_mut()),
                state: Mutex::new(LoopState {
                    poll,
                    events: Events::with_capacity(256),
                    timers: BinaryHeap::new(),
                    cancelled: HashSet::new(),
                    armed: 0,
                    sources: HashMap::new(),
                    dead: HashSet::new(),
                    token_counter: 0,
                }),
                clock: Arc::new(ClockCore::new()),
                timer_ids: AtomicU64::new(0),
                running: Mutex::new(None),
            }),
        }
    }

    /// Constructs the process-wide default loop. Fatal if one already
    /// exists; construction is explicit so teardown is deterministic.
    pub fn construct_default() {
        let mut slot = DEFAULT.lock().unwrap();
        assert!(slot.is_none(), "default event loop already constructed");
        *slot = Some(EventLoop::new());
    }

    /// Tears down the process-wide default loop, draining it until every
    /// handle has closed.
    pub fn destruct_default() {
        let taken = {
            let mut slot = DEFAULT.lock().unwrap();
            slot.take().expect("default event loop not yet constructed")
        };
        taken.teardown();
    }

    /// True while a default loop exists.
    pub fn has_default() -> bool {
        DEFAULT.lock().unwrap().is_some()
    }

    /// The process-wide default loop.
    pub fn default_loop() -> EventLoop {
        DEFAULT.lock().unwrap().clone().unwrap_or_else(|| {
            panic!(
                "\n\
                 ****************************************************************\n\
                 *  A default event loop has not yet been constructed!          *\n\
                 *                                                              *\n\
                 *  If you're seeing this message it probably means you forgot  *\n\
                 *  to call 'EventLoop::construct_default()' -- and don't       *\n\
                 *  forget that you also need to run the loop!                  *\n\
                 ****************************************************************\n"
            )
        })
    }

    /// The loop's virtualizable clock.
    pub fn clock(&self) -> Clock {
        Clock::new(self.inner.clock.clone(), self.clone())
    }

    /// Creates a context owned by this loop's scheduler.
    pub fn context(&self, name: impl Into<String>) -> Context {
        Context::new(Arc::new(self.clone()), name)
    }

    /// True when called from the thread currently running the loop.
    pub fn in_loop(&self) -> bool {
        *self.inner.running.lock().unwrap() == Some(thread::current().id())
    }

    /// Enqueues `callback` to run in the loop's post-phase on `context`.
    pub fn submit(&self, callback: Callback, context: &Context) {
        context.block();
        self.push_waiter(Box::new(Waiter {
            callback: Some(callback),
            context: context.clone(),
            next: ptr::null_mut(),
        }));
    }

    /// Signals the loop's async wake-up, forcing an iteration. Used after
    /// external state changes such as clock advancement or timer removal.
    pub fn interrupt(&self) {
        self.inner.waker.wake().expect("failed to wake the event loop");
    }

    /// Drives the loop until no armed timers, poll handles, or waiters
    /// remain.
    pub fn run(&self) {
        self.drive(|| false);
    }

    /// Drives the loop until `future` is ready (or the loop goes fully
    /// idle).
    pub fn run_until<V>(&self, future: &Future<V>) {
        self.drive(|| future.ready());
    }

    fn drive(&self, mut until: impl FnMut() -> bool) {
        self.claim();
        loop {
            if until() || self.idle() {
                break;
            }
            self.turn(self.poll_timeout());
        }
        self.release();
    }

    fn claim(&self) {
        let mut running = self.inner.running.lock().unwrap();
        assert!(running.is_none(), "another thread is already running the event loop");
        *running = Some(thread::current().id());
    }

    fn release(&self) {
        *self.inner.running.lock().unwrap() = None;
    }

    // One loop iteration: poll for I/O, fire due timers, then drain the
    // waiter LIFO as the post-phase.
    fn turn(&self, timeout: Option<Duration>) {
        let ready: SmallVec<[(Token, Readiness); 8]> = {
            let mut state = self.inner.state.lock().unwrap();
            let LoopState { poll, events, .. } = &mut *state;
            match poll.poll(events, timeout) {
                Ok(()) => {}
                Err(error) if error.kind() == std::io::ErrorKind::Interrupted => {}
                Err(error) => panic!("event loop poll failed: {error}"),
            }
            events
                .iter()
                .filter(|event| event.token() != WAKER_TOKEN)
                .map(|event| {
                    (
                        event.token(),
                        Readiness {
                            readable: event.is_readable() || event.is_read_closed(),
                            writable: event.is_writable() || event.is_write_closed(),
                            error: event.is_error(),
                        },
                    )
                })
                .collect()
        };
        for (token, readiness) in ready {
            self.dispatch(token, readiness);
        }
        for entry in self.due_timers() {
            if let Some(callback) = entry.callback {
                callback.invoke();
            }
        }
        self.drain_waiters();
    }

    fn dispatch(&self, token: Token, readiness: Readiness) {
        let entry = self.inner.state.lock().unwrap().sources.remove(&token);
        let Some(mut entry) = entry else { return };
        (entry.callback)(readiness);
        let mut state = self.inner.state.lock().unwrap();
        if !state.dead.remove(&token) {
            state.sources.insert(token, entry);
        }
    }

    fn due_timers(&self) -> SmallVec<[TimerEntry; 4]> {
        let now = Instant::now();
        let mut due = SmallVec::new();
        let mut guard = self.inner.state.lock().unwrap();
        let state = &mut *guard;
        while let Some(entry) = state.timers.peek() {
            let id = entry.id;
            let pending = entry.deadline > now;
            if state.cancelled.remove(&id) {
                state.timers.pop();
                continue;
            }
            if pending {
                break;
            }
            state.armed -= 1;
            due.push(state.timers.pop().unwrap());
        }
        due
    }

    fn poll_timeout(&self) -> Option<Duration> {
        if !self.waiters_empty() {
            return Some(Duration::ZERO);
        }
        let now = Instant::now();
        let mut guard = self.inner.state.lock().unwrap();
        let state = &mut *guard;
        while let Some(entry) = state.timers.peek() {
            let id = entry.id;
            let timeout = entry.deadline.saturating_duration_since(now);
            if state.cancelled.remove(&id) {
                state.timers.pop();
                continue;
            }
            return Some(timeout);
        }
        None
    }

    fn waiters_empty(&self) -> bool {
        self.inner.waiters.load(Ordering::Acquire).is_null()
    }

    // Pending paused-clock entries are deliberately not counted: they only
    // become loop work once the clock is advanced or resumed.
    fn idle(&self) -> bool {
        let state = self.inner.state.lock().unwrap();
        state.armed == 0 && state.sources.is_empty() && self.waiters_empty()
    }

    fn push_waiter(&self, waiter: Box<Waiter>) {
        let node = Box::into_raw(waiter);
        let mut head = self.inner.waiters.load(Ordering::Relaxed);
        loop {
            unsafe {
                (*node).next = head;
            }
            match self.inner.waiters.compare_exchange_weak(
                head,
                node,
                Ordering::Release,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(actual) => head = actual,
            }
        }
        self.interrupt();
    }

    // The post-phase: atomically take the whole LIFO, reverse it, and run
    // the waiters in submission order.
    fn drain_waiters(&self) {
        let mut node = self.inner.waiters.swap(ptr::null_mut(), Ordering::Acquire);
        let mut reversed: *mut Waiter = ptr::null_mut();
        while !node.is_null() {
            unsafe {
                let next = (*node).next;
                (*node).next = reversed;
                reversed = node;
                node = next;
            }
        }
        let mut node = reversed;
        while !node.is_null() {
            let mut waiter = unsafe { Box::from_raw(node) };
            node = waiter.next;
            let context = waiter.context.clone();
            let callback = waiter.callback.take();
            // The waiter's memory is released before its callback runs; the
            // callback may immediately enqueue a fresh one.
            drop(waiter);
            context.unblock();
            context.acquire();
            let guard = context.enter();
            if let Some(callback) = callback {
                callback.invoke();
            }
            drop(guard);
            context.release();
        }
    }

    pub(crate) fn add_timer(&self, delay: Duration, callback: Callback) -> u64 {
        let id = self.inner.timer_ids.fetch_add(1, Ordering::Relaxed);
        let mut state = self.inner.state.lock().unwrap();
        state.timers.push(TimerEntry {
            deadline: Instant::now() + delay,
            id,
            callback: Some(callback),
        });
        state.armed += 1;
        id
    }

    pub(crate) fn cancel_timer(&self, id: u64) {
        let mut state = self.inner.state.lock().unwrap();
        if state.cancelled.insert(id) {
            state.armed -= 1;
        }
    }

    pub(crate) fn armed_timers(&self) -> usize {
        self.inner.state.lock().unwrap().armed
    }

    pub(crate) fn register_fd(
        &self,
        fd: RawFd,
        interest: Interest,
        callback: Box<dyn FnMut(Readiness) + Send + 'static>,
    ) -> Token {
        let mut state = self.inner.state.lock().unwrap();
        state.token_counter += 1;
        let token = Token(state.token_counter);
        state
            .poll
            .registry()
            .register(&mut SourceFd(&fd), token, interest)
            .expect("failed to register a poll handle");
        state.sources.insert(token, FdEntry { fd, callback });
        token
    }

    pub(crate) fn reregister_fd(&self, token: Token, fd: RawFd, interest: Interest) {
        let state = self.inner.state.lock().unwrap();
        state
            .poll
            .registry()
            .reregister(&mut SourceFd(&fd), token, interest)
            .expect("failed to rearm a poll handle");
    }

    pub(crate) fn deregister_fd(&self, token: Token, fd: RawFd) {
        let mut state = self.inner.state.lock().unwrap();
        if state.sources.remove(&token).is_none() {
            // Checked out for dispatch right now; leave a tombstone.
            state.dead.insert(token);
        }
        state
            .poll
            .registry()
            .deregister(&mut SourceFd(&fd))
            .expect("failed to deregister a poll handle");
    }

    // Teardown refuses to finish while handles are active: iterate
    // non-blocking until quiescent, complaining periodically.
    fn teardown(self) {
        self.claim();
        let mut iterations = 0usize;
        loop {
            self.turn(Some(Duration::ZERO));
            if self.idle() {
                break;
            }
            iterations += 1;
            if iterations % TEARDOWN_WARN_ITERATIONS == 0 {
                let (armed, sources) = {
                    let state = self.inner.state.lock().unwrap();
                    (state.armed, state.sources.len())
                };
                warn!(
                    timers = armed,
                    poll_handles = sources,
                    "destructing event loop with active handles"
                );
            }
        }
        self.release();
    }
}

impl Default for EventLoop {
    fn default() -> Self {
        EventLoop::new()
    }
}

impl Scheduler for EventLoop {
    fn submit(&self, callback: Callback, context: &Context, defer: bool) {
        if !defer && self.in_loop() {
            let _guard = context.enter();
            callback.invoke();
            return;
        }
        self.submit(callback, context);
    }

    fn continuable(&self, _context: &Context) -> bool {
        self.in_loop()
    }
}
