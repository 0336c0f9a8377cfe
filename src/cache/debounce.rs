//! Resettable single-shot expiry timer.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;

type Callback = Box<dyn FnOnce() + Send + 'static>;

/// Observable phase of a [`Debouncer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerPhase {
    /// Created, never touched.
    Idle,
    /// A fire is scheduled `window` after the latest touch.
    Armed,
    /// The callback ran. Terminal.
    Fired,
    /// Disarmed by `cancel`. Terminal.
    Cancelled,
}

enum State {
    Idle,
    Armed(JoinHandle<()>),
    Fired,
    Cancelled,
}

struct Inner {
    state: State,
    /// Bumped on every touch; a sleeping task only fires if its epoch is current.
    epoch: u64,
    on_fire: Option<Callback>,
}

/// Fires its callback once, after `window` passes with no `touch`.
///
/// Cancel-previous and schedule-next happen under one lock, and the sleeping
/// task re-checks its epoch under the same lock, so a touch racing with the
/// deadline either keeps the timer armed or loses to a single fire.
///
/// `touch` spawns onto the current tokio runtime.
pub struct Debouncer {
    window: Duration,
    inner: Arc<Mutex<Inner>>,
}

impl Debouncer {
    pub fn new<F>(window: Duration, on_fire: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            window,
            inner: Arc::new(Mutex::new(Inner {
                state: State::Idle,
                epoch: 0,
                on_fire: Some(Box::new(on_fire)),
            })),
        }
    }

    /// Arm the timer, pushing any pending deadline to `now + window`.
    ///
    /// Returns `false` once the timer has fired or been cancelled; the caller
    /// then needs a new instance.
    pub fn touch(&self) -> bool {
        let mut inner = self.inner.lock();
        match &inner.state {
            State::Fired | State::Cancelled => return false,
            State::Armed(task) => task.abort(),
            State::Idle => {}
        }

        inner.epoch += 1;
        let epoch = inner.epoch;
        let shared = Arc::clone(&self.inner);
        let window = self.window;
        let task = tokio::spawn(async move {
            tokio::time::sleep(window).await;
            fire(&shared, epoch);
        });
        inner.state = State::Armed(task);
        true
    }

    /// Permanently disarm. A pending fire is dropped.
    pub fn cancel(&self) {
        let mut inner = self.inner.lock();
        if let State::Armed(task) = &inner.state {
            task.abort();
        }
        if !matches!(inner.state, State::Fired) {
            inner.state = State::Cancelled;
        }
        inner.on_fire = None;
    }

    pub fn phase(&self) -> TimerPhase {
        match self.inner.lock().state {
            State::Idle => TimerPhase::Idle,
            State::Armed(_) => TimerPhase::Armed,
            State::Fired => TimerPhase::Fired,
            State::Cancelled => TimerPhase::Cancelled,
        }
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        if let State::Armed(task) = &self.inner.lock().state {
            task.abort();
        }
    }
}

impl std::fmt::Debug for Debouncer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Debouncer")
            .field("window", &self.window)
            .field("phase", &self.phase())
            .finish()
    }
}

fn fire(shared: &Mutex<Inner>, epoch: u64) {
    let callback = {
        let mut inner = shared.lock();
        if inner.epoch != epoch || !matches!(inner.state, State::Armed(_)) {
            return;
        }
        inner.state = State::Fired;
        inner.on_fire.take()
    };
    // Run outside the lock so the callback may touch shared maps freely.
    if let Some(callback) = callback {
        callback();
    }
}
