//! Change Signal Module
//!
//! A one-shot, observable trigger used to invalidate cache entries. Entries
//! list the signals they depend on; firing a signal evicts every dependent
//! entry immediately.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::error::{CacheError, Result};

static NEXT_SIGNAL_ID: AtomicU64 = AtomicU64::new(1);

type Observer = Box<dyn FnOnce() + Send>;

thread_local! {
    /// Observers of signals fired while this thread is already delivering.
    /// `Some` while an outermost `fire` is draining.
    static PENDING: RefCell<Option<VecDeque<(u64, Observer)>>> = const { RefCell::new(None) };
}

// == Change Signal ==
/// Cancelable, observable condition that fires at most once.
///
/// Cloning is cheap and every clone refers to the same signal.
#[derive(Clone)]
pub struct ChangeSignal {
    inner: Arc<SignalInner>,
}

struct SignalInner {
    id: u64,
    /// Ids of every signal this one was combined from, transitively
    lineage: Vec<u64>,
    fired: AtomicBool,
    state: Mutex<SignalState>,
    /// Observers this signal holds on the children it was combined from
    upstream: Mutex<Vec<Registration>>,
}

impl Drop for SignalInner {
    fn drop(&mut self) {
        for registration in self.upstream.get_mut().drain(..) {
            registration.dispose();
        }
    }
}

#[derive(Default)]
struct SignalState {
    disposed: bool,
    next_observer: u64,
    observers: Vec<(u64, Observer)>,
}

impl ChangeSignal {
    // == Constructor ==
    /// Creates a new, unfired signal.
    pub fn new() -> Self {
        Self::with_lineage(Vec::new())
    }

    fn with_lineage(lineage: Vec<u64>) -> Self {
        Self {
            inner: Arc::new(SignalInner {
                id: NEXT_SIGNAL_ID.fetch_add(1, Ordering::Relaxed),
                lineage,
                fired: AtomicBool::new(false),
                state: Mutex::new(SignalState::default()),
                upstream: Mutex::new(Vec::new()),
            }),
        }
    }

    // == Combinator ==
    /// Creates a signal that fires as soon as any of `children` fires.
    ///
    /// A child that has already fired makes the combined signal fire before
    /// this returns.
    pub fn any<'a, I>(children: I) -> Result<Self>
    where
        I: IntoIterator<Item = &'a ChangeSignal>,
    {
        let children: Vec<&ChangeSignal> = children.into_iter().collect();
        if let Some(disposed) = children.iter().find(|c| c.is_disposed()) {
            return Err(disposed.disposed_error());
        }

        let mut lineage: Vec<u64> = children
            .iter()
            .flat_map(|c| std::iter::once(c.id()).chain(c.inner.lineage.iter().copied()))
            .collect();
        lineage.sort_unstable();
        lineage.dedup();

        let combined = Self::with_lineage(lineage);
        for child in children {
            let target = Arc::downgrade(&combined.inner);
            let registration = child.register(move || fire_weak(&target))?;
            combined.inner.upstream.lock().push(registration);
        }

        Ok(combined)
    }

    // == Accessors ==
    /// Process-unique identifier of this signal.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Returns true once the signal has fired.
    pub fn is_fired(&self) -> bool {
        self.inner.fired.load(Ordering::Acquire)
    }

    /// Returns true once the signal has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.inner.state.lock().disposed
    }

    /// Returns true if this signal is `other`, or was combined from it.
    pub fn derives_from(&self, other: &ChangeSignal) -> bool {
        self.id() == other.id() || self.inner.lineage.binary_search(&other.id()).is_ok()
    }

    // == Register ==
    /// Registers an observer to run when the signal fires.
    ///
    /// If the signal already fired the observer runs immediately on the
    /// calling thread. Fails with `InvalidState` once disposed.
    pub fn register<F>(&self, observer: F) -> Result<Registration>
    where
        F: FnOnce() + Send + 'static,
    {
        let mut state = self.inner.state.lock();
        if state.disposed {
            return Err(self.disposed_error());
        }

        if self.is_fired() {
            drop(state);
            run_observer(self.id(), Box::new(observer));
            return Ok(Registration::spent());
        }

        let observer_id = state.next_observer;
        state.next_observer += 1;
        state.observers.push((observer_id, Box::new(observer)));

        Ok(Registration {
            signal: Arc::downgrade(&self.inner),
            observer: Some(observer_id),
        })
    }

    // == Fire ==
    /// Fires the signal, running every pending observer once in
    /// registration order.
    ///
    /// Firing an already-fired signal does nothing. Observers run without any
    /// internal lock held, so they may fire other signals or this one again.
    /// A fire from inside an observer is queued and delivered by the
    /// outermost `fire` on this thread before it returns, so chains of any
    /// length run at constant stack depth.
    pub fn fire(&self) -> Result<()> {
        let observers = {
            let mut state = self.inner.state.lock();
            if state.disposed {
                return Err(self.disposed_error());
            }
            if self.inner.fired.swap(true, Ordering::AcqRel) {
                return Ok(());
            }
            std::mem::take(&mut state.observers)
        };

        debug!(signal = self.id(), observers = observers.len(), "Change signal fired");

        deliver(self.id(), observers);
        Ok(())
    }

    /// Fires the signal from a background task once `delay` has elapsed.
    ///
    /// Must be called from within a tokio runtime. Racing an explicit
    /// `fire` is harmless: observers still run once.
    pub fn fire_after(&self, delay: Duration) -> JoinHandle<()> {
        let signal = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(err) = signal.fire() {
                debug!(signal = signal.id(), %err, "Delayed fire skipped");
            }
        })
    }

    // == Dispose ==
    /// Drops all pending observers; later `register`/`fire` calls fail.
    pub fn dispose(&self) {
        let dropped = {
            let mut state = self.inner.state.lock();
            state.disposed = true;
            std::mem::take(&mut state.observers)
        };
        drop(dropped);
    }

    #[cfg(test)]
    fn observer_count(&self) -> usize {
        self.inner.state.lock().observers.len()
    }

    fn disposed_error(&self) -> CacheError {
        CacheError::InvalidState(format!("change signal {} is disposed", self.id()))
    }
}

impl Default for ChangeSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ChangeSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeSignal")
            .field("id", &self.id())
            .field("fired", &self.is_fired())
            .finish()
    }
}

// == Registration ==
/// Handle to an observer registered on a [`ChangeSignal`].
#[derive(Debug)]
pub struct Registration {
    signal: Weak<SignalInner>,
    observer: Option<u64>,
}

impl Registration {
    /// Registration whose observer already ran.
    fn spent() -> Self {
        Self {
            signal: Weak::new(),
            observer: None,
        }
    }

    /// Detaches the observer if it has not run yet.
    pub fn dispose(self) {
        let (Some(inner), Some(observer_id)) = (self.signal.upgrade(), self.observer) else {
            return;
        };
        let removed = {
            let mut state = inner.state.lock();
            state
                .observers
                .iter()
                .position(|(id, _)| *id == observer_id)
                .map(|index| state.observers.remove(index))
        };
        drop(removed);
    }
}

fn fire_weak(target: &Weak<SignalInner>) {
    if let Some(inner) = target.upgrade() {
        let _ = ChangeSignal { inner }.fire();
    }
}

// == Delivery ==
/// Runs `observers`, or queues them if this thread is already delivering.
fn deliver(signal: u64, observers: Vec<(u64, Observer)>) {
    let outermost = PENDING.with(|pending| {
        let mut pending = pending.borrow_mut();
        match pending.as_mut() {
            Some(queue) => {
                queue.extend(observers.into_iter().map(|(_, observer)| (signal, observer)));
                None
            }
            None => {
                *pending = Some(VecDeque::new());
                Some(observers)
            }
        }
    });
    let Some(observers) = outermost else {
        return;
    };

    let _draining = DrainGuard;
    for (_, observer) in observers {
        run_observer(signal, observer);
    }
    while let Some((signal, observer)) =
        PENDING.with(|pending| pending.borrow_mut().as_mut().and_then(VecDeque::pop_front))
    {
        run_observer(signal, observer);
    }
}

/// Ends the draining state of the current thread.
struct DrainGuard;

impl Drop for DrainGuard {
    fn drop(&mut self) {
        let leftover = PENDING.try_with(|pending| pending.borrow_mut().take());
        drop(leftover);
    }
}

fn run_observer(signal: u64, observer: Observer) {
    if panic::catch_unwind(AssertUnwindSafe(observer)).is_err() {
        error!(signal, "Change signal observer panicked");
    }
}
