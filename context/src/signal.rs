//! A one-shot broadcast notification.
//!
//! See the [`Signal`] type's documentation for details.
use crate::park;
use core::{
    fmt,
    sync::atomic::{AtomicBool, Ordering::*},
    task::Waker,
};
use parking_lot::Mutex;
use slab::Slab;
use std::{sync::Arc, time::Instant};

#[cfg(test)]
mod tests;

/// A one-shot notification that wakes every waiter at once.
///
/// A `Signal` starts out unfired. Calling [`fire`] on any handle to it
/// marks it fired, permanently, and wakes every [`Waker`] that was
/// [registered] with it. Firing is idempotent: only the first call has any
/// effect, so a `Signal` can never be "closed twice".
///
/// This is the blocking analogue of closing a channel that nobody sends on:
/// any number of threads may wait for it, either alone ([`wait`]) or
/// together with other wakeup sources (by registering a
/// [`park::thread_waker`] with each source and parking).
///
/// `Signal` is a cheap reference-counted handle; cloning it yields another
/// handle to the *same* notification.
///
/// [`fire`]: Self::fire
/// [registered]: Self::register
/// [`wait`]: Self::wait
#[derive(Clone)]
pub struct Signal {
    inner: Arc<Inner>,
}

/// A [`Waker`] registered with a [`Signal`].
///
/// Dropping the `Registration` removes the waker from the signal, if it has
/// not fired yet.
#[must_use = "dropping a `Registration` immediately deregisters its waker"]
pub struct Registration {
    signal: Signal,
    key: Option<usize>,
}

struct Inner {
    fired: AtomicBool,
    wakers: Mutex<Slab<Waker>>,
}

// === impl Signal ===

impl Signal {
    /// Returns a new, unfired `Signal`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                fired: AtomicBool::new(false),
                wakers: Mutex::new(Slab::new()),
            }),
        }
    }

    /// Fires the signal, waking every registered waker.
    ///
    /// Returns `true` if this call fired the signal, or `false` if it had
    /// already been fired.
    pub fn fire(&self) -> bool {
        if self.inner.fired.swap(true, AcqRel) {
            return false;
        }

        // Wakers may drop registrations on this same signal when woken, so
        // they must not be woken while the lock is held.
        let wakers = {
            let wakers = self.inner.wakers.lock();
            wakers.iter().map(|(_, waker)| waker.clone()).collect::<Vec<_>>()
        };
        trace!(signal = ?Arc::as_ptr(&self.inner), wakers = wakers.len(), "Signal::fire");
        for waker in wakers {
            waker.wake();
        }
        true
    }

    /// Returns `true` if this signal has been fired.
    #[inline]
    #[must_use]
    pub fn is_fired(&self) -> bool {
        self.inner.fired.load(Acquire)
    }

    /// Registers `waker` to be woken when this signal fires.
    ///
    /// If the signal has already fired, nothing is stored; callers are
    /// expected to check [`is_fired`](Self::is_fired) after registering and
    /// before blocking.
    pub fn register(&self, waker: &Waker) -> Registration {
        let mut wakers = self.inner.wakers.lock();
        let key = if self.is_fired() {
            None
        } else {
            Some(wakers.insert(waker.clone()))
        };
        Registration {
            signal: self.clone(),
            key,
        }
    }

    /// Blocks the current thread until this signal fires.
    pub fn wait(&self) {
        if self.is_fired() {
            return;
        }
        let _registration = self.register(&park::thread_waker());
        park::park_until(|| self.is_fired());
    }

    /// Blocks the current thread until this signal fires or `deadline`
    /// passes.
    ///
    /// Returns `true` if the signal fired.
    pub fn wait_deadline(&self, deadline: Instant) -> bool {
        if self.is_fired() {
            return true;
        }
        let _registration = self.register(&park::thread_waker());
        park::park_until_deadline(deadline, || self.is_fired())
    }

    /// Returns `true` if `self` and `other` are handles to the same signal.
    #[inline]
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    #[cfg(test)]
    pub(crate) fn registered(&self) -> usize {
        self.inner.wakers.lock().len()
    }
}

impl Default for Signal {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("fired", &self.is_fired())
            .field("inner", &Arc::as_ptr(&self.inner))
            .finish()
    }
}

// === impl Registration ===

impl Registration {
    /// Returns the [`Signal`] this registration belongs to.
    #[must_use]
    pub fn signal(&self) -> &Signal {
        &self.signal
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            self.signal.inner.wakers.lock().try_remove(key);
        }
    }
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("signal", &self.signal)
            .field("key", &self.key)
            .finish()
    }
}
