//! A cancelable [condition variable].
//!
//! See the documentation on the [`CondVar`] type for details.
//!
//! [condition variable]: https://en.wikipedia.org/wiki/Monitor_(synchronization)#Condition_variables
use crate::{
    context::{park, Signal},
    loom::sync::blocking,
    util::NoMove,
    Context, Error, Locker,
};
use core::fmt;
use slab::Slab;


/// A condition variable whose [`wait`] operation can be canceled.
///
/// A `CondVar` is a rendezvous point for threads waiting for, or announcing,
/// some change to state protected by a [`Locker`] (usually a
/// [`Mutex`](crate::Mutex)). The locker must be held when changing that
/// state and when calling [`wait`].
///
/// Each call to [`wait`] registers a fresh one-shot [`Signal`] with the
/// condition variable. [`signal`] removes and fires one of them;
/// [`broadcast`] removes and fires all of them. Because each waiter's signal
/// is removed as it is fired, no waiter is ever woken twice by the same
/// notification.
///
/// Waiters are not woken in any particular order. Fairness between woken
/// waiters comes from the locker they all re-acquire.
///
/// Because the locker is not held when [`wait`] first wakes up, the condition
/// being waited for may no longer be true when `wait` returns. Callers
/// should wait in a loop:
///
/// ```
/// use cancel_sync::{context, CondVar, Error, Mutex};
/// use std::sync::atomic::{AtomicBool, Ordering};
///
/// fn wait_until_ready(
///     cond: &CondVar<Mutex>,
///     ready: &AtomicBool,
///     cx: &dyn context::Context,
/// ) -> Result<(), Error> {
///     cond.locker().lock(cx)?;
///     while !ready.load(Ordering::Acquire) {
///         // if `wait` fails, the lock is not held.
///         cond.wait(cx)?;
///     }
///     // ... make use of the condition ...
///     cond.locker().unlock();
///     Ok(())
/// }
/// # let cond = CondVar::new(Mutex::new());
/// # let ready = AtomicBool::new(true);
/// # wait_until_ready(&cond, &ready, &context::background()).unwrap();
/// ```
///
/// A `CondVar` must not be moved once it has been used.
///
/// [`wait`]: Self::wait
/// [`signal`]: Self::signal
/// [`broadcast`]: Self::broadcast
pub struct CondVar<L> {
    locker: L,
    waiters: blocking::Mutex<Slab<Signal>>,
    no_move: NoMove,
}

impl<L> CondVar<L> {
    /// Returns a new `CondVar` associated with `locker`.
    #[must_use]
    pub fn new(locker: L) -> Self {
        Self {
            locker,
            waiters: blocking::Mutex::new(Slab::new()),
            no_move: NoMove::new(),
        }
    }

    /// Returns a reference to the [`Locker`] associated with this condition
    /// variable.
    #[inline]
    #[must_use]
    pub fn locker(&self) -> &L {
        &self.locker
    }

    /// Returns the number of threads currently waiting to be notified.
    #[must_use]
    pub fn waiters(&self) -> usize {
        self.waiters.with_lock(|waiters| waiters.len())
    }

    /// Wakes one thread waiting on this condition variable, if there is
    /// one.
    ///
    /// It is allowed, but not required, to hold the locker while calling
    /// this.
    ///
    /// # Panics
    ///
    /// If the condition variable was moved after it was first used.
    #[track_caller]
    pub fn signal(&self) {
        assert!(
            self.no_move.check(),
            "CondVar::signal: condition variable was moved after first use"
        );
        self.waiters.with_lock(|waiters| {
            let Some(key) = waiters.iter().next().map(|(key, _)| key) else {
                return;
            };
            waiters.remove(key).fire();
            trace!(cond = ?crate::util::fmt::ptr(self), key, remaining = waiters.len(), "CondVar::signal");
        });
    }

    /// Wakes every thread waiting on this condition variable.
    ///
    /// It is allowed, but not required, to hold the locker while calling
    /// this.
    ///
    /// # Panics
    ///
    /// If the condition variable was moved after it was first used.
    #[track_caller]
    pub fn broadcast(&self) {
        assert!(
            self.no_move.check(),
            "CondVar::broadcast: condition variable was moved after first use"
        );
        self.waiters.with_lock(|waiters| {
            trace!(
                cond = ?crate::util::fmt::ptr(self),
                woken = waiters.len(),
                "CondVar::broadcast"
            );
            for notified in waiters.drain() {
                notified.fire();
            }
        });
    }
}

impl<L: Locker> CondVar<L> {
    /// Atomically unlocks the locker and blocks the current thread until
    /// this condition variable is notified or `cx` is canceled.
    ///
    /// Once notified, this re-acquires the locker before returning, using
    /// the same `cx`. Spurious wakeups do not happen: `wait` only returns
    /// successfully after a [`signal`] or [`broadcast`] chose this waiter.
    ///
    /// # Errors
    ///
    /// Returns [`cx.err()`](Context::err) if the context was canceled,
    /// either while waiting to be notified, or while re-acquiring the
    /// locker after being notified. **In either case, the locker is not
    /// held when this returns an error.**
    ///
    /// # Panics
    ///
    /// - If the condition variable was moved after it was first used.
    /// - If the locker's `unlock` panics, typically because the caller did
    ///   not hold it.
    ///
    /// [`signal`]: Self::signal
    /// [`broadcast`]: Self::broadcast
    #[track_caller]
    pub fn wait(&self, cx: &dyn Context) -> Result<(), Error> {
        assert!(
            self.no_move.check(),
            "CondVar::wait: condition variable was moved after first use"
        );

        let notified = Signal::new();
        let key = self
            .waiters
            .with_lock(|waiters| waiters.insert(notified.clone()));
        self.locker.unlock();

        let waker = park::thread_waker();
        {
            let _notified = notified.register(&waker);
            let _canceled = cx.done().register(&waker);
            park::park_until(|| notified.is_fired() || cx.is_done());
        }

        if !notified.is_fired() {
            if let Some(err) = cx.err() {
                // A fired signal has already been removed, and its key may
                // since have been handed to another waiter.
                self.waiters.with_lock(|waiters| {
                    if waiters
                        .get(key)
                        .map_or(false, |registered| registered.ptr_eq(&notified))
                    {
                        waiters.remove(key);
                    }
                });
                debug!(cond = ?crate::util::fmt::ptr(self), key, %err, "CondVar::wait: canceled");
                return Err(err);
            }
        }

        trace!(cond = ?crate::util::fmt::ptr(self), key, "CondVar::wait: notified");
        self.locker.lock(cx)
    }
}

impl<L: Default> Default for CondVar<L> {
    fn default() -> Self {
        Self::new(L::default())
    }
}

impl<L: fmt::Debug> fmt::Debug for CondVar<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CondVar")
            .field("locker", &self.locker)
            .field("waiters", &self.waiters())
            .finish()
    }
}
