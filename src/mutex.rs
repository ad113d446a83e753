//! A cancelable [mutual exclusion lock].
//!
//! See the documentation on the [`Mutex`] type for details.
//!
//! [mutual exclusion lock]: https://en.wikipedia.org/wiki/Mutual_exclusion
use crate::{
    context::park,
    loom::{
        sync::{
            atomic::{AtomicBool, AtomicUsize, Ordering::*},
            blocking,
        },
        thread,
    },
    util::NoMove,
    wait_queue::WaitQueue,
    Context, Error,
};
use core::{fmt, task::Waker};
use slab::Slab;
use std::time::{Duration, Instant};


/// How long a waiter may be kept waiting before a [`Mutex`] switches to
/// starvation mode, unless overridden with
/// [`Mutex::with_starvation_threshold`].
pub const STARVATION_THRESHOLD: Duration = Duration::from_millis(1);

/// A [mutual exclusion lock][mutex] whose [`lock`] operation can be
/// canceled.
///
/// Unlike [`std::sync::Mutex`], this lock does not own the data it protects,
/// and it is not released by dropping a guard: it is a bare lock with
/// [`lock`] and [`unlock`] operations, in the manner of the [`Locker`]
/// trait. A thread blocked in [`lock`] stops waiting as soon as the
/// [`Context`] passed to it is canceled, and returns that context's
/// [`Error`] without acquiring the lock.
///
/// A locked `Mutex` is not associated with a particular thread. One thread
/// may lock it and another unlock it.
///
/// # Fairness
///
/// The mutex operates in one of two modes:
///
/// - **Normal mode**: whenever the lock is released, every blocked waiter
///   is woken and they race to acquire it. A thread that calls [`lock`]
///   just as the lock is released may "barge" ahead of threads that have
///   been waiting for much longer. This gives the best throughput, since
///   a thread that is already running can usually take the lock before a
///   sleeping one wakes up.
/// - **Starvation mode**: only the waiter that has been waiting the
///   longest (the head of the mutex's [`WaitQueue`]) may acquire the
///   lock. Newly arriving threads queue up behind it.
///
/// A waiter that has been kept waiting for longer than the mutex's
/// [starvation threshold] switches the mutex to starvation mode. A waiter
/// that acquires the lock in starvation mode switches it back to normal
/// mode if it was the last one queued, or if it waited for less than the
/// threshold.
///
/// # Misuse
///
/// [`unlock`]ing a mutex that is not locked panics. A `Mutex` must not be
/// moved once it has been used: after its first [`lock`] or [`unlock`],
/// any further call on a moved `Mutex` panics.
///
/// [mutex]: https://en.wikipedia.org/wiki/Mutual_exclusion
/// [`lock`]: Self::lock
/// [`unlock`]: Self::unlock
/// [`Locker`]: crate::Locker
/// [starvation threshold]: Self::with_starvation_threshold
pub struct Mutex {
    /// The token of the current holder, or [`UNLOCKED`].
    state: AtomicUsize,
    next_token: AtomicUsize,
    starving: AtomicBool,
    queue: WaitQueue,
    /// Threads waiting for a particular holder to release the lock.
    releases: blocking::Mutex<Slab<ReleaseWaiter>>,
    starvation_threshold: Duration,
    no_move: NoMove,
}

struct ReleaseWaiter {
    holder: usize,
    waker: Waker,
}

/// Removes a [`ReleaseWaiter`] from the registry when the waiting thread is done
/// with it. Only the owner ever removes its entry, so a key is never freed
/// out from under it.
struct ReleaseRegistration<'a> {
    mutex: &'a Mutex,
    key: usize,
}

const UNLOCKED: usize = 0;

// === impl Mutex ===

impl Mutex {
    /// Returns a new, unlocked `Mutex` using the default
    /// [`STARVATION_THRESHOLD`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_starvation_threshold(STARVATION_THRESHOLD)
    }

    /// Returns a new, unlocked `Mutex` that switches to starvation mode once
    /// a waiter has been kept waiting for longer than `threshold`.
    #[must_use]
    pub fn with_starvation_threshold(threshold: Duration) -> Self {
        Self {
            state: AtomicUsize::new(UNLOCKED),
            next_token: AtomicUsize::new(UNLOCKED + 1),
            starving: AtomicBool::new(false),
            queue: WaitQueue::new(),
            releases: blocking::Mutex::new(Slab::new()),
            starvation_threshold: threshold,
            no_move: NoMove::new(),
        }
    }

    /// Locks the mutex, blocking the current thread until the lock is
    /// available or `cx` is canceled.
    ///
    /// If `cx` is already canceled, this returns immediately, without
    /// attempting to acquire the lock.
    ///
    /// # Errors
    ///
    /// Returns [`cx.err()`](Context::err) if the context was canceled
    /// before the lock was acquired. The lock is not held in that case.
    ///
    /// # Panics
    ///
    /// If the mutex was moved after it was first used.
    #[track_caller]
    pub fn lock(&self, cx: &dyn Context) -> Result<(), Error> {
        assert!(
            self.no_move.check(),
            "Mutex::lock: mutex was moved after first use"
        );
        if let Some(err) = cx.err() {
            trace!(mutex = ?crate::util::fmt::ptr(self), %err, "Mutex::lock: already canceled");
            return Err(err);
        }

        let token = self.next_token();
        let mut entry = self.queue.entry();
        let mut wait_start: Option<Instant> = None;
        let mut waker: Option<Waker> = None;

        loop {
            let starving = self.starving.load(Acquire);
            if (!starving || entry.is_head())
                && test_dbg!(self.state.compare_exchange(UNLOCKED, token, Acquire, Relaxed)).is_ok()
            {
                let remaining = entry.remove();
                self.acquired(wait_start, remaining);
                return Ok(());
            }

            let holder = self.state.load(Acquire);
            match wait_start {
                None => {
                    wait_start = Some(Instant::now());
                    entry.append();
                }
                Some(start) if start.elapsed() > self.starvation_threshold => {
                    if !self.starving.swap(true, AcqRel) {
                        debug!(mutex = ?crate::util::fmt::ptr(self), "Mutex::lock: entering starvation mode");
                    }
                }
                Some(_) => {}
            }

            if holder == UNLOCKED {
                // Released since the last attempt, or free but reserved for
                // the head of the queue.
                if let Some(err) = cx.err() {
                    debug!(mutex = ?crate::util::fmt::ptr(self), %err, "Mutex::lock: canceled");
                    return Err(err);
                }
                if starving {
                    thread::yield_now();
                }
                continue;
            }

            let waker = waker.get_or_insert_with(park::thread_waker);
            if let Err(err) = self.wait_for_release(holder, cx, waker) {
                debug!(mutex = ?crate::util::fmt::ptr(self), %err, "Mutex::lock: canceled");
                return Err(err);
            }
        }
    }

    /// Attempts to lock the mutex without blocking, returning `true` if the
    /// lock was acquired.
    ///
    /// In starvation mode, this fails whenever other threads are queued,
    /// even if the lock is free.
    ///
    /// # Panics
    ///
    /// If the mutex was moved after it was first used.
    #[track_caller]
    #[must_use]
    pub fn try_lock(&self) -> bool {
        assert!(
            self.no_move.check(),
            "Mutex::try_lock: mutex was moved after first use"
        );
        if self.starving.load(Acquire) && !self.queue.is_empty() {
            return false;
        }
        let token = self.next_token();
        self.state
            .compare_exchange(UNLOCKED, token, Acquire, Relaxed)
            .is_ok()
    }

    /// Unlocks the mutex, waking every thread waiting for it.
    ///
    /// The mutex may be unlocked by a different thread than the one that
    /// locked it.
    ///
    /// # Panics
    ///
    /// - If the mutex is not locked.
    /// - If the mutex was moved after it was first used.
    #[track_caller]
    pub fn unlock(&self) {
        assert!(
            self.no_move.check(),
            "Mutex::unlock: mutex was moved after first use"
        );
        let holder = self.state.swap(UNLOCKED, AcqRel);
        if holder == UNLOCKED {
            panic!("Mutex::unlock: not locked");
        }

        let wakers: Vec<Waker> = self.releases.with_lock(|releases| {
            releases
                .iter()
                .filter(|(_, release)| release.holder == holder)
                .map(|(_, release)| release.waker.clone())
                .collect()
        });
        trace!(mutex = ?crate::util::fmt::ptr(self), holder, waiters = wakers.len(), "Mutex::unlock");
        for waker in wakers {
            waker.wake();
        }
    }

    /// Returns `true` if the mutex is currently locked.
    #[inline]
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.state.load(Acquire) != UNLOCKED
    }

    /// Returns `true` if the mutex is currently in starvation mode.
    #[inline]
    #[must_use]
    pub fn is_starving(&self) -> bool {
        self.starving.load(Acquire)
    }

    /// Returns the duration after which a waiting thread switches this mutex
    /// to starvation mode.
    #[inline]
    #[must_use]
    pub fn starvation_threshold(&self) -> Duration {
        self.starvation_threshold
    }

    fn next_token(&self) -> usize {
        loop {
            let token = self.next_token.fetch_add(1, Relaxed);
            if token != UNLOCKED {
                return token;
            }
        }
    }

    fn acquired(&self, wait_start: Option<Instant>, remaining: usize) {
        if !self.starving.load(Acquire) {
            return;
        }
        let waited = wait_start.map(|start| start.elapsed()).unwrap_or_default();
        if remaining == 0 || waited < self.starvation_threshold {
            self.starving.store(false, Release);
            debug!(
                mutex = ?crate::util::fmt::ptr(self),
                remaining,
                ?waited,
                "Mutex::lock: leaving starvation mode"
            );
        }
    }

    /// Blocks until `holder` releases the lock or `cx` is canceled.
    fn wait_for_release(&self, holder: usize, cx: &dyn Context, waker: &Waker) -> Result<(), Error> {
        let key = self.releases.with_lock(|releases| {
            releases.insert(ReleaseWaiter {
                holder,
                waker: waker.clone(),
            })
        });
        let _release = ReleaseRegistration { mutex: self, key };
        let _canceled = cx.done().register(waker);

        // `holder` may have released the lock before we registered; if so,
        // the first check sees it.
        park::park_until(|| self.state.load(Acquire) != holder || cx.is_done());

        match cx.err() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl Default for Mutex {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Mutex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mutex")
            .field("locked", &self.is_locked())
            .field("starving", &self.is_starving())
            .field("waiters", &self.queue.len())
            .field("starvation_threshold", &self.starvation_threshold)
            .finish()
    }
}

// === impl ReleaseRegistration ===

impl Drop for ReleaseRegistration<'_> {
    fn drop(&mut self) {
        self.mutex.releases.with_lock(|releases| {
            releases.try_remove(self.key);
        });
    }
}
