//! Blocking the current thread on one or more [`Signal`]s.
//!
//! A [`Waker`] returned by [`thread_waker`] unparks the thread that created
//! it. Registering the same waker with several wakeup sources and then
//! [parking] until one of them reports readiness is how a thread waits on
//! "whichever happens first".
//!
//! [`Signal`]: crate::Signal
//! [parking]: std::thread::park
use std::{
    sync::Arc,
    task::{Wake, Waker},
    thread::{self, Thread},
    time::Instant,
};

struct Unparker(Thread);

impl Wake for Unparker {
    fn wake(self: Arc<Self>) {
        self.0.unpark();
    }

    fn wake_by_ref(self: &Arc<Self>) {
        self.0.unpark();
    }
}

/// Returns a [`Waker`] that unparks the current thread when woken.
#[must_use]
pub fn thread_waker() -> Waker {
    Waker::from(Arc::new(Unparker(thread::current())))
}

/// Parks the current thread until `ready` returns `true`.
///
/// The caller must have registered a [`thread_waker`] with whatever makes
/// `ready` become true, or this will block forever. Spurious unparks are
/// absorbed by re-checking `ready`.
pub fn park_until(mut ready: impl FnMut() -> bool) {
    while !ready() {
        thread::park();
    }
}

/// Parks the current thread until `ready` returns `true` or `deadline`
/// passes.
///
/// Returns the final value of `ready`.
pub fn park_until_deadline(deadline: Instant, mut ready: impl FnMut() -> bool) -> bool {
    loop {
        if ready() {
            return true;
        }
        let now = Instant::now();
        if now >= deadline {
            return false;
        }
        thread::park_timeout(deadline - now);
    }
}
