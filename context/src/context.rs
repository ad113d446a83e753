//! Cancellation contexts.
//!
//! A [`Context`] carries a cancellation signal across API boundaries: a
//! [`Signal`] that fires when the work the context scopes should stop, plus
//! the [`Error`] explaining why. Blocking operations that accept a context
//! race their own wakeup source against [`Context::done`] and return
//! [`Context::err`] if the context wins.
//!
//! Contexts form a tree. A child created with [`with_cancel`],
//! [`with_deadline`] or [`with_timeout`] is canceled when its parent is, with
//! the parent's reason, but canceling a child never affects its parent.
use crate::{park, signal::Registration, Signal};
use core::{fmt, task::Waker};
use parking_lot::Mutex;
use std::{
    sync::{Arc, OnceLock, Weak},
    task::Wake,
    thread,
    time::{Duration, Instant},
};

#[cfg(test)]
mod tests;

/// A source of cancellation.
pub trait Context: Send + Sync {
    /// Returns a [`Signal`] that fires when this context is canceled.
    fn done(&self) -> &Signal;

    /// Returns the reason this context was canceled, or `None` if it has not
    /// been canceled.
    ///
    /// Once `done` has fired, this always returns the same `Some` value.
    fn err(&self) -> Option<Error>;

    /// Returns the instant at which this context will be canceled
    /// automatically, if there is one.
    fn deadline(&self) -> Option<Instant> {
        None
    }

    /// Returns `true` if this context has been canceled.
    fn is_done(&self) -> bool {
        self.done().is_fired()
    }
}

/// The reason a [`Context`] was canceled.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, thiserror::Error)]
pub enum Error {
    /// The context was canceled explicitly.
    #[error("context canceled")]
    Canceled,

    /// The context's deadline passed.
    #[error("context deadline exceeded")]
    DeadlineExceeded,
}

/// A [`Context`] that is never canceled.
///
/// Returned by [`background`]. This is the root of every context tree.
#[derive(Clone, Debug, Default)]
pub struct Background {
    done: Signal,
}

/// A cancelable [`Context`].
///
/// Created by [`with_cancel`], [`with_deadline`] and [`with_timeout`].
/// Clones are handles to the same context. Once every clone and every
/// [`CancelHandle`] is dropped, a pending deadline timer exits without
/// waiting for the deadline.
#[derive(Clone)]
pub struct CancelContext {
    inner: Arc<Inner>,
}

/// Cancels the [`CancelContext`] it was created with.
///
/// Dropping a `CancelHandle` does *not* cancel the context.
#[derive(Clone)]
pub struct CancelHandle {
    inner: Arc<Inner>,
}

struct Inner {
    done: Signal,
    err: OnceLock<Error>,
    deadline: Option<Instant>,
    /// Wakes us when the parent is canceled. Released once we're canceled.
    parent: Mutex<Option<Registration>>,
}

/// Cancels a child context when woken by its parent's `done` signal.
struct Propagate {
    child: Weak<Inner>,
    parent: Arc<dyn Context>,
}

/// Returns a [`Context`] that is never canceled.
#[must_use]
pub fn background() -> Background {
    Background::default()
}

/// Returns a child of `parent` that is canceled when the returned
/// [`CancelHandle`] is [canceled](CancelHandle::cancel), or when `parent` is
/// canceled, whichever happens first.
pub fn with_cancel<P>(parent: &P) -> (CancelContext, CancelHandle)
where
    P: Context + Clone + 'static,
{
    let ctx = CancelContext::child_of(parent, parent.deadline());
    let handle = CancelHandle {
        inner: ctx.inner.clone(),
    };
    (ctx, handle)
}

/// Returns a child of `parent` that is additionally canceled with
/// [`Error::DeadlineExceeded`] once `deadline` passes.
///
/// If `parent` already has an earlier deadline, the child simply inherits
/// it. If `deadline` is already in the past, the returned context is
/// canceled before this function returns.
pub fn with_deadline<P>(parent: &P, deadline: Instant) -> (CancelContext, CancelHandle)
where
    P: Context + Clone + 'static,
{
    if let Some(parent_deadline) = parent.deadline() {
        if parent_deadline <= deadline {
            return with_cancel(parent);
        }
    }

    let ctx = CancelContext::child_of(parent, Some(deadline));
    let handle = CancelHandle {
        inner: ctx.inner.clone(),
    };

    if Instant::now() >= deadline {
        ctx.inner.cancel(Error::DeadlineExceeded);
        return (ctx, handle);
    }

    if !ctx.inner.done.is_fired() {
        let done = ctx.inner.done.clone();
        let inner = Arc::downgrade(&ctx.inner);
        thread::spawn(move || {
            if done.wait_deadline(deadline) {
                return;
            }
            if let Some(inner) = inner.upgrade() {
                debug!(?deadline, "context deadline exceeded");
                inner.cancel(Error::DeadlineExceeded);
            }
        });
    }

    (ctx, handle)
}

/// Returns a child of `parent` that is additionally canceled with
/// [`Error::DeadlineExceeded`] after `timeout` elapses.
///
/// This is shorthand for `with_deadline(parent, Instant::now() + timeout)`.
pub fn with_timeout<P>(parent: &P, timeout: Duration) -> (CancelContext, CancelHandle)
where
    P: Context + Clone + 'static,
{
    with_deadline(parent, Instant::now() + timeout)
}

/// Blocks the current thread until `ctx` is canceled, returning its reason.
pub fn wait(ctx: &dyn Context) -> Error {
    if let Some(err) = ctx.err() {
        return err;
    }
    let _registration = ctx.done().register(&park::thread_waker());
    let mut err = None;
    park::park_until(|| {
        err = ctx.err();
        err.is_some()
    });
    err.unwrap_or(Error::Canceled)
}

// === impl Background ===

impl Context for Background {
    fn done(&self) -> &Signal {
        &self.done
    }

    fn err(&self) -> Option<Error> {
        None
    }
}

// === impl CancelContext ===

impl CancelContext {
    fn child_of<P>(parent: &P, deadline: Option<Instant>) -> Self
    where
        P: Context + Clone + 'static,
    {
        let inner = Arc::new(Inner {
            done: Signal::new(),
            err: OnceLock::new(),
            deadline,
            parent: Mutex::new(None),
        });

        let propagate = Arc::new(Propagate {
            child: Arc::downgrade(&inner),
            parent: Arc::new(parent.clone()),
        });
        let registration = parent.done().register(&Waker::from(propagate));
        *inner.parent.lock() = Some(registration);

        // the parent may have been canceled before we registered.
        if let Some(err) = parent.err() {
            inner.cancel(err);
        }

        Self { inner }
    }
}

impl Context for CancelContext {
    fn done(&self) -> &Signal {
        &self.inner.done
    }

    fn err(&self) -> Option<Error> {
        self.inner.err.get().copied()
    }

    fn deadline(&self) -> Option<Instant> {
        self.inner.deadline
    }
}

impl fmt::Debug for CancelContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelContext")
            .field("err", &self.inner.err.get())
            .field("deadline", &self.inner.deadline)
            .field("done", &self.inner.done)
            .finish()
    }
}

// === impl CancelHandle ===

impl CancelHandle {
    /// Cancels the context with [`Error::Canceled`].
    ///
    /// Does nothing if the context was already canceled.
    pub fn cancel(&self) {
        self.inner.cancel(Error::Canceled);
    }
}

impl fmt::Debug for CancelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelHandle")
            .field("err", &self.inner.err.get())
            .finish()
    }
}

// === impl Inner ===

impl Inner {
    fn cancel(&self, err: Error) {
        if self.err.set(err).is_err() {
            return;
        }
        trace!(%err, "context canceled");

        let parent = self.parent.lock().take();
        drop(parent);
        self.done.fire();
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        // Nobody can observe `err` anymore. Firing releases a deadline timer
        // still parked on `done`.
        self.done.fire();
    }
}

// === impl Propagate ===

impl Wake for Propagate {
    fn wake(self: Arc<Self>) {
        self.wake_by_ref()
    }

    fn wake_by_ref(self: &Arc<Self>) {
        if let Some(child) = self.child.upgrade() {
            child.cancel(self.parent.err().unwrap_or(Error::Canceled));
        }
    }
}

// === forwarding impls ===

impl<C: Context + ?Sized> Context for &C {
    fn done(&self) -> &Signal {
        (**self).done()
    }

    fn err(&self) -> Option<Error> {
        (**self).err()
    }

    fn deadline(&self) -> Option<Instant> {
        (**self).deadline()
    }
}

impl<C: Context + ?Sized> Context for Arc<C> {
    fn done(&self) -> &Signal {
        (**self).done()
    }

    fn err(&self) -> Option<Error> {
        (**self).err()
    }

    fn deadline(&self) -> Option<Instant> {
        (**self).deadline()
    }
}

impl<C: Context + ?Sized> Context for Box<C> {
    fn done(&self) -> &Signal {
        (**self).done()
    }

    fn err(&self) -> Option<Error> {
        (**self).err()
    }

    fn deadline(&self) -> Option<Instant> {
        (**self).deadline()
    }
}
