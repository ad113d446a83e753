use crate::{Context, Error, Mutex};
use std::sync::Arc;

/// An object that can be locked and unlocked, where locking may be canceled.
///
/// Any blocking in [`lock`](Self::lock) must end, with the context's error,
/// once the [`Context`] is canceled. A canceled `lock` must leave the
/// locker unlocked on behalf of the caller.
///
/// [`CondVar`](crate::CondVar) is generic over `Locker`, so it may be used
/// with lock types other than this crate's [`Mutex`].
pub trait Locker {
    /// Acquires the lock, blocking until it is available or `cx` is
    /// canceled.
    ///
    /// # Errors
    ///
    /// Returns the context's [`Error`] if `cx` was canceled before the lock
    /// was acquired. The lock is not held in that case.
    fn lock(&self, cx: &dyn Context) -> Result<(), Error>;

    /// Releases the lock.
    ///
    /// Implementations should panic if the lock is not held.
    fn unlock(&self);
}

impl Locker for Mutex {
    #[inline]
    fn lock(&self, cx: &dyn Context) -> Result<(), Error> {
        Mutex::lock(self, cx)
    }

    #[inline]
    #[track_caller]
    fn unlock(&self) {
        Mutex::unlock(self)
    }
}

impl<L: Locker + ?Sized> Locker for &L {
    #[inline]
    fn lock(&self, cx: &dyn Context) -> Result<(), Error> {
        (**self).lock(cx)
    }

    #[inline]
    fn unlock(&self) {
        (**self).unlock()
    }
}

impl<L: Locker + ?Sized> Locker for Arc<L> {
    #[inline]
    fn lock(&self, cx: &dyn Context) -> Result<(), Error> {
        (**self).lock(cx)
    }

    #[inline]
    fn unlock(&self) {
        (**self).unlock()
    }
}

impl<L: Locker + ?Sized> Locker for Box<L> {
    #[inline]
    fn lock(&self, cx: &dyn Context) -> Result<(), Error> {
        (**self).lock(cx)
    }

    #[inline]
    fn unlock(&self) {
        (**self).unlock()
    }
}
