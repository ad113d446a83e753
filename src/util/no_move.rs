use crate::loom::sync::atomic::{AtomicUsize, Ordering::*};
use core::fmt;

/// Detects a value that was moved after it was first used.
///
/// The first [`check`] stores the token's own address in the token. Every
/// later `check` compares the stored address against the current one. A
/// bitwise move of the containing struct carries the old address along, so
/// the first `check` after a move fails.
///
/// This is a best-effort diagnostic. A value moved *before* its first use is
/// not (and need not be) detected, and a move that happens to land the value
/// back at its original address goes unnoticed.
///
/// [`check`]: NoMove::check
pub(crate) struct NoMove {
    addr: AtomicUsize,
}

impl NoMove {
    pub(crate) fn new() -> Self {
        Self {
            addr: AtomicUsize::new(0),
        }
    }

    /// Returns `false` if the value containing this token has been moved
    /// since it was first checked.
    #[inline]
    #[must_use]
    pub(crate) fn check(&self) -> bool {
        let this = self as *const Self as usize;
        match self.addr.compare_exchange(0, this, AcqRel, Acquire) {
            Ok(_) => true,
            Err(claimed) => claimed == this,
        }
    }
}

impl Default for NoMove {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for NoMove {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("NoMove")
            .field(&(self.addr.load(Relaxed) as *const ()))
            .finish()
    }
}
