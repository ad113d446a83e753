#[allow(unused_imports)]
pub(crate) use self::inner::*;

#[cfg(loom)]
mod inner {
    #![allow(dead_code)]
    #![allow(unused_imports)]

    pub(crate) use loom::{model, thread};

    pub(crate) mod sync {
        pub(crate) use loom::sync::*;

        pub(crate) mod blocking {
            use core::fmt;

            /// Mock version of the `parking_lot` mutex that guards wait
            /// lists, using `loom::sync::Mutex`.
            pub(crate) struct Mutex<T>(loom::sync::Mutex<T>);

            impl<T> Mutex<T> {
                #[track_caller]
                pub(crate) fn new(t: T) -> Self {
                    Self(loom::sync::Mutex::new(t))
                }

                #[track_caller]
                pub(crate) fn with_lock<U>(&self, f: impl FnOnce(&mut T) -> U) -> U {
                    let mut guard = self.0.lock().expect("loom mutex will never poison");
                    f(&mut *guard)
                }
            }

            impl<T: fmt::Debug> fmt::Debug for Mutex<T> {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    self.0.fmt(f)
                }
            }
        }
    }
}

#[cfg(not(loom))]
mod inner {
    #![allow(dead_code, unused_imports)]

    pub(crate) mod sync {
        pub(crate) use std::sync::*;

        pub(crate) mod blocking {
            use core::fmt;

            /// A short-held lock around a wait list.
            ///
            /// This is never held across a blocking wait, so an OS mutex with
            /// no cancellation support is fine here.
            pub(crate) struct Mutex<T>(parking_lot::Mutex<T>);

            impl<T> Mutex<T> {
                pub(crate) const fn new(t: T) -> Self {
                    Self(parking_lot::const_mutex(t))
                }

                #[inline]
                pub(crate) fn with_lock<U>(&self, f: impl FnOnce(&mut T) -> U) -> U {
                    f(&mut *self.0.lock())
                }
            }

            impl<T: fmt::Debug> fmt::Debug for Mutex<T> {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    self.0.fmt(f)
                }
            }
        }
    }


    #[cfg(not(test))]
    pub(crate) mod thread {
        pub(crate) use std::thread::yield_now;
    }

    #[cfg(test)]
    pub(crate) fn model(f: impl FnOnce()) {
        let _trace = crate::util::test::trace_init();
        let _span = tracing::info_span!(
            "test",
            message = std::thread::current().name().unwrap_or("<unnamed>")
        )
        .entered();

        tracing::info!("started test...");
        f();
        tracing::info!("test completed successfully!");
    }
}
