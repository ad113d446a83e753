#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg, doc_cfg_hide))]
#![cfg_attr(docsrs, doc(cfg_hide(docsrs, loom)))]
#![warn(missing_docs, missing_debug_implementations)]

pub(crate) mod loom;

#[macro_use]
mod util;

pub mod cond;
mod locker;
pub mod mutex;
pub mod wait_queue;

#[doc(inline)]
pub use self::cond::CondVar;
#[doc(inline)]
pub use self::locker::Locker;
#[doc(inline)]
pub use self::mutex::{Mutex, STARVATION_THRESHOLD};
#[doc(inline)]
pub use self::wait_queue::WaitQueue;

pub use cancel_context as context;
#[doc(inline)]
pub use cancel_context::{Context, Error};
