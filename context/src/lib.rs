#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs, missing_debug_implementations)]

#[macro_use]
mod util;

pub mod context;
pub mod park;
pub mod signal;

#[doc(inline)]
pub use self::context::{
    background, wait, with_cancel, with_deadline, with_timeout, Background,
    CancelContext, CancelHandle, Context, Error,
};
#[doc(inline)]
pub use self::signal::{Registration, Signal};
