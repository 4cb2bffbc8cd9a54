//! Camera capture source for the bridge: enumerates the first color camera,
//! negotiates a capture format, and delivers GPU-resident frames through a
//! frame-arrival callback.

#![cfg(windows)]

mod pipeline;
mod source;

pub use pipeline::*;
pub use source::*;
