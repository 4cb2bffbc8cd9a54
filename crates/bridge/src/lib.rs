//! Platform-independent half of the camera-to-GLES texture bridge: the
//! single-slot frame handoff, the render loop controller with lost-device
//! recovery, the traits the secondary graphics API and UI context plug into,
//! and the capture format selection policy.

mod format;
mod gles;
mod handoff;
mod render_loop;

pub use format::*;
pub use gles::*;
pub use handoff::*;
pub use render_loop::*;
