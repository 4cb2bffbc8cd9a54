//! D3D11 half of the camera-to-GLES bridge: converts GPU-resident NV12
//! camera surfaces into a persistent BGRA texture exported through an OS
//! shared handle, entirely on the GPU.

#![cfg(windows)]

mod converter;
mod readback;

pub use converter::*;
pub use readback::*;
