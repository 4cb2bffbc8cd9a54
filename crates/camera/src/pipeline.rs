use std::sync::Arc;

use glint_bridge::FrameHandoff;
use glint_direct3d::Nv12ToBgra;

use crate::{CameraSource, OpenCameraError, StartCameraError, StopCameraError};

#[derive(Debug, thiserror::Error)]
pub enum StartBridgeError {
    #[error(transparent)]
    Open(#[from] OpenCameraError),
    #[error(transparent)]
    Start(#[from] StartCameraError),
}

/// Producer half of the bridge: camera surfaces in, shared-texture frames
/// out.
///
/// Each arriving surface is converted on the GPU inside the arrival callback
/// and the resulting handle published to the handoff. The capture path never
/// waits on the render loop; a frame that fails to convert is logged and
/// dropped, not retried.
pub struct CameraBridge {
    source: CameraSource,
    handoff: Arc<FrameHandoff>,
}

impl CameraBridge {
    pub fn start(handoff: Arc<FrameHandoff>) -> Result<Self, StartBridgeError> {
        let mut source = CameraSource::open()?;

        let mut converter = Nv12ToBgra::new();
        let publish_to = Arc::clone(&handoff);
        source.start(move |texture| match converter.convert(texture) {
            Ok(frame) => publish_to.publish(frame),
            Err(e) => tracing::error!("frame conversion failed: {e}"),
        })?;

        Ok(Self { source, handoff })
    }

    pub fn handoff(&self) -> &Arc<FrameHandoff> {
        &self.handoff
    }

    pub fn stop(&mut self) -> Result<(), StopCameraError> {
        self.source.stop()
    }
}
