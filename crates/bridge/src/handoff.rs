use parking_lot::Mutex;

/// Process-local opaque handle to a GPU resource exported by one graphics
/// API and importable by another.
///
/// The value stays valid only as long as the exporting texture is alive; a
/// resize on the producer side invalidates every previously issued handle,
/// so consumers must not cache it across frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExternalHandle(pub isize);

/// A converted frame as published to the render loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SharedFrame {
    pub handle: ExternalHandle,
    pub width: u32,
    pub height: u32,
}

/// Single-slot mailbox between the capture-arrival callback and the render
/// loop.
///
/// Latest-wins: each publish overwrites any unconsumed entry, so a slow
/// consumer drops intermediate frames instead of queueing them. Neither side
/// ever blocks on the other; the lock is held only across the slot access,
/// never across a draw.
#[derive(Default)]
pub struct FrameHandoff {
    slot: Mutex<Option<SharedFrame>>,
}

impl FrameHandoff {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publishes the latest converted frame, replacing any pending one.
    pub fn publish(&self, frame: SharedFrame) {
        *self.slot.lock() = Some(frame);
    }

    /// Removes and returns the pending frame, if any.
    pub fn take_latest(&self) -> Option<SharedFrame> {
        self.slot.lock().take()
    }
}
