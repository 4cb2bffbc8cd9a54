use crate::handoff::ExternalHandle;

/// Opaque handle to the display panel the render surface attaches to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PanelHandle(pub isize);

/// Sizing options for the render surface. By default the surface matches the
/// panel; a fixed size or a resolution scale can be requested instead, which
/// the compositor scales up for free on most mobile hardware.
#[derive(Debug, Clone, Copy, Default)]
pub struct SurfaceOptions {
    pub size: Option<(u32, u32)>,
    pub resolution_scale: Option<f32>,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum GlesError {
    #[error("CreateSurface/{0}")]
    CreateSurface(String),
}

/// The secondary graphics API the bridge renders through (an ANGLE/EGL-style
/// service). The bridge only ever drives it through this seam; surface and
/// context creation details stay on the implementor's side.
pub trait GlesContext: Send + Sync + 'static {
    type Surface: Send + 'static;

    fn create_surface(
        &self,
        panel: PanelHandle,
        options: SurfaceOptions,
    ) -> Result<Self::Surface, GlesError>;

    fn destroy_surface(&self, surface: Self::Surface);

    fn make_current(&self, surface: &Self::Surface);

    fn surface_dimensions(&self, surface: &Self::Surface) -> (u32, u32);

    /// Presents the surface. A `false` return is the device-lost signal and
    /// triggers the recovery cycle; there is no other failure channel.
    fn swap_buffers(&self, surface: &Self::Surface) -> bool;

    /// Imports the shared texture behind `handle` and binds it for the scene
    /// to sample. Called at most once per render iteration, with whatever
    /// handle the producer last published.
    fn bind_external_texture(&self, handle: ExternalHandle, width: u32, height: u32);

    /// Tears down the API's global state after a lost device. Only called
    /// with no surface alive and no render worker running.
    fn reset(&self);
}

/// Scene drawing, opaque to the bridge beyond sizing and the draw call
/// itself. Constructed on the render worker thread once the context is
/// current, so implementations may allocate GL resources in their
/// constructor.
pub trait Scene {
    fn update_size(&mut self, width: u32, height: u32);
    fn draw(&mut self);
}

/// The UI-owning execution context. Lost-device recovery is marshaled here
/// because the windowing layer's surface may only be touched from its owning
/// thread.
///
/// Implementations must queue `work` to that thread, never run it inline on
/// the caller: the render worker dispatches its own recovery right before
/// exiting, and recovery joins the worker.
pub trait Dispatch: Send + Sync + 'static {
    fn dispatch(&self, work: Box<dyn FnOnce() + Send>);
}
