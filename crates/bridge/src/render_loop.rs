use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use std::thread::JoinHandle;

use parking_lot::Mutex;

use crate::{Dispatch, FrameHandoff, GlesContext, GlesError, PanelHandle, Scene, SurfaceOptions};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Stopped,
    Running,
    SwapFailed,
    Recovering,
}

#[derive(Debug, thiserror::Error)]
pub enum StartRenderLoopError {
    #[error("SurfaceMissing")]
    SurfaceMissing,
    #[error("SpawnFailed/{0}")]
    SpawnFailed(std::io::Error),
}

struct RenderWorker {
    stop_flag: Arc<AtomicBool>,
    thread: JoinHandle<()>,
}

/// Drives the continuous render loop over a [`GlesContext`] surface and owns
/// that surface's lifecycle, including the stop/reset/recreate/start cycle
/// after a lost device.
///
/// The surface lock is held for the duration of each render iteration and
/// for the entirety of recovery, which makes recovery atomic with respect to
/// any in-flight iteration. Frames arrive through the [`FrameHandoff`]
/// mailbox, whose narrower lock never overlaps a draw.
pub struct RenderLoop<G: GlesContext> {
    gles: Arc<G>,
    panel: PanelHandle,
    options: SurfaceOptions,
    handoff: Arc<FrameHandoff>,
    dispatcher: Arc<dyn Dispatch>,
    scene_factory: Box<dyn Fn() -> Box<dyn Scene> + Send + Sync>,
    surface: Mutex<Option<G::Surface>>,
    worker: Mutex<Option<RenderWorker>>,
    state: Mutex<LoopState>,
}

impl<G: GlesContext> RenderLoop<G> {
    pub fn new(
        gles: Arc<G>,
        panel: PanelHandle,
        options: SurfaceOptions,
        handoff: Arc<FrameHandoff>,
        dispatcher: Arc<dyn Dispatch>,
        scene_factory: impl Fn() -> Box<dyn Scene> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            gles,
            panel,
            options,
            handoff,
            dispatcher,
            scene_factory: Box::new(scene_factory),
            surface: Mutex::new(None),
            worker: Mutex::new(None),
            state: Mutex::new(LoopState::Stopped),
        })
    }

    pub fn state(&self) -> LoopState {
        *self.state.lock()
    }

    /// Creates the render surface if it does not exist yet.
    pub fn create_render_surface(&self) -> Result<(), GlesError> {
        let mut surface = self.surface.lock();
        if surface.is_none() {
            *surface = Some(self.gles.create_surface(self.panel, self.options)?);
        }
        Ok(())
    }

    pub fn destroy_render_surface(&self) {
        if let Some(surface) = self.surface.lock().take() {
            self.gles.destroy_surface(surface);
        }
    }

    /// Starts the render worker. A no-op when the loop is already running.
    pub fn start(self: &Arc<Self>) -> Result<(), StartRenderLoopError> {
        let mut worker = self.worker.lock();
        if let Some(active) = worker.as_ref()
            && !active.thread.is_finished()
        {
            return Ok(());
        }

        if self.surface.lock().is_none() {
            return Err(StartRenderLoopError::SurfaceMissing);
        }

        let stop_flag = Arc::new(AtomicBool::new(false));
        *self.state.lock() = LoopState::Running;

        let this = Arc::clone(self);
        let flag = Arc::clone(&stop_flag);
        let thread = std::thread::Builder::new()
            .name("glint-render-loop".to_string())
            .spawn(move || this.run_render_loop(&flag))
            .map_err(|e| {
                *self.state.lock() = LoopState::Stopped;
                StartRenderLoopError::SpawnFailed(e)
            })?;

        *worker = Some(RenderWorker { stop_flag, thread });
        tracing::debug!("render loop started");
        Ok(())
    }

    /// Cancels the worker cooperatively and waits for it to exit. The flag
    /// is checked once per iteration; an iteration already past the check
    /// completes, including its swap, before the worker exits.
    pub fn stop(&self) {
        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            worker.stop_flag.store(true, Ordering::Relaxed);
            if worker.thread.join().is_err() {
                tracing::error!("render worker panicked");
            }
            tracing::debug!("render loop stopped");
        }
        *self.state.lock() = LoopState::Stopped;
    }

    /// Stop the render loop, reset the secondary API, recreate the render
    /// surface and start the render loop again to recover from a lost
    /// device. Must run on the UI-owning context; the swap-failure path
    /// dispatches it there.
    pub fn recover_from_lost_device(self: &Arc<Self>) {
        tracing::info!("recovering from lost device");
        self.stop();
        *self.state.lock() = LoopState::Recovering;

        {
            let mut surface = self.surface.lock();
            if let Some(old) = surface.take() {
                self.gles.destroy_surface(old);
            }
            self.gles.reset();
            match self.gles.create_surface(self.panel, self.options) {
                Ok(new) => *surface = Some(new),
                Err(e) => {
                    tracing::error!("surface recreation failed: {e}");
                    *self.state.lock() = LoopState::Stopped;
                    return;
                }
            }
        }

        if let Err(e) = self.start() {
            tracing::error!("failed to restart render loop: {e}");
        }
    }

    fn run_render_loop(self: Arc<Self>, stop_flag: &AtomicBool) {
        let mut scene = {
            let surface = self.surface.lock();
            let Some(surface) = surface.as_ref() else {
                return;
            };
            self.gles.make_current(surface);
            (self.scene_factory)()
        };

        while !stop_flag.load(Ordering::Relaxed) {
            let surface_guard = self.surface.lock();
            let Some(surface) = surface_guard.as_ref() else {
                break;
            };

            let (width, height) = self.gles.surface_dimensions(surface);
            scene.update_size(width, height);

            if let Some(frame) = self.handoff.take_latest() {
                self.gles
                    .bind_external_texture(frame.handle, frame.width, frame.height);
            }

            scene.draw();

            if !self.gles.swap_buffers(surface) {
                drop(surface_guard);
                *self.state.lock() = LoopState::SwapFailed;
                tracing::warn!("swap failed, scheduling device-lost recovery");

                let this = Arc::clone(&self);
                self.dispatcher
                    .dispatch(Box::new(move || this.recover_from_lost_device()));
                return;
            }
        }
    }
}
