use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, mpsc};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use glint_bridge::{
    Dispatch, ExternalHandle, FrameHandoff, GlesContext, GlesError, LoopState, PanelHandle,
    RenderLoop, Scene, SharedFrame, SurfaceOptions,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Event {
    CreateSurface(u64),
    DestroySurface(u64),
    MakeCurrent(u64),
    Bind(ExternalHandle, u32, u32),
    SwapOk(u64),
    SwapFailed(u64),
    Reset,
}

/// Scripted stand-in for the ANGLE-style service: surfaces are ids, every
/// call is recorded, and the next swap can be armed to fail.
struct FakeGles {
    events: Mutex<Vec<Event>>,
    next_surface: AtomicU64,
    swap_count: AtomicUsize,
    fail_next_swap: AtomicBool,
}

impl FakeGles {
    fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            next_surface: AtomicU64::new(1),
            swap_count: AtomicUsize::new(0),
            fail_next_swap: AtomicBool::new(false),
        }
    }

    fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    fn record(&self, event: Event) {
        self.events.lock().push(event);
    }

    fn swap_count(&self) -> usize {
        self.swap_count.load(Ordering::SeqCst)
    }

    fn arm_swap_failure(&self) {
        self.fail_next_swap.store(true, Ordering::SeqCst);
    }
}

impl GlesContext for FakeGles {
    type Surface = u64;

    fn create_surface(
        &self,
        _panel: PanelHandle,
        _options: SurfaceOptions,
    ) -> Result<u64, GlesError> {
        let id = self.next_surface.fetch_add(1, Ordering::SeqCst);
        self.record(Event::CreateSurface(id));
        Ok(id)
    }

    fn destroy_surface(&self, surface: u64) {
        self.record(Event::DestroySurface(surface));
    }

    fn make_current(&self, surface: &u64) {
        self.record(Event::MakeCurrent(*surface));
    }

    fn surface_dimensions(&self, _surface: &u64) -> (u32, u32) {
        (800, 600)
    }

    fn swap_buffers(&self, surface: &u64) -> bool {
        if self.fail_next_swap.swap(false, Ordering::SeqCst) {
            self.record(Event::SwapFailed(*surface));
            return false;
        }
        self.record(Event::SwapOk(*surface));
        self.swap_count.fetch_add(1, Ordering::SeqCst);
        true
    }

    fn bind_external_texture(&self, handle: ExternalHandle, width: u32, height: u32) {
        self.record(Event::Bind(handle, width, height));
    }

    fn reset(&self) {
        self.record(Event::Reset);
    }
}

struct NullScene;

impl Scene for NullScene {
    fn update_size(&mut self, _width: u32, _height: u32) {}
    fn draw(&mut self) {}
}

/// Queues dispatched work for the test thread to pump, the way a UI
/// dispatcher would.
struct QueueDispatch(mpsc::Sender<Box<dyn FnOnce() + Send>>);

impl Dispatch for QueueDispatch {
    fn dispatch(&self, work: Box<dyn FnOnce() + Send>) {
        self.0.send(work).expect("dispatcher queue closed");
    }
}

struct Harness {
    gles: Arc<FakeGles>,
    render_loop: Arc<RenderLoop<FakeGles>>,
    handoff: Arc<FrameHandoff>,
    dispatched: mpsc::Receiver<Box<dyn FnOnce() + Send>>,
}

fn harness() -> Harness {
    let gles = Arc::new(FakeGles::new());
    let handoff = Arc::new(FrameHandoff::new());
    let (tx, rx) = mpsc::channel();
    let render_loop = RenderLoop::new(
        Arc::clone(&gles),
        PanelHandle(0x5afe),
        SurfaceOptions::default(),
        Arc::clone(&handoff),
        Arc::new(QueueDispatch(tx)),
        || Box::new(NullScene),
    );
    Harness {
        gles,
        render_loop,
        handoff,
        dispatched: rx,
    }
}

fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting for condition");
        std::thread::sleep(Duration::from_millis(1));
    }
}

#[test]
fn renders_and_stops_cleanly() {
    let h = harness();
    h.render_loop.create_render_surface().unwrap();
    h.render_loop.start().unwrap();
    assert_eq!(h.render_loop.state(), LoopState::Running);

    wait_until(|| h.gles.swap_count() >= 3);

    h.render_loop.stop();
    assert_eq!(h.render_loop.state(), LoopState::Stopped);

    // No further iterations after stop returned.
    let swaps = h.gles.swap_count();
    std::thread::sleep(Duration::from_millis(20));
    assert_eq!(h.gles.swap_count(), swaps);
}

#[test]
fn start_without_surface_is_rejected() {
    let h = harness();
    assert!(h.render_loop.start().is_err());
}

#[test]
fn start_is_idempotent_while_running() {
    let h = harness();
    h.render_loop.create_render_surface().unwrap();
    h.render_loop.start().unwrap();
    wait_until(|| h.gles.swap_count() >= 1);
    h.render_loop.start().unwrap();
    h.render_loop.stop();

    let make_current_count = h
        .gles
        .events()
        .iter()
        .filter(|e| matches!(e, Event::MakeCurrent(_)))
        .count();
    assert_eq!(make_current_count, 1, "second start must not spawn a worker");
}

#[test]
fn latest_published_frame_is_bound() {
    let h = harness();
    h.handoff.publish(SharedFrame {
        handle: ExternalHandle(11),
        width: 320,
        height: 180,
    });
    h.handoff.publish(SharedFrame {
        handle: ExternalHandle(22),
        width: 640,
        height: 360,
    });

    h.render_loop.create_render_surface().unwrap();
    h.render_loop.start().unwrap();
    wait_until(|| {
        h.gles
            .events()
            .iter()
            .any(|e| matches!(e, Event::Bind(..)))
    });
    h.render_loop.stop();

    let binds: Vec<Event> = h
        .gles
        .events()
        .into_iter()
        .filter(|e| matches!(e, Event::Bind(..)))
        .collect();
    assert_eq!(binds, vec![Event::Bind(ExternalHandle(22), 640, 360)]);
}

#[test]
fn swap_failure_runs_full_recovery_cycle() {
    let h = harness();
    h.render_loop.create_render_surface().unwrap();
    h.render_loop.start().unwrap();
    wait_until(|| h.gles.swap_count() >= 2);

    h.gles.arm_swap_failure();

    // The worker marshals recovery to the UI context and exits.
    let recovery = h
        .dispatched
        .recv_timeout(Duration::from_secs(5))
        .expect("recovery was not dispatched");
    assert_eq!(h.render_loop.state(), LoopState::SwapFailed);

    let swaps_before_recovery = h.gles.swap_count();
    std::thread::sleep(Duration::from_millis(20));
    assert_eq!(
        h.gles.swap_count(),
        swaps_before_recovery,
        "worker must not keep swapping after a failed swap"
    );

    // Pump the UI context.
    recovery();
    assert_eq!(h.render_loop.state(), LoopState::Running);

    // destroy -> reset -> create, in order, after the failed swap.
    let events = h.gles.events();
    let failed_at = events
        .iter()
        .position(|e| matches!(e, Event::SwapFailed(_)))
        .expect("failed swap not recorded");
    let destroyed_at = events
        .iter()
        .position(|e| matches!(e, Event::DestroySurface(_)))
        .expect("surface was not destroyed");
    let reset_at = events
        .iter()
        .position(|e| matches!(e, Event::Reset))
        .expect("context was not reset");
    let recreated_at = events
        .iter()
        .rposition(|e| matches!(e, Event::CreateSurface(_)))
        .expect("surface was not recreated");
    assert!(failed_at < destroyed_at);
    assert!(destroyed_at < reset_at);
    assert!(reset_at < recreated_at);

    // The loop resumes producing successful swaps on the new surface.
    wait_until(|| h.gles.swap_count() > swaps_before_recovery);

    h.render_loop.stop();
}
