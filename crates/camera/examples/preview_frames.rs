//! Runs the producer half of the bridge against the first camera on the
//! system and prints each frame published to the handoff.

#[cfg(windows)]
fn main() -> Result<(), Box<dyn std::error::Error>> {
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    use glint_bridge::FrameHandoff;
    use glint_camera::CameraBridge;

    tracing_subscriber::fmt::init();

    let handoff = Arc::new(FrameHandoff::new());
    let mut bridge = CameraBridge::start(Arc::clone(&handoff))?;

    let deadline = Instant::now() + Duration::from_secs(5);
    let mut frames = 0u32;
    while Instant::now() < deadline {
        if let Some(frame) = handoff.take_latest() {
            frames += 1;
            println!(
                "frame {}x{} handle {:#x}",
                frame.width, frame.height, frame.handle.0
            );
        }
        std::thread::sleep(Duration::from_millis(15));
    }

    println!("{frames} frames in 5s");
    bridge.stop()?;
    Ok(())
}

#[cfg(not(windows))]
fn main() {
    eprintln!("camera capture is only available on Windows");
}
