use std::cmp::Ordering;

/// One format a capture source offers: output dimensions plus frame rate as
/// a numerator/denominator pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureFormat {
    pub width: u32,
    pub height: u32,
    pub frame_rate: (u32, u32),
}

impl CaptureFormat {
    pub fn new(width: u32, height: u32, frame_rate: (u32, u32)) -> Self {
        Self {
            width,
            height,
            frame_rate,
        }
    }
}

pub const PREFERRED_FRAME_RATE: u32 = 30;

fn rate_cmp(a: &CaptureFormat, b: &CaptureFormat) -> Ordering {
    // Cross-multiplied rational comparison, no float keys.
    let lhs = a.frame_rate.0 as u64 * b.frame_rate.1 as u64;
    let rhs = b.frame_rate.0 as u64 * a.frame_rate.1 as u64;
    lhs.cmp(&rhs)
}

fn at_most_preferred(format: &CaptureFormat) -> bool {
    format.frame_rate.0 as u64 <= PREFERRED_FRAME_RATE as u64 * format.frame_rate.1 as u64
}

/// Picks the capture format to request from the camera.
///
/// The widest format running at exactly [`PREFERRED_FRAME_RATE`] wins. When
/// no format reaches it, the fastest format below it is taken instead, and
/// when every format exceeds it, the slowest one. Ties on rate go to the
/// widest format. Formats with a zero rate denominator are ignored.
pub fn select_capture_format(formats: &[CaptureFormat]) -> Option<CaptureFormat> {
    let valid = formats.iter().filter(|f| f.frame_rate.1 != 0);

    if valid.clone().any(at_most_preferred) {
        valid
            .filter(|&f| at_most_preferred(f))
            .max_by(|a, b| rate_cmp(a, b).then(a.width.cmp(&b.width)))
            .copied()
    } else {
        valid
            .min_by(|a, b| rate_cmp(a, b).then(b.width.cmp(&a.width)))
            .copied()
    }
}
