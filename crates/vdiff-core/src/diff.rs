//! Pixel-level comparison against the ground-truth image.

use crate::backend::Backend;
use crate::canvas;
use crate::task::Size;
use image::{Rgba, RgbaImage};

/// Colors farther apart than this (Euclidean, RGB, after compositing on white) are mismatches.
pub const DIFF_THRESHOLD: u32 = 5;

pub const MATCH_COLOR: Rgba<u8> = Rgba([255, 255, 255, 255]);
pub const MISMATCH_COLOR: Rgba<u8> = Rgba([255, 0, 0, 255]);

#[derive(Debug, Clone)]
pub struct DiffResult {
    pub backend: Backend,
    /// Two-color mask with the reference's dimensions.
    pub image: RgbaImage,
    pub mismatched: u64,
    /// `mismatched` relative to the compared (overlapping) area, in percent.
    pub percent: f64,
    /// Set when the two inputs differ in size: `(reference, candidate)`.
    pub size_mismatch: Option<(Size, Size)>,
}

impl DiffResult {
    pub fn is_exact_match(&self) -> bool {
        self.mismatched == 0
    }

    /// `"<count>/<percent>%"`, as shown next to each diff view.
    pub fn stats_text(&self) -> String {
        format!("{}/{:.2}%", self.mismatched, self.percent)
    }

    pub fn size_mismatch_message(&self) -> Option<String> {
        let (a, b) = self.size_mismatch?;
        Some(format!(
            "Images size mismatch: {}x{} != {}x{} for {}",
            a.width, a.height, b.width, b.height, self.backend
        ))
    }
}

/// Compares `candidate` against `reference`.
///
/// Only the overlapping region is compared; pixels of the reference outside it are marked as
/// mismatches in the mask but do not count towards the statistics. Alpha is not compared
/// directly: both pixels are composited over opaque white first.
pub fn diff(backend: Backend, reference: &RgbaImage, candidate: &RgbaImage) -> DiffResult {
    let size_mismatch = (reference.dimensions() != candidate.dimensions()).then(|| {
        (
            Size::new(reference.width(), reference.height()),
            Size::new(candidate.width(), candidate.height()),
        )
    });

    let w = reference.width().min(candidate.width());
    let h = reference.height().min(candidate.height());

    let mut mask = canvas::filled(
        Size::new(reference.width(), reference.height()),
        MISMATCH_COLOR,
    );
    let limit = DIFF_THRESHOLD * DIFF_THRESHOLD;
    let mut mismatched = 0u64;

    for y in 0..h {
        for x in 0..w {
            let a = over_white(*reference.get_pixel(x, y));
            let b = over_white(*candidate.get_pixel(x, y));
            if distance_sq(a, b) > limit {
                mismatched += 1;
            } else {
                mask.put_pixel(x, y, MATCH_COLOR);
            }
        }
    }

    let compared = (w as u64) * (h as u64);
    let percent = if compared > 0 {
        (mismatched as f64) / (compared as f64) * 100.0
    } else if reference.dimensions() == candidate.dimensions() {
        0.0
    } else {
        100.0
    };

    let result = DiffResult {
        backend,
        image: mask,
        mismatched,
        percent,
        size_mismatch,
    };
    if let Some(msg) = result.size_mismatch_message() {
        tracing::warn!("{msg}");
    }
    result
}

fn over_white(p: Rgba<u8>) -> [u8; 3] {
    let [r, g, b, a] = p.0;
    let a = a as u32;
    let blend = |c: u8| ((c as u32 * a + 255 * (255 - a) + 127) / 255) as u8;
    [blend(r), blend(g), blend(b)]
}

fn distance_sq(a: [u8; 3], b: [u8; 3]) -> u32 {
    a.iter()
        .zip(b.iter())
        .map(|(&x, &y)| {
            let d = x as i32 - y as i32;
            (d * d) as u32
        })
        .sum()
}
