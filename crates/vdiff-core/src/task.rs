use crate::backend::{Backend, TestSuite};
use crate::config::RenderConfig;
use std::path::PathBuf;
use std::time::Duration;

/// Pixel size of a raster image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub const fn square(side: u32) -> Self {
        Self::new(side, side)
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Scales an intrinsic (possibly fractional) size so that its width equals `target_width`.
    pub fn fit_width(width: f32, height: f32, target_width: u32) -> Self {
        if !(width.is_finite() && height.is_finite() && width > 0.0 && height > 0.0) {
            return Self::square(target_width);
        }
        let h = (height as f64) * (target_width as f64) / (width as f64);
        Self::new(target_width, h.round().max(1.0) as u32)
    }

    /// Largest size with this size's aspect ratio that fits into `bounds`.
    pub fn fit_within(&self, bounds: Size) -> Self {
        if self.is_empty() {
            return bounds;
        }
        let sx = bounds.width as f64 / self.width as f64;
        let sy = bounds.height as f64 / self.height as f64;
        let s = sx.min(sy);
        Self::new(
            ((self.width as f64) * s).round().max(1.0) as u32,
            ((self.height as f64) * s).round().max(1.0) as u32,
        )
    }
}

/// One rendering job. Built per run, consumed once.
#[derive(Debug, Clone)]
pub struct RenderTask {
    pub backend: Backend,
    /// Edge of the square target canvas (view size times display density).
    pub size: u32,
    /// SVG intrinsic size scaled to `size` wide; rectangular-canvas outputs are cropped to it.
    pub image_size: Size,
    pub svg_path: PathBuf,
    /// Resolved tool executable; `None` for in-process backends.
    pub tool: Option<String>,
    pub tool_args: Vec<String>,
    pub test_suite: TestSuite,
    pub work_dir: PathBuf,
    pub fonts_dir: Option<PathBuf>,
    pub timeout: Option<Duration>,
}

impl RenderTask {
    pub fn new(backend: Backend, svg_path: PathBuf, image_size: Size, config: &RenderConfig) -> Self {
        let settings = config.settings(backend);
        Self {
            backend,
            size: config.target_size(),
            image_size,
            svg_path,
            tool: settings.and_then(|s| s.path.clone()),
            tool_args: settings.map(|s| s.args.clone()).unwrap_or_default(),
            test_suite: config.test_suite,
            work_dir: config.work_dir.clone(),
            fonts_dir: config.fonts_dir.clone(),
            timeout: config.timeout(),
        }
    }

    pub fn target(&self) -> Size {
        Size::square(self.size)
    }
}
