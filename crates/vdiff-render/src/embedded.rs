//! In-process backends: the pre-rendered reference and embedded `resvg`.

use crate::BackendRenderer;
use crate::raster::{self, RasterError};
use std::path::{Path, PathBuf};
use vdiff_core::canvas;
use vdiff_core::image::RgbaImage;
use vdiff_core::{Backend, BackendError, CancelToken, RenderTask};

/// Where the pre-rendered reference for `svg_path` lives: `<dir>/../png/<stem>.png`.
pub fn reference_path(svg_path: &Path) -> PathBuf {
    let dir = svg_path.parent().unwrap_or(Path::new("."));
    let mut name = svg_path
        .file_stem()
        .map(|s| s.to_os_string())
        .unwrap_or_default();
    name.push(".png");
    dir.join("..").join("png").join(name)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Reference;

impl BackendRenderer for Reference {
    fn backend(&self) -> Backend {
        Backend::Reference
    }

    fn render(&self, task: &RenderTask, _cancel: &CancelToken) -> Result<RgbaImage, BackendError> {
        let path = reference_path(&task.svg_path);
        if !path.is_file() {
            return Err(BackendError::MissingReference { path });
        }
        let image = canvas::load(&path).map_err(|_| BackendError::InvalidImage {
            path: path.clone(),
            exit: vdiff_core::process::ProcessExit::Success,
        })?;

        let target = task.target();
        if image.dimensions() == (target.width, target.height) {
            Ok(image)
        } else {
            Ok(canvas::scale_to_fit(&image, target))
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Resvg;

impl BackendRenderer for Resvg {
    fn backend(&self) -> Backend {
        Backend::Resvg
    }

    fn render(&self, task: &RenderTask, cancel: &CancelToken) -> Result<RgbaImage, BackendError> {
        if cancel.is_cancelled() {
            return Err(BackendError::Cancelled);
        }
        raster::render_file_to_width(&task.svg_path, task.size).map_err(|err| match err {
            RasterError::Read { source, .. } => BackendError::from(source),
            other => BackendError::Svg(other.to_string()),
        })
    }
}
