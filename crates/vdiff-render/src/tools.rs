//! Standalone converter tools.

use crate::BackendRenderer;
use crate::adapter::{self, Invocation, Scratch};
use std::path::Path;
use vdiff_core::image::RgbaImage;
use vdiff_core::{Backend, BackendError, CancelToken, RenderTask};

/// Builds a tool's command line given its scratch dir.
type Recipe = fn(&RenderTask, &Path) -> Result<Invocation, BackendError>;

fn run_recipe(
    task: &RenderTask,
    cancel: &CancelToken,
    recipe: Recipe,
    log: fn(Backend, &str),
) -> Result<RgbaImage, BackendError> {
    let scratch = Scratch::new(task)?;
    let inv = recipe(task, scratch.path())?;
    adapter::execute(task, cancel, &inv, log)
}

macro_rules! tool_backend {
    ($name:ident, $backend:expr, $recipe:path, $log:path) => {
        #[derive(Debug, Clone, Copy, Default)]
        pub struct $name;

        impl BackendRenderer for $name {
            fn backend(&self) -> Backend {
                $backend
            }

            fn render(
                &self,
                task: &RenderTask,
                cancel: &CancelToken,
            ) -> Result<RgbaImage, BackendError> {
                run_recipe(task, cancel, $recipe, $log)
            }
        }
    };
}

tool_backend!(Batik, Backend::Batik, batik, log_batik);
tool_backend!(Inkscape, Backend::Inkscape, inkscape, adapter::log_nothing);
tool_backend!(Librsvg, Backend::Librsvg, librsvg, adapter::log_all);
tool_backend!(QtSvg, Backend::QtSvg, qtsvg, adapter::log_all);
tool_backend!(WxSvg, Backend::WxSvg, wxsvg, adapter::log_all);
tool_backend!(SvgNet, Backend::SvgNet, svgnet, adapter::log_all);

/// Batik's rasterizer. Its canvas is always `N x N`, so the output gets cropped.
fn batik(task: &RenderTask, dir: &Path) -> Result<Invocation, BackendError> {
    let out = dir.join("batik.png");
    let size = task.size.to_string();
    Ok(Invocation::new(adapter::tool(task, None)?, task, out.clone())
        .arg("-scriptSecurityOff")
        .arg(&task.svg_path)
        .arg("-d")
        .arg(&out)
        .args(["-w", &size, "-h", &size]))
}

/// Batik reports every conversion; only the unusual output is interesting.
fn log_batik(backend: Backend, text: &str) {
    if !text.contains("success") {
        adapter::log_all(backend, text);
    }
}

fn inkscape(task: &RenderTask, dir: &Path) -> Result<Invocation, BackendError> {
    let out = dir.join("inkscape.png");
    let mut export = std::ffi::OsString::from("--export-filename=");
    export.push(&out);
    Ok(
        Invocation::new(adapter::tool(task, Some("inkscape"))?, task, out)
            .arg(&task.svg_path)
            .arg("-w")
            .arg(task.size.to_string())
            .arg(export)
            .stdout_only(),
    )
}

fn librsvg(task: &RenderTask, dir: &Path) -> Result<Invocation, BackendError> {
    let out = dir.join("rsvg.png");
    Ok(
        Invocation::new(adapter::tool(task, Some("rsvg-convert"))?, task, out.clone())
            .args(["-f", "png", "-w"])
            .arg(task.size.to_string())
            .arg(&task.svg_path)
            .arg("-o")
            .arg(&out)
            .stdout_only(),
    )
}

fn qtsvg(task: &RenderTask, dir: &Path) -> Result<Invocation, BackendError> {
    svg_out_size(task, dir, "qtsvgrender", "qtsvg.png")
}

fn wxsvg(task: &RenderTask, dir: &Path) -> Result<Invocation, BackendError> {
    svg_out_size(task, dir, "wxsvgrender", "wxsvg.png")
}

/// `<tool> <svg> <out.png> <size>`, shared by the small Qt and wxWidgets render helpers.
fn svg_out_size(
    task: &RenderTask,
    dir: &Path,
    default_tool: &str,
    file: &str,
) -> Result<Invocation, BackendError> {
    let out = dir.join(file);
    Ok(
        Invocation::new(adapter::tool(task, Some(default_tool))?, task, out.clone())
            .arg(&task.svg_path)
            .arg(&out)
            .arg(task.size.to_string()),
    )
}

/// SVG.NET renders at the document's own size into `<dir>/<svg stem>.png`.
fn svgnet(task: &RenderTask, dir: &Path) -> Result<Invocation, BackendError> {
    let mut name = task
        .svg_path
        .file_stem()
        .map(|s| s.to_os_string())
        .unwrap_or_default();
    name.push(".png");
    let out = dir.join(name);
    Ok(Invocation::new(adapter::tool(task, None)?, task, out.clone())
        .arg(&task.svg_path)
        .arg(&out))
}
