//! Browser-engine backends: headless Chrome via a screenshot script, Firefox's
//! `--screenshot` mode and Safari/WebKit through Quick Look thumbnails.

use crate::BackendRenderer;
use crate::adapter::{self, Invocation, Scratch};
use vdiff_core::image::RgbaImage;
use vdiff_core::{Backend, BackendError, CancelToken, RenderTask};

const HEADLESS_NOTICE: &str = "*** You are running in headless mode.";

/// `<tool> <args...> <svg> <out.png> <size>`; the args usually name the screenshot script.
#[derive(Debug, Clone, Copy, Default)]
pub struct Chrome;

impl BackendRenderer for Chrome {
    fn backend(&self) -> Backend {
        Backend::Chrome
    }

    fn render(&self, task: &RenderTask, cancel: &CancelToken) -> Result<RgbaImage, BackendError> {
        let scratch = Scratch::new(task)?;
        let out = scratch.file("chrome.png");
        let inv = Invocation::new(adapter::tool(task, Some("node"))?, task, out.clone())
            .arg(&task.svg_path)
            .arg(&out)
            .arg(task.size.to_string());
        adapter::execute(task, cancel, &inv, adapter::log_all)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Firefox;

impl BackendRenderer for Firefox {
    fn backend(&self) -> Backend {
        Backend::Firefox
    }

    fn render(&self, task: &RenderTask, cancel: &CancelToken) -> Result<RgbaImage, BackendError> {
        let scratch = Scratch::new(task)?;
        let out = scratch.file("firefox.png");
        let svg = std::path::absolute(&task.svg_path)?;
        let url = url::Url::from_file_path(&svg)
            .map_err(|()| BackendError::Svg(format!("cannot form a file URL for {}", svg.display())))?;

        let mut screenshot = std::ffi::OsString::from("--screenshot=");
        screenshot.push(&out);
        let inv = Invocation::new(adapter::tool(task, Some("firefox"))?, task, out)
            .arg(format!("--window-size={0},{0}", task.size))
            .arg(screenshot)
            .arg(url.as_str());
        adapter::execute(task, cancel, &inv, log_firefox)
    }
}

fn log_firefox(backend: Backend, text: &str) {
    if let Some(text) = filter_firefox_output(text) {
        adapter::log_all(backend, &text);
    }
}

/// Drops the GTK and plugin-host chatter Firefox prints on every run.
pub fn filter_firefox_output(text: &str) -> Option<String> {
    let lines: Vec<&str> = text
        .lines()
        .filter(|l| !l.is_empty())
        .filter(|l| !l.contains("Gtk-Message") && !l.contains("plugin-container"))
        .collect();
    if lines.is_empty() {
        return None;
    }
    let joined = lines.join("\n");
    let simplified = joined.split_whitespace().collect::<Vec<_>>().join(" ");
    if simplified == HEADLESS_NOTICE {
        None
    } else {
        Some(joined)
    }
}

/// `qlmanage -t -s N -o <dir> <svg>`, which writes `<dir>/<svg file name>.png`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Safari;

impl BackendRenderer for Safari {
    fn backend(&self) -> Backend {
        Backend::Safari
    }

    fn render(&self, task: &RenderTask, cancel: &CancelToken) -> Result<RgbaImage, BackendError> {
        let scratch = Scratch::new(task)?;
        let mut name = task
            .svg_path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".png");

        let inv = Invocation::new(adapter::tool(task, Some("qlmanage"))?, task, scratch.file(&name))
            .args(["-t", "-s"])
            .arg(task.size.to_string())
            .arg("-o")
            .arg(scratch.path())
            .arg(&task.svg_path);
        adapter::execute(task, cancel, &inv, adapter::log_nothing)
    }
}
