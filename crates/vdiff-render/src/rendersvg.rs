//! resvg built against its alternative 2D backends, driven through the `rendersvg` CLI.

use crate::BackendRenderer;
use crate::adapter::{self, Invocation, Scratch};
use std::path::PathBuf;
use vdiff_core::image::RgbaImage;
use vdiff_core::{Backend, BackendError, CancelToken, RenderTask, TestSuite};

/// Font setup matching the bundled fonts of the project's own test suite.
const FONT_FAMILIES: [(&str, &str); 6] = [
    ("--font-family", "Noto Sans"),
    ("--serif-family", "Noto Serif"),
    ("--sans-serif-family", "Noto Sans"),
    ("--cursive-family", "Yellowtail"),
    ("--fantasy-family", "Sedgwick Ave Display"),
    ("--monospace-family", "Noto Mono"),
];

#[derive(Debug, Clone, Copy)]
pub struct RenderSvg {
    backend: Backend,
}

impl RenderSvg {
    pub fn new(backend: Backend) -> Self {
        Self { backend }
    }

    fn variant(&self) -> &'static str {
        self.backend.resvg_variant().unwrap_or("skia")
    }
}

impl BackendRenderer for RenderSvg {
    fn backend(&self) -> Backend {
        self.backend
    }

    fn render(&self, task: &RenderTask, cancel: &CancelToken) -> Result<RgbaImage, BackendError> {
        let scratch = Scratch::new(task)?;
        let inv = self.invocation(task, scratch.file(format!("{}.png", self.backend.name())))?;
        adapter::execute(task, cancel, &inv, adapter::log_all)
    }
}

impl RenderSvg {
    fn invocation(&self, task: &RenderTask, out: PathBuf) -> Result<Invocation, BackendError> {
        let mut inv = Invocation::new(adapter::tool(task, Some("rendersvg"))?, task, out.clone())
            .arg(&task.svg_path)
            .arg(&out)
            .arg("-w")
            .arg(task.size.to_string())
            .arg("--backend")
            .arg(self.variant());

        if task.test_suite == TestSuite::Own {
            if let Some(fonts_dir) = &task.fonts_dir {
                inv = inv
                    .arg("--skip-system-fonts")
                    .arg("--use-fonts-dir")
                    .arg(fonts_dir);
                for (flag, family) in FONT_FAMILIES {
                    inv = inv.arg(flag).arg(family);
                }
            }
        }
        Ok(inv)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsString;
    use vdiff_core::{BackendSettings, RenderConfig, Size};

    fn args(suite: TestSuite, fonts_dir: Option<&str>) -> Vec<OsString> {
        let config = RenderConfig {
            test_suite: suite,
            fonts_dir: fonts_dir.map(PathBuf::from),
            backends: vec![BackendSettings::new(Backend::ResvgCairo).with_path("/opt/rendersvg")],
            ..Default::default()
        };
        let task = RenderTask::new(
            Backend::ResvgCairo,
            PathBuf::from("/t/svg/a.svg"),
            Size::square(300),
            &config,
        );
        let inv = RenderSvg::new(Backend::ResvgCairo)
            .invocation(&task, PathBuf::from("/w/out.png"))
            .unwrap();
        assert_eq!(inv.program, "/opt/rendersvg");
        inv.args
    }

    #[test]
    fn official_suite_uses_system_fonts() {
        let expected: Vec<OsString> = ["/t/svg/a.svg", "/w/out.png", "-w", "300", "--backend", "cairo"]
            .into_iter()
            .map(OsString::from)
            .collect();
        assert_eq!(args(TestSuite::Official, Some("/fonts")), expected);
    }

    #[test]
    fn own_suite_pins_bundled_fonts() {
        let args = args(TestSuite::Own, Some("/fonts"));
        assert_eq!(args.len(), 6 + 3 + 2 * FONT_FAMILIES.len());
        assert_eq!(args[6], "--skip-system-fonts");
        assert_eq!(args[8], "/fonts");
        assert!(args.iter().any(|a| a == "Sedgwick Ave Display"));
    }
}
