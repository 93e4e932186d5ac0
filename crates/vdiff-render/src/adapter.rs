//! Shared plumbing for adapters that shell out to an external tool.

use std::ffi::{OsStr, OsString};
use std::fs;
use std::path::{Path, PathBuf};
use vdiff_core::canvas;
use vdiff_core::image::RgbaImage;
use vdiff_core::process::{self, ProcessExit, RunOptions};
use vdiff_core::{Backend, BackendError, CancelToken, RenderTask};

/// Per-task scratch directory under the work dir, removed on drop.
///
/// Concurrent tasks (and concurrent sessions) never share output file names.
#[derive(Debug)]
pub struct Scratch {
    dir: PathBuf,
}

impl Scratch {
    pub fn new(task: &RenderTask) -> Result<Self, BackendError> {
        let dir = task.work_dir.join(format!(
            "{}-{}",
            task.backend.name(),
            uuid::Uuid::new_v4().simple()
        ));
        fs::create_dir_all(&dir)?;
        let dir = std::path::absolute(&dir)?;
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    pub fn file(&self, name: impl AsRef<Path>) -> PathBuf {
        self.dir.join(name)
    }
}

impl Drop for Scratch {
    fn drop(&mut self) {
        if let Err(err) = fs::remove_dir_all(&self.dir) {
            tracing::debug!(dir = %self.dir.display(), error = %err, "failed to remove scratch dir");
        }
    }
}

/// A fully built tool command line plus where its output lands.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<OsString>,
    pub output: PathBuf,
    pub merge_stderr: bool,
}

impl Invocation {
    /// Starts a command line with the task's configured extra arguments.
    pub fn new(program: impl Into<String>, task: &RenderTask, output: PathBuf) -> Self {
        Self {
            program: program.into(),
            args: task.tool_args.iter().map(OsString::from).collect(),
            output,
            merge_stderr: true,
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }

    pub fn stdout_only(mut self) -> Self {
        self.merge_stderr = false;
        self
    }
}

/// The configured tool, or `default` when the backend has a well-known command name.
pub fn tool(task: &RenderTask, default: Option<&str>) -> Result<String, BackendError> {
    task.tool
        .as_deref()
        .filter(|t| !t.trim().is_empty())
        .or(default)
        .map(str::to_string)
        .ok_or(BackendError::MissingTool {
            backend: task.backend,
        })
}

/// Runs `invocation`, then loads, deletes and normalizes its output image.
///
/// `log` sees the tool's captured output and decides what is worth reporting.
pub fn execute(
    task: &RenderTask,
    cancel: &CancelToken,
    invocation: &Invocation,
    log: fn(Backend, &str),
) -> Result<RgbaImage, BackendError> {
    if cancel.is_cancelled() {
        return Err(BackendError::Cancelled);
    }

    let output = process::run(
        &invocation.program,
        &invocation.args,
        &RunOptions {
            merge_stderr: invocation.merge_stderr,
            timeout: task.timeout,
            cancel: Some(cancel),
            current_dir: None,
        },
    );
    match &output.exit {
        ProcessExit::Cancelled => return Err(BackendError::Cancelled),
        ProcessExit::TimedOut(after) => {
            tracing::warn!(
                backend = %task.backend,
                timeout_ms = after.as_millis() as u64,
                "external tool timed out"
            );
        }
        _ => {}
    }
    if !output.text.is_empty() {
        log(task.backend, &output.text);
    }

    let image = load_output(&invocation.output, &output.exit)?;
    Ok(normalize(task, image))
}

pub fn log_all(backend: Backend, text: &str) {
    tracing::debug!(backend = %backend, "{text}");
}

pub fn log_nothing(_: Backend, _: &str) {}

/// Loads a tool's output file and removes it. Missing or undecodable output is the failure
/// signal, whatever the exit status was.
pub fn load_output(path: &Path, exit: &ProcessExit) -> Result<RgbaImage, BackendError> {
    match canvas::load(path) {
        Ok(image) => {
            let _ = fs::remove_file(path);
            Ok(image)
        }
        Err(err) => {
            tracing::debug!(error = %err, "tool output is not a valid image");
            Err(BackendError::InvalidImage {
                path: path.to_path_buf(),
                exit: exit.clone(),
            })
        }
    }
}

/// Crops screenshots of rectangular-canvas tools to the SVG's aspect-correct size.
///
/// Loaded images are already canonical RGBA, which covers tools that drop the alpha channel.
pub fn normalize(task: &RenderTask, image: RgbaImage) -> RgbaImage {
    let expected = task.image_size;
    if task.backend.has_rectangular_canvas()
        && !expected.is_empty()
        && image.dimensions() != (expected.width, expected.height)
    {
        canvas::center_crop(&image, expected)
    } else {
        image
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vdiff_core::image::Rgba;
    use vdiff_core::{RenderConfig, Size};

    fn task(backend: Backend, work_dir: &Path) -> RenderTask {
        RenderTask::new(
            backend,
            work_dir.join("in.svg"),
            Size::new(20, 10),
            &RenderConfig {
                view_size: 20,
                work_dir: work_dir.to_path_buf(),
                ..Default::default()
            },
        )
    }

    #[test]
    fn scratch_dir_is_unique_and_removed() {
        let tmp = tempfile::tempdir().unwrap();
        let t = task(Backend::Inkscape, tmp.path());
        let a = Scratch::new(&t).unwrap();
        let b = Scratch::new(&t).unwrap();
        assert_ne!(a.path(), b.path());
        assert!(a.path().is_absolute());

        let dir = a.path().to_path_buf();
        fs::write(a.file("x.png"), b"junk").unwrap();
        drop(a);
        assert!(!dir.exists());
    }

    #[test]
    fn missing_tool_without_default() {
        let tmp = tempfile::tempdir().unwrap();
        let t = task(Backend::Batik, tmp.path());
        assert!(matches!(
            tool(&t, None),
            Err(BackendError::MissingTool { backend: Backend::Batik })
        ));
        assert_eq!(tool(&t, Some("batik")).unwrap(), "batik");
    }

    #[test]
    fn nonexistent_executable_yields_invalid_image() {
        let tmp = tempfile::tempdir().unwrap();
        let t = task(Backend::Librsvg, tmp.path());
        let out = tmp.path().join("out.png");
        let inv = Invocation::new("/nonexistent/vdiff-tool", &t, out.clone()).arg("x");
        let err = execute(&t, &CancelToken::never(), &inv, log_all).unwrap_err();
        match err {
            BackendError::InvalidImage { path, exit } => {
                assert_eq!(path, out);
                assert!(matches!(exit, ProcessExit::SpawnFailed(_)));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn rectangular_canvas_output_is_cropped() {
        let tmp = tempfile::tempdir().unwrap();
        let img = RgbaImage::from_pixel(20, 20, Rgba([0, 0, 0, 255]));

        let t = task(Backend::Firefox, tmp.path());
        assert_eq!(normalize(&t, img.clone()).dimensions(), (20, 10));

        let t = task(Backend::Inkscape, tmp.path());
        assert_eq!(normalize(&t, img).dimensions(), (20, 20));
    }

    #[test]
    fn loaded_output_file_is_deleted() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("out.png");
        canvas::save_png(&RgbaImage::new(2, 2), &path).unwrap();
        let img = load_output(&path, &ProcessExit::Success).unwrap();
        assert_eq!(img.dimensions(), (2, 2));
        assert!(!path.exists());
    }

    #[test]
    fn cancelled_token_skips_the_tool() {
        let tmp = tempfile::tempdir().unwrap();
        let t = task(Backend::Librsvg, tmp.path());
        let generation = vdiff_core::Generation::new();
        let token = generation.advance();
        generation.advance();
        let inv = Invocation::new("/nonexistent/vdiff-tool", &t, tmp.path().join("o.png"));
        assert!(matches!(
            execute(&t, &token, &inv, log_all),
            Err(BackendError::Cancelled)
        ));
    }
}
