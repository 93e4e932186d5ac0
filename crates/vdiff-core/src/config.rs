//! Per-run configuration.
//!
//! A `RenderConfig` is built once by the caller (usually from user settings) and handed to the
//! pipeline at the start of every run. The pipeline never mutates it.

use crate::backend::{Backend, TestSuite};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RenderConfig {
    /// Logical view size in pixels; the rendered square is `view_size * scale`.
    pub view_size: u32,
    /// Display density factor.
    pub scale: f64,
    pub test_suite: TestSuite,
    /// Scratch directory for tool outputs and the image cache.
    pub work_dir: PathBuf,
    pub backends: Vec<BackendSettings>,
    /// Per-task limit for external tools. Unset means tools may run indefinitely.
    pub timeout_ms: Option<u64>,
    /// Font directory passed to `rendersvg` when rendering the project's own test suite.
    pub fonts_dir: Option<PathBuf>,
    pub use_cache: bool,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            view_size: 300,
            scale: 1.0,
            test_suite: TestSuite::default(),
            work_dir: std::env::temp_dir().join("vdiff"),
            backends: Vec::new(),
            timeout_ms: None,
            fonts_dir: None,
            use_cache: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BackendSettings {
    pub backend: Backend,
    /// Executable (or script host) for external backends.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Extra arguments placed before the backend's own arguments.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
}

fn enabled_by_default() -> bool {
    true
}

impl BackendSettings {
    pub fn new(backend: Backend) -> Self {
        Self {
            backend,
            path: None,
            args: Vec::new(),
            enabled: true,
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }
}

impl RenderConfig {
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| Error::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)
    }

    /// Edge length of the square every backend renders into.
    pub fn target_size(&self) -> u32 {
        let scale = if self.scale.is_finite() && self.scale > 0.0 {
            self.scale
        } else {
            1.0
        };
        ((self.view_size as f64) * scale).round().max(1.0) as u32
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    pub fn settings(&self, backend: Backend) -> Option<&BackendSettings> {
        self.backends
            .iter()
            .find(|s| s.backend == backend && s.enabled)
    }

    /// Enabled backends, deduplicated, in catalog order.
    ///
    /// The reference is dropped for suites without pre-rendered references.
    pub fn enabled_backends(&self) -> Vec<Backend> {
        let mut out: Vec<Backend> = self
            .backends
            .iter()
            .filter(|s| s.enabled)
            .map(|s| s.backend)
            .filter(|b| *b != Backend::Reference || self.test_suite.has_reference())
            .collect();
        out.sort();
        out.dedup();
        out
    }

    pub fn cache_enabled(&self) -> bool {
        self.use_cache && self.test_suite != TestSuite::Custom
    }
}
