#![forbid(unsafe_code)]

//! Backend catalog for `vdiff`.
//!
//! Every [`Backend`] maps to one [`BackendRenderer`]: a function from a [`RenderTask`] to a
//! canonical RGBA image or a typed [`BackendError`]. External tools run through the process
//! runner in `vdiff-core`; `reference` and `resvg` stay in-process.

pub mod adapter;
pub mod browsers;
pub mod embedded;
pub mod placeholder;
pub mod raster;
pub mod rendersvg;
pub mod tools;

use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::Arc;
use vdiff_core::image::RgbaImage;
use vdiff_core::{Backend, BackendError, CancelToken, RenderTask};

pub use placeholder::error_image;
pub use raster::{RasterError, expected_size};

/// One backend's rendering recipe.
pub trait BackendRenderer: Send + Sync {
    fn backend(&self) -> Backend;

    /// Produces the backend's image for `task`.
    ///
    /// Implementations block on the external tool (if any) and must return
    /// [`BackendError::Cancelled`] once `cancel` fires.
    fn render(&self, task: &RenderTask, cancel: &CancelToken) -> Result<RgbaImage, BackendError>;
}

/// Adapts a closure into a renderer. Mostly useful for substituting fakes in tests.
pub struct FnRenderer<F> {
    backend: Backend,
    f: F,
}

pub fn from_fn<F>(backend: Backend, f: F) -> FnRenderer<F>
where
    F: Fn(&RenderTask, &CancelToken) -> Result<RgbaImage, BackendError> + Send + Sync,
{
    FnRenderer { backend, f }
}

impl<F> BackendRenderer for FnRenderer<F>
where
    F: Fn(&RenderTask, &CancelToken) -> Result<RgbaImage, BackendError> + Send + Sync,
{
    fn backend(&self) -> Backend {
        self.backend
    }

    fn render(&self, task: &RenderTask, cancel: &CancelToken) -> Result<RgbaImage, BackendError> {
        (self.f)(task, cancel)
    }
}

/// Static table of renderers keyed by backend.
#[derive(Clone, Default)]
pub struct Catalog {
    renderers: FxHashMap<Backend, Arc<dyn BackendRenderer>>,
}

impl Catalog {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Catalog with the built-in adapter registered for every backend.
    pub fn standard() -> Self {
        let mut catalog = Self::empty();
        catalog.register(embedded::Reference);
        catalog.register(browsers::Chrome);
        catalog.register(browsers::Firefox);
        catalog.register(browsers::Safari);
        catalog.register(embedded::Resvg);
        for backend in [
            Backend::ResvgCairo,
            Backend::ResvgQt,
            Backend::ResvgRaqote,
            Backend::ResvgSkia,
        ] {
            catalog.register(rendersvg::RenderSvg::new(backend));
        }
        catalog.register(tools::Batik);
        catalog.register(tools::Inkscape);
        catalog.register(tools::Librsvg);
        catalog.register(tools::QtSvg);
        catalog.register(tools::WxSvg);
        catalog.register(tools::SvgNet);
        catalog
    }

    /// Registers `renderer` under its own backend, returning the one it replaces.
    pub fn register<R>(&mut self, renderer: R) -> Option<Arc<dyn BackendRenderer>>
    where
        R: BackendRenderer + 'static,
    {
        self.register_arc(Arc::new(renderer))
    }

    pub fn register_arc(
        &mut self,
        renderer: Arc<dyn BackendRenderer>,
    ) -> Option<Arc<dyn BackendRenderer>> {
        self.renderers.insert(renderer.backend(), renderer)
    }

    pub fn get(&self, backend: Backend) -> Option<&Arc<dyn BackendRenderer>> {
        self.renderers.get(&backend)
    }

    pub fn contains(&self, backend: Backend) -> bool {
        self.renderers.contains_key(&backend)
    }

    pub fn backends(&self) -> Vec<Backend> {
        let mut out: Vec<Backend> = self.renderers.keys().copied().collect();
        out.sort();
        out
    }

    pub fn render(&self, task: &RenderTask, cancel: &CancelToken) -> Result<RgbaImage, BackendError> {
        let renderer = self.get(task.backend).ok_or(BackendError::Unregistered {
            backend: task.backend,
        })?;
        renderer.render(task, cancel)
    }
}

impl fmt::Debug for Catalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Catalog")
            .field("backends", &self.backends())
            .finish()
    }
}
