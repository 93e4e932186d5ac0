use rustc_hash::FxHashMap;
use std::sync::Arc;
use vdiff_core::{Backend, DiffResult, RenderedImage, TestState, TestSuite};

/// Results of the most recent `render` call: at most one image and one diff per backend.
#[derive(Debug, Clone, Default)]
pub struct Session {
    images: FxHashMap<Backend, Arc<RenderedImage>>,
    diffs: FxHashMap<Backend, Arc<DiffResult>>,
}

impl Session {
    pub fn image(&self, backend: Backend) -> Option<&Arc<RenderedImage>> {
        self.images.get(&backend)
    }

    pub fn diff(&self, backend: Backend) -> Option<&Arc<DiffResult>> {
        self.diffs.get(&backend)
    }

    /// Backends with an image, in catalog order.
    pub fn backends(&self) -> Vec<Backend> {
        let mut out: Vec<Backend> = self.images.keys().copied().collect();
        out.sort();
        out
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn state(&self, backend: Backend) -> TestState {
        match self.image(backend) {
            Some(image) => TestState::judge(image, self.diff(backend).map(Arc::as_ref)),
            None => TestState::Unknown,
        }
    }

    /// The image every other backend is compared with.
    ///
    /// Suites with references use the reference render, provided it did not fail. Custom
    /// suites fall back to the first real render in catalog order.
    pub fn ground_truth(&self, suite: TestSuite) -> Option<Arc<RenderedImage>> {
        if suite.has_reference() {
            return self
                .image(Backend::Reference)
                .filter(|img| !img.is_placeholder())
                .cloned();
        }
        self.backends()
            .into_iter()
            .filter_map(|b| self.image(b))
            .find(|img| !img.is_placeholder())
            .cloned()
    }

    pub(crate) fn insert_image(&mut self, image: Arc<RenderedImage>) {
        self.images.insert(image.backend, image);
    }

    pub(crate) fn insert_diff(&mut self, diff: Arc<DiffResult>) {
        self.diffs.insert(diff.backend, diff);
    }
}
