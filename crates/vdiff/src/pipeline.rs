//! Render orchestration and the diff fan-out.
//!
//! Each `render` call spawns one coordinator future on the worker pool. The coordinator fans
//! render tasks out to the pool, awaits all of them (the render barrier), then fans out one
//! diff per backend and awaits those too. Workers publish results straight into the session
//! and onto the event channel, so per-backend events arrive as soon as each finishes.

use crate::error::PipelineError;
use crate::events::{EventStream, PipelineEvent};
use crate::session::Session;
use futures::channel::mpsc::{self, UnboundedSender};
use futures::executor::ThreadPool;
use futures::future::{RemoteHandle, join_all};
use futures::task::SpawnExt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use vdiff_core::{
    Backend, BackendError, CancelToken, Generation, ImageCache, ImageOrigin, RenderConfig,
    RenderTask, RenderedImage, Size,
};
use vdiff_render::Catalog;

#[derive(Debug, Default)]
struct Slot {
    generation: u64,
    session: Session,
}

type SharedSlot = Arc<Mutex<Slot>>;

fn lock(slot: &SharedSlot) -> MutexGuard<'_, Slot> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

/// The render/diff pipeline.
///
/// `render` is the only mutating entry point. Calling it again while a run is in flight
/// supersedes that run: its external tools are killed at their next poll, its late results are
/// dropped and its event stream ends without `Finished`.
pub struct Pipeline {
    catalog: Arc<Catalog>,
    cache: Option<Arc<ImageCache>>,
    pool: ThreadPool,
    generation: Generation,
    slot: SharedSlot,
}

impl Pipeline {
    pub fn new(catalog: Catalog, cache: Option<ImageCache>) -> Result<Self, PipelineError> {
        let pool = ThreadPool::builder()
            .name_prefix("vdiff-worker-")
            .create()
            .map_err(|err| PipelineError::Spawn(err.to_string()))?;
        Ok(Self::with_pool(catalog, cache, pool))
    }

    pub fn with_pool(catalog: Catalog, cache: Option<ImageCache>, pool: ThreadPool) -> Self {
        Self {
            catalog: Arc::new(catalog),
            cache: cache.map(Arc::new),
            pool,
            generation: Generation::new(),
            slot: Arc::default(),
        }
    }

    /// Starts rendering `svg_path` with every backend enabled in `config`.
    ///
    /// The previous session is cleared before this returns.
    pub fn render(&mut self, svg_path: impl Into<PathBuf>, config: Arc<RenderConfig>) -> EventStream {
        let token = self.generation.advance();
        {
            let mut slot = lock(&self.slot);
            slot.generation = token.generation();
            slot.session = Session::default();
        }

        let (events, rx) = mpsc::unbounded();
        let run = Arc::new(Run {
            svg_path: svg_path.into(),
            config,
            token,
            catalog: Arc::clone(&self.catalog),
            cache: self.cache.clone(),
            pool: self.pool.clone(),
            slot: Arc::clone(&self.slot),
            events,
        });
        tracing::debug!(
            svg = %run.svg_path.display(),
            generation = run.token.generation(),
            "render requested"
        );
        self.pool.spawn_ok(coordinate(run));
        EventStream::new(rx)
    }

    /// Abandons the in-flight run, if any, without starting a new one.
    pub fn cancel(&mut self) {
        let token = self.generation.advance();
        lock(&self.slot).generation = token.generation();
    }

    /// Snapshot of the current session.
    pub fn session(&self) -> Session {
        lock(&self.slot).session.clone()
    }

    pub fn cache(&self) -> Option<&ImageCache> {
        self.cache.as_deref()
    }

    /// Cancels any in-flight run and closes the cache.
    ///
    /// The cache journal is only compacted when no abandoned task still holds the cache.
    pub fn close(mut self) -> vdiff_core::Result<()> {
        self.cancel();
        match self.cache.take().map(Arc::try_unwrap) {
            Some(Ok(cache)) => cache.close(),
            Some(Err(_)) => {
                tracing::debug!("image cache still in use; skipping compaction");
                Ok(())
            }
            None => Ok(()),
        }
    }
}

/// Everything one `render` call's tasks share.
struct Run {
    svg_path: PathBuf,
    config: Arc<RenderConfig>,
    token: CancelToken,
    catalog: Arc<Catalog>,
    cache: Option<Arc<ImageCache>>,
    pool: ThreadPool,
    slot: SharedSlot,
    events: UnboundedSender<PipelineEvent>,
}

impl Run {
    /// Sends `event` unless the run has been superseded, applying `update` to the session in
    /// the same critical section so session and stream never disagree.
    fn publish(&self, event: PipelineEvent, update: impl FnOnce(&mut Session)) -> bool {
        let mut slot = lock(&self.slot);
        if self.token.is_cancelled() || slot.generation != self.token.generation() {
            return false;
        }
        update(&mut slot.session);
        self.events.unbounded_send(event).is_ok()
    }

    fn emit(&self, event: PipelineEvent) -> bool {
        self.publish(event, |_| {})
    }

    fn publish_image(&self, image: RenderedImage) {
        let image = Arc::new(image);
        let event = PipelineEvent::ImageReady(Arc::clone(&image));
        self.publish(event, |session| session.insert_image(image));
    }

    fn cache_for(&self, backend: Backend) -> Option<&ImageCache> {
        if self.config.cache_enabled() && backend.is_cacheable() {
            self.cache.as_deref()
        } else {
            None
        }
    }

    fn spawn<F>(&self, fut: F) -> Result<RemoteHandle<()>, PipelineError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.pool
            .spawn_with_handle(fut)
            .map_err(|err| PipelineError::Spawn(err.to_string()))
    }
}

async fn coordinate(run: Arc<Run>) {
    let image_size = match vdiff_render::expected_size(&run.svg_path, run.config.target_size()) {
        Ok(size) => size,
        Err(err) => {
            tracing::warn!(svg = %run.svg_path.display(), error = %err, "cannot load input");
            run.emit(PipelineEvent::Error(PipelineError::InputFatal {
                path: run.svg_path.clone(),
                message: err.to_string(),
            }));
            run.emit(PipelineEvent::Finished);
            return;
        }
    };

    if !render_all(&run, image_size).await {
        return;
    }
    diff_all(&run).await;
}

/// Render phase. Returns false if the run was superseded.
async fn render_all(run: &Arc<Run>, image_size: Size) -> bool {
    let mut handles = Vec::new();
    for backend in run.config.enabled_backends() {
        let task = RenderTask::new(backend, run.svg_path.clone(), image_size, &run.config);

        if let Some(image) = cached_image(run, &task) {
            run.publish_image(image);
            continue;
        }

        let worker = Arc::clone(run);
        let target = task.target();
        match run.spawn(async move { render_one(&worker, task) }) {
            Ok(handle) => handles.push(handle),
            Err(err) => {
                tracing::warn!(backend = %backend, error = %err, "cannot schedule render task");
                run.publish_image(placeholder(backend, target, &err.to_string()));
                run.emit(PipelineEvent::Error(err));
            }
        }
    }

    join_all(handles).await;
    run.emit(PipelineEvent::AllRendered)
}

fn cached_image(run: &Run, task: &RenderTask) -> Option<RenderedImage> {
    let cache = run.cache_for(task.backend)?;
    let image = cache.get(task.backend, &task.svg_path)?;
    // Renders cached at another view size are stale for this run; `put` replaces them.
    if image.width() != task.size {
        tracing::debug!(backend = %task.backend, "cached image has a different size");
        return None;
    }
    Some(RenderedImage::new(task.backend, image, ImageOrigin::Cached))
}

fn render_one(run: &Run, task: RenderTask) {
    if run.token.is_cancelled() {
        return;
    }
    let backend = task.backend;
    tracing::debug!(backend = %backend, "rendering");

    let image = match run.catalog.render(&task, &run.token) {
        Ok(image) => {
            if let Some(cache) = run.cache_for(backend) {
                if let Err(err) = cache.put(backend, &task.svg_path, &image) {
                    tracing::warn!(backend = %backend, error = %err, "failed to cache image");
                }
            }
            RenderedImage::new(backend, image, ImageOrigin::Rendered)
        }
        Err(BackendError::Cancelled) => return,
        Err(err) => {
            tracing::warn!(backend = %backend, error = %err, "backend failed");
            placeholder(backend, task.target(), &err.to_string())
        }
    };
    run.publish_image(image);
}

fn placeholder(backend: Backend, size: Size, reason: &str) -> RenderedImage {
    RenderedImage::new(
        backend,
        vdiff_render::error_image(size, reason),
        ImageOrigin::Placeholder {
            reason: reason.to_string(),
        },
    )
}

/// Diff phase: every backend except the reference and the ground truth itself.
async fn diff_all(run: &Arc<Run>) {
    let session = {
        let slot = lock(&run.slot);
        if slot.generation != run.token.generation() {
            return;
        }
        slot.session.clone()
    };

    let suite = run.config.test_suite;
    let Some(truth) = session.ground_truth(suite) else {
        tracing::warn!(suite = %suite, "no ground truth; skipping diffs");
        run.emit(PipelineEvent::Error(PipelineError::MissingGroundTruth { suite }));
        run.emit(PipelineEvent::Finished);
        return;
    };

    let mut handles = Vec::new();
    for backend in session.backends() {
        if backend == Backend::Reference || backend == truth.backend {
            continue;
        }
        let Some(candidate) = session.image(backend).cloned() else {
            continue;
        };
        let worker = Arc::clone(run);
        let truth = Arc::clone(&truth);
        match run.spawn(async move { diff_one(&worker, &truth, &candidate) }) {
            Ok(handle) => handles.push(handle),
            Err(err) => {
                run.emit(PipelineEvent::Error(err));
            }
        }
    }

    join_all(handles).await;
    if run.emit(PipelineEvent::AllDiffed) {
        run.emit(PipelineEvent::Finished);
    }
}

fn diff_one(run: &Run, truth: &RenderedImage, candidate: &RenderedImage) {
    if run.token.is_cancelled() {
        return;
    }
    let result = Arc::new(vdiff_core::diff(
        candidate.backend,
        &truth.image,
        &candidate.image,
    ));
    if let Some(message) = result.size_mismatch_message() {
        run.emit(PipelineEvent::Warning(message));
    }
    let event = PipelineEvent::DiffReady(Arc::clone(&result));
    run.publish(event, |session| session.insert_diff(result));
}
