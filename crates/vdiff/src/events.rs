use crate::error::PipelineError;
use futures::StreamExt;
use futures::channel::mpsc::UnboundedReceiver;
use futures::executor::block_on;
use futures::stream::Stream;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use vdiff_core::{DiffResult, RenderedImage};

/// What a running pipeline reports, in delivery order per run:
/// every `ImageReady` precedes `AllRendered`, every `DiffReady` precedes `AllDiffed`, and
/// `Finished` is always last.
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    /// One backend's image, real or placeholder.
    ImageReady(Arc<RenderedImage>),
    AllRendered,
    DiffReady(Arc<DiffResult>),
    AllDiffed,
    /// Non-fatal condition, e.g. a size mismatch between a candidate and the ground truth.
    Warning(String),
    Error(PipelineError),
    Finished,
}

impl PipelineEvent {
    pub fn is_finished(&self) -> bool {
        matches!(self, PipelineEvent::Finished)
    }
}

/// Events of one `render` call.
///
/// The stream ends after `Finished`, or early if the run is superseded by a newer one.
#[derive(Debug)]
pub struct EventStream {
    rx: UnboundedReceiver<PipelineEvent>,
}

impl EventStream {
    pub(crate) fn new(rx: UnboundedReceiver<PipelineEvent>) -> Self {
        Self { rx }
    }

    /// Blocks the calling thread, handing each event to `f` as it arrives.
    pub fn for_each_blocking(mut self, mut f: impl FnMut(PipelineEvent)) {
        block_on(async {
            while let Some(event) = self.next().await {
                f(event);
            }
        });
    }

    pub fn collect_blocking(self) -> Vec<PipelineEvent> {
        block_on(self.collect())
    }
}

impl Stream for EventStream {
    type Item = PipelineEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.rx).poll_next(cx)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.rx.size_hint()
    }
}
