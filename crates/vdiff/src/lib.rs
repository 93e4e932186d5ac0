#![forbid(unsafe_code)]

//! `vdiff` renders one SVG with many independent backends, then diffs every result against a
//! ground-truth image.
//!
//! The entry point is [`Pipeline::render`], which returns an [`EventStream`] of per-backend
//! results followed by a single [`PipelineEvent::Finished`]:
//!
//! ```no_run
//! use std::sync::Arc;
//! use vdiff::{Backend, BackendSettings, Catalog, Pipeline, PipelineEvent, RenderConfig};
//!
//! let mut pipeline = Pipeline::new(Catalog::standard(), None)?;
//! let config = Arc::new(RenderConfig {
//!     backends: vec![
//!         BackendSettings::new(Backend::Reference),
//!         BackendSettings::new(Backend::Resvg),
//!     ],
//!     ..Default::default()
//! });
//! pipeline.render("/tests/svg/e-circle-001.svg", config).for_each_blocking(|event| {
//!     if let PipelineEvent::DiffReady(diff) = event {
//!         println!("{}: {}", diff.backend, diff.stats_text());
//!     }
//! });
//! # Ok::<(), vdiff::PipelineError>(())
//! ```

mod error;
mod events;
mod pipeline;
mod session;

pub use error::PipelineError;
pub use events::{EventStream, PipelineEvent};
pub use pipeline::Pipeline;
pub use session::Session;

pub use vdiff_core::*;

pub mod render {
    pub use vdiff_render::*;
}

pub use vdiff_render::{BackendRenderer, Catalog};
