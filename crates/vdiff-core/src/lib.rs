#![forbid(unsafe_code)]

//! Core of the vdiff SVG regression harness.
//!
//! This crate holds everything that does not depend on a particular renderer:
//! - the closed [`Backend`] catalog and per-run [`RenderConfig`]
//! - the external [`process`] runner
//! - the content-hash keyed [`ImageCache`]
//! - the pixel comparator ([`diff()`])

pub mod backend;
pub mod cache;
pub mod cancel;
pub mod canvas;
pub mod config;
pub mod diff;
pub mod error;
pub mod process;
pub mod task;
pub mod verdict;

pub use backend::{Backend, TestSuite, UnknownBackend};
pub use cache::{CacheEntry, ImageCache};
pub use cancel::{CancelToken, Generation};
pub use canvas::{ImageOrigin, RenderedImage};
pub use config::{BackendSettings, RenderConfig};
pub use diff::{DIFF_THRESHOLD, DiffResult, diff};
pub use error::{BackendError, Error, Result};
pub use task::{RenderTask, Size};
pub use verdict::TestState;

pub use image;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
