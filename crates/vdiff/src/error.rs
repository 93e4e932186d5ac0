use std::path::PathBuf;
use vdiff_core::TestSuite;

/// Failures that make a whole `render` call meaningless.
///
/// A single backend failing is never one of these; it shows up as a placeholder image instead.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PipelineError {
    #[error("cannot load {path}: {message}")]
    InputFatal { path: PathBuf, message: String },

    #[error("no ground-truth image for the {suite} suite; diffing skipped")]
    MissingGroundTruth { suite: TestSuite },

    #[error("failed to schedule work: {0}")]
    Spawn(String),
}
