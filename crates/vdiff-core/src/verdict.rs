use crate::canvas::RenderedImage;
use crate::diff::DiffResult;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Per-backend test outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestState {
    #[default]
    Unknown,
    Passed,
    Failed,
    Crashed,
}

impl TestState {
    /// Derives a verdict from a backend's image and, if one was computed, its diff.
    pub fn judge(image: &RenderedImage, diff: Option<&DiffResult>) -> Self {
        if image.is_placeholder() {
            return TestState::Crashed;
        }
        match diff {
            Some(d) if d.is_exact_match() && d.size_mismatch.is_none() => TestState::Passed,
            Some(_) => TestState::Failed,
            None => TestState::Unknown,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            TestState::Unknown => "unknown",
            TestState::Passed => "passed",
            TestState::Failed => "failed",
            TestState::Crashed => "crashed",
        }
    }
}

impl fmt::Display for TestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
