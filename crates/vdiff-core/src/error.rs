use crate::backend::Backend;
use crate::process::ProcessExit;
use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("image error ({path}): {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Why a single backend failed to produce an image.
///
/// These never escape their own task: the orchestrator maps them to a placeholder image and
/// keeps going with the other backends.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BackendError {
    #[error("Invalid image: {path}{}", detail_suffix(.exit))]
    InvalidImage { path: PathBuf, exit: ProcessExit },

    #[error("Reference image not found: {path}")]
    MissingReference { path: PathBuf },

    #[error("No tool configured for {backend}")]
    MissingTool { backend: Backend },

    #[error("No renderer registered for {backend}")]
    Unregistered { backend: Backend },

    #[error("SVG error: {0}")]
    Svg(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Rendering was cancelled")]
    Cancelled,
}

fn detail_suffix(exit: &ProcessExit) -> String {
    match exit {
        ProcessExit::Success => String::new(),
        other => format!(" ({other})"),
    }
}

impl From<std::io::Error> for BackendError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_image_mentions_process_failure() {
        let err = BackendError::InvalidImage {
            path: PathBuf::from("/tmp/out.png"),
            exit: ProcessExit::SpawnFailed("No such file or directory".to_string()),
        };
        assert_eq!(
            err.to_string(),
            "Invalid image: /tmp/out.png (failed to start: No such file or directory)"
        );

        let err = BackendError::InvalidImage {
            path: PathBuf::from("/tmp/out.png"),
            exit: ProcessExit::Success,
        };
        assert_eq!(err.to_string(), "Invalid image: /tmp/out.png");
    }
}
