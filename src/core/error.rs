//! Error types for the tractography engine

use thiserror::Error;

/// Main error type for the engine
///
/// Algorithmic stop conditions in the tracker (no orientation estimate,
/// curvature violation, mask exit and so on) are normal outcomes and are
/// never reported through this type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("image space transform is not invertible")]
    InvalidTransform,

    #[error("no streamline source file found for stem {0:?}")]
    MissingSource(String),

    #[error("format error: {0}")]
    Format(String),

    #[error("data source is exhausted")]
    Exhausted,

    #[error("binary stream is not attached")]
    Detached,

    #[error("file handle is closed")]
    Closed,

    #[error("image error: {0}")]
    Image(String),
}
