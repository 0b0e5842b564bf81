use cgcast::CastError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BlockerError {
    #[error("Blocker is already running")]
    AlreadyRunning,
    #[error("Blocker is not running")]
    NotRunning,
    #[error("Cannot save keywords to {path}: {message}")]
    Keywords { path: String, message: String },
    #[error(transparent)]
    Device(#[from] CastError),
    #[error("Cannot spawn monitor thread: {0}")]
    Spawn(#[from] std::io::Error),
}

impl BlockerError {
    pub fn keywords(path: &std::path::Path, err: impl std::fmt::Display) -> Self {
        BlockerError::Keywords {
            path: path.display().to_string(),
            message: err.to_string(),
        }
    }
}
