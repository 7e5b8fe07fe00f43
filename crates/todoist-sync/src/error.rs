use crate::fs::FsError;
use crate::project::TreeError;
use crate::remote::RemoteError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Malformed project tree: {0}")]
    MalformedTree(#[from] TreeError),

    #[error("Conflict at {path}: {reason}")]
    Conflict { path: String, reason: String },

    #[error("Remote fetch failed: {0}")]
    Transport(#[from] RemoteError),

    #[error("Store error: {0}")]
    Store(#[from] FsError),
}

pub type Result<T> = std::result::Result<T, SyncError>;
