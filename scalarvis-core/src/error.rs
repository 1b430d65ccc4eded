//! Error types for the ingestion-and-query engine.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("Unsupported file type for path: {}", .0.display())]
    UnsupportedFileType(PathBuf),

    #[error("Invalid record framing in {}: {detail}", .path.display())]
    InvalidRecordFraming { path: PathBuf, detail: String },

    #[error("Operation '{op}' is not valid on a virtual file")]
    VirtualFileOperation { op: &'static str },

    #[error("Merge failed for virtual file '{name}': {detail}")]
    MergeFailed { name: String, detail: String },

    #[error("Unmerge failed: no virtual file named '{0}'")]
    UnmergeNotFound(String),

    #[error("Worker pool has been stopped")]
    WorkerPoolStopped,

    #[error("Config parse error: {0}")]
    ConfigParse(String),

    #[error("Path is not readable: {}", .0.display())]
    PathUnreadable(PathBuf),
}

pub type Result<T> = std::result::Result<T, EngineError>;
