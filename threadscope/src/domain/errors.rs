//! Structured error types for threadscope
//!
//! Using thiserror for automatic Display implementation and error chaining.

use super::types::Pid;
use std::path::PathBuf;
use thiserror::Error;

/// Fatal errors raised while acquiring a capture and locating the thread of
/// interest. Any of these aborts the run with a non-zero exit status.
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Capture {0} not found (no archive to unpack either)")]
    CaptureNotFound(PathBuf),

    #[error("Failed to unpack archive {archive}: {error}")]
    ArchiveUnpackFailed { archive: PathBuf, error: String },

    #[error("Invalid capture: {0}")]
    InvalidCapture(String),

    #[error("No instance of process '{0}' found in capture")]
    ProcessNotFound(String),

    #[error("Expected exactly one instance of process '{name}', found {count}")]
    AmbiguousProcess { name: String, count: usize },

    #[error("No thread in process {pid} has a stack containing '{signature}'")]
    TargetThreadNotFound { pid: Pid, signature: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {error}")]
    ReadFailed { path: PathBuf, error: std::io::Error },

    #[error("Failed to parse config {path}: {error}")]
    ParseFailed { path: PathBuf, error: serde_json::Error },

    #[error("Invalid config: {0} must not be empty")]
    EmptyField(&'static str),
}

/// Errors from the process monitor service.
#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("Process monitor is stopped")]
    Stopped,

    #[error("Process monitor worker panicked")]
    WorkerPanicked,
}
