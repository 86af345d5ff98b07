//! Domain model for threadscope
//!
//! Process and thread id newtypes, plus the error types of each stage.

pub mod errors;
pub mod types;

// Re-export common types for convenience
pub use types::{Pid, Tid};

pub use errors::{CaptureError, ConfigError, MonitorError};
