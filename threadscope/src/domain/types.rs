//! Domain types providing compile-time safety and self-documentation
//!
//! These newtype wrappers prevent passing a process ID where a thread ID is
//! expected, which matters here because capture records carry both.

use serde::Serialize;
use std::fmt;
use threadscope_common::{ProcessId, ThreadId};

/// Process ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Pid(pub ProcessId);

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PID:{}", self.0)
    }
}

/// Thread ID
///
/// Represents a thread ID as recorded by the capture. Thread ids are only
/// unique while the thread is alive, so they are always paired with a capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Tid(pub ThreadId);

impl Tid {
    /// Returns true if `tid` refers to this thread.
    #[must_use]
    pub fn is(self, tid: ThreadId) -> bool {
        self.0 == tid
    }
}

impl fmt::Display for Tid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TID:{}", self.0)
    }
}
