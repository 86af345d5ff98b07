//! Wait-reason classification table.
//!
//! Maps the scheduler's wait-reason code for an outgoing thread to whether
//! the thread stopped because it was waiting for something (blocking) or
//! because the scheduler took the CPU away or it chose to sleep (non-blocking).
//!
//! Unknown codes are reported as `None`; the classifier treats them as
//! non-blocking so an unrecognized reason never inflates blocked time.

use serde::Serialize;
use threadscope_common::wait_reason::MAX_KNOWN;

/// Whether a switch-out means the thread was waiting on something.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitClass {
    /// Waiting for input, a reply, a lock, or other work to complete
    Blocking,
    /// Preempted, quantum expired, sleeping, or suspended
    NonBlocking,
}

use WaitClass::{Blocking, NonBlocking};

/// Code-indexed table of (name, class) for codes `0..=MAX_KNOWN`.
const STANDARD_TABLE: [(&str, WaitClass); MAX_KNOWN as usize + 1] = [
    ("Executive", Blocking),
    ("FreePage", Blocking),
    ("PageIn", Blocking),
    ("PoolAllocation", Blocking),
    ("DelayExecution", NonBlocking),
    ("Suspended", NonBlocking),
    ("UserRequest", Blocking),
    ("WrExecutive", Blocking),
    ("WrFreePage", Blocking),
    ("WrPageIn", Blocking),
    ("WrPoolAllocation", Blocking),
    ("WrDelayExecution", NonBlocking),
    ("WrSuspended", NonBlocking),
    ("WrUserRequest", Blocking),
    ("WrEventPair", Blocking),
    ("WrQueue", Blocking),
    ("WrLpcReceive", Blocking),
    ("WrLpcReply", Blocking),
    ("WrVirtualMemory", Blocking),
    ("WrPageOut", Blocking),
    ("WrRendezvous", Blocking),
    ("WrKeyedEvent", Blocking),
    ("WrTerminated", NonBlocking),
    ("WrProcessInSwap", NonBlocking),
    ("WrCpuRateControl", NonBlocking),
    ("WrCalloutStack", Blocking),
    ("WrKernel", Blocking),
    ("WrResource", Blocking),
    ("WrPushLock", Blocking),
    ("WrMutex", Blocking),
    ("WrQuantumEnd", NonBlocking),
    ("WrDispatchInt", NonBlocking),
    ("WrPreempted", NonBlocking),
    ("WrYieldExecution", NonBlocking),
    ("WrFastMutex", Blocking),
    ("WrGuardedMutex", Blocking),
    ("WrRundown", Blocking),
];

/// Fixed wait-reason lookup table.
#[derive(Debug, Clone, Copy)]
pub struct WaitReasonTable {
    entries: &'static [(&'static str, WaitClass)],
}

impl WaitReasonTable {
    /// The platform's standard table covering codes 0-36.
    #[must_use]
    pub const fn standard() -> Self {
        Self { entries: &STANDARD_TABLE }
    }

    /// Classify a wait-reason code. `None` for codes outside the table.
    #[must_use]
    pub fn classify(&self, code: u32) -> Option<WaitClass> {
        self.entry(code).map(|(_, class)| *class)
    }

    /// Human-readable name of a wait-reason code.
    #[must_use]
    pub fn name(&self, code: u32) -> Option<&'static str> {
        self.entry(code).map(|(name, _)| *name)
    }
}

impl WaitReasonTable {
    fn entry(&self, code: u32) -> Option<&(&'static str, WaitClass)> {
        usize::try_from(code).ok().and_then(|index| self.entries.get(index))
    }
}

impl Default for WaitReasonTable {
    fn default() -> Self {
        Self::standard()
    }
}
