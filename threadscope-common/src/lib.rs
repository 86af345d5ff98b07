//! # Shared Event Model (Capture Producers ↔ Analyzer)
//!
//! Defines the scheduling events and call-stack frames exchanged between
//! whatever produces a capture (trace conversion, symbolization) and the
//! thread-state analyzer. Serde support is opt-in through the `serde`
//! feature so producers that only need the types stay dependency-free.
//!
//! ## Event Kinds
//!
//! 1. **Sample** - CPU sample of one thread with its call stack
//! 2. **Context switch** - CPU moved from `old_tid` to `new_tid`; carries the
//!    outgoing thread's wait reason and the incoming thread's stack
//! 3. **Ready thread** - a waiting thread became runnable
//!
//! ## Key Types
//!
//! - [`Event`] - Tagged union of the three kinds above
//! - [`Frame`] - One call-stack frame, leaf-first ordering
//! - [`FrameSymbol`] - Resolved method name or raw address
//! - [`wait_reason`] - Platform wait-reason codes (0-36)

use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

// ============================================================================
// Identifiers
// ============================================================================

/// Thread ID as recorded by the capture.
pub type ThreadId = u32;

/// Process ID as recorded by the capture.
pub type ProcessId = u32;

/// Module placeholder used in signatures when a frame has no module.
pub const UNKNOWN_MODULE: &str = "?";

// ============================================================================
// Call Stacks
// ============================================================================

/// Symbol part of a frame: either a resolved method or the raw code address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum FrameSymbol {
    /// Fully qualified method name from symbolization
    Method(String),
    /// Unresolved instruction address
    Address(u64),
}

/// A single call-stack frame.
///
/// Stacks are stored as `Vec<Frame>` ordered leaf-first: index 0 is the
/// innermost frame and each following element is its caller.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Frame {
    /// Module (image) name without path, if known
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub module: Option<String>,

    #[cfg_attr(feature = "serde", serde(flatten))]
    pub symbol: FrameSymbol,
}

impl Frame {
    /// Frame with a resolved method name.
    pub fn method(module: impl Into<String>, method: impl Into<String>) -> Self {
        Self { module: Some(module.into()), symbol: FrameSymbol::Method(method.into()) }
    }

    /// Frame that only has a raw address.
    pub fn address(module: Option<&str>, address: u64) -> Self {
        Self { module: module.map(str::to_owned), symbol: FrameSymbol::Address(address) }
    }

    /// Module name, or `?` when the frame has none.
    #[must_use]
    pub fn module_or_unknown(&self) -> &str {
        self.module.as_deref().unwrap_or(UNKNOWN_MODULE)
    }

    /// Frame signature in `module!method` form.
    ///
    /// Unresolved frames render their address in hex (`module!0x7ffe1234`),
    /// a missing module renders as `?`.
    #[must_use]
    pub fn signature(&self) -> String {
        self.to_string()
    }

    /// Returns true if the frame still carries a raw address.
    #[must_use]
    pub fn is_unresolved(&self) -> bool {
        matches!(self.symbol, FrameSymbol::Address(_))
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.symbol {
            FrameSymbol::Method(name) => write!(f, "{}!{name}", self.module_or_unknown()),
            FrameSymbol::Address(addr) => write!(f, "{}!0x{addr:x}", self.module_or_unknown()),
        }
    }
}

// ============================================================================
// Scheduling Events
// ============================================================================

/// A scheduling event from the capture.
///
/// Timestamps are milliseconds relative to capture start and must be
/// non-decreasing across the event sequence.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "type", rename_all = "snake_case"))]
pub enum Event {
    /// CPU sample of a running thread
    Sample {
        timestamp: f64,
        pid: ProcessId,
        tid: ThreadId,
        #[cfg_attr(feature = "serde", serde(default))]
        stack: Vec<Frame>,
    },

    /// Processor switched from `old_tid` to `new_tid`
    ///
    /// `stack` is captured at the switch-in instant and belongs to `new_tid`.
    ContextSwitch {
        timestamp: f64,
        old_tid: ThreadId,
        new_tid: ThreadId,
        old_wait_reason: u32,
        #[cfg_attr(feature = "serde", serde(default))]
        stack: Vec<Frame>,
    },

    /// `awakened_tid` became eligible to run
    ReadyThread { timestamp: f64, awakened_tid: ThreadId },
}

impl Event {
    /// Timestamp of the event in milliseconds.
    #[must_use]
    pub fn timestamp(&self) -> f64 {
        match self {
            Event::Sample { timestamp, .. }
            | Event::ContextSwitch { timestamp, .. }
            | Event::ReadyThread { timestamp, .. } => *timestamp,
        }
    }

    /// Call stack carried by the event, if its kind has one.
    #[must_use]
    pub fn stack(&self) -> Option<&[Frame]> {
        match self {
            Event::Sample { stack, .. } | Event::ContextSwitch { stack, .. } => Some(stack),
            Event::ReadyThread { .. } => None,
        }
    }

    /// Mutable access to the call stack, used when symbolizing in place.
    pub fn stack_mut(&mut self) -> Option<&mut Vec<Frame>> {
        match self {
            Event::Sample { stack, .. } | Event::ContextSwitch { stack, .. } => Some(stack),
            Event::ReadyThread { .. } => None,
        }
    }
}

// ============================================================================
// Wait Reasons
// ============================================================================

/// Platform wait-reason codes carried by context switches.
///
/// Values follow the kernel's `KWAIT_REASON` enumeration.
pub mod wait_reason {
    pub const EXECUTIVE: u32 = 0;
    pub const FREE_PAGE: u32 = 1;
    pub const PAGE_IN: u32 = 2;
    pub const POOL_ALLOCATION: u32 = 3;
    pub const DELAY_EXECUTION: u32 = 4;
    pub const SUSPENDED: u32 = 5;
    pub const USER_REQUEST: u32 = 6;
    pub const WR_EXECUTIVE: u32 = 7;
    pub const WR_FREE_PAGE: u32 = 8;
    pub const WR_PAGE_IN: u32 = 9;
    pub const WR_POOL_ALLOCATION: u32 = 10;
    pub const WR_DELAY_EXECUTION: u32 = 11;
    pub const WR_SUSPENDED: u32 = 12;
    pub const WR_USER_REQUEST: u32 = 13;
    pub const WR_EVENT_PAIR: u32 = 14;
    pub const WR_QUEUE: u32 = 15;
    pub const WR_LPC_RECEIVE: u32 = 16;
    pub const WR_LPC_REPLY: u32 = 17;
    pub const WR_VIRTUAL_MEMORY: u32 = 18;
    pub const WR_PAGE_OUT: u32 = 19;
    pub const WR_RENDEZVOUS: u32 = 20;
    pub const WR_KEYED_EVENT: u32 = 21;
    pub const WR_TERMINATED: u32 = 22;
    pub const WR_PROCESS_IN_SWAP: u32 = 23;
    pub const WR_CPU_RATE_CONTROL: u32 = 24;
    pub const WR_CALLOUT_STACK: u32 = 25;
    pub const WR_KERNEL: u32 = 26;
    pub const WR_RESOURCE: u32 = 27;
    pub const WR_PUSH_LOCK: u32 = 28;
    pub const WR_MUTEX: u32 = 29;
    pub const WR_QUANTUM_END: u32 = 30;
    pub const WR_DISPATCH_INT: u32 = 31;
    pub const WR_PREEMPTED: u32 = 32;
    pub const WR_YIELD_EXECUTION: u32 = 33;
    pub const WR_FAST_MUTEX: u32 = 34;
    pub const WR_GUARDED_MUTEX: u32 = 35;
    pub const WR_RUNDOWN: u32 = 36;

    /// Highest code the wait-reason table knows about.
    pub const MAX_KNOWN: u32 = WR_RUNDOWN;
}
