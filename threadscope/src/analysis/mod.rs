//! Thread-state analysis
//!
//! Pure analysis logic over an already-loaded event sequence, separated from
//! capture acquisition and report presentation:
//!
//! - [`call_stack`]: activity-label extraction relative to an anchor frame
//! - [`locator`]: find the target thread by its entry-point frame
//! - [`wait_reason`]: blocking/non-blocking table for wait-reason codes
//! - [`activity`]: activity label → bucket table
//! - [`classifier`]: the per-thread state machine producing the breakdown

pub mod activity;
pub mod call_stack;
pub mod classifier;
pub mod locator;
pub mod wait_reason;

pub use activity::{ActivityBucket, ActivityTable};
pub use call_stack::{extract_activity_label, frame_matches, stack_contains};
pub use classifier::{
    classify, Anomaly, AnomalyKind, DurationTotals, EventCounters, ThreadBreakdown,
    ThreadStateClassifier,
};
pub use locator::locate_target_thread;
pub use wait_reason::{WaitClass, WaitReasonTable};
