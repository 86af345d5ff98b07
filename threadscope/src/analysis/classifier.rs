//! # Thread-State Classifier
//!
//! Replays scheduling events for one thread and attributes its wall-clock
//! time to activity buckets.
//!
//! ## State Machine
//!
//! ```text
//!            switch-out (wait reason)                 ready
//!   ON-CPU ───────────────────────────▶ OFF-CPU ─────────────▶ OFF-CPU+READY
//!     ▲                                    │                        │
//!     └──────── switch-in (stack) ─────────┴────────────────────────┘
//! ```
//!
//! - **ON-CPU → OFF-CPU**: time since switch-in goes to `running`; the wait
//!   reason decides whether the coming off-CPU gap is blocking.
//! - **OFF-CPU → ON-CPU**: the off-CPU gap goes to one bucket. Blocking gaps are
//!   split by the activity label of the switch-in stack, non-blocking gaps go
//!   to `not_running`. If the thread was readied meanwhile, the ready-to-run
//!   latency is additionally added to `ready`.
//!
//! Captures come from a live, preemptible system, so transitions can be
//! missing or duplicated (truncation at either end, lost buffers). Such
//! irregularities are recorded as [`Anomaly`] entries and processing goes on.
//!
//! Events must arrive in non-decreasing timestamp order; nothing is reordered.

use std::fmt;

use log::{debug, warn};
use serde::Serialize;
use threadscope_common::{Event, Frame};

use super::activity::{ActivityBucket, ActivityTable};
use super::call_stack::extract_activity_label;
use super::wait_reason::{WaitClass, WaitReasonTable};
use crate::domain::Tid;

// =============================================================================
// RESULT TYPES
// =============================================================================

/// Event counters for the target thread.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EventCounters {
    pub samples: u64,
    pub context_switches: u64,
    pub ready_thread_events: u64,
    /// Samples whose stack did not reach the anchor frame
    pub skipped_samples: u64,
    /// Switch-ins whose stack did not reach the anchor frame
    pub skipped_context_switches: u64,
}

/// Cumulative time per bucket, in milliseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct DurationTotals {
    pub running: f64,
    pub message_pump_wait: f64,
    pub process_message: f64,
    pub idle: f64,
    pub blocked: f64,
    pub not_running: f64,
    /// Ready-to-running latency; nested inside the off-CPU buckets
    pub ready: f64,
}

impl DurationTotals {
    /// Sum of all on-CPU and off-CPU buckets.
    ///
    /// `ready` is excluded because it overlaps the off-CPU buckets.
    #[must_use]
    pub fn accounted(&self) -> f64 {
        self.running
            + self.message_pump_wait
            + self.process_message
            + self.idle
            + self.blocked
            + self.not_running
    }

    fn bucket_mut(&mut self, bucket: ActivityBucket) -> &mut f64 {
        match bucket {
            ActivityBucket::MessagePumpWait => &mut self.message_pump_wait,
            ActivityBucket::ProcessMessage => &mut self.process_message,
            ActivityBucket::Idle => &mut self.idle,
            ActivityBucket::Blocked => &mut self.blocked,
        }
    }
}

/// A state-machine irregularity found while replaying events.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Anomaly {
    /// Timestamp of the event that exposed the irregularity (ms)
    pub timestamp: f64,
    #[serde(flatten)]
    pub kind: AnomalyKind,
}

/// Kinds of irregularities, with the timestamps needed to audit them.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnomalyKind {
    /// Switched out again without a switch-in in between
    DoubleSwitchOut { previous_switch_out: f64 },
    /// Switched out but the previous switch-in was never seen
    SwitchOutWithoutSwitchIn,
    /// Switched out while still marked ready
    SwitchOutWhileReady { ready_since: f64 },
    /// Switched in again without a switch-out in between
    DoubleSwitchIn { previous_switch_in: f64 },
    /// Switched in but the previous switch-out was never seen
    SwitchInWithoutSwitchOut,
    /// Readied again while already ready
    ReadyWhileReady { ready_since: f64 },
    /// Wait-reason code missing from the table; treated as non-blocking
    UnknownWaitReason { code: u32 },
}

impl fmt::Display for AnomalyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnomalyKind::DoubleSwitchOut { previous_switch_out } => {
                write!(f, "switch-out while already switched out since {previous_switch_out:.3}ms")
            }
            AnomalyKind::SwitchOutWithoutSwitchIn => {
                write!(f, "switch-out without a matching switch-in")
            }
            AnomalyKind::SwitchOutWhileReady { ready_since } => {
                write!(f, "switch-out while ready since {ready_since:.3}ms")
            }
            AnomalyKind::DoubleSwitchIn { previous_switch_in } => {
                write!(f, "switch-in while already switched in since {previous_switch_in:.3}ms")
            }
            AnomalyKind::SwitchInWithoutSwitchOut => {
                write!(f, "switch-in without a matching switch-out")
            }
            AnomalyKind::ReadyWhileReady { ready_since } => {
                write!(f, "ready while already ready since {ready_since:.3}ms")
            }
            AnomalyKind::UnknownWaitReason { code } => {
                write!(f, "unknown wait reason {code}, counted as non-blocking")
            }
        }
    }
}

impl fmt::Display for Anomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:.3}ms] {}", self.timestamp, self.kind)
    }
}

/// Final output of a classifier run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThreadBreakdown {
    pub counters: EventCounters,
    pub durations: DurationTotals,
    /// First and last timestamp of all events offered, if any
    pub span: Option<(f64, f64)>,
    pub anomalies: Vec<Anomaly>,
}

impl ThreadBreakdown {
    /// Length of the span in milliseconds (0 when no events were seen).
    #[must_use]
    pub fn span_ms(&self) -> f64 {
        self.span.map_or(0.0, |(first, last)| last - first)
    }
}

// =============================================================================
// CLASSIFIER
// =============================================================================

/// Switch/ready timestamps for the target thread.
///
/// At most one of `switch_out` and `switch_in` is set at a time.
#[derive(Debug, Default)]
struct ThreadState {
    switch_out: Option<f64>,
    switch_in: Option<f64>,
    ready: Option<f64>,
    /// Meaningful only while `switch_out` is set
    switch_was_blocking: bool,
    seen_first_switch: bool,
}

/// Single-pass, single-owner classifier for one target thread.
///
/// Feed every event in capture order through [`process_event`](Self::process_event),
/// then call [`finish`](Self::finish). Totals read before the stream is
/// exhausted are valid but incomplete.
#[derive(Debug)]
pub struct ThreadStateClassifier {
    // Configuration
    target: Tid,
    anchor: String,
    activities: ActivityTable,
    wait_reasons: WaitReasonTable,

    // Mutable state
    state: ThreadState,
    counters: EventCounters,
    durations: DurationTotals,
    span: Option<(f64, f64)>,
    anomalies: Vec<Anomaly>,
}

impl ThreadStateClassifier {
    /// Create a classifier for `target` using the standard wait-reason table.
    #[must_use]
    pub fn new(target: Tid, anchor: impl Into<String>, activities: ActivityTable) -> Self {
        Self {
            target,
            anchor: anchor.into(),
            activities,
            wait_reasons: WaitReasonTable::standard(),
            state: ThreadState::default(),
            counters: EventCounters::default(),
            durations: DurationTotals::default(),
            span: None,
            anomalies: Vec::new(),
        }
    }

    /// Replace the wait-reason table.
    #[must_use]
    pub fn with_wait_reasons(mut self, wait_reasons: WaitReasonTable) -> Self {
        self.wait_reasons = wait_reasons;
        self
    }

    /// Counters so far.
    #[must_use]
    pub fn counters(&self) -> &EventCounters {
        &self.counters
    }

    /// Durations so far.
    #[must_use]
    pub fn durations(&self) -> &DurationTotals {
        &self.durations
    }

    /// Anomalies recorded so far.
    #[must_use]
    pub fn anomalies(&self) -> &[Anomaly] {
        &self.anomalies
    }

    /// Process a single event.
    pub fn process_event(&mut self, event: &Event) {
        let timestamp = event.timestamp();
        self.span = Some(match self.span {
            Some((first, _)) => (first, timestamp),
            None => (timestamp, timestamp),
        });

        match event {
            Event::Sample { tid, stack, .. } => {
                if self.target.is(*tid) {
                    self.handle_sample(stack);
                }
            }
            Event::ContextSwitch { old_tid, new_tid, old_wait_reason, stack, .. } => {
                if self.target.is(*old_tid) {
                    self.handle_switch_out(timestamp, *old_wait_reason);
                }
                if self.target.is(*new_tid) {
                    self.handle_switch_in(timestamp, stack);
                }
            }
            Event::ReadyThread { awakened_tid, .. } => {
                if self.target.is(*awakened_tid) {
                    self.handle_ready(timestamp);
                }
            }
        }
    }

    /// Process every event of `events` in order.
    pub fn process_all<'a, I>(&mut self, events: I)
    where
        I: IntoIterator<Item = &'a Event>,
    {
        for event in events {
            self.process_event(event);
        }
    }

    /// Consume the classifier and return the final totals.
    #[must_use]
    pub fn finish(self) -> ThreadBreakdown {
        ThreadBreakdown {
            counters: self.counters,
            durations: self.durations,
            span: self.span,
            anomalies: self.anomalies,
        }
    }

    // Private event handlers

    fn handle_sample(&mut self, stack: &[Frame]) {
        self.counters.samples += 1;
        if extract_activity_label(stack, &self.anchor).is_none() {
            self.counters.skipped_samples += 1;
        }
    }

    fn handle_switch_out(&mut self, timestamp: f64, wait_reason: u32) {
        self.counters.context_switches += 1;

        if let Some(previous_switch_out) = self.state.switch_out {
            self.record(timestamp, AnomalyKind::DoubleSwitchOut { previous_switch_out });
        }
        if self.state.seen_first_switch && self.state.switch_in.is_none() {
            self.record(timestamp, AnomalyKind::SwitchOutWithoutSwitchIn);
        }
        if let Some(ready_since) = self.state.ready {
            self.record(timestamp, AnomalyKind::SwitchOutWhileReady { ready_since });
        }

        if let Some(switch_in) = self.state.switch_in.take() {
            self.durations.running += timestamp - switch_in;
        }
        self.state.switch_out = Some(timestamp);

        self.state.switch_was_blocking = match self.wait_reasons.classify(wait_reason) {
            Some(class) => class == WaitClass::Blocking,
            None => {
                self.record(timestamp, AnomalyKind::UnknownWaitReason { code: wait_reason });
                false
            }
        };
        self.state.seen_first_switch = true;
    }

    fn handle_switch_in(&mut self, timestamp: f64, stack: &[Frame]) {
        self.counters.context_switches += 1;

        if let Some(previous_switch_in) = self.state.switch_in {
            self.record(timestamp, AnomalyKind::DoubleSwitchIn { previous_switch_in });
        }
        if self.state.seen_first_switch && self.state.switch_out.is_none() {
            self.record(timestamp, AnomalyKind::SwitchInWithoutSwitchOut);
        }

        match extract_activity_label(stack, &self.anchor) {
            None => self.counters.skipped_context_switches += 1,
            Some(label) => self.attribute_off_cpu(timestamp, &label),
        }

        self.state.switch_out = None;
        self.state.switch_in = Some(timestamp);
        self.state.ready = None;
        self.state.seen_first_switch = true;
    }

    /// Attribute the off-CPU gap ending at `timestamp` to its bucket.
    fn attribute_off_cpu(&mut self, timestamp: f64, label: &str) {
        // No switch-out seen yet (thread was off-CPU when the capture began)
        let Some(switch_out) = self.state.switch_out else {
            return;
        };

        let elapsed = timestamp - switch_out;
        if self.state.switch_was_blocking {
            let bucket = self.activities.bucket_for(label);
            debug!("{:.3}ms off-CPU in {label} -> {bucket:?}", elapsed);
            *self.durations.bucket_mut(bucket) += elapsed;
        } else {
            self.durations.not_running += elapsed;
        }

        if let Some(ready) = self.state.ready {
            self.durations.ready += timestamp - ready;
        }
    }

    fn handle_ready(&mut self, timestamp: f64) {
        self.counters.ready_thread_events += 1;

        if let Some(ready_since) = self.state.ready {
            self.record(timestamp, AnomalyKind::ReadyWhileReady { ready_since });
        }
        // A wake signal while already on-CPU carries no latency to measure
        if self.state.switch_out.is_some() {
            self.state.ready = Some(timestamp);
        }
    }

    fn record(&mut self, timestamp: f64, kind: AnomalyKind) {
        let anomaly = Anomaly { timestamp, kind };
        warn!("{} {anomaly}", self.target);
        self.anomalies.push(anomaly);
    }
}

/// Classify `events` for `target` in a single pass.
pub fn classify<'a, I>(
    events: I,
    target: Tid,
    anchor: &str,
    activities: ActivityTable,
    wait_reasons: WaitReasonTable,
) -> ThreadBreakdown
where
    I: IntoIterator<Item = &'a Event>,
{
    let mut classifier =
        ThreadStateClassifier::new(target, anchor, activities).with_wait_reasons(wait_reasons);
    classifier.process_all(events);
    classifier.finish()
}
