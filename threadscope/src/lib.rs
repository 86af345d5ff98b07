//! # threadscope - UI Thread State Breakdown from Scheduling Captures
//!
//! threadscope reads a captured timeline of scheduling events (CPU samples,
//! context switches, ready notifications) for one process and attributes the
//! wall-clock time of its UI thread to activity buckets: running, waiting in
//! the message pump, processing a message, idling, blocked, descheduled while
//! runnable, and ready but not yet scheduled.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                 Capture (JSON, optionally .gz)                  │
//! └───────────────────────┬─────────────────────────────────────────┘
//!                         │ locate / unpack / validate
//!                         ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     threadscope (This Crate)                    │
//! │                                                                 │
//! │  ┌──────────────┐   ┌──────────────┐   ┌──────────────┐         │
//! │  │   Capture    │──▶│   Monitor    │   │ Symbolizer   │         │
//! │  │   loader     │   │ (process     │   │ (symbol      │         │
//! │  │              │   │  filter)     │   │  caches)     │         │
//! │  └──────────────┘   └──────────────┘   └──────┬───────┘         │
//! │                                               ▼                 │
//! │  ┌──────────────┐   ┌──────────────┐   ┌──────────────┐         │
//! │  │    Report    │◀──│  Classifier  │◀──│   Locator    │         │
//! │  │ (text, JSON) │   │ (state       │   │ (entry point │         │
//! │  │              │   │  machine)    │   │  signature)  │         │
//! │  └──────────────┘   └──────────────┘   └──────────────┘         │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Structure
//!
//! - [`capture`]: locate, unpack and load captures; acquisition log
//! - [`monitor`]: process lifecycle registry and the monitor service
//! - [`symbolization`]: resolve raw address frames from symbol caches
//! - [`analysis`]: call-stack walker, target locator, wait reasons, classifier
//! - [`report`]: text rendering and JSON export
//! - [`pipeline`]: the above, end to end
//! - [`config`]: signatures and labels the analysis keys on
//! - [`cli`]: command-line arguments
//! - [`domain`]: `Pid`/`Tid` newtypes and error types
//!
//! ## Typical Usage
//!
//! ```bash
//! threadscope trace.json
//! threadscope trace.json --keep-logs --export report.json
//! RUST_LOG=debug threadscope trace.json --local-symbols
//! ```

pub mod analysis;
pub mod capture;
pub mod cli;
pub mod config;
pub mod domain;
pub mod monitor;
pub mod pipeline;
pub mod report;
pub mod symbolization;
