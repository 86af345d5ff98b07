//! # Capture Acquisition
//!
//! Loads a capture from disk and provides the views the analyzer needs.
//!
//! ## Capture Format
//!
//! A JSON document produced by the trace conversion step:
//!
//! ```json
//! {
//!   "version": 1,
//!   "processes": [{ "pid": 4242, "name": "devenv.exe" }],
//!   "process_events": [
//!     { "kind": "start", "pid": 4242, "image_file_name": "devenv.exe", "timestamp": 0.0 },
//!     { "kind": "image_load", "pid": 4242, "image_file_name": "C:\\VS\\msenv.dll",
//!       "image_base": 1879048192, "image_size": 4194304, "timestamp": 0.5 }
//!   ],
//!   "events": [
//!     { "type": "sample", "timestamp": 1.0, "pid": 4242, "tid": 17, "stack": [{ "module": "devenv", "method": "WinMain" }] },
//!     { "type": "context_switch", "timestamp": 2.0, "old_tid": 17, "new_tid": 0, "old_wait_reason": 13, "stack": [] },
//!     { "type": "ready_thread", "timestamp": 3.0, "awakened_tid": 17 }
//!   ]
//! }
//! ```
//!
//! Stacks are leaf-first; frames carry either `method` or a raw `address`.
//! Process records are `start`/`end`/`rundown_start`/`rundown_end` for
//! processes and `image_load`/`image_unload`/`image_rundown` for the images
//! mapped into them.
//! Scheduling events must be in non-decreasing timestamp order. Captures
//! that violate this are rejected rather than reordered.

pub mod acquisition_log;
pub mod archive;

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use log::info;
use serde::Deserialize;
use threadscope_common::Event;

use crate::domain::{CaptureError, Pid};
use crate::monitor::{
    ProcessEvent, ProcessMonitor, ProcessNotification, ProcessRecord, ProcessRegistry,
    Subscription,
};

pub use acquisition_log::AcquisitionLog;
pub use archive::locate_capture;

/// Capture format version this build reads.
pub const SUPPORTED_VERSION: u32 = 1;

/// Process present in the capture.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProcessInfo {
    pub pid: u32,
    pub name: String,
}

#[derive(Debug, Deserialize)]
struct CaptureFile {
    version: u32,
    #[serde(default)]
    processes: Vec<ProcessInfo>,
    #[serde(default)]
    process_events: Vec<ProcessEvent>,
    #[serde(default)]
    events: Vec<Event>,
}

/// A loaded, validated capture.
#[derive(Debug)]
pub struct Capture {
    path: PathBuf,
    processes: Vec<ProcessInfo>,
    process_events: Vec<ProcessEvent>,
    events: Vec<Event>,
}

impl Capture {
    /// Locate (unpacking if needed) and load the capture at `path`.
    ///
    /// # Errors
    /// Any [`CaptureError`] from locating, reading or validating the capture.
    pub fn load(path: &Path, log: &mut AcquisitionLog) -> Result<Self, CaptureError> {
        let located = locate_capture(path, log)?;
        let file = File::open(&located)?;
        let capture = Self::from_reader(BufReader::new(file), located)?;
        log.record(format!(
            "Loaded {} scheduling events, {} processes, {} process records",
            capture.events.len(),
            capture.processes.len(),
            capture.process_events.len()
        ));
        Ok(capture)
    }

    /// Parse and validate a capture from `reader`; `path` is kept for reporting.
    ///
    /// # Errors
    /// [`CaptureError::Json`] on malformed input, [`CaptureError::InvalidCapture`]
    /// on an unsupported version or out-of-order events.
    pub fn from_reader<R: Read>(reader: R, path: PathBuf) -> Result<Self, CaptureError> {
        let file: CaptureFile = serde_json::from_reader(reader)?;
        if file.version != SUPPORTED_VERSION {
            return Err(CaptureError::InvalidCapture(format!(
                "unsupported version {} (expected {SUPPORTED_VERSION})",
                file.version
            )));
        }
        validate_order(&file.events)?;
        Ok(Self {
            path,
            processes: file.processes,
            process_events: file.process_events,
            events: file.events,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All scheduling events in capture order.
    #[must_use]
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// Mutable events, for in-place symbolization.
    pub fn events_mut(&mut self) -> &mut [Event] {
        &mut self.events
    }

    /// Sample events of one process.
    pub fn process_samples(&self, pid: Pid) -> impl Iterator<Item = &Event> + '_ {
        self.events
            .iter()
            .filter(move |event| matches!(event, Event::Sample { pid: p, .. } if *p == pid.0))
    }

    /// Find the single instance of process `name`.
    ///
    /// # Errors
    /// See [`track_process`](Self::track_process).
    pub fn find_process(&self, name: &str, log: &mut AcquisitionLog) -> Result<Pid, CaptureError> {
        self.track_process(name, log).map(|(pid, _)| pid)
    }

    /// Find the single instance of process `name` along with its lifecycle
    /// and image records.
    ///
    /// Process records are replayed through a [`ProcessMonitor`], whose
    /// notifications are copied into `log`.
    ///
    /// # Errors
    /// [`CaptureError::ProcessNotFound`] when there is no instance,
    /// [`CaptureError::AmbiguousProcess`] when there is more than one.
    pub fn track_process(
        &self,
        name: &str,
        log: &mut AcquisitionLog,
    ) -> Result<(Pid, ProcessRecord), CaptureError> {
        let mut registry = ProcessRegistry::new(name);
        let notifications = registry.subscribe(Subscription::All);
        for process in &self.processes {
            registry.observe_existing(process.pid, &process.name);
        }

        let monitor = ProcessMonitor::start(registry);
        for event in &self.process_events {
            monitor
                .feed(event.clone())
                .map_err(|e| CaptureError::InvalidCapture(e.to_string()))?;
        }
        let registry = monitor.stop().map_err(|e| CaptureError::InvalidCapture(e.to_string()))?;

        for notification in notifications.try_iter() {
            match notification {
                ProcessNotification::Started { pid, name } => {
                    log.record(format!("Process {pid} ({name}) started"));
                }
                ProcessNotification::Ended { pid } => log.record(format!("Process {pid} ended")),
                ProcessNotification::Anomaly { message, .. } => {
                    log.record(format!("Process anomaly: {message}"));
                }
                ProcessNotification::ImageLoaded { pid, file_name, base, load_order } => {
                    log.record(format!("{pid} loaded #{load_order} {file_name} at 0x{base:x}"));
                }
                ProcessNotification::ImageUnloaded { pid, file_name, base } => {
                    log.record(format!("{pid} unloaded {file_name} at 0x{base:x}"));
                }
            }
        }

        let instances = registry.instances();
        match instances.as_slice() {
            [] => Err(CaptureError::ProcessNotFound(name.to_string())),
            [pid] => {
                let record = registry.get(*pid).cloned().unwrap_or_default();
                info!("Found {name} as {pid} with {} images", record.images.len());
                Ok((*pid, record))
            }
            _ => Err(CaptureError::AmbiguousProcess {
                name: name.to_string(),
                count: instances.len(),
            }),
        }
    }
}

/// Reject non-finite or decreasing timestamps.
fn validate_order(events: &[Event]) -> Result<(), CaptureError> {
    let mut previous = f64::NEG_INFINITY;
    for (index, event) in events.iter().enumerate() {
        let timestamp = event.timestamp();
        if !timestamp.is_finite() {
            return Err(CaptureError::InvalidCapture(format!(
                "event {index} has non-finite timestamp"
            )));
        }
        if timestamp < previous {
            return Err(CaptureError::InvalidCapture(format!(
                "event {index} at {timestamp}ms precedes previous event at {previous}ms"
            )));
        }
        previous = timestamp;
    }
    Ok(())
}
