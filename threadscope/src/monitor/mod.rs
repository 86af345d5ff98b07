//! Process monitoring service
//!
//! [`ProcessMonitor`] owns a [`ProcessRegistry`] on a worker thread and
//! applies lifecycle records fed to it through a bounded channel. There is no
//! global instance: the caller constructs the service, feeds it, and stops it
//! to get the registry back.
//!
//! ```text
//! feed() ──▶ [bounded queue] ──▶ worker: registry.apply() ──▶ subscribers
//! stop() ──▶ close queue, join worker, return registry
//! ```

pub mod registry;

use std::thread::JoinHandle;

use crossbeam_channel::{bounded, Sender};
use log::debug;

use crate::domain::MonitorError;

pub use registry::{
    image_name_matches, ImageRecord, ImageStatus, ProcessEvent, ProcessEventKind,
    ProcessNotification, ProcessRecord, ProcessRegistry, Subscription,
};

/// Capacity of the input queue; `feed` blocks when it is full.
const QUEUE_CAPACITY: usize = 1000;

/// Running process monitor service.
pub struct ProcessMonitor {
    input: Option<Sender<ProcessEvent>>,
    worker: Option<JoinHandle<ProcessRegistry>>,
}

impl ProcessMonitor {
    /// Start the service with `registry`.
    ///
    /// Subscribe on the registry before starting; once started it is owned
    /// by the worker until [`stop`](Self::stop).
    #[must_use]
    pub fn start(mut registry: ProcessRegistry) -> Self {
        let (tx, rx) = bounded::<ProcessEvent>(QUEUE_CAPACITY);
        let worker = std::thread::spawn(move || {
            for event in rx {
                registry.apply(&event);
            }
            debug!("Process monitor input closed");
            registry
        });
        Self { input: Some(tx), worker: Some(worker) }
    }

    /// Queue one lifecycle record.
    ///
    /// # Errors
    /// Returns [`MonitorError::Stopped`] if the worker is no longer running.
    pub fn feed(&self, event: ProcessEvent) -> Result<(), MonitorError> {
        let input = self.input.as_ref().ok_or(MonitorError::Stopped)?;
        input.send(event).map_err(|_| MonitorError::Stopped)
    }

    /// Stop the service once every queued record is applied and return the registry.
    ///
    /// # Errors
    /// Returns [`MonitorError::WorkerPanicked`] if the worker thread panicked.
    pub fn stop(mut self) -> Result<ProcessRegistry, MonitorError> {
        self.shutdown().ok_or(MonitorError::Stopped)?
    }

    fn shutdown(&mut self) -> Option<Result<ProcessRegistry, MonitorError>> {
        // Closing the input ends the worker's receive loop
        self.input.take();
        self.worker.take().map(|handle| handle.join().map_err(|_| MonitorError::WorkerPanicked))
    }
}

impl Drop for ProcessMonitor {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}
