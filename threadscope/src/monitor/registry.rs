//! Process lifecycle registry with publish/subscribe notifications.
//!
//! Tracks instances of one process image from start/end and rundown records
//! and fans out notifications to subscribers over `crossbeam_channel` queues.
//! Subscribers are keyed by process id, or subscribe to every tracked process.
//!
//! Each tracked process also keeps the images (DLLs, executables) loaded into
//! it, in load order:
//!
//! ```text
//! image_load / image_rundown   base not yet loaded → new record, ImageLoaded
//!                              base already loaded → ignored
//! image_unload                 base loaded under the same file name → Unloaded, ImageUnloaded
//!                              otherwise → ignored
//! ```

use std::collections::BTreeMap;

use crossbeam_channel::{unbounded, Receiver, Sender};
use log::{debug, warn};
use serde::Deserialize;

use crate::domain::Pid;

/// Kind of a process lifecycle record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessEventKind {
    Start,
    End,
    /// Process was already running when the capture began
    RundownStart,
    /// Process was still running when the capture ended
    RundownEnd,
    /// Image mapped into a tracked process
    ImageLoad,
    /// Image unmapped from a tracked process
    ImageUnload,
    /// Image was already mapped when the capture began
    ImageRundown,
}

impl ProcessEventKind {
    #[must_use]
    pub fn is_image(self) -> bool {
        matches!(self, Self::ImageLoad | Self::ImageUnload | Self::ImageRundown)
    }
}

/// Process lifecycle record from a capture.
///
/// For process kinds `image_file_name` is the process image; for image kinds
/// it is the loaded file and `image_base`/`image_size` give its mapping.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ProcessEvent {
    pub kind: ProcessEventKind,
    pub pid: u32,
    pub image_file_name: String,
    #[serde(default)]
    pub timestamp: f64,
    #[serde(default)]
    pub image_base: u64,
    #[serde(default)]
    pub image_size: u64,
}

impl ProcessEvent {
    /// Process start/end/rundown record.
    pub fn process(kind: ProcessEventKind, pid: u32, name: impl Into<String>, timestamp: f64) -> Self {
        Self { kind, pid, image_file_name: name.into(), timestamp, image_base: 0, image_size: 0 }
    }

    /// Image load/unload/rundown record.
    pub fn image(
        kind: ProcessEventKind,
        pid: u32,
        file_name: impl Into<String>,
        image_base: u64,
        image_size: u64,
        timestamp: f64,
    ) -> Self {
        Self { kind, pid, image_file_name: file_name.into(), timestamp, image_base, image_size }
    }
}

/// Notification delivered to subscribers.
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessNotification {
    Started { pid: Pid, name: String },
    Ended { pid: Pid },
    Anomaly { pid: Pid, message: String },
    ImageLoaded { pid: Pid, file_name: String, base: u64, load_order: usize },
    ImageUnloaded { pid: Pid, file_name: String, base: u64 },
}

impl ProcessNotification {
    fn pid(&self) -> Pid {
        match self {
            ProcessNotification::Started { pid, .. }
            | ProcessNotification::Ended { pid }
            | ProcessNotification::Anomaly { pid, .. }
            | ProcessNotification::ImageLoaded { pid, .. }
            | ProcessNotification::ImageUnloaded { pid, .. } => *pid,
        }
    }
}

/// Which notifications a subscriber receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subscription {
    All,
    Process(Pid),
}

impl Subscription {
    fn matches(self, pid: Pid) -> bool {
        match self {
            Subscription::All => true,
            Subscription::Process(wanted) => wanted == pid,
        }
    }
}

/// Whether an image is still mapped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageStatus {
    Loaded,
    Unloaded,
}

/// One image mapped into a tracked process.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageRecord {
    pub file_name: String,
    /// Position among the process's images, starting at 0
    pub load_order: usize,
    pub base: u64,
    pub size: u64,
    /// `None` when the image was mapped before the capture began
    pub loaded_at: Option<f64>,
    pub unloaded_at: Option<f64>,
}

impl ImageRecord {
    #[must_use]
    pub fn status(&self) -> ImageStatus {
        if self.unloaded_at.is_some() {
            ImageStatus::Unloaded
        } else {
            ImageStatus::Loaded
        }
    }

    /// Module name: file name without directories or extension.
    #[must_use]
    pub fn module_name(&self) -> &str {
        let base = self.file_name.rsplit(['/', '\\']).next().unwrap_or(&self.file_name);
        base.rsplit_once('.').map_or(base, |(stem, _)| stem)
    }

    /// Returns true if `addr` is inside the image's mapping.
    #[must_use]
    pub fn contains(&self, addr: u64) -> bool {
        addr >= self.base && addr - self.base < self.size
    }

    /// Returns true if the image was mapped at `timestamp`.
    #[must_use]
    pub fn mapped_at(&self, timestamp: f64) -> bool {
        self.loaded_at.is_none_or(|at| at <= timestamp)
            && self.unloaded_at.is_none_or(|at| timestamp < at)
    }
}

/// One tracked process instance.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ProcessRecord {
    pub name: String,
    /// `None` when the start was not part of the capture
    pub started_at: Option<f64>,
    pub ended_at: Option<f64>,
    /// Every image seen, in load order
    pub images: Vec<ImageRecord>,
    /// Index into `images` of each currently loaded base
    loaded: BTreeMap<u64, usize>,
}

impl ProcessRecord {
    fn new(name: &str, started_at: Option<f64>, ended_at: Option<f64>) -> Self {
        Self { name: name.to_string(), started_at, ended_at, ..Self::default() }
    }

    #[must_use]
    pub fn is_live(&self) -> bool {
        self.ended_at.is_none()
    }

    /// Currently loaded image at `base`.
    #[must_use]
    pub fn loaded_image(&self, base: u64) -> Option<&ImageRecord> {
        self.loaded.get(&base).and_then(|&index| self.images.get(index))
    }

    /// Record a load; returns the new image, or `None` if `base` is already loaded.
    fn load_image(&mut self, file_name: &str, base: u64, size: u64, loaded_at: Option<f64>) -> Option<&ImageRecord> {
        if self.loaded.contains_key(&base) {
            return None;
        }
        let load_order = self.images.len();
        self.images.push(ImageRecord {
            file_name: file_name.to_string(),
            load_order,
            base,
            size,
            loaded_at,
            unloaded_at: None,
        });
        self.loaded.insert(base, load_order);
        self.images.last()
    }

    /// Record an unload; only an image loaded at `base` under `file_name` is unloaded.
    fn unload_image(&mut self, file_name: &str, base: u64, timestamp: f64) -> bool {
        let Some(&index) = self.loaded.get(&base) else {
            return false;
        };
        let Some(image) = self.images.get_mut(index) else {
            return false;
        };
        if image.file_name != file_name {
            return false;
        }
        image.unloaded_at = Some(timestamp);
        self.loaded.remove(&base);
        true
    }
}

/// Returns true if `image` names the process `filter`.
///
/// Case-insensitive, and a trailing `.exe` is optional on either side.
#[must_use]
pub fn image_name_matches(image: &str, filter: &str) -> bool {
    fn normalize(name: &str) -> String {
        let base = name.rsplit(['/', '\\']).next().unwrap_or(name).to_ascii_lowercase();
        match base.strip_suffix(".exe") {
            Some(stem) => stem.to_string(),
            None => base,
        }
    }
    normalize(image) == normalize(filter)
}

/// Registry of process instances matching one image name.
#[derive(Debug)]
pub struct ProcessRegistry {
    filter: String,
    processes: BTreeMap<Pid, ProcessRecord>,
    subscribers: Vec<(Subscription, Sender<ProcessNotification>)>,
    anomalies: Vec<String>,
}

impl ProcessRegistry {
    /// Create a registry tracking processes named `filter`.
    #[must_use]
    pub fn new(filter: impl Into<String>) -> Self {
        Self {
            filter: filter.into(),
            processes: BTreeMap::new(),
            subscribers: Vec::new(),
            anomalies: Vec::new(),
        }
    }

    /// Subscribe to notifications.
    ///
    /// The new subscriber immediately receives `Started` for every live
    /// process it matches, then every later notification in order.
    pub fn subscribe(&mut self, subscription: Subscription) -> Receiver<ProcessNotification> {
        let (tx, rx) = unbounded();
        for (pid, record) in &self.processes {
            if record.is_live() && subscription.matches(*pid) {
                let _ = tx.send(ProcessNotification::Started { pid: *pid, name: record.name.clone() });
            }
        }
        self.subscribers.push((subscription, tx));
        rx
    }

    /// Record a process already present when the capture began.
    pub fn observe_existing(&mut self, pid: u32, name: &str) {
        if !image_name_matches(name, &self.filter) || self.processes.contains_key(&Pid(pid)) {
            return;
        }
        self.processes.insert(Pid(pid), ProcessRecord::new(name, None, None));
        self.publish(ProcessNotification::Started { pid: Pid(pid), name: name.to_string() });
    }

    /// Apply one lifecycle record.
    pub fn apply(&mut self, event: &ProcessEvent) {
        if event.kind.is_image() {
            self.apply_image(event);
            return;
        }
        if !image_name_matches(&event.image_file_name, &self.filter) {
            return;
        }
        let pid = Pid(event.pid);

        match event.kind {
            ProcessEventKind::Start | ProcessEventKind::RundownStart => {
                if self.processes.get(&pid).is_some_and(ProcessRecord::is_live) {
                    self.anomaly(pid, format!("process {pid} already started"));
                }
                debug!("{pid} ({}) started at {:.3}ms", event.image_file_name, event.timestamp);
                self.processes.insert(
                    pid,
                    ProcessRecord::new(&event.image_file_name, Some(event.timestamp), None),
                );
                self.publish(ProcessNotification::Started {
                    pid,
                    name: event.image_file_name.clone(),
                });
            }
            ProcessEventKind::End | ProcessEventKind::RundownEnd => {
                match self.processes.get_mut(&pid) {
                    Some(record) if record.is_live() => record.ended_at = Some(event.timestamp),
                    Some(record) => {
                        record.ended_at = Some(event.timestamp);
                        self.anomaly(pid, format!("process {pid} ended twice"));
                    }
                    None => {
                        self.processes.insert(
                            pid,
                            ProcessRecord::new(&event.image_file_name, None, Some(event.timestamp)),
                        );
                        self.anomaly(pid, format!("process {pid} ended without a start"));
                    }
                }
                self.publish(ProcessNotification::Ended { pid });
            }
            ProcessEventKind::ImageLoad
            | ProcessEventKind::ImageUnload
            | ProcessEventKind::ImageRundown => {}
        }
    }

    /// Apply an image record to its process; images of untracked processes are ignored.
    fn apply_image(&mut self, event: &ProcessEvent) {
        let pid = Pid(event.pid);
        let Some(record) = self.processes.get_mut(&pid) else {
            return;
        };
        let file_name = event.image_file_name.clone();
        let base = event.image_base;

        let notification = match event.kind {
            ProcessEventKind::ImageLoad | ProcessEventKind::ImageRundown => {
                let loaded_at = (event.kind == ProcessEventKind::ImageLoad).then_some(event.timestamp);
                match record.load_image(&file_name, base, event.image_size, loaded_at) {
                    Some(image) => ProcessNotification::ImageLoaded {
                        pid,
                        file_name,
                        base,
                        load_order: image.load_order,
                    },
                    None => {
                        debug!("{pid}: {file_name} at 0x{base:x} already loaded");
                        return;
                    }
                }
            }
            _ => {
                if !record.unload_image(&file_name, base, event.timestamp) {
                    debug!("{pid}: ignoring unload of {file_name} at 0x{base:x}");
                    return;
                }
                ProcessNotification::ImageUnloaded { pid, file_name, base }
            }
        };
        self.publish(notification);
    }

    /// Process ids of every instance seen, in ascending order.
    #[must_use]
    pub fn instances(&self) -> Vec<Pid> {
        self.processes.keys().copied().collect()
    }

    /// Record for one instance.
    #[must_use]
    pub fn get(&self, pid: Pid) -> Option<&ProcessRecord> {
        self.processes.get(&pid)
    }

    /// Lifecycle irregularities seen so far.
    #[must_use]
    pub fn anomalies(&self) -> &[String] {
        &self.anomalies
    }

    fn anomaly(&mut self, pid: Pid, message: String) {
        warn!("{message}");
        self.anomalies.push(message.clone());
        self.publish(ProcessNotification::Anomaly { pid, message });
    }

    fn publish(&mut self, notification: ProcessNotification) {
        let pid = notification.pid();
        // Drop subscribers whose receiver is gone
        self.subscribers.retain(|(subscription, tx)| {
            !subscription.matches(pid) || tx.send(notification.clone()).is_ok()
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(kind: ProcessEventKind, pid: u32, name: &str) -> ProcessEvent {
        ProcessEvent::process(kind, pid, name, 1.0)
    }

    fn image(kind: ProcessEventKind, file: &str, base: u64, timestamp: f64) -> ProcessEvent {
        ProcessEvent::image(kind, 5, file, base, 0x1000, timestamp)
    }

    fn tracked() -> ProcessRegistry {
        let mut registry = ProcessRegistry::new("devenv.exe");
        registry.observe_existing(5, "devenv.exe");
        registry
    }

    #[test]
    fn test_image_name_matching() {
        assert!(image_name_matches("devenv.exe", "devenv.exe"));
        assert!(image_name_matches("DEVENV.EXE", "devenv"));
        assert!(image_name_matches(r"C:\VS\Common7\IDE\devenv.exe", "devenv.exe"));
        assert!(!image_name_matches("devenv2.exe", "devenv.exe"));
    }

    #[test]
    fn test_filters_other_processes() {
        let mut registry = ProcessRegistry::new("devenv.exe");
        registry.apply(&event(ProcessEventKind::Start, 1, "notepad.exe"));
        registry.apply(&event(ProcessEventKind::Start, 2, "devenv.exe"));
        assert_eq!(registry.instances(), vec![Pid(2)]);
    }

    #[test]
    fn test_lifecycle_anomalies() {
        let mut registry = ProcessRegistry::new("devenv.exe");
        registry.apply(&event(ProcessEventKind::RundownStart, 5, "devenv.exe"));
        registry.apply(&event(ProcessEventKind::Start, 5, "devenv.exe"));
        registry.apply(&event(ProcessEventKind::End, 9, "devenv.exe"));
        assert_eq!(registry.anomalies().len(), 2);
        assert_eq!(registry.instances(), vec![Pid(5), Pid(9)]);
        assert!(registry.get(Pid(5)).unwrap().is_live());
        assert!(!registry.get(Pid(9)).unwrap().is_live());
    }

    #[test]
    fn test_subscription_by_pid() {
        let mut registry = ProcessRegistry::new("devenv.exe");
        let all = registry.subscribe(Subscription::All);
        let only_seven = registry.subscribe(Subscription::Process(Pid(7)));

        registry.apply(&event(ProcessEventKind::Start, 3, "devenv.exe"));
        registry.apply(&event(ProcessEventKind::Start, 7, "devenv.exe"));
        registry.apply(&event(ProcessEventKind::End, 7, "devenv.exe"));

        assert_eq!(all.try_iter().count(), 3);
        let seven: Vec<_> = only_seven.try_iter().collect();
        assert_eq!(
            seven,
            vec![
                ProcessNotification::Started { pid: Pid(7), name: "devenv.exe".to_string() },
                ProcessNotification::Ended { pid: Pid(7) },
            ]
        );
    }

    #[test]
    fn test_late_subscriber_gets_live_processes() {
        let mut registry = ProcessRegistry::new("devenv.exe");
        registry.observe_existing(11, "devenv.exe");
        registry.apply(&event(ProcessEventKind::Start, 12, "devenv.exe"));
        registry.apply(&event(ProcessEventKind::End, 12, "devenv.exe"));

        let rx = registry.subscribe(Subscription::All);
        let replayed: Vec<_> = rx.try_iter().collect();
        assert_eq!(
            replayed,
            vec![ProcessNotification::Started { pid: Pid(11), name: "devenv.exe".to_string() }]
        );
    }

    #[test]
    fn test_dropped_subscriber_is_removed() {
        let mut registry = ProcessRegistry::new("devenv.exe");
        drop(registry.subscribe(Subscription::All));
        registry.apply(&event(ProcessEventKind::Start, 1, "devenv.exe"));
        assert!(registry.subscribers.is_empty());
    }

    #[test]
    fn test_images_kept_in_load_order() {
        let mut registry = tracked();
        registry.apply(&image(ProcessEventKind::ImageRundown, r"C:\Windows\System32\user32.dll", 0x7000, 0.0));
        registry.apply(&image(ProcessEventKind::ImageLoad, r"C:\VS\msenv.dll", 0x9000, 2.0));

        let images = &registry.get(Pid(5)).unwrap().images;
        assert_eq!(images.len(), 2);
        assert_eq!(images[0].load_order, 0);
        assert_eq!(images[0].loaded_at, None);
        assert_eq!(images[0].module_name(), "user32");
        assert_eq!(images[1].load_order, 1);
        assert_eq!(images[1].loaded_at, Some(2.0));
        assert_eq!(images[1].status(), ImageStatus::Loaded);
    }

    #[test]
    fn test_duplicate_base_ignored() {
        let mut registry = tracked();
        let rx = registry.subscribe(Subscription::Process(Pid(5)));
        registry.apply(&image(ProcessEventKind::ImageRundown, "a.dll", 0x7000, 0.0));
        registry.apply(&image(ProcessEventKind::ImageLoad, "b.dll", 0x7000, 1.0));

        let record = registry.get(Pid(5)).unwrap();
        assert_eq!(record.images.len(), 1);
        assert_eq!(record.loaded_image(0x7000).unwrap().file_name, "a.dll");
        // Started replay plus one ImageLoaded
        assert_eq!(rx.try_iter().count(), 2);
    }

    #[test]
    fn test_unload_requires_matching_file_name() {
        let mut registry = tracked();
        registry.apply(&image(ProcessEventKind::ImageLoad, "a.dll", 0x7000, 1.0));
        let rx = registry.subscribe(Subscription::Process(Pid(5)));
        rx.try_iter().for_each(drop);

        registry.apply(&image(ProcessEventKind::ImageUnload, "other.dll", 0x7000, 2.0));
        registry.apply(&image(ProcessEventKind::ImageUnload, "a.dll", 0x8000, 2.0));
        assert_eq!(registry.get(Pid(5)).unwrap().images[0].status(), ImageStatus::Loaded);
        assert_eq!(rx.try_iter().count(), 0);

        registry.apply(&image(ProcessEventKind::ImageUnload, "a.dll", 0x7000, 3.0));
        let record = registry.get(Pid(5)).unwrap();
        assert_eq!(record.images[0].status(), ImageStatus::Unloaded);
        assert_eq!(record.images[0].unloaded_at, Some(3.0));
        assert!(record.loaded_image(0x7000).is_none());
        assert_eq!(
            rx.try_iter().collect::<Vec<_>>(),
            vec![ProcessNotification::ImageUnloaded {
                pid: Pid(5),
                file_name: "a.dll".to_string(),
                base: 0x7000
            }]
        );
    }

    #[test]
    fn test_base_reusable_after_unload() {
        let mut registry = tracked();
        registry.apply(&image(ProcessEventKind::ImageLoad, "a.dll", 0x7000, 1.0));
        registry.apply(&image(ProcessEventKind::ImageUnload, "a.dll", 0x7000, 2.0));
        registry.apply(&image(ProcessEventKind::ImageLoad, "b.dll", 0x7000, 3.0));

        let record = registry.get(Pid(5)).unwrap();
        assert_eq!(record.images.len(), 2);
        assert_eq!(record.loaded_image(0x7000).unwrap().file_name, "b.dll");
        assert!(!record.images[0].mapped_at(2.5));
        assert!(record.images[1].mapped_at(3.0));
    }

    #[test]
    fn test_images_of_untracked_process_ignored() {
        let mut registry = ProcessRegistry::new("devenv.exe");
        registry.apply(&ProcessEvent::image(ProcessEventKind::ImageLoad, 77, "a.dll", 0x7000, 0x10, 1.0));
        assert!(registry.instances().is_empty());
    }
}
