//! Module assignment for frames recorded without one.
//!
//! A frame captured as a bare address can still be placed in a module when
//! the process's image mappings are known: the image whose range contains the
//! address at the event's time names the module. Symbol caches are keyed by
//! module, so this runs before [`Symbolizer`](super::Symbolizer).

use std::collections::HashSet;

use log::debug;
use threadscope_common::{Event, FrameSymbol, ThreadId};

use crate::domain::Pid;
use crate::monitor::ImageRecord;

/// Image mappings of one process, ordered by base address.
#[derive(Debug, Clone, Default)]
pub struct ImageMap {
    images: Vec<ImageRecord>,
}

impl ImageMap {
    #[must_use]
    pub fn new(mut images: Vec<ImageRecord>) -> Self {
        images.sort_by_key(|image| image.base);
        Self { images }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    /// Image containing `addr` at `timestamp`.
    ///
    /// Bases can be reused after an unload, so every candidate at or below
    /// `addr` is checked for its mapping window.
    #[must_use]
    pub fn image_at(&self, addr: u64, timestamp: f64) -> Option<&ImageRecord> {
        let end = self.images.partition_point(|image| image.base <= addr);
        self.images[..end]
            .iter()
            .rev()
            .find(|image| image.contains(addr) && image.mapped_at(timestamp))
    }

    /// Fill in the module of module-less address frames belonging to `pid`.
    ///
    /// Sample stacks belong to their own process. A context-switch stack
    /// belongs to the incoming thread, so it is handled when that thread has
    /// been sampled in `pid`. Returns the number of frames assigned.
    pub fn assign_modules(&self, events: &mut [Event], pid: Pid) -> u64 {
        if self.is_empty() {
            return 0;
        }
        let threads: HashSet<ThreadId> = events
            .iter()
            .filter_map(|event| match event {
                Event::Sample { pid: p, tid, .. } if *p == pid.0 => Some(*tid),
                _ => None,
            })
            .collect();

        let mut assigned = 0;
        for event in events.iter_mut() {
            let timestamp = event.timestamp();
            let belongs = match event {
                Event::Sample { pid: p, .. } => *p == pid.0,
                Event::ContextSwitch { new_tid, .. } => threads.contains(new_tid),
                Event::ReadyThread { .. } => false,
            };
            let Some(stack) = event.stack_mut().filter(|_| belongs) else {
                continue;
            };
            for frame in stack.iter_mut().filter(|frame| frame.module.is_none()) {
                let FrameSymbol::Address(addr) = frame.symbol else {
                    continue;
                };
                if let Some(image) = self.image_at(addr, timestamp) {
                    frame.module = Some(image.module_name().to_string());
                    assigned += 1;
                }
            }
        }
        debug!("Assigned modules to {assigned} frames from {} images", self.images.len());
        assigned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use threadscope_common::Frame;

    fn image(file_name: &str, base: u64, loaded_at: Option<f64>, unloaded_at: Option<f64>) -> ImageRecord {
        ImageRecord {
            file_name: file_name.to_string(),
            load_order: 0,
            base,
            size: 0x1000,
            loaded_at,
            unloaded_at,
        }
    }

    #[test]
    fn test_image_at_respects_mapping_window() {
        let map = ImageMap::new(vec![
            image(r"C:\a\first.dll", 0x7000, Some(1.0), Some(5.0)),
            image(r"C:\a\second.dll", 0x7000, Some(6.0), None),
            image(r"C:\a\user32.dll", 0x1000, None, None),
        ]);
        assert_eq!(map.image_at(0x1800, 0.0).map(ImageRecord::module_name), Some("user32"));
        assert_eq!(map.image_at(0x7010, 2.0).map(ImageRecord::module_name), Some("first"));
        assert_eq!(map.image_at(0x7010, 5.5), None);
        assert_eq!(map.image_at(0x7010, 7.0).map(ImageRecord::module_name), Some("second"));
        assert_eq!(map.image_at(0x9000, 7.0), None);
    }

    #[test]
    fn test_assign_modules_to_process_frames() {
        let map = ImageMap::new(vec![image(r"C:\W\user32.dll", 0x1000, None, None)]);
        let mut events = vec![
            Event::Sample {
                timestamp: 0.0,
                pid: 5,
                tid: 17,
                stack: vec![Frame::address(None, 0x1100), Frame::address(Some("clr"), 0x1100)],
            },
            Event::Sample { timestamp: 0.0, pid: 6, tid: 30, stack: vec![Frame::address(None, 0x1100)] },
            Event::ContextSwitch {
                timestamp: 1.0,
                old_tid: 30,
                new_tid: 17,
                old_wait_reason: 0,
                stack: vec![Frame::address(None, 0x1200)],
            },
        ];

        assert_eq!(map.assign_modules(&mut events, Pid(5)), 2);
        assert_eq!(events[0].stack().unwrap()[0].signature(), "user32!0x1100");
        // Already had a module
        assert_eq!(events[0].stack().unwrap()[1].signature(), "clr!0x1100");
        // Other process untouched
        assert_eq!(events[1].stack().unwrap()[0].signature(), "?!0x1100");
        assert_eq!(events[2].stack().unwrap()[0].signature(), "user32!0x1200");
    }
}
