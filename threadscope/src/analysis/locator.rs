//! Target-thread discovery from sampled call stacks.
//!
//! A UI thread is identified by its entry point: every sample taken on it has
//! the startup function (e.g. `devenv!WinMain`) somewhere on the stack. Thread
//! names are not available in captures, so this stack signature is the only
//! reliable marker.

use log::{debug, info};
use threadscope_common::Event;

use super::call_stack::stack_contains;
use crate::domain::Tid;

/// Find the thread whose samples carry `entry_signature` on their stack.
///
/// Non-sample events are ignored. Returns the thread of the first matching
/// sample, or `None` if no sample matches.
pub fn locate_target_thread<'a, I>(events: I, entry_signature: &str) -> Option<Tid>
where
    I: IntoIterator<Item = &'a Event>,
{
    let mut scanned = 0usize;
    for event in events {
        let Event::Sample { tid, stack, .. } = event else {
            continue;
        };
        scanned += 1;
        if stack_contains(stack, entry_signature) {
            info!("Target thread {} found after {scanned} samples", Tid(*tid));
            return Some(Tid(*tid));
        }
    }
    debug!("No sample out of {scanned} contains '{entry_signature}'");
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use threadscope_common::Frame;

    fn sample(tid: u32, stack: Vec<Frame>) -> Event {
        Event::Sample { timestamp: 0.0, pid: 1, tid, stack }
    }

    #[test]
    fn test_finds_thread_with_entry_frame() {
        let events = vec![
            sample(10, vec![Frame::method("ntdll", "RtlUserThreadStart")]),
            Event::ReadyThread { timestamp: 0.0, awakened_tid: 20 },
            sample(20, vec![Frame::method("user32", "GetMessageW"), Frame::method("devenv", "WinMain")]),
            sample(30, vec![Frame::method("devenv", "WinMain")]),
        ];
        assert_eq!(locate_target_thread(&events, "devenv!WinMain"), Some(Tid(20)));
    }

    #[test]
    fn test_not_found() {
        let events = vec![sample(10, vec![Frame::method("ntdll", "RtlUserThreadStart")])];
        assert_eq!(locate_target_thread(&events, "devenv!WinMain"), None);
        assert_eq!(locate_target_thread(&[], "devenv!WinMain"), None);
    }

    #[test]
    fn test_context_switch_stacks_ignored() {
        let events = vec![Event::ContextSwitch {
            timestamp: 0.0,
            old_tid: 1,
            new_tid: 2,
            old_wait_reason: 0,
            stack: vec![Frame::method("devenv", "WinMain")],
        }];
        assert_eq!(locate_target_thread(&events, "devenv!WinMain"), None);
    }
}
