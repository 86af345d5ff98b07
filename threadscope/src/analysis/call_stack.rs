//! Call-stack walking for activity labels.
//!
//! UI threads spend their life inside a message loop. The frame the loop
//! called into (the one directly leafward of the loop's own frame) says what
//! the thread was doing: waiting for a message, dispatching one, idling.
//! This module finds that frame.
//!
//! ```text
//! leaf   ntdll!NtUserGetMessage
//!        win32u!NtUserGetMessage
//!        user32!GetMessageW              ← activity label
//! anchor msenv!MainMessageLoop::Run
//! root   devenv!WinMain
//! ```

use threadscope_common::{Frame, FrameSymbol};

/// Returns true if `frame` renders exactly to `signature` (`module!method` or `module!0xaddr`).
///
/// Resolved frames are compared piecewise without allocating.
#[must_use]
pub fn frame_matches(frame: &Frame, signature: &str) -> bool {
    let Some((module, symbol)) = signature.split_once('!') else {
        return false;
    };
    if frame.module_or_unknown() != module {
        return false;
    }
    match &frame.symbol {
        FrameSymbol::Method(name) => name == symbol,
        FrameSymbol::Address(addr) => symbol == format!("0x{addr:x}"),
    }
}

/// Returns true if any frame of `stack` matches `signature`.
#[must_use]
pub fn stack_contains(stack: &[Frame], signature: &str) -> bool {
    stack.iter().any(|frame| frame_matches(frame, signature))
}

/// Extract the activity label of a leaf-first call stack.
///
/// Walks from the leaf toward the root until a frame matches `anchor`, and
/// returns the signature of the frame visited just before it (the frame
/// immediately inside the anchor).
///
/// Returns `None` (unresolved) when the anchor never appears, or when the
/// anchor is the leaf frame itself so nothing sits inside it.
#[must_use]
pub fn extract_activity_label(stack: &[Frame], anchor: &str) -> Option<String> {
    let mut inner: Option<&Frame> = None;
    for frame in stack {
        if frame_matches(frame, anchor) {
            return inner.map(Frame::signature);
        }
        inner = Some(frame);
    }
    None
}
