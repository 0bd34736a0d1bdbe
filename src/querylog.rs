//! Structured query events. Each event is one JSON object logged at DEBUG on the
//! `booklite::query` target, and optionally captured per thread so tests can assert on it.

use std::cell::RefCell;

/// Log target that `qlog!` writes to.
pub const TARGET: &str = "booklite::query";

thread_local! {
    static CAPTURE: RefCell<Option<Vec<String>>> = const { RefCell::new(None) };
}

/// Stops capturing on drop.
pub struct CaptureGuard;

impl Drop for CaptureGuard {
    fn drop(&mut self) {
        CAPTURE.with(|c| *c.borrow_mut() = None);
    }
}

/// Starts capturing query events emitted on the current thread.
#[must_use]
pub fn capture() -> CaptureGuard {
    CAPTURE.with(|c| *c.borrow_mut() = Some(Vec::new()));
    CaptureGuard
}

/// True while the current thread is capturing.
pub fn capturing() -> bool {
    CAPTURE.with(|c| c.borrow().is_some())
}

pub fn record(line: &str) {
    CAPTURE.with(|c| {
        if let Some(buf) = c.borrow_mut().as_mut() {
            buf.push(line.to_owned());
        }
    });
}

/// Returns and clears the captured events. Empty when capture is off.
pub fn drain() -> Vec<String> {
    CAPTURE.with(|c| c.borrow_mut().as_mut().map(std::mem::take).unwrap_or_default())
}

/// Captured events parsed back into JSON values.
pub fn drain_json() -> Vec<serde_json::Value> {
    drain().iter().filter_map(|s| serde_json::from_str(s).ok()).collect()
}

/// Emits one structured query event, e.g. `qlog!({"op": "find", "returned": 3})`.
/// The payload is only built when someone is listening.
#[macro_export]
macro_rules! qlog {
    ($($json:tt)+) => {{
        let __logged = log::log_enabled!(target: $crate::querylog::TARGET, log::Level::Debug);
        if __logged || $crate::querylog::capturing() {
            let __line = serde_json::json!($($json)+).to_string();
            $crate::querylog::record(&__line);
            if __logged {
                log::debug!(target: $crate::querylog::TARGET, "{}", __line);
            }
        }
    }};
}
