//! Per-executor state handed to every running command.

use std::sync::atomic::{AtomicBool, Ordering};

/// Execution environment of a single executor thread.
///
/// Commands receive it by reference and must not keep it past their own
/// invocation. Long-running commands are expected to poll
/// [`is_cancelled`](Self::is_cancelled) at small intervals and return once it
/// reports `true`; the queue never interrupts a command by force.
#[derive(Debug)]
pub struct ExecutionContext {
    thread_index: usize,
    cancelled: AtomicBool,
}

impl ExecutionContext {
    pub(crate) fn new(thread_index: usize) -> Self {
        Self {
            thread_index,
            cancelled: AtomicBool::new(false),
        }
    }

    /// Index of the executor running the command, in `0..executors_count`.
    pub fn thread_index(&self) -> usize {
        self.thread_index
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    // monotonic: never reset for the lifetime of this context
    pub(crate) fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }
}
