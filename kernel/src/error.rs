//! Kernel error type.
//!
//! All fallible kernel entry points return `Result<_, OsError>`. The kernel
//! never panics on caller-supplied bad input; panics are reserved for
//! configuration-time invariant violations caught by `const` assertions.

use core::fmt;

/// Errors returned by kernel services.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum OsError {
    /// An identifier was out of range, an alarm was set with `ticks == 0`,
    /// a queue access mask was empty, or the caller lacked access to a queue.
    InvalidArgument,
    /// Reserved. Task ids address a fixed-size table allocated at compile
    /// time, so this variant is never emitted by the current surface; it is
    /// kept for parity with `os_task_create`'s documented contract.
    MaxCreatedTasks,
    /// `active_count` would exceed `config::MAX_TASKS`.
    MaxActiveTasks,
    /// `os_queue_receive` found the queue empty after the wait budget
    /// (if any) was exhausted.
    QueueEmpty,
    /// `os_queue_send` found the queue full after the wait budget
    /// (if any) was exhausted.
    QueueFull,
}

impl fmt::Display for OsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            OsError::InvalidArgument => "invalid argument",
            OsError::MaxCreatedTasks => "maximum number of created tasks reached",
            OsError::MaxActiveTasks => "maximum number of active tasks reached",
            OsError::QueueEmpty => "queue empty",
            OsError::QueueFull => "queue full",
        };
        f.write_str(text)
    }
}

/// Logs `err` at warn level (when the `log` feature is enabled) and returns it.
pub(crate) fn warn(err: OsError) -> OsError {
    #[cfg(feature = "log")]
    log::warn!("{err}");
    err
}
