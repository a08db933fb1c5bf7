//! Mailbox-style queue engine.
//!
//! Grounded on nano-rtos's `queues.c`, generalized the way `bitset.rs`
//! generalizes the task table: `tasks_with_access` widened from an 8-bit
//! field to a full `TaskMask`, and the backing buffer sized to
//! `config::MAX_QUEUE_LEN` slots used in full (the original reserved one
//! extra slot to disambiguate full from empty; here `count` does that job
//! directly, so every configured slot actually holds data).
//!
//! Elements are transported as `usize` tokens wide enough to carry a pointer,
//! matching `queues.c`'s own `(uint16_t) item` pointer cast on its target.
//!
//! Blocking send/receive are a wait-and-retry loop rather than a single
//! capture-and-resume: a blocked task marks itself `Wait`, records its
//! `ticks_to_wait` budget, requests a reschedule, and spins on `wfi` until
//! either a matching send/receive or the tick ISR's timeout sweep flips it
//! back to `Ready`. Either way it gets exactly one retry of the non-blocking
//! attempt before returning: a wake is not distinguished from a timeout, the
//! retry outcome is.

use crate::arch::{self, ContextSwitch, Platform};
use crate::bitset::{self, TaskMask};
use crate::config;
use crate::error::{self, OsError};
use crate::sched;
use crate::task::{self, TaskId, TaskState};

pub type QueueId = u8;

struct Queue {
    buf: [usize; config::MAX_QUEUE_LEN],
    capacity: usize,
    head: usize,
    count: usize,
    tasks_with_access: TaskMask,
    waiting_for_space: TaskMask,
    waiting_for_item: TaskMask,
}

impl Queue {
    const fn empty() -> Self {
        Queue {
            buf: [0usize; config::MAX_QUEUE_LEN],
            capacity: 0,
            head: 0,
            count: 0,
            tasks_with_access: 0,
            waiting_for_space: 0,
            waiting_for_item: 0,
        }
    }
}

static mut QUEUES: [Queue; config::MAX_QUEUES] = [const { Queue::empty() }; config::MAX_QUEUES];

fn valid(id: QueueId) -> bool {
    (id as usize) < config::MAX_QUEUES
}

/// Creates queue `id` with room for `capacity` bytes (`1..=MAX_QUEUE_LEN`),
/// accessible only to the tasks listed in `access`.
pub fn os_queue_create(id: QueueId, capacity: usize, access: &[TaskId]) -> Result<(), OsError> {
    if !valid(id) || capacity == 0 || capacity > config::MAX_QUEUE_LEN || access.is_empty() {
        return Err(error::warn(OsError::InvalidArgument));
    }
    let mut mask: TaskMask = 0;
    for &task_id in access {
        if (task_id as usize) >= config::MAX_TASKS {
            return Err(error::warn(OsError::InvalidArgument));
        }
        mask |= bitset::bit(task_id);
    }
    arch::free(|| unsafe {
        QUEUES[id as usize] = Queue {
            buf: [0usize; config::MAX_QUEUE_LEN],
            capacity,
            head: 0,
            count: 0,
            tasks_with_access: mask,
            waiting_for_space: 0,
            waiting_for_item: 0,
        };
    });
    Ok(())
}

fn has_access(id: QueueId, task_id: TaskId) -> bool {
    arch::free(|| unsafe { bitset::contains(QUEUES[id as usize].tasks_with_access, task_id) })
}

/// Picks the lowest-id task recorded in `mask`, matching the scheduler's
/// own tie-break rule so wakeups are deterministic.
fn lowest_waiter(mask: TaskMask) -> Option<TaskId> {
    (0..config::MAX_TASKS as TaskId).find(|&id| bitset::contains(mask, id))
}

enum SendOutcome {
    Sent,
    Full,
}

fn try_send_locked(id: QueueId, token: usize) -> SendOutcome {
    unsafe {
        let q = &mut QUEUES[id as usize];
        if q.count == q.capacity {
            return SendOutcome::Full;
        }
        let tail = (q.head + q.count) % q.capacity;
        q.buf[tail] = token;
        q.count += 1;
        SendOutcome::Sent
    }
}

enum RecvOutcome {
    Received(usize),
    Empty,
}

fn try_receive_locked(id: QueueId) -> RecvOutcome {
    unsafe {
        let q = &mut QUEUES[id as usize];
        if q.count == 0 {
            return RecvOutcome::Empty;
        }
        let token = q.buf[q.head];
        q.head = (q.head + 1) % q.capacity;
        q.count -= 1;
        RecvOutcome::Received(token)
    }
}

/// Wakes the lowest-id task waiting in `mask`, clearing its bit and
/// rescheduling it. Returns the updated mask.
fn wake_one(mask: TaskMask) -> TaskMask {
    match lowest_waiter(mask) {
        Some(id) => {
            task::set_state(id, TaskState::Ready);
            sched::request_reschedule();
            mask & !bitset::bit(id)
        }
        None => mask,
    }
}

pub(crate) fn mark_waiting_for_space(id: QueueId, task_id: TaskId) {
    arch::free(|| unsafe {
        QUEUES[id as usize].waiting_for_space |= bitset::bit(task_id);
    });
}

fn mark_waiting_for_item(id: QueueId, task_id: TaskId) {
    arch::free(|| unsafe {
        QUEUES[id as usize].waiting_for_item |= bitset::bit(task_id);
    });
}

pub(crate) fn clear_waiting_for_space(id: QueueId, task_id: TaskId) {
    arch::free(|| unsafe {
        QUEUES[id as usize].waiting_for_space &= !bitset::bit(task_id);
    });
}

fn clear_waiting_for_item(id: QueueId, task_id: TaskId) {
    arch::free(|| unsafe {
        QUEUES[id as usize].waiting_for_item &= !bitset::bit(task_id);
    });
}

/// Blocks the calling task for up to `ticks_to_wait` kernel ticks, marking it
/// waiting on `id` via `mark`. Returns once some other task's matching
/// send/receive or the tick ISR's timeout sweep moves the caller out of
/// `Wait`; the caller is responsible for clearing its own waiting bit and
/// retrying its operation exactly once afterwards.
///
/// `ticks_to_wait == 0` never parks: the caller should already have returned
/// its empty/full error before calling this.
fn park_waiting(
    id: QueueId,
    caller: TaskId,
    ticks_to_wait: u32,
    mark: fn(QueueId, TaskId),
) {
    task::set_ticks_to_wait(caller, ticks_to_wait);
    task::set_state(caller, TaskState::Wait);
    mark(id, caller);
    sched::request_reschedule();
    while task::state(caller) == TaskState::Wait {
        Platform::sleep();
    }
    task::set_ticks_to_wait(caller, 0);
}

/// Sends `token` into queue `id`, blocking the calling task for up to
/// `ticks_to_wait` ticks while the queue is full
/// (`config::OS_MAX_TICKS` waits forever). Wakes the lowest-id task waiting
/// for an item once the token is enqueued.
///
/// Returns `OsError::QueueFull` if the queue is still full once the wait
/// budget (or the single retry after a wake) is exhausted.
pub fn os_queue_send(id: QueueId, token: usize, ticks_to_wait: u32) -> Result<(), OsError> {
    if !valid(id) {
        return Err(error::warn(OsError::InvalidArgument));
    }
    let caller = task::current_task();
    if !has_access(id, caller) {
        return Err(error::warn(OsError::InvalidArgument));
    }
    let mut outcome = arch::free(|| try_send_locked(id, token));
    if matches!(outcome, SendOutcome::Full) && ticks_to_wait > 0 {
        park_waiting(id, caller, ticks_to_wait, mark_waiting_for_space);
        clear_waiting_for_space(id, caller);
        outcome = arch::free(|| try_send_locked(id, token));
    }
    match outcome {
        SendOutcome::Sent => {
            arch::free(|| unsafe {
                let woken = wake_one(QUEUES[id as usize].waiting_for_item);
                QUEUES[id as usize].waiting_for_item = woken;
            });
            Ok(())
        }
        SendOutcome::Full => Err(error::warn(OsError::QueueFull)),
    }
}

/// Receives a token from queue `id`, blocking the calling task for up to
/// `ticks_to_wait` ticks while the queue is empty
/// (`config::OS_MAX_TICKS` waits forever). Wakes the lowest-id task waiting
/// for space once a slot is freed.
///
/// Returns `OsError::QueueEmpty` if the queue is still empty once the wait
/// budget (or the single retry after a wake) is exhausted.
pub fn os_queue_receive(id: QueueId, ticks_to_wait: u32) -> Result<usize, OsError> {
    if !valid(id) {
        return Err(error::warn(OsError::InvalidArgument));
    }
    let caller = task::current_task();
    if !has_access(id, caller) {
        return Err(error::warn(OsError::InvalidArgument));
    }
    let mut outcome = arch::free(|| try_receive_locked(id));
    if matches!(outcome, RecvOutcome::Empty) && ticks_to_wait > 0 {
        park_waiting(id, caller, ticks_to_wait, mark_waiting_for_item);
        clear_waiting_for_item(id, caller);
        outcome = arch::free(|| try_receive_locked(id));
    }
    match outcome {
        RecvOutcome::Received(token) => {
            arch::free(|| unsafe {
                let woken = wake_one(QUEUES[id as usize].waiting_for_space);
                QUEUES[id as usize].waiting_for_space = woken;
            });
            Ok(token)
        }
        RecvOutcome::Empty => Err(error::warn(OsError::QueueEmpty)),
    }
}
