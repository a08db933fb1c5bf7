//! Fixed-priority scheduler.
//!
//! Grounded on the teacher's `os::update_to_next_task` priority-scan branch
//! (the round-robin mode it also supported has no counterpart here; a
//! static-configuration kernel schedules by fixed priority only) and on its
//! `scheduler_init`/`PendSV` wiring for how a decision turns into an actual
//! register-level switch.

use crate::arch::{ContextSwitch, Platform};
use crate::config;
use crate::task::{self, TaskId, TaskState};

/// Scans the task table from the highest id down to 0, returning the
/// lowest-indexed READY task of the highest priority found. Ties are
/// broken toward the lowest id because the scan keeps overwriting its
/// current pick on `>=`, and it walks downward.
pub(crate) fn pick_ready() -> Option<TaskId> {
    let mut best: Option<(u8, TaskId)> = None;
    let mut i = config::MAX_TASKS;
    while i > 0 {
        i -= 1;
        let id = i as TaskId;
        if task::state(id) == TaskState::Ready {
            let p = task::priority(id);
            if best.map_or(true, |(best_p, _)| p >= best_p) {
                best = Some((p, id));
            }
        }
    }
    best.map(|(_, id)| id)
}

/// Runs one scheduling decision and applies the resulting state transition.
/// Must be called with interrupts disabled. If no task is READY, this is a
/// no-op: whoever was running (and was just preempted by the caller) keeps
/// running.
///
/// Called from [`super::arch::cortex_m4::kernel_select_next_task`], between
/// the register save of the outgoing task and the restore of the incoming
/// one.
pub(crate) fn dispatch_locked() {
    let Some(next) = pick_ready() else {
        return;
    };
    let prev = task::current_task();
    if (prev as usize) < config::MAX_TASKS && task::state(prev) == TaskState::Run {
        task::set_state(prev, TaskState::Ready);
    }
    task::set_state(next, TaskState::Run);
    task::set_current_task(next);
}

/// Requests a reschedule and returns normally. The actual switch happens
/// asynchronously, on the next PendSV; the caller keeps executing until
/// then.
pub(crate) fn request_reschedule() {
    Platform::request_reschedule();
}

/// Requests a reschedule and parks forever. For task service calls whose
/// caller must never resume at this point (`os_task_terminate`,
/// `os_task_chain`): the task has already been marked non-runnable, so the
/// only way out of the loop is PendSV switching execution away entirely.
pub(crate) fn park_until_rescheduled() -> ! {
    Platform::request_reschedule();
    Platform::park_for_reschedule();
}

/// Starts multitasking. Called once, after [`crate::os_init`], to hand
/// control to the highest-priority READY task. Unlike every other
/// reschedule in this kernel, the very first one has no prior task context
/// to preempt, so it bypasses PendSV and jumps straight into the chosen
/// task's entry function.
pub fn scheduler_run() -> ! {
    let chosen = pick_ready().map(|id| {
        task::set_state(id, TaskState::Run);
        task::set_current_task(id);
        id
    });
    match chosen {
        Some(id) => Platform::enter_first_task(id),
        None => loop {
            Platform::sleep();
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    extern "C" fn dummy() -> ! {
        loop {}
    }

    fn reset() {
        for i in 0..config::MAX_TASKS {
            task::set_state(i as TaskId, TaskState::Empty);
        }
        task::set_current_task(config::TASK_ID_NONE);
    }

    fn ready_task(id: TaskId, priority: u8) {
        crate::os_task_create(id, dummy, priority, false).unwrap();
        task::set_state(id, TaskState::Ready);
    }

    #[test]
    #[serial]
    fn picks_highest_priority() {
        reset();
        ready_task(0, 1);
        ready_task(1, 5);
        ready_task(2, 3);
        assert_eq!(pick_ready(), Some(1));
    }

    #[test]
    #[serial]
    fn ties_break_toward_lowest_id() {
        reset();
        ready_task(0, 4);
        ready_task(1, 4);
        ready_task(2, 4);
        assert_eq!(pick_ready(), Some(0));
    }

    #[test]
    #[serial]
    fn none_ready_yields_none() {
        reset();
        assert_eq!(pick_ready(), None);
    }

    #[test]
    #[serial]
    fn dispatch_moves_outgoing_run_task_to_ready() {
        reset();
        ready_task(0, 1);
        ready_task(1, 1);
        task::set_state(0, TaskState::Run);
        task::set_current_task(0);
        dispatch_locked();
        assert_eq!(task::current_task(), 1);
        assert_eq!(task::state(0), TaskState::Ready);
        assert_eq!(task::state(1), TaskState::Run);
    }

    #[test]
    #[serial]
    fn dispatch_with_nothing_ready_leaves_current_untouched() {
        reset();
        ready_task(0, 1);
        task::set_state(0, TaskState::Run);
        task::set_current_task(0);
        // Only one task and it's already RUN, not READY: nothing else to pick.
        dispatch_locked();
        assert_eq!(task::current_task(), 0);
        assert_eq!(task::state(0), TaskState::Run);
    }
}
