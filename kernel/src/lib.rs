//! A small, statically-configured, cooperative/preemptible real-time kernel
//! for a single Cortex-M4 microcontroller: a fixed task table, a
//! fixed-priority scheduler, a tick-driven alarm engine and a mailbox-style
//! queue engine.
//!
//! Every task, alarm and queue is registered at a caller-chosen id before
//! [`scheduler_run`] is called; there is no dynamic allocation and no
//! dynamic id assignment, matching the teacher's four-fixed-task layout
//! generalized to `config::MAX_TASKS` slots.
//!
//! Built `no_std` for the target; `cargo test` instead links against `std`
//! and swaps in the host backend in [`arch::sim`] so the task table,
//! scheduler, alarm and queue logic can be exercised without real silicon.

#![cfg_attr(not(test), no_std)]

mod arch;
mod bitset;
pub mod config;
pub mod error;

mod alarm;
mod queue;
mod sched;
mod task;

pub use alarm::{os_alarm_cancel, os_alarm_create, os_alarm_is_active, os_alarm_set_rel, AlarmId};
pub use error::OsError;
pub use queue::{os_queue_create, os_queue_receive, os_queue_send, QueueId};
pub use sched::scheduler_run;
pub use task::{
    os_task_activate, os_task_activate_from_isr, os_task_chain, os_task_create,
    os_task_terminate, TaskEntry, TaskId,
};

use arch::{ContextSwitch, Platform};

/// Brings the kernel up: makes every `autostart` task READY and arms the
/// tick source. Call once, after registering every task, alarm and queue,
/// and before [`scheduler_run`].
pub fn os_init() {
    task::activate_autostart_tasks();
    Platform::arm_tick();
}

#[cfg(test)]
mod integration_tests {
    use super::*;
    use serial_test::serial;

    extern "C" fn dummy() -> ! {
        loop {}
    }

    fn reset() {
        for i in 0..config::MAX_TASKS {
            task::set_state(i as TaskId, task::TaskState::Empty);
        }
        task::set_current_task(config::TASK_ID_NONE);
    }

    #[test]
    #[serial]
    fn init_activates_only_autostart_tasks() {
        reset();
        os_task_create(0, dummy, 0, true).unwrap();
        os_task_create(1, dummy, 1, false).unwrap();
        os_init();
        assert_eq!(os_task_activate(1), Ok(()));
    }

    /// Scenario 1: a low-priority autostart task is running; an alarm fires
    /// and activates a higher-priority task; the scheduler must pick the
    /// higher-priority task on its next dispatch.
    #[test]
    #[serial]
    fn priority_preemption_via_alarm() {
        reset();
        const LOW: TaskId = 0;
        const HIGH: TaskId = 1;
        os_task_create(LOW, dummy, 1, true).unwrap();
        os_task_create(HIGH, dummy, 5, false).unwrap();
        alarm::os_alarm_create(0, HIGH).unwrap();
        task::activate_autostart_tasks();
        task::set_state(LOW, task::TaskState::Run);
        task::set_current_task(LOW);

        alarm::os_alarm_set_rel(0, 1, false).unwrap();
        alarm::tick();

        assert_eq!(task::state(HIGH), task::TaskState::Ready);
        assert_eq!(sched::pick_ready(), Some(HIGH));
        sched::dispatch_locked();
        assert_eq!(task::current_task(), HIGH);
        assert_eq!(task::state(LOW), task::TaskState::Ready);
    }

    /// Scenario 2: a task chains into another. `os_task_chain` never returns
    /// on real hardware (it parks until PendSV switches away), so this drives
    /// the same state transition it performs — suspend the caller, activate
    /// the target — through the public activation API and checks the
    /// resulting lifecycle matches what the chain contract promises: the
    /// outgoing task SUSPENDED, the target READY then RUN once dispatched.
    #[test]
    #[serial]
    fn chain_suspends_caller_and_activates_target() {
        reset();
        const A: TaskId = 0;
        const B: TaskId = 1;
        os_task_create(A, dummy, 1, false).unwrap();
        os_task_create(B, dummy, 1, false).unwrap();
        task::set_state(A, task::TaskState::Run);
        task::set_current_task(A);

        task::set_state(A, task::TaskState::Suspended);
        assert_eq!(os_task_activate(B), Ok(()));
        assert_eq!(task::state(A), task::TaskState::Suspended);
        assert_eq!(task::state(B), task::TaskState::Ready);

        sched::dispatch_locked();
        assert_eq!(task::current_task(), B);
        assert_eq!(task::state(B), task::TaskState::Run);
    }

    /// Scenario 4: a task outside a queue's access list is rejected without
    /// touching the queue's contents.
    #[test]
    #[serial]
    fn queue_send_without_access_leaves_queue_untouched() {
        reset();
        os_task_create(0, dummy, 1, false).unwrap();
        os_task_create(1, dummy, 1, false).unwrap();
        queue::os_queue_create(0, 2, &[0]).unwrap();
        task::set_current_task(1);

        assert_eq!(
            queue::os_queue_send(0, 42, 0),
            Err(OsError::InvalidArgument)
        );

        task::set_current_task(0);
        assert_eq!(queue::os_queue_receive(0, 0), Err(OsError::QueueEmpty));
    }

    /// Scenario 6: a full queue with no wait budget fails immediately; once
    /// a receiver frees a slot and wakes the blocked sender's task, the
    /// sender's retry succeeds.
    ///
    /// The host backend has no real task-switching, so there is no second
    /// thread of execution to free the slot while a real `os_queue_send`
    /// call is parked spinning on its own state. This drives the same
    /// sequence `os_queue_send`'s retry-once algorithm does — mark the
    /// blocked sender WAIT with a budget, let the real `os_queue_receive`
    /// wake it via its own `wake_one` call, then perform the single retry —
    /// by hand, so the wake path itself still runs for real.
    #[test]
    #[serial]
    fn queue_send_blocks_then_succeeds_after_receive_wakes_it() {
        reset();
        const SENDER: TaskId = 0;
        const RECEIVER: TaskId = 1;
        os_task_create(SENDER, dummy, 1, false).unwrap();
        os_task_create(RECEIVER, dummy, 1, false).unwrap();
        queue::os_queue_create(0, 1, &[SENDER, RECEIVER]).unwrap();

        task::set_current_task(SENDER);
        queue::os_queue_send(0, 1, 0).unwrap();
        assert_eq!(
            queue::os_queue_send(0, 2, 0),
            Err(OsError::QueueFull),
            "no wait budget must fail fast rather than block"
        );

        // Stand in for `os_queue_send`'s own park: the queue is still full,
        // so a real call with a nonzero budget would mark itself here.
        task::set_ticks_to_wait(SENDER, 5);
        task::set_state(SENDER, task::TaskState::Wait);
        queue::mark_waiting_for_space(0, SENDER);

        task::set_current_task(RECEIVER);
        assert_eq!(queue::os_queue_receive(0, 0), Ok(1));
        assert_eq!(
            task::state(SENDER),
            task::TaskState::Ready,
            "receive must wake the sender blocked on space"
        );

        // Stand in for the wake path's cleanup and single retry.
        queue::clear_waiting_for_space(0, SENDER);
        task::set_ticks_to_wait(SENDER, 0);
        task::set_current_task(SENDER);
        assert_eq!(queue::os_queue_send(0, 2, 0), Ok(()));

        task::set_current_task(RECEIVER);
        assert_eq!(queue::os_queue_receive(0, 0), Ok(2));
    }
}
