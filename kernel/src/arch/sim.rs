//! Host test backend.
//!
//! Stands in for [`super::cortex_m4::CortexM4`] under `cargo test`. There is
//! no real stack to switch: tests exercise the pure, lock-held mutation
//! functions (`task::*_locked`, `sched::dispatch_locked`, ...) directly and
//! never reach `restore_from`, so it is left deliberately unreachable rather
//! than faked into something that looks like it works.

use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use super::ContextSwitch;
use crate::task::{self, TaskEntry, TaskId};

static RESCHEDULE_REQUESTED: AtomicBool = AtomicBool::new(false);
static TICK_ARMED: AtomicBool = AtomicBool::new(false);
static NEXT_FAKE_STACK_TOP: AtomicU32 = AtomicU32::new(0x1000_0000);

pub(crate) struct Sim;

impl ContextSwitch for Sim {
    fn init_task_stack(_stack_top: u32, _entry: TaskEntry) -> u32 {
        // A distinct, fake value per task is enough to prove the slot was
        // populated without pretending to build a real register frame.
        NEXT_FAKE_STACK_TOP.fetch_add(0x1000, Ordering::Relaxed)
    }

    unsafe fn save_to(_stack_ptr_slot: &mut u32) {}

    unsafe fn restore_from(_stack_top: u32) -> ! {
        unreachable!("the test backend never performs a real context restore")
    }

    fn request_reschedule() {
        RESCHEDULE_REQUESTED.store(true, Ordering::SeqCst);
    }

    fn arm_tick() {
        TICK_ARMED.store(true, Ordering::SeqCst);
    }

    fn sleep() {}

    fn enter_first_task(id: TaskId) -> ! {
        // A real jump-into-entry is meaningless on the host; tests assert on
        // the task-table state transition instead of ever calling this.
        let _ = task::entry(id);
        unreachable!("the test backend never performs a real first-task entry")
    }

    fn park_for_reschedule() -> ! {
        unreachable!("the test backend never parks; tests call dispatch_locked directly")
    }
}

#[cfg(test)]
pub(crate) fn reschedule_was_requested() -> bool {
    RESCHEDULE_REQUESTED.swap(false, Ordering::SeqCst)
}

#[cfg(test)]
pub(crate) fn tick_is_armed() -> bool {
    TICK_ARMED.load(Ordering::SeqCst)
}
