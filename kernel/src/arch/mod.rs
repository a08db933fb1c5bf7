//! Platform backend for the kernel core.
//!
//! The core is written against this narrow surface rather than against
//! `cortex_m` directly so the same task-table, scheduler, alarm and queue
//! logic can be exercised on the host under `cargo test` with [`sim::Sim`]
//! standing in for real silicon.
//!
//! The stack frame layout is specified abstractly: the saved program
//! counter sits at the top of a task's stack, the saved stack pointer
//! beneath it, followed by the rest of the register file. `save_to` and
//! `restore_from` are the only operations allowed to touch that layout;
//! nothing else in the kernel assumes a particular register order.

use crate::task::{TaskEntry, TaskId};

#[cfg(not(test))]
mod cortex_m4;
#[cfg(test)]
mod sim;

#[cfg(not(test))]
pub(crate) use cortex_m4::CortexM4 as Platform;
#[cfg(test)]
pub(crate) use sim::Sim as Platform;

/// Platform-specific context switch and timer/interrupt primitives.
///
/// # Safety
/// Implementations touch raw stack memory and processor control registers;
/// callers must uphold the invariants documented on each method.
pub(crate) trait ContextSwitch {
    /// Lays out the initial saved context for a freshly created task so
    /// that the first `restore_from` on it jumps to `entry` with a clean
    /// register file. Returns the saved stack-pointer value to record in
    /// the task's descriptor.
    fn init_task_stack(stack_top: u32, entry: TaskEntry) -> u32;

    /// Snapshots the caller's architectural context onto the stack
    /// referenced by `stack_ptr_slot`, which is updated in place to the new
    /// top of the saved frame.
    ///
    /// # Safety
    /// Must only be called from task context, immediately before a kernel
    /// service either returns or dispatches the scheduler.
    unsafe fn save_to(stack_ptr_slot: &mut u32);

    /// Loads the architectural context from `stack_top` and transfers
    /// control to its saved program counter. Never returns.
    ///
    /// # Safety
    /// `stack_top` must be a value previously produced by `init_task_stack`
    /// or updated by `save_to`.
    unsafe fn restore_from(stack_top: u32) -> !;

    /// Requests a reschedule at the next safe point (on Cortex-M, pends
    /// PendSV). Safe to call from task or interrupt context.
    fn request_reschedule();

    /// Arms the periodic tick interrupt per `config::TICK_PERIOD_MS`.
    fn arm_tick();

    /// Enters low-power sleep until the next interrupt.
    fn sleep();

    /// Cold-start only: jumps straight into `id`'s entry function on its own
    /// stack. There is no prior context to preempt, so this bypasses the
    /// usual pend-and-park reschedule path.
    fn enter_first_task(id: TaskId) -> !;

    /// Parks the calling task until a previously requested reschedule
    /// actually preempts it.
    fn park_for_reschedule() -> !;
}

/// Runs `f` with interrupts globally disabled, the kernel's sole
/// synchronization primitive. On the host test backend this is a no-op:
/// there is exactly one thread of execution driving the simulated kernel.
#[inline(always)]
pub(crate) fn free<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    #[cfg(not(test))]
    {
        cortex_m::interrupt::free(|_| f())
    }
    #[cfg(test)]
    {
        f()
    }
}
