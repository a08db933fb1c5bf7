//! Compile-time configuration for the kernel.
//!
//! All knobs here are `pub const` so a downstream crate can size the task,
//! alarm and queue tables for its own target without touching kernel code.
//!
//! ## Adapting to a targeted microcontroller
//!
//! - Adjust `MAX_TASKS`, `TASK_STACK_WORDS` and `SRAM_*` to match the target.
//! - Pick the first task (id 0) to act as the idle task if `USE_IDLE_TASK`
//!   is `true`; it must be `autostart = true` and `priority = 0`.
//! - Check the SRAM size and starting address in the device's reference
//!   manual and set `SRAM_START` / `SRAM_SIZE` accordingly.
//! - Make sure `MAX_TASKS * TASK_STACK_WORDS * 4 + SCHEDULER_STACK_WORDS * 4`
//!   fits within `SRAM_SIZE`.

/// Maximum number of tasks the kernel can hold. Bounded to 32 because the
/// task-table bitmaps (`queue::AccessMask` and friends) are backed by a
/// single machine word.
pub const MAX_TASKS: usize = 8;

/// Sentinel task id meaning "no current task" (`current_task` before the
/// first dispatch).
pub const TASK_ID_NONE: u8 = MAX_TASKS as u8;

/// Size of a task's private context-switch stack, in 32-bit words. Must be
/// at least 16 words (the Cortex-M exception frame plus the callee-saved
/// register set saved by the PendSV handler).
pub const TASK_STACK_WORDS: usize = 64;

/// Size of the scheduler's own (MSP) stack, in 32-bit words.
pub const SCHEDULER_STACK_WORDS: usize = 256;

/// SRAM base address and size, used to lay out per-task stacks. Update for
/// the target MCU's memory map.
pub const SRAM_START: u32 = 0x2000_0000;
pub const SRAM_SIZE: u32 = 128 * 1024;
pub const SRAM_END: u32 = SRAM_START + SRAM_SIZE;

/// Kernel tick period in milliseconds.
pub const TICK_PERIOD_MS: u32 = 1;

/// Maximum number of queues.
pub const MAX_QUEUES: usize = 4;

/// Maximum number of elements a single queue may hold.
pub const MAX_QUEUE_LEN: usize = 8;

/// Maximum number of alarms.
pub const MAX_ALARMS: usize = 6;

/// Sentinel `ticks_to_wait` value meaning "wait forever": the tick ISR never
/// decrements a wait budget set to this value.
pub const OS_MAX_TICKS: u32 = u32::MAX;

/// If `true`, the scheduler expects the application to register a
/// `priority = 0`, `autostart = true` idle task at id 0 and always finds
/// something READY to run. If `false`, the scheduler enters low-power sleep
/// when no task is READY.
pub const USE_IDLE_TASK: bool = true;

const _: () = assert!(MAX_TASKS <= 32, "task bitmaps need widening past 32 tasks");
const _: () = assert!(TASK_STACK_WORDS >= 16, "stack must hold the full register frame");

/// Top-of-stack address for task `i` (0..MAX_TASKS). Full descending stack.
#[inline(always)]
pub const fn task_stack_start(i: usize) -> u32 {
    SRAM_END - (i as u32 * TASK_STACK_WORDS as u32 * 4)
}

/// Scheduler (MSP) stack start, placed below all task stacks.
#[inline(always)]
pub const fn scheduler_stack_start() -> u32 {
    SRAM_END - (MAX_TASKS as u32 * TASK_STACK_WORDS as u32 * 4)
}
