//! Cortex-M4 backend: PendSV-based context switch and SysTick tick source.
//!
//! Grounded directly on the teacher's `kernel::os` module (the SHPR3
//! priority wiring, the `get_psp_value`/`save_psp_value` glue called from
//! assembly, and the exception-frame layout built by `init_task_stack`),
//! but with the PendSV/bootstrap assembly actually supplied via
//! [`core::arch::global_asm`] rather than left as an unresolved `extern`
//! symbol pending a separate `.s` file.
//!
//! All reschedules funnel through PendSV, the lowest-priority exception:
//! a task service call mutates the task table then pends PendSV and parks;
//! the tick ISR does the same. PendSV alone performs the actual register
//! save/restore, using the process stack pointer (PSP) as each task's
//! stack. The very first dispatch has no prior context to save, so it
//! bypasses PendSV and jumps straight into the chosen task via
//! [`kernel_enter_first_task`].

use core::ptr::{read_volatile, write_volatile};

use cortex_m_rt::exception;

use super::ContextSwitch;
use crate::config;
use crate::task::{self, TaskEntry, TaskId};

/// Core clock, used to derive the SysTick reload value. Update alongside
/// `config::TICK_PERIOD_MS` when retargeting to a different MCU or clock
/// tree setup.
const CORE_CLOCK_HZ: u32 = 16_000_000;

const SYSTICK_BASE: u32 = 0xE000_E010;
const SYSTICK_CSR: *mut u32 = SYSTICK_BASE as *mut u32;
const SYSTICK_RVR: *mut u32 = (SYSTICK_BASE + 0x04) as *mut u32;
const SYSTICK_CVR: *mut u32 = (SYSTICK_BASE + 0x08) as *mut u32;

const SYSTICK_CSR_ENABLE: u32 = 1 << 0;
const SYSTICK_CSR_TICKINT: u32 = 1 << 1;
const SYSTICK_CSR_CLKSOURCE: u32 = 1 << 2;

/// System Control Block ICSR, bit 28 pends PendSV.
const SCB_ICSR: *mut u32 = 0xE000_ED04 as *mut u32;
const ICSR_PENDSVSET: u32 = 1 << 28;

/// SHPR3, holds the PendSV (bits 23:16) and SysTick (bits 31:24) priorities.
const SCB_SHPR3: *mut u32 = 0xE000_ED20 as *mut u32;

unsafe extern "C" {
    fn PendSV_Handler();
    fn kernel_enter_first_task(psp_top: u32, entry: TaskEntry, msp_top: u32) -> !;
}

core::arch::global_asm!(
    ".thumb_func",
    ".global PendSV_Handler",
    "PendSV_Handler:",
    "    mrs r0, psp",
    "    stmdb r0!, {{r4-r11}}",
    "    bl kernel_save_current_task_psp",
    "    bl kernel_select_next_task",
    "    bl kernel_current_task_psp",
    "    ldmia r0!, {{r4-r11}}",
    "    msr psp, r0",
    "    bx lr",
);

core::arch::global_asm!(
    ".thumb_func",
    ".global kernel_enter_first_task",
    "kernel_enter_first_task:",
    // Relocate MSP below all task stacks first: cortex-m-rt's reset handler
    // leaves MSP at the top of SRAM, which is also where task 0's PSP-based
    // stack starts, so this must move out of the way before anything else
    // touches the stack.
    "    msr msp, r2",
    "    msr psp, r0",
    "    mrs r2, control",
    "    movs r3, #2",
    "    orrs r2, r2, r3",
    "    msr control, r2",
    "    isb",
    "    bx r1",
);

/// Returns the saved stack pointer of the currently running task. Called
/// only from [`PendSV_Handler`].
#[unsafe(no_mangle)]
extern "C" fn kernel_current_task_psp() -> u32 {
    task::stack_ptr(task::current_task())
}

/// Records `psp` as the saved stack pointer of the currently running task,
/// i.e. the task that PendSV is about to preempt. Called only from
/// [`PendSV_Handler`].
#[unsafe(no_mangle)]
extern "C" fn kernel_save_current_task_psp(psp: u32) {
    task::set_stack_ptr(task::current_task(), psp);
}

/// Runs the scheduling decision and updates task states. Called only from
/// [`PendSV_Handler`], between the save of the outgoing task and the
/// restore of the incoming one.
#[unsafe(no_mangle)]
extern "C" fn kernel_select_next_task() {
    crate::sched::dispatch_locked();
}

pub(crate) struct CortexM4;

impl ContextSwitch for CortexM4 {
    fn init_task_stack(stack_top: u32, entry: TaskEntry) -> u32 {
        // Cortex-M exception frame, top to bottom: xPSR, PC, LR, R12, R3,
        // R2, R1, R0, then the callee-saved R4-R11 pushed by PendSV_Handler.
        // PendSV_Handler's `ldmia` expects exactly this order beneath the
        // hardware-restored frame.
        const DUMMY_XPSR: u32 = 0x0100_0000; // Thumb bit set
        const EXC_RETURN_THREAD_PSP: u32 = 0xFFFF_FFFD;

        let mut p = stack_top as *mut u32;
        unsafe {
            p = p.offset(-1);
            write_volatile(p, DUMMY_XPSR);
            p = p.offset(-1);
            write_volatile(p, entry as usize as u32);
            p = p.offset(-1);
            write_volatile(p, EXC_RETURN_THREAD_PSP);
            for _ in 0..5 {
                // R12, R3, R2, R1, R0
                p = p.offset(-1);
                write_volatile(p, 0);
            }
            for _ in 0..8 {
                // R11..R4
                p = p.offset(-1);
                write_volatile(p, 0);
            }
        }
        p as u32
    }

    unsafe fn save_to(_stack_ptr_slot: &mut u32) {
        // No-op: the live register file is captured by PendSV_Handler's
        // `stmdb` at the moment PendSV actually fires, not here. Callers
        // only need to have pended a reschedule before relying on this.
    }

    unsafe fn restore_from(_stack_top: u32) -> ! {
        unreachable!(
            "Cortex-M4 reschedules only happen through PendSV; \
             use request_reschedule() and park, or enter_first_task() for the cold start"
        )
    }

    fn request_reschedule() {
        unsafe {
            write_volatile(SCB_ICSR, ICSR_PENDSVSET);
        }
    }

    fn arm_tick() {
        unsafe {
            // PendSV lowest priority (0xFF), SysTick one step above (0xF0),
            // so a pended reschedule never preempts the tick sweep itself.
            let mut shpr3 = read_volatile(SCB_SHPR3);
            shpr3 &= !((0xFFu32 << 16) | (0xFFu32 << 24));
            shpr3 |= (0xFFu32 << 16) | (0xF0u32 << 24);
            write_volatile(SCB_SHPR3, shpr3);

            let reload = (CORE_CLOCK_HZ / 1000) * config::TICK_PERIOD_MS;
            write_volatile(SYSTICK_CSR, 0);
            write_volatile(SYSTICK_RVR, reload.saturating_sub(1));
            write_volatile(SYSTICK_CVR, 0);
            write_volatile(
                SYSTICK_CSR,
                SYSTICK_CSR_ENABLE | SYSTICK_CSR_CLKSOURCE | SYSTICK_CSR_TICKINT,
            );
        }
    }

    fn sleep() {
        cortex_m::asm::wfi();
    }

    fn enter_first_task(id: TaskId) -> ! {
        let entry = task::entry(id).expect("idle/first task has no registered entry");
        let stack_top = config::task_stack_start(id as usize);
        let msp_top = config::scheduler_stack_start();
        unsafe { kernel_enter_first_task(stack_top, entry, msp_top) }
    }

    fn park_for_reschedule() -> ! {
        loop {
            cortex_m::asm::wfi();
        }
    }
}

/// Tick source: advances every alarm. Any alarm-driven activation already
/// pends PendSV itself, so there is nothing further to do here.
#[exception]
fn SysTick() {
    crate::alarm::tick();
}

/// Installs [`PendSV_Handler`] as the exception vector. The handler runs on
/// the main stack (exception entry never switches to PSP), does the actual
/// register save/restore against PSP, and `bx lr`s back into this function,
/// which then returns through the normal exception-return sequence.
#[exception]
fn PendSV() {
    unsafe { PendSV_Handler() }
}
