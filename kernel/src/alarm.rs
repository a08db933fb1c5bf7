//! Tick-driven alarm engine.
//!
//! Grounded on the teacher's `os::SysTick` exception (the single point
//! where kernel time advances) combined with nano-rtos's `alarms.c`: each
//! alarm is bound to a task at creation and, once armed, activates that
//! task when its countdown reaches zero. `ACTIVE`/`AUTORELOAD` replace the
//! original's separate boolean fields with a `bitflags` set, matching how
//! the pack's systems code (valibali-cluu) represents small, fixed state
//! sets.

use bitflags::bitflags;

use crate::arch;
use crate::config;
use crate::error::{self, OsError};
use crate::task::{self, TaskId};

bitflags! {
    #[derive(Clone, Copy, PartialEq, Eq, Debug)]
    struct AlarmFlags: u8 {
        /// Counting down; reaching zero activates the bound task.
        const ACTIVE = 0b01;
        /// On expiry, reload from `period` instead of going idle.
        const AUTORELOAD = 0b10;
    }
}

pub type AlarmId = u8;

#[derive(Clone, Copy)]
struct Alarm {
    bound_task: Option<TaskId>,
    flags: AlarmFlags,
    ticks_remaining: u32,
    period: u32,
}

impl Alarm {
    const fn empty() -> Self {
        Alarm {
            bound_task: None,
            flags: AlarmFlags::empty(),
            ticks_remaining: 0,
            period: 0,
        }
    }
}

static mut ALARMS: [Alarm; config::MAX_ALARMS] = [Alarm::empty(); config::MAX_ALARMS];

fn valid(id: AlarmId) -> bool {
    (id as usize) < config::MAX_ALARMS
}

/// Binds `id` to `task`, the task this alarm activates on expiry. Must be
/// called before `os_alarm_set_rel`.
pub fn os_alarm_create(id: AlarmId, task: TaskId) -> Result<(), OsError> {
    if !valid(id) {
        return Err(error::warn(OsError::InvalidArgument));
    }
    arch::free(|| unsafe {
        ALARMS[id as usize] = Alarm {
            bound_task: Some(task),
            flags: AlarmFlags::empty(),
            ticks_remaining: 0,
            period: 0,
        };
    });
    Ok(())
}

/// Arms `id` to activate its bound task after `ticks` kernel ticks. If
/// `autoreload` is set, the alarm rearms itself to `ticks` again on every
/// expiry instead of going idle after the first.
///
/// `ticks == 0` is rejected: an alarm due on the same tick it was armed is
/// almost always a logic error at the call site, not a legitimate
/// "activate immediately" request (use `os_task_activate` directly for
/// that).
pub fn os_alarm_set_rel(id: AlarmId, ticks: u32, autoreload: bool) -> Result<(), OsError> {
    if !valid(id) || ticks == 0 {
        return Err(error::warn(OsError::InvalidArgument));
    }
    arch::free(|| unsafe {
        if ALARMS[id as usize].bound_task.is_none() {
            return Err(error::warn(OsError::InvalidArgument));
        }
        let mut flags = AlarmFlags::ACTIVE;
        flags.set(AlarmFlags::AUTORELOAD, autoreload);
        ALARMS[id as usize].flags = flags;
        ALARMS[id as usize].ticks_remaining = ticks;
        ALARMS[id as usize].period = ticks;
        Ok(())
    })
}

/// Disarms `id`. A cancelled alarm stays bound to its task and can be
/// re-armed with `os_alarm_set_rel`.
pub fn os_alarm_cancel(id: AlarmId) -> Result<(), OsError> {
    if !valid(id) {
        return Err(error::warn(OsError::InvalidArgument));
    }
    arch::free(|| unsafe {
        ALARMS[id as usize].flags.remove(AlarmFlags::ACTIVE);
    });
    Ok(())
}

/// Returns whether `id` is currently counting down.
pub fn os_alarm_is_active(id: AlarmId) -> bool {
    if !valid(id) {
        return false;
    }
    arch::free(|| unsafe { ALARMS[id as usize].flags.contains(AlarmFlags::ACTIVE) })
}

/// Advances every alarm by one tick, waking bound tasks whose countdown
/// reaches zero, then decrements the wait budget of every task blocked in a
/// queue. Called once per tick from the SysTick exception; must run with
/// interrupts disabled (SysTick already runs with interrupts masked at its
/// own priority, but this is also exercised directly by tests).
pub(crate) fn tick() {
    for i in 0..config::MAX_ALARMS {
        let id = i as AlarmId;
        let due = arch::free(|| unsafe {
            let alarm = &mut ALARMS[i];
            if !alarm.flags.contains(AlarmFlags::ACTIVE) {
                return None;
            }
            alarm.ticks_remaining -= 1;
            if alarm.ticks_remaining > 0 {
                return None;
            }
            if alarm.flags.contains(AlarmFlags::AUTORELOAD) {
                alarm.ticks_remaining = alarm.period;
            } else {
                alarm.flags.remove(AlarmFlags::ACTIVE);
            }
            alarm.bound_task
        });
        if let Some(task_id) = due {
            let _ = task::os_task_wake_from_alarm(task_id);
        }
        let _ = id;
    }
    sweep_wait_timeouts();
}

/// Decrements the wait budget of every task blocked WAIT on a queue, waking
/// any whose budget reaches zero. A budget of `OS_MAX_TICKS` means "wait
/// forever" and is never decremented.
fn sweep_wait_timeouts() {
    for i in 0..config::MAX_TASKS {
        let id = i as TaskId;
        if task::state(id) != task::TaskState::Wait {
            continue;
        }
        let ticks = task::ticks_to_wait(id);
        if ticks == 0 || ticks == config::OS_MAX_TICKS {
            continue;
        }
        let remaining = ticks - 1;
        task::set_ticks_to_wait(id, remaining);
        if remaining == 0 {
            task::set_state(id, task::TaskState::Ready);
        }
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
        for i in 0..config::MAX_ALARMS {
            unsafe { ALARMS[i] = Alarm::empty() };
        }
        for i in 0..config::MAX_TASKS {
            task::set_state(i as TaskId, task::TaskState::Empty);
        }
    }

    #[test]
    #[serial]
    fn set_rel_rejects_zero_ticks() {
        reset();
        os_alarm_create(0, 0).unwrap();
        assert_eq!(os_alarm_set_rel(0, 0, false), Err(OsError::InvalidArgument));
    }

    #[test]
    #[serial]
    fn set_rel_rejects_unbound_alarm() {
        reset();
        assert_eq!(os_alarm_set_rel(0, 5, false), Err(OsError::InvalidArgument));
    }

    #[test]
    #[serial]
    fn one_shot_alarm_activates_once() {
        reset();
        crate::os_task_create(0, dummy, 1, false).unwrap();
        os_alarm_create(0, 0).unwrap();
        os_alarm_set_rel(0, 2, false).unwrap();
        tick();
        assert_eq!(task::state(0), task::TaskState::Suspended);
        tick();
        assert_eq!(task::state(0), task::TaskState::Ready);
        assert!(!os_alarm_is_active(0));
        task::set_state(0, task::TaskState::Suspended);
        tick();
        assert_eq!(task::state(0), task::TaskState::Suspended);
    }

    #[test]
    #[serial]
    fn autoreload_alarm_keeps_firing() {
        reset();
        crate::os_task_create(0, dummy, 1, false).unwrap();
        os_alarm_create(0, 0).unwrap();
        os_alarm_set_rel(0, 1, true).unwrap();
        tick();
        assert_eq!(task::state(0), task::TaskState::Ready);
        assert!(os_alarm_is_active(0));
        task::set_state(0, task::TaskState::Suspended);
        tick();
        assert_eq!(task::state(0), task::TaskState::Ready);
    }

    #[test]
    #[serial]
    fn cancel_stops_countdown() {
        reset();
        crate::os_task_create(0, dummy, 1, false).unwrap();
        os_alarm_create(0, 0).unwrap();
        os_alarm_set_rel(0, 1, false).unwrap();
        os_alarm_cancel(0).unwrap();
        tick();
        assert_eq!(task::state(0), task::TaskState::Suspended);
    }
}
