#![no_std]
#![no_main]

mod button;
mod led;

use cortex_m_rt::entry;
use panic_halt as _;

use kernel::{
    config::OS_MAX_TICKS, os_alarm_create, os_alarm_set_rel, os_init, os_queue_create,
    os_queue_receive, os_queue_send, os_task_create, os_task_terminate, scheduler_run,
};

use button::*;
use led::*;

const IDLE_TASK: u8 = 0;
const PERIOD_TASK: u8 = 1;
const LED_R_TASK: u8 = 2;
const LED_G_TASK: u8 = 3;
const LED_B_TASK: u8 = 4;
const LOGGER_TASK: u8 = 5;

const ALARM_PERIOD: u8 = 0;
const ALARM_R: u8 = 1;
const ALARM_G: u8 = 2;
const ALARM_B: u8 = 3;

const LOG_QUEUE: u8 = 0;

/// Ticks each color channel stays lit before its alarm clears it, mirroring
/// the original firmware's one-tick PWM pulse width.
const PULSE_WIDTH_TICKS: u32 = 1;
/// Ticks between the start of one blink period and the next.
const PERIOD_TICKS: u32 = 24;

#[entry]
fn main() -> ! {
    init_led();
    init_user_button();

    os_task_create(IDLE_TASK, idle_task, 0, true).expect("idle task registration");
    os_task_create(PERIOD_TASK, period_task, 2, true).expect("period task registration");
    os_task_create(LED_R_TASK, led_r_task, 1, false).expect("red task registration");
    os_task_create(LED_G_TASK, led_g_task, 1, false).expect("green task registration");
    os_task_create(LED_B_TASK, led_b_task, 1, false).expect("blue task registration");
    os_task_create(LOGGER_TASK, logger_task, 1, true).expect("logger task registration");

    os_alarm_create(ALARM_PERIOD, PERIOD_TASK).expect("period alarm binding");
    os_alarm_create(ALARM_R, LED_R_TASK).expect("red alarm binding");
    os_alarm_create(ALARM_G, LED_G_TASK).expect("green alarm binding");
    os_alarm_create(ALARM_B, LED_B_TASK).expect("blue alarm binding");

    os_queue_create(LOG_QUEUE, 4, &[PERIOD_TASK, LOGGER_TASK]).expect("log queue creation");

    os_init();
    os_alarm_set_rel(ALARM_PERIOD, PERIOD_TICKS, true).expect("period alarm arm");

    scheduler_run()
}

/// Runs once per `PERIOD_TICKS`: lights every channel, arms the three
/// per-channel alarms to turn them back off one tick later, then reports
/// the period count over the log queue before rearming itself.
extern "C" fn period_task() -> ! {
    static mut PERIOD_COUNT: u8 = 0;

    led2_on();
    led3_on();
    led4_on();

    os_alarm_set_rel(ALARM_R, PULSE_WIDTH_TICKS, false).ok();
    os_alarm_set_rel(ALARM_G, PULSE_WIDTH_TICKS, false).ok();
    os_alarm_set_rel(ALARM_B, PULSE_WIDTH_TICKS, false).ok();

    unsafe {
        PERIOD_COUNT = PERIOD_COUNT.wrapping_add(1);
        let _ = os_queue_send(LOG_QUEUE, PERIOD_COUNT as usize, 0);
    }

    os_task_terminate()
}

extern "C" fn led_r_task() -> ! {
    led2_off();
    os_task_terminate()
}

extern "C" fn led_g_task() -> ! {
    led3_off();
    os_task_terminate()
}

extern "C" fn led_b_task() -> ! {
    led4_off();
    os_task_terminate()
}

/// Drains the period counter off the log queue, blocking on
/// `os_queue_receive` between periods rather than polling.
extern "C" fn logger_task() -> ! {
    loop {
        if let Ok(count) = os_queue_receive(LOG_QUEUE, OS_MAX_TICKS) {
            if count % 2 == 0 {
                led1_on();
            }
        }
    }
}

extern "C" fn idle_task() -> ! {
    loop {
        led1_toggle();
    }
}
