#![deny(unused_must_use)]
#![no_main]
#![no_std]

//! On-brick binary: boot the baseplate and run a minimal supervisor
//! application — two tasks on the scheduler, one of which powers the
//! brick down when the dark-grey cancel button is pressed. An
//! application kernel replaces `app_main` with its own entry point.

use defmt_rtt as _;
use nxtbase as lib;

use lib::{avr, config, lifecycle, sched, systick};

mod startup;

/// Heartbeat period of the supervisor task.
const HEARTBEAT_MS: u32 = 1000;
/// Button poll period; the AVR refreshes its snapshot at 1 kHz anyway.
const BUTTON_POLL_MS: u32 = 50;

#[no_mangle]
extern "C" fn kernel_start() -> ! {
    lifecycle::kernel_main(app_main)
}

fn app_main() {
    defmt::info!(
        "nxtbase up, battery {=u16} mV, avr {=u8}.{=u8}",
        avr::get_battery_mv(),
        avr::get_version().0,
        avr::get_version().1
    );

    static mut IDLE_STACK: [u8; config::TASK_STACK_SIZE] = [0; config::TASK_STACK_SIZE];
    static mut SUPERVISOR_STACK: [u8; config::TASK_STACK_SIZE] = [0; config::TASK_STACK_SIZE];

    let mut scheduler = sched::Scheduler::new();
    // SAFETY: each static is taken exactly once, here, before the
    // scheduler can observe it.
    unsafe {
        let idle = &mut *core::ptr::addr_of_mut!(IDLE_STACK);
        let supervisor = &mut *core::ptr::addr_of_mut!(SUPERVISOR_STACK);
        scheduler.register_idle(idle, idle_task).expect("idle task");
        scheduler.register(supervisor, supervisor_task).expect("supervisor task");
    }
    sched::install(scheduler);
    sched::start();
}

fn idle_task() {
    loop {
        core::hint::spin_loop();
    }
}

fn supervisor_task() {
    let mut last_beat = systick::ms_now();
    loop {
        if avr::get_button().contains(avr::Buttons::CANCEL) {
            lifecycle::halt();
        }
        if systick::ms_now().wrapping_sub(last_beat) >= HEARTBEAT_MS {
            last_beat = systick::ms_now();
            defmt::trace!("alive at {=u32} ms", last_beat);
        }
        systick::wait_ms(BUTTON_POLL_MS);
    }
}

#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    defmt::error!("panic: {}", defmt::Display2Format(info));
    loop {
        core::hint::spin_loop();
    }
}
