//! Core lifecycle: ordered bring-up, post-reset diagnostics, shutdown.
//!
//! Bring-up order matters and is fixed: interrupt controller first (and
//! global interrupts on), then the timebases, then the AVR link so
//! motors and battery sensing are live, then the sensor mux, USB last
//! among the drivers. A 100 ms settle delay follows before the
//! application entry point, giving every conversation-style driver time
//! to reach steady state.
//!
//! Shutdown is the mirror: the application's registered handler runs
//! first (this is where an application kernel stops its display), USB
//! detaches from the bus, and finally the AVR is told to cut power — or,
//! on the reset path, the reset controller is keyed instead.
//!
//! A watchdog or brownout status in the reset controller at boot is a
//! fault: something already went badly enough that silently carrying on
//! would hide it. The fault path reports through a registered hook
//! (display and sound live above this crate) and parks the CPU.

use core::cell::Cell;

use critical_section::Mutex;

/// Application callback run first on the shutdown and reset paths.
pub type ShutdownHandler = fn();

/// Sink for fault messages (a display driver, typically). Keep it
/// cheap; it runs on a machine that is about to stop.
pub type FaultHook = fn(&'static str);

static SHUTDOWN: Mutex<Cell<Option<ShutdownHandler>>> = Mutex::new(Cell::new(None));
static FAULT_HOOK: Mutex<Cell<Option<FaultHook>>> = Mutex::new(Cell::new(None));

/// Why the reset controller says the chip last reset.
#[derive(Copy, Clone, PartialEq, Eq, Debug, defmt::Format)]
pub enum ResetCause {
    PowerUp,
    WakeUp,
    Watchdog,
    Software,
    User,
    Brownout,
    Unknown,
}

impl ResetCause {
    /// Decode the RSTTYP field of the reset-controller status register.
    pub fn from_rsttyp(bits: u32) -> ResetCause {
        match bits {
            0 => ResetCause::PowerUp,
            1 => ResetCause::WakeUp,
            2 => ResetCause::Watchdog,
            3 => ResetCause::Software,
            4 => ResetCause::User,
            5 => ResetCause::Brownout,
            _ => ResetCause::Unknown,
        }
    }
}

/// Boot-blocking failures detected from the previous reset.
#[derive(Copy, Clone, PartialEq, Eq, Debug, defmt::Format)]
pub enum Fault {
    /// The watchdog fired. It is disabled right after reset, so this
    /// means a real lockup, not a missed feed.
    Watchdog,
    /// Supply voltage dipped below the brownout threshold.
    Brownout,
}

impl Fault {
    pub fn message(&self) -> &'static str {
        match self {
            Fault::Watchdog => "Watchdog fault",
            Fault::Brownout => "Brownout fault",
        }
    }
}

/// Which reset causes refuse to boot.
pub fn boot_fault(cause: ResetCause) -> Option<Fault> {
    match cause {
        ResetCause::Watchdog => Some(Fault::Watchdog),
        ResetCause::Brownout => Some(Fault::Brownout),
        _ => None,
    }
}

/// Register the single optional shutdown callback; a later registration
/// replaces an earlier one.
pub fn register_shutdown_handler(handler: ShutdownHandler) {
    critical_section::with(|cs| SHUTDOWN.borrow(cs).set(Some(handler)));
}

pub fn register_fault_hook(hook: FaultHook) {
    critical_section::with(|cs| FAULT_HOOK.borrow(cs).set(Some(hook)));
}

fn run_shutdown_handler() {
    let handler = critical_section::with(|cs| SHUTDOWN.borrow(cs).get());
    if let Some(handler) = handler {
        handler();
    }
}

/// Report a fault through the hook (and the log). Does not stop the
/// machine by itself; [`fatal`] does.
pub fn report(fault: Fault) {
    defmt::error!("fault: {}", fault);
    let hook = critical_section::with(|cs| FAULT_HOOK.borrow(cs).get());
    if let Some(hook) = hook {
        hook(fault.message());
    }
}

/// Report and park the CPU. Interrupts stay enabled so a debugger (or
/// the fault hook's display) keeps working.
pub fn fatal(fault: Fault) -> ! {
    report(fault);
    loop {
        core::hint::spin_loop();
    }
}

#[cfg(all(target_arch = "arm", target_os = "none"))]
mod target {
    use tock_registers::interfaces::{Readable, Writeable};

    use super::*;
    use crate::aic::{Aic, Priority, Trigger};
    use crate::hw::{self, PeripheralId};
    use crate::hw::rstc::{CR, SR};
    use crate::hw::wdt::MR as WDT_MR;
    use crate::{avr, config, i2c, sensors, systick, usb};

    /// Bring the baseplate up in its fixed order and enter the
    /// application. Called exactly once from the reset path, with
    /// interrupts still globally masked.
    ///
    /// External collaborators (sound PWM, LCD/display) initialize from
    /// the application entry point; their slots in the order are between
    /// the AVR link and the sensor mux, as `app` sees a live AVR.
    pub fn kernel_main(app: fn()) -> ! {
        // SAFETY: reset path, nothing else owns any peripheral yet.
        // Each block is handed to exactly one driver below.
        let (wdt, rstc, pmc, pioa) =
            unsafe { (hw::wdt(), hw::rstc(), hw::pmc(), hw::pioa()) };

        // The watchdog mode register is write-once: disable it before
        // anything can starve it. A watchdog reset from here on is a bug.
        wdt.mr.write(WDT_MR::WDDIS::SET);

        let cause = ResetCause::from_rsttyp(rstc.sr.read(SR::RSTTYP));

        // Clocks for everything the core drives.
        pmc.pcer.set(
            PeripheralId::PioA.mask()
                | PeripheralId::Twi.mask()
                | PeripheralId::Adc.mask()
                | PeripheralId::Udp.mask(),
        );
        pmc.scer.write(hw::pmc::SC::UDP::SET);

        // 1. interrupt controller, then global interrupts.
        let aic = Aic::new(unsafe { hw::aic() });
        crate::aic::init(aic);
        crate::arch::enable_interrupts();

        // 2. the heartbeat tick, at the highest priority: it paces the
        // soft-I²C sub-scheduler, the AVR link and the task switcher.
        let _timebase = systick::SysTick::new(unsafe { hw::pit() });
        crate::aic::install(PeripheralId::Sys, Priority::Tick, Trigger::Level, systick::sys_isr);

        // 3. AVR link (the motor API rides on it).
        let twi = avr::twi::Twi::new(unsafe { hw::twi() }, pioa);
        avr::init(avr::Link::new(twi));
        crate::aic::install(PeripheralId::Twi, Priority::Driver, Trigger::Level, avr::twi_isr);

        // 4. sensor ports and the soft-I²C engine above them.
        sensors::init(sensors::Mux::new(pioa));
        i2c::init(i2c::Engine::new());

        // 5. USB, last of the drivers.
        usb::init(usb::Stack::new(usb::bus::Udp::new(unsafe { hw::udp() }, pioa)));
        crate::aic::install(PeripheralId::Udp, Priority::Driver, Trigger::Level, usb::isr);

        // Let conversations reach steady state before the app runs.
        systick::wait_ms(config::BOOT_SETTLE_MS);

        if let Some(fault) = boot_fault(cause) {
            fatal(fault);
        }

        app();

        // The application returned: treat it as an orderly shutdown.
        halt();
    }

    /// Power the brick down: handler, USB detach, then ask the AVR to
    /// cut power (it obliges about a second later).
    pub fn halt() -> ! {
        defmt::info!("halt");
        run_shutdown_handler();
        usb::disable();
        avr::power_down();
        loop {
            core::hint::spin_loop();
        }
    }

    /// Processor reset instead of power-down: same shutdown chain, then
    /// key the reset controller.
    pub fn reset() -> ! {
        defmt::info!("reset");
        run_shutdown_handler();
        usb::disable();
        // SAFETY: write-only reset trigger; we are on the way out.
        let rstc = unsafe { hw::rstc() };
        rstc.cr
            .write(CR::KEY.val(hw::rstc::KEY) + CR::PERRST::SET + CR::PROCRST::SET);
        loop {
            core::hint::spin_loop();
        }
    }
}

#[cfg(all(target_arch = "arm", target_os = "none"))]
pub use target::{halt, kernel_main, reset};
