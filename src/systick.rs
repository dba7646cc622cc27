//! System timebase: the 1 ms heartbeat tick.
//!
//! The periodic interval timer fires at 1 kHz on the shared system
//! controller line and is the single heartbeat of the baseplate. Each
//! tick the handler advances the millisecond counter and then
//! dispatches, in fixed order: the soft-I²C sub-scheduler (a faster
//! sub-tick counter, several protocol edges per tick), the AVR link
//! conversation, and finally the scheduler hook. Running all three from
//! one highest-priority handler is what keeps their relative timing
//! jitter-free; only USB runs on its own peripheral interrupt source.
//!
//! [`ms_now`] is a single 32-bit load and safe from any context,
//! including interrupt handlers and halfway through a context switch.

use core::cell::Cell;

use critical_section::Mutex;
use portable_atomic::{AtomicU32, Ordering};
use tock_registers::interfaces::{Readable, Writeable};

use crate::config;
use crate::hw;
use crate::hw::pit::{MR, SR, VALUE};
use crate::utils::ms_since;
use crate::{avr, i2c};

static MS: AtomicU32 = AtomicU32::new(0);

/// Optional callback run at the end of every tick, after the drivers.
/// The scheduler installs its switch evaluator here.
static SCHEDULER_HOOK: Mutex<Cell<Option<fn()>>> = Mutex::new(Cell::new(None));

/// Milliseconds since boot. Wraps after ~49.7 days; compare timestamps
/// with [`crate::utils::ms_since`] rather than `<`.
#[inline]
pub fn ms_now() -> u32 {
    MS.load(Ordering::Relaxed)
}

/// Busy-wait with interrupts running. This is the only blocking
/// primitive in the baseplate; everything else is poll-based.
pub fn wait_ms(ms: u32) {
    let deadline = ms_now().wrapping_add(ms);
    while !ms_since(ms_now(), deadline) {
        core::hint::spin_loop();
    }
}

/// Sub-millisecond busy delay by counted spin, calibrated against MCK.
/// Coarse (the loop body is a handful of cycles) but monotonic, which is
/// all the bit-banging paths need.
pub fn wait_ns(ns: u32) {
    // ~4 cycles per iteration at -Os on ARM7.
    let loops = (ns / 1000).saturating_mul(hw::MCK_HZ / 1_000_000) / 4 + 1;
    for _ in 0..loops {
        core::hint::spin_loop();
    }
}

/// Install the end-of-tick scheduler callback. Passing `None` disables
/// preemption entirely.
pub fn install_scheduler(hook: Option<fn()>) {
    critical_section::with(|cs| SCHEDULER_HOOK.borrow(cs).set(hook));
}

/// One millisecond tick: counter, then the fixed dispatch order —
/// soft-I²C sub-scheduler, AVR link, task-switch evaluator. Factored
/// out of the interrupt entry so the sequencing is testable on the
/// host.
pub(crate) fn tick_once() {
    MS.fetch_add(1, Ordering::Relaxed);
    i2c::isr_tick(config::I2C_SUBTICKS_PER_TICK);
    avr::isr_tick();
    let hook = critical_section::with(|cs| SCHEDULER_HOOK.borrow(cs).get());
    if let Some(hook) = hook {
        hook();
    }
}

/// Timebase driver. Constructing it programs the tick timer; the
/// interrupt line is routed separately by the lifecycle component.
pub struct SysTick {
    pit: &'static hw::pit::PitRegisters,
}

impl SysTick {
    /// PIT period register value for the 1 kHz tick (PIT runs at MCK/16).
    const PIT_PIV: u32 = hw::MCK_HZ / 16 / config::TICK_HZ - 1;

    pub fn new(pit: &'static hw::pit::PitRegisters) -> Self {
        pit.mr
            .write(MR::PIV.val(Self::PIT_PIV) + MR::PITEN::SET + MR::PITIEN::SET);
        Self { pit }
    }

    /// Stop the tick (shutdown path; the AIC line must already be
    /// masked).
    pub fn stop(&self) {
        self.pit.mr.write(MR::PIV.val(Self::PIT_PIV));
    }
}

/// System-controller interrupt: the line is shared with the RTT, WDT and
/// DBGU, so check that the PIT really fired before acknowledging it.
pub extern "C" fn sys_isr() {
    // SAFETY: read-only status access; the PIT is programmed once by
    // [`SysTick::new`] before this handler is ever enabled.
    let pit = unsafe { hw::pit() };
    if !pit.sr.is_set(SR::PITS) {
        return;
    }
    // Reading PIVR acknowledges; PICNT recovers ticks lost to long
    // critical sections so the wall clock never drifts.
    let missed = pit.pivr.read(VALUE::PICNT);
    for _ in 0..missed {
        tick_once();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ms_now_is_monotonic_across_ticks() {
        // Property: successive reads never go backwards, including over
        // a simulated wrap of the 32-bit counter.
        MS.store(u32::MAX - 3, Ordering::Relaxed);
        let mut last = ms_now();
        for _ in 0..8 {
            MS.fetch_add(1, Ordering::Relaxed);
            let now = ms_now();
            assert!(ms_since(now, last));
            last = now;
        }
    }

    #[test]
    fn timer_constants_match_the_datasheet_formulas() {
        // 48 MHz / 16 / 1 kHz = 3000 PIT ticks per ms.
        assert_eq!(SysTick::PIT_PIV, 2999);
        // 22 kHz of sub-ticks dispatched in 1 kHz batches.
        assert_eq!(config::I2C_SUBTICKS_PER_TICK, 22);
    }
}
