//! Advanced Interrupt Controller driver.
//!
//! Routes peripheral interrupt lines to handler functions. The ARM7 IRQ
//! entry veneer (see the startup code) reads AIC_IVR, which returns
//! whatever address was programmed into the source vector register here,
//! and calls it as a plain `fn()`.

use tock_registers::interfaces::Writeable;

use crate::hw::{self, PeripheralId};
use crate::hw::aic::SMR;

/// An interrupt handler. Runs in IRQ mode with further IRQs of equal or
/// lower priority masked by the controller; `extern "C"` because the
/// entry veneer calls it from assembly.
pub type Isr = extern "C" fn();

/// Priority levels for interrupt lines.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug, defmt::Format)]
pub enum Priority {
    /// Stuff that doesn't mind waiting a little.
    Low = 2,
    /// Most drivers go in here.
    Driver = 4,
    /// Drivers that have no hardware controller behind them.
    SoftMac = 6,
    /// Keeps the system clock accurate.
    Tick = 7,
}

#[derive(Copy, Clone, PartialEq, Eq, Debug, defmt::Format)]
pub enum Trigger {
    Level,
    Edge,
}

/// Owner of the interrupt controller.
pub struct Aic {
    regs: &'static hw::aic::AicRegisters,
}

impl Aic {
    /// Take over the controller: everything masked, pending state
    /// cleared, spurious interrupts routed to a handler that just
    /// returns.
    pub fn new(regs: &'static hw::aic::AicRegisters) -> Self {
        let aic = Self { regs };
        aic.regs.idcr.set(!0);
        aic.regs.iccr.set(!0);
        aic.regs.spu.set(spurious_isr as usize as u32);
        // Pop the priority stack in case the boot loader left interrupts
        // half-acknowledged; eight writes cover all priority levels.
        for _ in 0..8 {
            aic.regs.eoicr.set(0);
        }
        aic
    }

    /// Route `vector` to `handler` and enable the line.
    ///
    /// Replaces any previous handler for the vector; the line is masked
    /// while the registers are rewritten so a half-updated pair is never
    /// observable.
    pub fn install(&self, vector: PeripheralId, priority: Priority, trigger: Trigger, handler: Isr) {
        let n = vector as usize;
        self.regs.idcr.set(vector.mask());
        self.regs.smr[n].write(
            SMR::PRIOR.val(priority as u32)
                + match trigger {
                    Trigger::Level => SMR::SRCTYPE::LevelSensitive,
                    Trigger::Edge => SMR::SRCTYPE::EdgeTriggered,
                },
        );
        self.regs.svr[n].set(handler as usize as u32);
        self.regs.iccr.set(vector.mask());
        self.regs.iecr.set(vector.mask());
    }

    pub fn enable(&self, vector: PeripheralId) {
        self.regs.iecr.set(vector.mask());
    }

    pub fn disable(&self, vector: PeripheralId) {
        self.regs.idcr.set(vector.mask());
    }

    /// Software-trigger the line, as if the peripheral had asserted it.
    pub fn force(&self, vector: PeripheralId) {
        self.regs.iscr.set(vector.mask());
    }

    /// Clear a pending (edge-latched) interrupt without running it.
    pub fn ack(&self, vector: PeripheralId) {
        self.regs.iccr.set(vector.mask());
    }
}

extern "C" fn spurious_isr() {}

static AIC: crate::utils::Holder<Aic> = crate::utils::Holder::new();

/// Park the controller after bring-up so drivers and the shutdown path
/// can manage their interrupt lines without threading a reference
/// through every call chain.
pub fn init(aic: Aic) {
    AIC.init(aic);
}

pub fn install(vector: PeripheralId, priority: Priority, trigger: Trigger, handler: Isr) {
    AIC.with(|aic| aic.install(vector, priority, trigger, handler));
}

pub fn enable(vector: PeripheralId) {
    AIC.with(|aic| aic.enable(vector));
}

pub fn disable(vector: PeripheralId) {
    AIC.with(|aic| aic.disable(vector));
}

pub fn force(vector: PeripheralId) {
    AIC.with(|aic| aic.force(vector));
}

pub fn ack(vector: PeripheralId) {
    AIC.with(|aic| aic.ack(vector));
}
