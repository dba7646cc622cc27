//! AT91SAM7S256 peripheral register maps.
//!
//! Pure data: typed register blocks (via `tock_registers`) plus the base
//! addresses they live at. Each peripheral has exactly one `unsafe`
//! accessor returning the `&'static` block; every volatile access in the
//! crate funnels through these. No driver logic lives here.
//!
//! Field layouts follow the AT91SAM7S series datasheet; only the
//! registers the baseplate actually touches are spelled out, the rest are
//! reserved gaps.

pub mod adc;
pub mod aic;
pub mod pio;
pub mod pit;
pub mod pmc;
pub mod rstc;
pub mod twi;
pub mod udp;
pub mod wdt;

/// Master clock. The brick's 18.432 MHz crystal is multiplied to 96 MHz
/// by the PLL and divided down to 48 MHz for MCK during startup.
pub const MCK_HZ: u32 = 48_000_000;

/// Peripheral identifiers, used both as AIC interrupt vectors and as bit
/// numbers in the PMC clock-enable registers.
#[derive(Copy, Clone, PartialEq, Eq, Debug, defmt::Format)]
#[repr(u8)]
pub enum PeripheralId {
    Fiq = 0,
    /// System controller: PIT, RTT, WDT, DBGU share this line.
    Sys = 1,
    PioA = 2,
    Adc = 4,
    Spi = 5,
    Us0 = 6,
    Us1 = 7,
    Ssc = 8,
    Twi = 9,
    Pwmc = 10,
    Udp = 11,
    Tc0 = 12,
    Tc1 = 13,
    Tc2 = 14,
    Irq0 = 30,
    Irq1 = 31,
}

impl PeripheralId {
    pub fn mask(self) -> u32 {
        1 << (self as u32)
    }
}

pub const AIC_BASE: usize = 0xFFFF_F000;
pub const PIOA_BASE: usize = 0xFFFF_F400;
pub const PMC_BASE: usize = 0xFFFF_FC00;
pub const RSTC_BASE: usize = 0xFFFF_FD00;
pub const PIT_BASE: usize = 0xFFFF_FD30;
pub const WDT_BASE: usize = 0xFFFF_FD40;
pub const ADC_BASE: usize = 0xFFFD_8000;
pub const UDP_BASE: usize = 0xFFFB_0000;
pub const TWI_BASE: usize = 0xFFFB_8000;

macro_rules! steal_fns {
    ($($(#[$doc:meta])* $name:ident: $ty:ty = $base:expr;)*) => {
        $(
            $(#[$doc])*
            /// # Safety
            ///
            /// Returns an unguarded alias of memory-mapped hardware. The
            /// caller must be the single owner of this peripheral (the
            /// lifecycle component hands each block to exactly one
            /// driver) or restrict itself to accesses that cannot
            /// interfere with that owner.
            pub unsafe fn $name() -> &'static $ty {
                &*($base as *const $ty)
            }
        )*
    };
}

steal_fns! {
    /// Advanced Interrupt Controller.
    aic: aic::AicRegisters = AIC_BASE;
    /// Parallel I/O controller A (the SAM7S has only port A).
    pioa: pio::PioRegisters = PIOA_BASE;
    /// Power management controller.
    pmc: pmc::PmcRegisters = PMC_BASE;
    /// Reset controller.
    rstc: rstc::RstcRegisters = RSTC_BASE;
    /// Periodic interval timer.
    pit: pit::PitRegisters = PIT_BASE;
    /// Watchdog timer.
    wdt: wdt::WdtRegisters = WDT_BASE;
    /// Analog-to-digital converter.
    adc: adc::AdcRegisters = ADC_BASE;
    /// USB device port.
    udp: udp::UdpRegisters = UDP_BASE;
    /// Two-wire (hardware I²C) interface.
    twi: twi::TwiRegisters = TWI_BASE;
}
