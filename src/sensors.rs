//! Sensor-port multiplexer.
//!
//! The four sensor ports share one PIO controller and the AVR's analog
//! sampling; this module owns the ports' pin lines and arbitrates their
//! modes. A port's electrical configuration is a pure function of its
//! mode, and every mode change passes through [`Mode::Off`] — drivers
//! layered above (soft-I²C, analog sensors) never touch the PIO directly.
//!
//! Pin operations go through the small [`PinIo`] seam so the mode logic
//! runs against a recording mock on the host; on target the seam is the
//! PIO register block itself.

use core::convert::Infallible;

use embedded_hal::digital::v2::{InputPin, OutputPin};
use tock_registers::interfaces::{Readable, Writeable};

use crate::hw;
use crate::{Port, N_PORTS};

/// The two digital data lines of a sensor port. In digital mode DIGI0
/// clocks the bus and DIGI1 carries data.
#[derive(Copy, Clone, PartialEq, Eq, Debug, defmt::Format)]
pub enum DigiPin {
    Digi0,
    Digi1,
}

/// Operating mode of a sensor port.
#[derive(Copy, Clone, PartialEq, Eq, Debug, defmt::Format)]
pub enum Mode {
    /// Unused; pins idle as inputs.
    Off,
    /// Legacy RCX sensor (pins driven manually from analog mode).
    Legacy,
    /// NXT sensor in analog mode: both DIGI lines driven low.
    Analog,
    /// NXT sensor in digital (I²C) mode: open-drain lines, idle high.
    Digital,
    /// NXT color sensor: electrically like digital, tagged so readers
    /// can disambiguate the hybrid protocol above.
    Color,
}

#[derive(Copy, Clone, PartialEq, Eq, Debug, defmt::Format)]
pub enum Error {
    /// The requested transition does not pass through `Off`, or the
    /// operation is not valid for the port's current mode.
    BadMode,
}

/// DIGI0/DIGI1 PIO masks per port, in connector order.
const PINMAP: [PortPins; N_PORTS] = [
    PortPins { digi0: 1 << 23, digi1: 1 << 18 },
    PortPins { digi0: 1 << 28, digi1: 1 << 19 },
    PortPins { digi0: 1 << 29, digi1: 1 << 20 },
    PortPins { digi0: 1 << 30, digi1: 1 << 2 },
];

#[derive(Copy, Clone)]
struct PortPins {
    digi0: u32,
    digi1: u32,
}

impl PortPins {
    fn both(&self) -> u32 {
        self.digi0 | self.digi1
    }
}

/// Mask-level pin control, the mux's view of the PIO controller.
///
/// Implementations must make each call a single atomic store (the PIO's
/// set/clear register pairs do this for free), since the soft-I²C engine
/// wiggles pins from interrupt context while the mux reconfigures others
/// from task context.
pub trait PinIo {
    /// Enable output drivers for the pins in `mask`.
    fn make_output(&self, mask: u32);
    /// Disable output drivers; pins become inputs.
    fn make_input(&self, mask: u32);
    /// Drive high, or release when the pin is open-drain.
    fn set(&self, mask: u32);
    /// Drive low.
    fn clear(&self, mask: u32);
    /// Switch open-drain (multi-drive) mode on or off.
    fn multi_drive(&self, mask: u32, on: bool);
    /// Switch the internal pull-ups on or off.
    fn pull_up(&self, mask: u32, on: bool);
    /// Actual line level of a single-pin mask.
    fn level(&self, mask: u32) -> bool;
}

impl PinIo for &'static hw::pio::PioRegisters {
    fn make_output(&self, mask: u32) {
        self.oer.set(mask);
    }
    fn make_input(&self, mask: u32) {
        self.odr.set(mask);
    }
    fn set(&self, mask: u32) {
        self.sodr.set(mask);
    }
    fn clear(&self, mask: u32) {
        self.codr.set(mask);
    }
    fn multi_drive(&self, mask: u32, on: bool) {
        if on {
            self.mder.set(mask);
        } else {
            self.mddr.set(mask);
        }
    }
    fn pull_up(&self, mask: u32, on: bool) {
        if on {
            self.ppuer.set(mask);
        } else {
            self.ppudr.set(mask);
        }
    }
    fn level(&self, mask: u32) -> bool {
        self.pdsr.get() & mask != 0
    }
}

/// One DIGI line handed out to the soft-I²C engine. Open-drain
/// semantics: `set_high` releases the line, `set_low` sinks it, reads
/// return the actual wire level.
pub struct Pin<P: PinIo> {
    io: P,
    mask: u32,
}

impl<P: PinIo> OutputPin for Pin<P> {
    type Error = Infallible;

    fn set_low(&mut self) -> Result<(), Infallible> {
        self.io.clear(self.mask);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Infallible> {
        self.io.set(self.mask);
        Ok(())
    }
}

impl<P: PinIo> InputPin for Pin<P> {
    type Error = Infallible;

    fn is_high(&self) -> Result<bool, Infallible> {
        Ok(self.io.level(self.mask))
    }

    fn is_low(&self) -> Result<bool, Infallible> {
        Ok(!self.io.level(self.mask))
    }
}

/// The SCL/SDA pair released to a digital port's bus driver.
pub struct BusPins<P: PinIo> {
    pub scl: Pin<P>,
    pub sda: Pin<P>,
}

/// Owner of the four sensor ports.
pub struct Mux<P: PinIo + Copy> {
    io: P,
    modes: [Mode; N_PORTS],
}

impl<P: PinIo + Copy> Mux<P> {
    /// Claim the ports: all DIGI pins become inputs with pull-ups off,
    /// all modes `Off`.
    pub fn new(io: P) -> Self {
        let mut all = 0;
        for pins in &PINMAP {
            all |= pins.both();
        }
        io.make_input(all);
        io.pull_up(all, false);
        io.multi_drive(all, false);
        Self { io, modes: [Mode::Off; N_PORTS] }
    }

    pub fn mode(&self, port: Port) -> Mode {
        self.modes[port.index()]
    }

    fn claim(&mut self, port: Port, mode: Mode) -> Result<(), Error> {
        if self.modes[port.index()] != Mode::Off {
            return Err(Error::BadMode);
        }
        self.modes[port.index()] = mode;
        Ok(())
    }

    /// Configure `port` for an analog sensor: both DIGI lines driven low.
    pub fn analog_enable(&mut self, port: Port) -> Result<(), Error> {
        self.claim(port, Mode::Analog)?;
        let pins = PINMAP[port.index()];
        self.io.make_output(pins.both());
        self.io.clear(pins.both());
        Ok(())
    }

    /// Disable an analog port. Unlike [`Mux::disable`] this insists the
    /// port really is analog, for drivers that own their mode.
    pub fn analog_disable(&mut self, port: Port) -> Result<(), Error> {
        if self.mode(port) != Mode::Analog {
            return Err(Error::BadMode);
        }
        self.disable(port);
        Ok(())
    }

    /// Configure `port` for a digital sensor and hand out its bus pins:
    /// open-drain outputs, released high, internal pull-ups left off
    /// (the sensor side provides the bias).
    pub fn i2c_enable(&mut self, port: Port) -> Result<BusPins<P>, Error> {
        self.claim(port, Mode::Digital)?;
        let pins = PINMAP[port.index()];
        self.io.make_output(pins.both());
        self.io.set(pins.both());
        self.io.multi_drive(pins.both(), true);
        Ok(BusPins {
            scl: Pin { io: self.io, mask: pins.digi0 },
            sda: Pin { io: self.io, mask: pins.digi1 },
        })
    }

    /// Configure `port` for the hybrid color sensor: same lines, but
    /// plain push-pull and tagged [`Mode::Color`] so reads disambiguate.
    pub fn color_enable(&mut self, port: Port) -> Result<(), Error> {
        self.claim(port, Mode::Color)?;
        let pins = PINMAP[port.index()];
        self.io.make_output(pins.both());
        self.io.set(pins.both());
        Ok(())
    }

    /// Return `port` to the idle state: pins released as inputs, mode
    /// `Off`. Valid from any mode.
    pub fn disable(&mut self, port: Port) {
        let pins = PINMAP[port.index()];
        match self.modes[port.index()] {
            Mode::Off | Mode::Legacy => {}
            Mode::Analog | Mode::Digital | Mode::Color => {
                self.io.set(pins.both());
                self.io.make_input(pins.both());
                self.io.multi_drive(pins.both(), false);
            }
        }
        self.modes[port.index()] = Mode::Off;
    }

    /// Latest 10-bit analog sample for `port` (sampled by the AVR at
    /// 1 kHz).
    ///
    /// # Panics
    ///
    /// Panics if the port is not in analog mode.
    pub fn analog_get(&self, port: Port) -> u16 {
        assert!(
            self.mode(port) == Mode::Analog,
            "analog read from non-analog port"
        );
        crate::avr::get_sensor_raw(port)
    }

    /// Analog sample scaled to 0–100 %.
    ///
    /// # Panics
    ///
    /// Panics if the port is not in analog mode.
    pub fn analog_get_normalized(&self, port: Port) -> u8 {
        let raw = self.analog_get(port) as u32;
        (((raw + 1) * 100) / 1024) as u8
    }

    /// Manually drive one DIGI line high while in analog mode (RCX-style
    /// sensors toggle these to select readings).
    pub fn analog_digi_set(&mut self, port: Port, pin: DigiPin) -> Result<(), Error> {
        self.io.set(self.analog_digi(port, pin)?);
        Ok(())
    }

    /// Manually drive one DIGI line low while in analog mode.
    pub fn analog_digi_clear(&mut self, port: Port, pin: DigiPin) -> Result<(), Error> {
        self.io.clear(self.analog_digi(port, pin)?);
        Ok(())
    }

    fn analog_digi(&self, port: Port, pin: DigiPin) -> Result<u32, Error> {
        if self.mode(port) != Mode::Analog {
            return Err(Error::BadMode);
        }
        let pins = PINMAP[port.index()];
        Ok(match pin {
            DigiPin::Digi0 => pins.digi0,
            DigiPin::Digi1 => pins.digi1,
        })
    }
}

/// The mux instance the rest of the system shares. Parked once by the
/// lifecycle component; the free functions below mirror the methods for
/// callers that do not hold a driver reference (sensor drivers, the
/// I²C memory layer, applications).
static MUX: crate::utils::Holder<Mux<&'static hw::pio::PioRegisters>> = crate::utils::Holder::new();

pub fn init(mux: Mux<&'static hw::pio::PioRegisters>) {
    MUX.init(mux);
}

pub fn mode(port: Port) -> Mode {
    MUX.with(|m| m.mode(port))
}

pub fn analog_enable(port: Port) -> Result<(), Error> {
    MUX.with(|m| m.analog_enable(port))
}

pub fn analog_disable(port: Port) -> Result<(), Error> {
    MUX.with(|m| m.analog_disable(port))
}

pub fn i2c_enable(port: Port) -> Result<BusPins<&'static hw::pio::PioRegisters>, Error> {
    MUX.with(|m| m.i2c_enable(port))
}

pub fn color_enable(port: Port) -> Result<(), Error> {
    MUX.with(|m| m.color_enable(port))
}

pub fn disable(port: Port) {
    MUX.with(|m| m.disable(port))
}

pub fn analog_get(port: Port) -> u16 {
    MUX.with(|m| m.analog_get(port))
}

pub fn analog_get_normalized(port: Port) -> u8 {
    MUX.with(|m| m.analog_get_normalized(port))
}

pub fn analog_digi_set(port: Port, pin: DigiPin) -> Result<(), Error> {
    MUX.with(|m| m.analog_digi_set(port, pin))
}

pub fn analog_digi_clear(port: Port, pin: DigiPin) -> Result<(), Error> {
    MUX.with(|m| m.analog_digi_clear(port, pin))
}

#[cfg(test)]
pub(crate) mod mock {
    use super::PinIo;
    use std::cell::Cell;

    /// Records electrical pin state; `level` resolves like the real PIO
    /// (driven pins read their output, released pins read the bus, which
    /// the test controls via `bus`).
    #[derive(Default)]
    pub struct MockPio {
        pub output: Cell<u32>,
        pub odsr: Cell<u32>,
        pub multi_drive: Cell<u32>,
        pub pull_up: Cell<u32>,
        /// External bus level seen by released pins (pulled up by default).
        pub bus: Cell<u32>,
    }

    impl MockPio {
        pub fn new() -> Self {
            let mock = Self::default();
            mock.bus.set(!0);
            mock
        }

        fn driving(&self, mask: u32) -> bool {
            let out = self.output.get() & mask != 0;
            let od_released = self.multi_drive.get() & mask != 0 && self.odsr.get() & mask != 0;
            out && !od_released
        }
    }

    impl PinIo for &MockPio {
        fn make_output(&self, mask: u32) {
            self.output.set(self.output.get() | mask);
        }
        fn make_input(&self, mask: u32) {
            self.output.set(self.output.get() & !mask);
        }
        fn set(&self, mask: u32) {
            self.odsr.set(self.odsr.get() | mask);
        }
        fn clear(&self, mask: u32) {
            self.odsr.set(self.odsr.get() & !mask);
        }
        fn multi_drive(&self, mask: u32, on: bool) {
            let cur = self.multi_drive.get();
            self.multi_drive.set(if on { cur | mask } else { cur & !mask });
        }
        fn pull_up(&self, mask: u32, on: bool) {
            let cur = self.pull_up.get();
            self.pull_up.set(if on { cur | mask } else { cur & !mask });
        }
        fn level(&self, mask: u32) -> bool {
            if self.driving(mask) {
                self.odsr.get() & mask != 0
            } else {
                self.bus.get() & mask != 0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::MockPio;
    use super::*;

    const P0_BOTH: u32 = (1 << 23) | (1 << 18);

    #[test]
    fn enable_from_off_sets_pin_configuration() {
        let pio = MockPio::new();
        let mut mux = Mux::new(&pio);

        mux.analog_enable(Port::S1).unwrap();
        assert_eq!(mux.mode(Port::S1), Mode::Analog);
        // Analog mode drives both DIGI lines low.
        assert_eq!(pio.output.get() & P0_BOTH, P0_BOTH);
        assert_eq!(pio.odsr.get() & P0_BOTH, 0);

        let pio2 = MockPio::new();
        let mut mux = Mux::new(&pio2);
        mux.i2c_enable(Port::S1).unwrap();
        assert_eq!(mux.mode(Port::S1), Mode::Digital);
        // Digital mode: open-drain, released high.
        assert_eq!(pio2.multi_drive.get() & P0_BOTH, P0_BOTH);
        assert_eq!(pio2.odsr.get() & P0_BOTH, P0_BOTH);
    }

    #[test]
    fn transitions_must_pass_through_off() {
        let pio = MockPio::new();
        let mut mux = Mux::new(&pio);

        mux.analog_enable(Port::S2).unwrap();
        assert_eq!(mux.color_enable(Port::S2), Err(Error::BadMode));
        assert_eq!(mux.mode(Port::S2), Mode::Analog);

        mux.disable(Port::S2);
        assert_eq!(mux.mode(Port::S2), Mode::Off);
        mux.color_enable(Port::S2).unwrap();
        assert_eq!(mux.mode(Port::S2), Mode::Color);
    }

    #[test]
    fn disable_releases_the_lines() {
        let pio = MockPio::new();
        let mut mux = Mux::new(&pio);
        mux.i2c_enable(Port::S1).unwrap();
        mux.disable(Port::S1);
        assert_eq!(pio.output.get() & P0_BOTH, 0);
        assert_eq!(pio.multi_drive.get() & P0_BOTH, 0);
    }

    #[test]
    fn digi_lines_only_drivable_in_analog_mode() {
        let pio = MockPio::new();
        let mut mux = Mux::new(&pio);
        assert_eq!(
            mux.analog_digi_set(Port::S3, DigiPin::Digi0),
            Err(Error::BadMode)
        );
        mux.analog_enable(Port::S3).unwrap();
        mux.analog_digi_set(Port::S3, DigiPin::Digi1).unwrap();
        assert_ne!(pio.odsr.get() & (1 << 20), 0);
        mux.analog_digi_clear(Port::S3, DigiPin::Digi1).unwrap();
        assert_eq!(pio.odsr.get() & (1 << 20), 0);
    }

    #[test]
    fn bus_pins_have_open_drain_semantics() {
        let pio = MockPio::new();
        let mut mux = Mux::new(&pio);
        let mut pins = mux.i2c_enable(Port::S1).unwrap();

        // Released: reads follow the external bus.
        pins.sda.set_high().unwrap();
        assert!(pins.sda.is_high().unwrap());
        pio.bus.set(pio.bus.get() & !(1 << 18)); // slave pulls SDA low
        assert!(pins.sda.is_low().unwrap());

        // Driven low: reads see our own zero regardless of the bus.
        pio.bus.set(!0);
        pins.sda.set_low().unwrap();
        assert!(pins.sda.is_low().unwrap());
    }
}
