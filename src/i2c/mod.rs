//! Bit-banged I²C master for the sensor ports.
//!
//! Each digital sensor port runs its own transaction state machine over
//! the DIGI0/DIGI1 lines handed out by [`crate::sensors`]. The machines
//! are clocked by the millisecond tick's sub-scheduler: every tick runs
//! a batch of sub-ticks ([`config::I2C_SUBTICKS_PER_TICK`]), and each
//! sub-tick is one edge of the bit-bang protocol (set data, raise
//! clock, sample, drop clock). A bus bit costs two sub-ticks, so the
//! effective rate lands just under 10 kHz — slow by I²C standards, but
//! what the LEGO sensors expect.
//!
//! Transfers are the SMBus register shape: an optional one-byte internal
//! address written first, then data in either direction (reads go through
//! a repeated start). Ports registered with `lego_compat` get an extra
//! clock-low hold between the repeated start and the read address; the
//! stock ultrasonic sensor drops the transfer without it.
//!
//! [`start_read`]/[`start_write`] are non-blocking: callers poll
//! [`busy`] and then inspect [`status`]. At most one transaction is in
//! flight per port.
//!
//! [`start_read`]: Engine::start_read
//! [`start_write`]: Engine::start_write
//! [`busy`]: Engine::busy
//! [`status`]: Engine::status

pub mod memory;

use core::convert::Infallible;

use embedded_hal::digital::v2::{InputPin, OutputPin};
use heapless::Vec;

use crate::config;
use crate::utils::{Holder, InfallibleResult};
use crate::{Port, N_PORTS};

/// Outcome of the most recent transaction on a port.
#[derive(Copy, Clone, PartialEq, Eq, Debug, defmt::Format)]
pub enum Status {
    /// No transaction has run since the port was registered.
    Idle,
    InProgress,
    Success,
    Failed(Failure),
}

#[derive(Copy, Clone, PartialEq, Eq, Debug, defmt::Format)]
pub enum Failure {
    /// No acknowledge for the device address.
    AddressNack,
    /// A data or internal-address byte was not acknowledged.
    DataNack,
    /// A slave held SDA low longer than the configured timeout.
    BusStuck,
    /// The port was disabled mid-transaction.
    Aborted,
}

#[derive(Copy, Clone, PartialEq, Eq, Debug, defmt::Format)]
pub enum Error {
    /// Data length was zero or above [`config::I2C_MAX_DATA_LEN`].
    DataLen,
    /// The port has no bus pins attached.
    NotEnabled,
    /// The port has pins but no device address registered.
    NotRegistered,
    /// No completed read result is available on the port.
    NotReady,
}

/// Per-port protocol error counters, in the spirit of a receiver's stats
/// block: cheap enough to keep in release builds, dumped over defmt when
/// something misbehaves.
#[derive(Clone, Default, PartialEq, Eq, Debug, defmt::Format)]
pub struct Stats {
    pub address_nacks: u32,
    pub data_nacks: u32,
    pub bus_stuck: u32,
    pub aborted: u32,
    pub completed: u32,
}

#[derive(Copy, Clone, PartialEq, Eq)]
enum Dir {
    Read,
    Write,
}

/// Which byte of the transaction script is on the wire.
#[derive(Copy, Clone, PartialEq, Eq)]
enum Unit {
    AddressWrite,
    AddressRead,
    Internal,
    Data,
}

/// One protocol edge per sub-tick. `hi` distinguishes the clock-low
/// half (data changes) from the clock-high half (data is sampled).
#[derive(Copy, Clone, PartialEq, Eq)]
enum State {
    /// Wait for both lines to idle high before the start condition.
    WaitBusFree { waited: u32 },
    /// Start or repeated-start condition, edge by edge.
    Start { restart: bool, edge: u8 },
    /// Clock-low hold after a repeated start (legacy LEGO sensors).
    Hold { left: u32 },
    Tx { unit: Unit, value: u8, bit: u8, hi: bool },
    TxAck { unit: Unit, hi: bool },
    Rx { value: u8, bit: u8, hi: bool },
    RxAck { last: bool, hi: bool },
    Stop { edge: u8, failure: Option<Failure> },
}

struct Txn {
    dir: Dir,
    address: u8,
    internal: Option<u8>,
    len: usize,
    pos: usize,
    state: State,
}

struct Channel<SCL, SDA> {
    scl: SCL,
    sda: SDA,
    address: Option<u8>,
    lego_compat: bool,
    txn: Option<Txn>,
    status: Status,
    last_dir: Dir,
    data: Vec<u8, { config::I2C_MAX_DATA_LEN }>,
    stats: Stats,
}

/// The soft-master engine: four independent per-port state machines
/// advanced in lockstep by [`Engine::poll`].
pub struct Engine<SCL, SDA> {
    ports: [Option<Channel<SCL, SDA>>; N_PORTS],
    /// Last status of ports whose pins were taken away, so an abort on
    /// disable stays observable through [`Engine::status`].
    parked: [Status; N_PORTS],
}

impl<SCL, SDA> Engine<SCL, SDA>
where
    SCL: OutputPin<Error = Infallible> + InputPin<Error = Infallible>,
    SDA: OutputPin<Error = Infallible> + InputPin<Error = Infallible>,
{
    pub fn new() -> Self {
        Self {
            ports: [None, None, None, None],
            parked: [Status::Idle; N_PORTS],
        }
    }

    /// Give a port its bus pins (freshly enabled by the sensor mux).
    /// Replaces any previous channel state.
    pub fn attach(&mut self, port: Port, scl: SCL, sda: SDA) {
        self.parked[port.index()] = Status::Idle;
        self.ports[port.index()] = Some(Channel {
            scl,
            sda,
            address: None,
            lego_compat: false,
            txn: None,
            status: Status::Idle,
            last_dir: Dir::Write,
            data: Vec::new(),
            stats: Stats::default(),
        });
    }

    /// Associate a 7-bit device address with the port. Idempotent;
    /// re-registering only updates the address and compat flag.
    pub fn register(&mut self, port: Port, address: u8, lego_compat: bool) -> Result<(), Error> {
        let ch = self.channel_mut(port)?;
        ch.address = Some(address & 0x7f);
        ch.lego_compat = lego_compat;
        Ok(())
    }

    /// Detach the port, returning its pins to the caller (who hands them
    /// back to the sensor mux). An in-flight transaction is failed.
    pub fn detach(&mut self, port: Port) -> Option<(SCL, SDA)> {
        let mut ch = self.ports[port.index()].take()?;
        self.parked[port.index()] = if ch.txn.is_some() {
            ch.stats.aborted = ch.stats.aborted.saturating_add(1);
            defmt::warn!("i2c: port {} disabled mid-transaction", port);
            Status::Failed(Failure::Aborted)
        } else {
            ch.status
        };
        Some((ch.scl, ch.sda))
    }

    /// Queue a register write: optional internal address, then `data`.
    pub fn start_write(
        &mut self,
        port: Port,
        internal: Option<u8>,
        data: &[u8],
    ) -> nb::Result<(), Error> {
        if data.is_empty() || data.len() > config::I2C_MAX_DATA_LEN {
            return Err(nb::Error::Other(Error::DataLen));
        }
        let ch = self.channel_mut(port)?;
        let address = ch.address.ok_or(Error::NotRegistered)?;
        if ch.status == Status::InProgress {
            return Err(nb::Error::WouldBlock);
        }
        ch.data.clear();
        // Length was validated against the buffer capacity above.
        ch.data.extend_from_slice(data).ok();
        ch.last_dir = Dir::Write;
        ch.status = Status::InProgress;
        ch.txn = Some(Txn {
            dir: Dir::Write,
            address,
            internal,
            len: data.len(),
            pos: 0,
            state: State::WaitBusFree { waited: 0 },
        });
        Ok(())
    }

    /// Queue a register read of `len` bytes, collected into the port's
    /// result buffer ([`Engine::read_result`]).
    pub fn start_read(
        &mut self,
        port: Port,
        internal: Option<u8>,
        len: usize,
    ) -> nb::Result<(), Error> {
        if len == 0 || len > config::I2C_MAX_DATA_LEN {
            return Err(nb::Error::Other(Error::DataLen));
        }
        let ch = self.channel_mut(port)?;
        let address = ch.address.ok_or(Error::NotRegistered)?;
        if ch.status == Status::InProgress {
            return Err(nb::Error::WouldBlock);
        }
        ch.data.clear();
        ch.last_dir = Dir::Read;
        ch.status = Status::InProgress;
        ch.txn = Some(Txn {
            dir: Dir::Read,
            address,
            internal,
            len,
            pos: 0,
            state: State::WaitBusFree { waited: 0 },
        });
        Ok(())
    }

    /// A transaction is in flight on `port`.
    pub fn busy(&self, port: Port) -> bool {
        matches!(self.channel(port), Some(ch) if ch.status == Status::InProgress)
    }

    pub fn status(&self, port: Port) -> Status {
        self.channel(port)
            .map_or(self.parked[port.index()], |ch| ch.status)
    }

    /// Copy out the data of the port's last completed read.
    pub fn read_result(&self, port: Port, buf: &mut [u8]) -> Result<usize, Error> {
        let ch = self.channel(port).ok_or(Error::NotEnabled)?;
        if ch.status != Status::Success || ch.last_dir != Dir::Read {
            return Err(Error::NotReady);
        }
        let n = ch.data.len().min(buf.len());
        buf[..n].copy_from_slice(&ch.data[..n]);
        Ok(n)
    }

    pub fn stats(&self, port: Port) -> Stats {
        self.channel(port).map_or_else(Stats::default, |ch| ch.stats.clone())
    }

    /// Advance every port's machine by one protocol edge (one
    /// sub-tick).
    pub fn poll(&mut self) {
        for ch in self.ports.iter_mut().flatten() {
            ch.advance();
        }
    }

    fn channel(&self, port: Port) -> Option<&Channel<SCL, SDA>> {
        self.ports[port.index()].as_ref()
    }

    fn channel_mut(&mut self, port: Port) -> Result<&mut Channel<SCL, SDA>, Error> {
        self.ports[port.index()].as_mut().ok_or(Error::NotEnabled)
    }
}

impl<SCL, SDA> Channel<SCL, SDA>
where
    SCL: OutputPin<Error = Infallible> + InputPin<Error = Infallible>,
    SDA: OutputPin<Error = Infallible> + InputPin<Error = Infallible>,
{
    /// One protocol edge. Pin writes always move the clock before the
    /// data line so a data change can never be mistaken for a start or
    /// stop condition.
    fn advance(&mut self) {
        let Some(txn) = self.txn.as_mut() else { return };
        let mut outcome = None;

        match txn.state {
            State::WaitBusFree { waited } => {
                if self.scl.is_high().infallible() && self.sda.is_high().infallible() {
                    txn.state = State::Start { restart: false, edge: 1 };
                } else if waited >= config::I2C_STUCK_TIMEOUT {
                    self.stats.bus_stuck = self.stats.bus_stuck.saturating_add(1);
                    outcome = Some(Status::Failed(Failure::BusStuck));
                } else {
                    txn.state = State::WaitBusFree { waited: waited + 1 };
                }
            }

            State::Start { restart, edge } => {
                match edge {
                    // Edge 0 only exists for repeated starts, where the
                    // clock is still low from the previous ack.
                    0 => self.scl.set_low().infallible(),
                    1 => self.sda.set_high().infallible(),
                    2 => self.scl.set_high().infallible(),
                    // SDA falling while SCL is high: the start proper.
                    3 => self.sda.set_low().infallible(),
                    _ => self.scl.set_low().infallible(),
                }
                txn.state = if edge < 4 {
                    State::Start { restart, edge: edge + 1 }
                } else if restart && self.lego_compat {
                    State::Hold { left: config::I2C_LEGACY_HOLD }
                } else {
                    let unit = if restart || (txn.dir == Dir::Read && txn.internal.is_none()) {
                        Unit::AddressRead
                    } else {
                        Unit::AddressWrite
                    };
                    tx_address(txn.address, unit)
                };
            }

            State::Hold { left } => {
                // Clock held low; the ultrasonic sensor needs the pause
                // before it will accept its read address.
                self.scl.set_low().infallible();
                txn.state = if left > 0 {
                    State::Hold { left: left - 1 }
                } else {
                    tx_address(txn.address, Unit::AddressRead)
                };
            }

            State::Tx { unit, value, bit, hi } => {
                if !hi {
                    self.scl.set_low().infallible();
                    if value & 0x80 != 0 {
                        self.sda.set_high().infallible();
                    } else {
                        self.sda.set_low().infallible();
                    }
                    txn.state = State::Tx { unit, value, bit, hi: true };
                } else {
                    self.scl.set_high().infallible();
                    txn.state = if bit == 7 {
                        State::TxAck { unit, hi: false }
                    } else {
                        State::Tx { unit, value: value << 1, bit: bit + 1, hi: false }
                    };
                }
            }

            State::TxAck { unit, hi } => {
                if !hi {
                    self.scl.set_low().infallible();
                    self.sda.set_high().infallible();
                    txn.state = State::TxAck { unit, hi: true };
                } else {
                    self.scl.set_high().infallible();
                    if self.sda.is_low().infallible() {
                        txn.state = match unit {
                            Unit::AddressWrite => match txn.internal {
                                Some(internal) => State::Tx {
                                    unit: Unit::Internal,
                                    value: internal,
                                    bit: 0,
                                    hi: false,
                                },
                                None => State::Tx {
                                    unit: Unit::Data,
                                    value: self.data[txn.pos],
                                    bit: 0,
                                    hi: false,
                                },
                            },
                            Unit::Internal => match txn.dir {
                                Dir::Read => State::Start { restart: true, edge: 0 },
                                Dir::Write => State::Tx {
                                    unit: Unit::Data,
                                    value: self.data[txn.pos],
                                    bit: 0,
                                    hi: false,
                                },
                            },
                            Unit::AddressRead => State::Rx { value: 0, bit: 0, hi: false },
                            Unit::Data => {
                                txn.pos += 1;
                                if txn.pos < txn.len {
                                    State::Tx {
                                        unit: Unit::Data,
                                        value: self.data[txn.pos],
                                        bit: 0,
                                        hi: false,
                                    }
                                } else {
                                    State::Stop { edge: 0, failure: None }
                                }
                            }
                        };
                    } else {
                        let failure = match unit {
                            Unit::AddressWrite | Unit::AddressRead => {
                                self.stats.address_nacks =
                                    self.stats.address_nacks.saturating_add(1);
                                Failure::AddressNack
                            }
                            Unit::Internal | Unit::Data => {
                                self.stats.data_nacks = self.stats.data_nacks.saturating_add(1);
                                Failure::DataNack
                            }
                        };
                        txn.state = State::Stop { edge: 0, failure: Some(failure) };
                    }
                }
            }

            State::Rx { value, bit, hi } => {
                if !hi {
                    self.scl.set_low().infallible();
                    self.sda.set_high().infallible();
                    txn.state = State::Rx { value, bit, hi: true };
                } else {
                    self.scl.set_high().infallible();
                    let value = (value << 1) | self.sda.is_high().infallible() as u8;
                    if bit == 7 {
                        self.data.push(value).ok();
                        txn.pos += 1;
                        txn.state = State::RxAck { last: txn.pos == txn.len, hi: false };
                    } else {
                        txn.state = State::Rx { value, bit: bit + 1, hi: false };
                    }
                }
            }

            State::RxAck { last, hi } => {
                if !hi {
                    self.scl.set_low().infallible();
                    // Ack every byte except the final one; the nack tells
                    // the slave to release the bus for our stop.
                    if last {
                        self.sda.set_high().infallible();
                    } else {
                        self.sda.set_low().infallible();
                    }
                    txn.state = State::RxAck { last, hi: true };
                } else {
                    self.scl.set_high().infallible();
                    txn.state = if last {
                        State::Stop { edge: 0, failure: None }
                    } else {
                        State::Rx { value: 0, bit: 0, hi: false }
                    };
                }
            }

            State::Stop { edge, failure } => {
                match edge {
                    0 => {
                        self.scl.set_low().infallible();
                        self.sda.set_low().infallible();
                    }
                    1 => self.scl.set_high().infallible(),
                    // SDA rising while SCL is high: the stop condition.
                    _ => self.sda.set_high().infallible(),
                }
                if edge < 2 {
                    txn.state = State::Stop { edge: edge + 1, failure };
                } else {
                    outcome = Some(match failure {
                        None => Status::Success,
                        Some(f) => Status::Failed(f),
                    });
                }
            }
        }

        if let Some(status) = outcome {
            if status == Status::Success {
                self.stats.completed = self.stats.completed.saturating_add(1);
            }
            self.status = status;
            self.txn = None;
            // Leave both lines released whatever happened.
            self.scl.set_high().infallible();
            self.sda.set_high().infallible();
        }
    }
}

fn tx_address(address: u8, unit: Unit) -> State {
    let read_bit = (unit == Unit::AddressRead) as u8;
    State::Tx { unit, value: (address << 1) | read_bit, bit: 0, hi: false }
}

/// Pin type the global engine runs on: a sensor-port DIGI line.
pub type PortPin = crate::sensors::Pin<&'static crate::hw::pio::PioRegisters>;

static ENGINE: Holder<Engine<PortPin, PortPin>> = Holder::new();

/// Park the engine for tick and cross-task access. Called once by the
/// lifecycle component before the tick interrupt is enabled.
pub fn init(engine: Engine<PortPin, PortPin>) {
    ENGINE.init(engine);
}

pub fn attach(port: Port, pins: crate::sensors::BusPins<&'static crate::hw::pio::PioRegisters>) {
    ENGINE.with(|e| e.attach(port, pins.scl, pins.sda));
}

pub fn register(port: Port, address: u8, lego_compat: bool) -> Result<(), Error> {
    ENGINE.with(|e| e.register(port, address, lego_compat))
}

pub fn start_write(port: Port, internal: Option<u8>, data: &[u8]) -> nb::Result<(), Error> {
    ENGINE.with(|e| e.start_write(port, internal, data))
}

pub fn start_read(port: Port, internal: Option<u8>, len: usize) -> nb::Result<(), Error> {
    ENGINE.with(|e| e.start_read(port, internal, len))
}

pub fn busy(port: Port) -> bool {
    ENGINE.with(|e| e.busy(port))
}

pub fn status(port: Port) -> Status {
    ENGINE.with(|e| e.status(port))
}

pub fn read_result(port: Port, buf: &mut [u8]) -> Result<usize, Error> {
    ENGINE.with(|e| e.read_result(port, buf))
}

pub fn stats(port: Port) -> Stats {
    ENGINE.with(|e| e.stats(port))
}

/// Detach a port's pins (e.g. ahead of `sensors::disable`).
pub fn detach(port: Port) -> Option<(PortPin, PortPin)> {
    ENGINE.with(|e| e.detach(port))
}

/// Tick-time sub-scheduler: run this tick's batch of protocol edges on
/// every active port.
pub(crate) fn isr_tick(subticks: u32) {
    ENGINE.try_with(|e| {
        for _ in 0..subticks {
            e.poll();
        }
    });
}

#[cfg(test)]
pub(crate) mod mock;
