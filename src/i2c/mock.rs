//! Wire-level I²C slave emulation for exercising the master engine.
//!
//! The mock models the electrical bus: SDA is the AND of the master and
//! slave drivers, the slave reacts to clock edges and start/stop
//! conditions exactly as a memory-style sensor would (one pointer byte
//! after a write address, auto-incrementing reads).

use core::convert::Infallible;
use std::cell::RefCell;
use std::rc::Rc;

use embedded_hal::digital::v2::{InputPin, OutputPin};

/// A memory-unit slave: 256 registers behind a pointer.
pub struct Slave {
    pub address: u8,
    pub memory: [u8; 256],
    pointer: u8,
    expect_address: bool,
    fresh_write: bool,
    phase: Phase,
    /// Fault injection: hold SDA low forever, as a wedged slave would.
    pub hold_sda_low: bool,
}

enum Phase {
    Idle,
    Rx { byte: u8, bits: u8 },
    Ack { then_tx: bool },
    Tx { byte: u8, bits: u8 },
    TxAwaitAck { acked: bool },
}

impl Slave {
    pub fn new(address: u8) -> Self {
        Self {
            address,
            memory: [0; 256],
            pointer: 0,
            expect_address: false,
            fresh_write: false,
            phase: Phase::Idle,
            hold_sda_low: false,
        }
    }

    fn on_start(&mut self) {
        self.expect_address = true;
        self.phase = Phase::Rx { byte: 0, bits: 0 };
    }

    fn on_stop(&mut self) {
        self.expect_address = false;
        self.phase = Phase::Idle;
    }

    fn on_scl_rise(&mut self, sda: bool) {
        match &mut self.phase {
            Phase::Rx { byte, bits } => {
                *byte = (*byte << 1) | sda as u8;
                *bits += 1;
            }
            Phase::TxAwaitAck { acked } => *acked = !sda,
            _ => {}
        }
    }

    /// Returns the level the slave drives SDA to for the upcoming
    /// clock-low period (`true` = released).
    fn on_scl_fall(&mut self) -> bool {
        if self.hold_sda_low {
            return false;
        }
        match self.phase {
            Phase::Idle => true,
            Phase::Rx { byte, bits } => {
                if bits == 8 {
                    self.process_byte(byte)
                } else {
                    true
                }
            }
            Phase::Ack { then_tx } => {
                if then_tx {
                    self.load_tx()
                } else {
                    self.phase = Phase::Rx { byte: 0, bits: 0 };
                    true
                }
            }
            Phase::Tx { byte, bits } => {
                if bits < 8 {
                    self.phase = Phase::Tx { byte: byte << 1, bits: bits + 1 };
                    byte & 0x80 != 0
                } else {
                    self.phase = Phase::TxAwaitAck { acked: false };
                    true
                }
            }
            Phase::TxAwaitAck { acked } => {
                if acked {
                    self.load_tx()
                } else {
                    self.phase = Phase::Idle;
                    true
                }
            }
        }
    }

    fn process_byte(&mut self, byte: u8) -> bool {
        if self.expect_address {
            self.expect_address = false;
            if byte >> 1 != self.address {
                self.phase = Phase::Idle;
                return true; // NACK: not ours
            }
            if byte & 1 != 0 {
                self.phase = Phase::Ack { then_tx: true };
            } else {
                self.fresh_write = true;
                self.phase = Phase::Ack { then_tx: false };
            }
            false
        } else {
            if self.fresh_write {
                self.pointer = byte;
                self.fresh_write = false;
            } else {
                self.memory[self.pointer as usize] = byte;
                self.pointer = self.pointer.wrapping_add(1);
            }
            self.phase = Phase::Ack { then_tx: false };
            false
        }
    }

    fn load_tx(&mut self) -> bool {
        let byte = self.memory[self.pointer as usize];
        self.pointer = self.pointer.wrapping_add(1);
        self.phase = Phase::Tx { byte: byte << 1, bits: 1 };
        byte & 0x80 != 0
    }
}

struct Wire {
    scl: bool,
    sda_master: bool,
    sda_slave: bool,
    slave: Slave,
}

impl Wire {
    fn sda_level(&self) -> bool {
        self.sda_master && self.sda_slave
    }

    fn set_scl(&mut self, level: bool) {
        if self.scl == level {
            return;
        }
        self.scl = level;
        if level {
            let sda = self.sda_level();
            self.slave.on_scl_rise(sda);
        } else {
            self.sda_slave = self.slave.on_scl_fall();
        }
    }

    fn set_sda(&mut self, level: bool) {
        if self.sda_master == level {
            return;
        }
        let before = self.sda_level();
        self.sda_master = level;
        let after = self.sda_level();
        if self.scl {
            if before && !after {
                self.slave.on_start();
            } else if !before && after {
                self.slave.on_stop();
            }
        }
    }
}

/// One emulated bus with a single slave attached.
pub struct Bus {
    wire: Rc<RefCell<Wire>>,
}

impl Bus {
    pub fn new(slave: Slave) -> Self {
        let released = !slave.hold_sda_low;
        Self {
            wire: Rc::new(RefCell::new(Wire {
                scl: true,
                sda_master: true,
                sda_slave: released,
                slave,
            })),
        }
    }

    pub fn scl(&self) -> SclPin {
        SclPin(Rc::clone(&self.wire))
    }

    pub fn sda(&self) -> SdaPin {
        SdaPin(Rc::clone(&self.wire))
    }

    pub fn slave<R>(&self, f: impl FnOnce(&mut Slave) -> R) -> R {
        f(&mut self.wire.borrow_mut().slave)
    }
}

pub struct SclPin(Rc<RefCell<Wire>>);
pub struct SdaPin(Rc<RefCell<Wire>>);

impl OutputPin for SclPin {
    type Error = Infallible;

    fn set_low(&mut self) -> Result<(), Infallible> {
        self.0.borrow_mut().set_scl(false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Infallible> {
        self.0.borrow_mut().set_scl(true);
        Ok(())
    }
}

impl InputPin for SclPin {
    type Error = Infallible;

    fn is_high(&self) -> Result<bool, Infallible> {
        Ok(self.0.borrow().scl)
    }

    fn is_low(&self) -> Result<bool, Infallible> {
        Ok(!self.0.borrow().scl)
    }
}

impl OutputPin for SdaPin {
    type Error = Infallible;

    fn set_low(&mut self) -> Result<(), Infallible> {
        self.0.borrow_mut().set_sda(false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Infallible> {
        self.0.borrow_mut().set_sda(true);
        Ok(())
    }
}

impl InputPin for SdaPin {
    type Error = Infallible;

    fn is_high(&self) -> Result<bool, Infallible> {
        Ok(self.0.borrow().sda_level())
    }

    fn is_low(&self) -> Result<bool, Infallible> {
        Ok(!self.0.borrow().sda_level())
    }
}
