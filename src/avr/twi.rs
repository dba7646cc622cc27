//! Hardware TWI transport for the AVR link.
//!
//! The TWI block is a plain I²C master; the AVR is its only device.
//! Transfers are interrupt-pumped one byte at a time — at 380 kHz a
//! whole inbound frame comfortably fits in the half-millisecond slot the
//! link gives it.

use tock_registers::interfaces::{Readable, Writeable};

use crate::hw;
use crate::hw::twi::{CR, MMR, SR};
use crate::systick;

use super::{frame, Transport, TransportStatus};

/// TWD/TWCK pins (PA3/PA4).
const TWD: u32 = 1 << 3;
const TWCK: u32 = 1 << 4;

/// Bus clock ≈ 380 kHz at MCK 48 MHz.
const CWGR_380KHZ: u32 = 0x0002_0f0f;

#[derive(Copy, Clone, PartialEq, Eq)]
enum State {
    Ready,
    TxBusy,
    RxBusy,
    Failed,
}

pub struct Twi {
    regs: &'static hw::twi::TwiRegisters,
    state: State,
    buf: [u8; frame::IN_LEN],
    pos: usize,
    len: usize,
}

impl Twi {
    /// Take over the TWI block. Clocks out up to nine manual pulses
    /// first in case a previous run left a slave mid-byte with SDA low,
    /// then hands the pins to the peripheral and enables master mode.
    pub fn new(
        regs: &'static hw::twi::TwiRegisters,
        pio: &'static hw::pio::PioRegisters,
    ) -> Self {
        regs.idr.set(!0);

        pio.mder.set(TWD | TWCK);
        pio.per.set(TWD | TWCK);
        pio.odr.set(TWD);
        pio.oer.set(TWCK);
        let mut clocks = 9;
        while clocks > 0 && pio.pdsr.get() & TWD == 0 {
            pio.codr.set(TWCK);
            systick::wait_ns(1500);
            pio.sodr.set(TWCK);
            systick::wait_ns(1500);
            clocks -= 1;
        }
        pio.pdr.set(TWD | TWCK);
        pio.asr.set(TWD | TWCK);

        regs.cr.write(CR::SWRST::SET + CR::MSDIS::SET);
        regs.cwgr.set(CWGR_380KHZ);
        regs.cr.write(CR::MSEN::SET);

        Self { regs, state: State::Ready, buf: [0; frame::IN_LEN], pos: 0, len: 0 }
    }

    /// Interrupt body: pump the next byte or finish/fail the transfer.
    pub fn isr(&mut self) {
        let sr = self.regs.sr.extract();

        if sr.is_set(SR::RXRDY) && self.state == State::RxBusy {
            if self.pos < self.len {
                self.buf[self.pos] = self.regs.rhr.get() as u8;
                self.pos += 1;
                if self.len - self.pos == 1 {
                    self.regs.cr.write(CR::STOP::SET);
                }
                if self.pos == self.len {
                    self.regs.idr.set(!0);
                    self.state = State::Ready;
                }
            }
        }

        if sr.is_set(SR::TXRDY) && self.state == State::TxBusy {
            if self.pos < self.len {
                if self.len - self.pos == 1 {
                    self.regs.cr.write(CR::STOP::SET);
                }
                self.regs.thr.set(self.buf[self.pos] as u32);
                self.pos += 1;
            } else {
                self.regs.idr.set(!0);
                self.state = State::Ready;
            }
        }

        if sr.is_set(SR::NACK) || sr.is_set(SR::OVRE) || sr.is_set(SR::UNRE) {
            self.regs.cr.write(CR::STOP::SET);
            self.regs.idr.set(!0);
            self.state = State::Failed;
        }
    }
}

impl Transport for Twi {
    fn start_write(&mut self, address: u8, data: &[u8]) {
        self.regs.idr.set(!0);
        let n = data.len().min(self.buf.len());
        self.buf[..n].copy_from_slice(&data[..n]);
        self.pos = 0;
        self.len = n;
        self.state = State::TxBusy;

        self.regs.mmr.write(MMR::DADR.val(address as u32) + MMR::IADRSZ.val(0));
        self.regs.cr.write(CR::START::SET + CR::MSEN::SET);
        self.regs.ier.write(SR::TXRDY::SET);
    }

    fn start_read(&mut self, address: u8, len: usize) {
        self.regs.idr.set(!0);
        self.pos = 0;
        self.len = len.min(self.buf.len());
        self.state = State::RxBusy;

        // Drain stale status and data from an abandoned transfer.
        let _ = self.regs.sr.get();
        let _ = self.regs.rhr.get();

        self.regs.mmr.write(
            MMR::DADR.val(address as u32) + MMR::IADRSZ.val(0) + MMR::MREAD::SET,
        );
        if self.len == 1 {
            self.regs.cr.write(CR::START::SET + CR::STOP::SET + CR::MSEN::SET);
        } else {
            self.regs.cr.write(CR::START::SET + CR::MSEN::SET);
        }
        self.regs.ier.write(SR::RXRDY::SET);
    }

    fn status(&mut self) -> TransportStatus {
        match self.state {
            State::Ready => TransportStatus::Done,
            State::Failed => TransportStatus::Failed,
            State::TxBusy | State::RxBusy => TransportStatus::Busy,
        }
    }

    fn read_data(&mut self, buf: &mut [u8]) -> usize {
        let n = self.len.min(buf.len());
        buf[..n].copy_from_slice(&self.buf[..n]);
        n
    }
}
