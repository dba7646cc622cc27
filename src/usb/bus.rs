//! AT91 UDP implementation of the [`UdpBus`] seam.
//!
//! The UDP's CSR bits need a read-back synchronization dance on every
//! set and clear (the peripheral runs on its own 48 MHz clock domain);
//! the two helpers below are the only place that happens. The D+ pull-up
//! is not part of the UDP at all on this board — it hangs off PA16, low
//! side driven, so driving the pin low attaches us to the host.

use tock_registers::interfaces::{Readable, Writeable};

use crate::hw;
use crate::hw::udp::{CSR, FADDR, GLB_STAT, INT};

use super::proto::{BULK_MAX_PACKET, EP0_MAX_PACKET};
use super::{Event, UdpBus};

/// D+ pull-up control pin (drive low to attach).
const PULLUP: u32 = 1 << 16;

pub struct Udp {
    regs: &'static hw::udp::UdpRegisters,
    pio: &'static hw::pio::PioRegisters,
    /// Which hardware bank of EP2 the next OUT packet drains from.
    rx_bank1: bool,
}

impl Udp {
    /// Claim the UDP. The caller has already enabled the peripheral and
    /// 48 MHz clocks. Detaches first so the host sees a fresh
    /// connection, then attaches with all interrupts squelched; the
    /// first ENDBUSRES (which cannot be masked) arms the endpoints.
    pub fn new(
        regs: &'static hw::udp::UdpRegisters,
        pio: &'static hw::pio::PioRegisters,
    ) -> Self {
        let udp = Self { regs, pio, rx_bank1: false };

        pio.per.set(PULLUP);
        pio.oer.set(PULLUP);
        udp.detach_pin();
        crate::systick::wait_ms(crate::config::USB_DETACH_MS);

        regs.idr.set(!0);
        regs.rst_ep.set(0xf);
        regs.rst_ep.set(0);
        regs.icr.set(!0);
        udp.attach_pin();

        udp
    }

    fn attach_pin(&self) {
        self.pio.codr.set(PULLUP);
    }

    fn detach_pin(&self) {
        self.pio.sodr.set(PULLUP);
    }

    /// Clear CSR flags and wait for the clock-domain round trip.
    fn csr_clear(&self, ep: usize, mask: u32) {
        let csr = &self.regs.csr[ep];
        csr.set(csr.get() & !mask);
        while csr.get() & mask != 0 {}
    }

    /// Set CSR flags and wait for the clock-domain round trip.
    fn csr_set(&self, ep: usize, mask: u32) {
        let csr = &self.regs.csr[ep];
        csr.set(csr.get() | mask);
        while csr.get() & mask != mask {}
    }

    fn rx_bank_mask(&self) -> u32 {
        if self.rx_bank1 {
            CSR::RX_DATA_BK1::SET.value
        } else {
            CSR::RX_DATA_BK0::SET.value
        }
    }
}

impl UdpBus for Udp {
    fn poll(&mut self) -> Option<Event> {
        let isr = self.regs.isr.extract();

        if isr.is_set(INT::ENDBUSRES) {
            self.regs.icr.set(!0);
            return Some(Event::BusReset);
        }
        if isr.is_set(INT::WAKEUP) {
            self.regs.icr.write(INT::WAKEUP::SET);
            return self.poll();
        }
        if isr.is_set(INT::RXSUSP) {
            self.regs.icr.write(INT::RXSUSP::SET);
            return Some(Event::Suspend);
        }
        if isr.is_set(INT::RXRSM) || isr.is_set(INT::EXTRSM) {
            self.regs.icr.write(INT::RXRSM::SET + INT::EXTRSM::SET);
            return Some(Event::Resume);
        }
        if isr.is_set(INT::SOFINT) {
            self.regs.icr.write(INT::SOFINT::SET);
            return self.poll();
        }

        let csr0 = self.regs.csr[0].extract();
        if csr0.is_set(CSR::STALLSENT) {
            // The host acknowledged our stall; drop the force.
            self.csr_clear(
                0,
                CSR::FORCESTALL::SET.value | CSR::STALLSENT::SET.value,
            );
            return self.poll();
        }
        if csr0.is_set(CSR::RXSETUP) {
            let mut raw = [0u8; 8];
            let count = (csr0.read(CSR::RXBYTECNT) as usize).min(8);
            for byte in raw.iter_mut().take(count) {
                *byte = self.regs.fdr[0].get() as u8;
            }
            // An IN data phase needs DIR set before RXSETUP is released.
            if raw[0] & 0x80 != 0 {
                self.csr_set(0, CSR::DIR::SET.value);
            }
            self.csr_clear(0, CSR::RXSETUP::SET.value);
            return Some(Event::Setup(raw));
        }
        if csr0.is_set(CSR::RX_DATA_BK0) {
            return Some(Event::Out { ep: 0 });
        }
        if csr0.is_set(CSR::TXCOMP) {
            self.csr_clear(0, CSR::TXCOMP::SET.value);
            return Some(Event::InComplete { ep: 0 });
        }

        let csr1 = self.regs.csr[1].extract();
        if csr1.is_set(CSR::TXCOMP) {
            self.csr_clear(1, CSR::TXCOMP::SET.value);
            return Some(Event::InComplete { ep: 1 });
        }

        let csr2 = self.regs.csr[2].extract();
        if csr2.is_set(CSR::RX_DATA_BK0) || csr2.is_set(CSR::RX_DATA_BK1) {
            return Some(Event::Out { ep: 2 });
        }

        None
    }

    fn enable_after_reset(&mut self) {
        self.regs.rst_ep.set(!0);
        self.regs.rst_ep.set(0);
        self.regs.faddr.write(FADDR::FEN::SET + FADDR::FADD.val(0));
        self.regs.glb_stat.set(0);
        self.rx_bank1 = false;

        self.regs.idr.set(!0);
        self.regs.ier.write(
            INT::EP0::SET + INT::EP1::SET + INT::EP2::SET + INT::RXSUSP::SET + INT::RXRSM::SET,
        );

        self.regs.csr[0].write(CSR::EPEDS::SET + CSR::EPTYPE::Control);
        self.regs.csr[1].write(CSR::EPEDS::SET + CSR::EPTYPE::BulkIn);
        self.regs.csr[2].write(CSR::EPEDS::SET + CSR::EPTYPE::BulkOut);
        self.regs.csr[3].set(0);
    }

    fn set_address(&mut self, address: u8) {
        self.regs
            .faddr
            .write(FADDR::FEN::SET + FADDR::FADD.val(address as u32));
        if address > 0 {
            self.regs.glb_stat.write(GLB_STAT::FADDEN::SET);
        } else {
            self.regs.glb_stat.set(0);
        }
    }

    fn set_configured(&mut self, configured: bool) {
        if configured {
            self.regs
                .glb_stat
                .write(GLB_STAT::CONFG::SET + GLB_STAT::FADDEN::SET);
        } else {
            self.regs.glb_stat.write(GLB_STAT::FADDEN::SET);
        }
    }

    fn write_packet(&mut self, ep: u8, data: &[u8]) {
        let ep = ep as usize;
        debug_assert!(data.len() <= if ep == 0 { EP0_MAX_PACKET } else { BULK_MAX_PACKET });
        for &byte in data {
            self.regs.fdr[ep].set(byte as u32);
        }
        self.csr_set(ep, CSR::TXPKTRDY::SET.value);
    }

    fn read_packet(&mut self, ep: u8, buf: &mut [u8]) -> usize {
        let ep = ep as usize;
        let count = (self.regs.csr[ep].read(CSR::RXBYTECNT) as usize).min(buf.len());
        for byte in buf.iter_mut().take(count) {
            *byte = self.regs.fdr[ep].get() as u8;
        }
        if ep == 2 {
            // Release the bank we just drained and move to the other.
            let mask = self.rx_bank_mask();
            self.csr_clear(2, mask);
            self.rx_bank1 = !self.rx_bank1;
        } else {
            self.csr_clear(
                ep,
                CSR::RX_DATA_BK0::SET.value | CSR::RX_DATA_BK1::SET.value,
            );
        }
        count
    }

    fn stall_ep0(&mut self) {
        self.csr_set(0, CSR::FORCESTALL::SET.value);
    }

    fn detach(&mut self) {
        self.regs.idr.set(!0);
        self.detach_pin();
    }
}
