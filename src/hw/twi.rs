//! Two-wire interface (hardware I²C master) register map.

use tock_registers::registers::{ReadOnly, ReadWrite, WriteOnly};
use tock_registers::{register_bitfields, register_structs};

register_structs! {
    pub TwiRegisters {
        (0x00 => pub cr: WriteOnly<u32, CR::Register>),
        (0x04 => pub mmr: ReadWrite<u32, MMR::Register>),
        (0x08 => _reserved0),
        (0x0c => pub iadr: ReadWrite<u32>),
        (0x10 => pub cwgr: ReadWrite<u32, CWGR::Register>),
        (0x14 => _reserved1),
        (0x20 => pub sr: ReadOnly<u32, SR::Register>),
        (0x24 => pub ier: WriteOnly<u32, SR::Register>),
        (0x28 => pub idr: WriteOnly<u32, SR::Register>),
        (0x2c => pub imr: ReadOnly<u32, SR::Register>),
        (0x30 => pub rhr: ReadOnly<u32>),
        (0x34 => pub thr: WriteOnly<u32>),
        (0x38 => @END),
    }
}

// MMIO register block: all access is through a `&'static` reference
// guarded by a critical section, never concurrently from more than one
// execution context at a time, so `Sync` is sound even though the
// generated fields use `UnsafeCell`.
unsafe impl Sync for TwiRegisters {}

register_bitfields![u32,
    pub CR [
        START OFFSET(0) NUMBITS(1) [],
        STOP OFFSET(1) NUMBITS(1) [],
        MSEN OFFSET(2) NUMBITS(1) [],
        MSDIS OFFSET(3) NUMBITS(1) [],
        SWRST OFFSET(7) NUMBITS(1) []
    ],
    pub MMR [
        /// Internal address size in bytes (0 = none).
        IADRSZ OFFSET(8) NUMBITS(2) [],
        /// Transfer direction (set = master read).
        MREAD OFFSET(12) NUMBITS(1) [],
        /// Slave device address.
        DADR OFFSET(16) NUMBITS(7) []
    ],
    pub CWGR [
        CLDIV OFFSET(0) NUMBITS(8) [],
        CHDIV OFFSET(8) NUMBITS(8) [],
        CKDIV OFFSET(16) NUMBITS(3) []
    ],
    pub SR [
        TXCOMP OFFSET(0) NUMBITS(1) [],
        RXRDY OFFSET(1) NUMBITS(1) [],
        TXRDY OFFSET(2) NUMBITS(1) [],
        /// Receive overrun.
        OVRE OFFSET(6) NUMBITS(1) [],
        /// Transmit underrun.
        UNRE OFFSET(7) NUMBITS(1) [],
        /// Slave did not acknowledge.
        NACK OFFSET(8) NUMBITS(1) []
    ],
];
