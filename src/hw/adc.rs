//! Analog-to-digital converter register map.

use tock_registers::registers::{ReadOnly, ReadWrite, WriteOnly};
use tock_registers::{register_bitfields, register_structs};

register_structs! {
    pub AdcRegisters {
        (0x00 => pub cr: WriteOnly<u32, CR::Register>),
        (0x04 => pub mr: ReadWrite<u32, MR::Register>),
        (0x08 => _reserved0),
        (0x10 => pub cher: WriteOnly<u32>),
        (0x14 => pub chdr: WriteOnly<u32>),
        (0x18 => pub chsr: ReadOnly<u32>),
        (0x1c => pub sr: ReadOnly<u32, SR::Register>),
        (0x20 => pub lcdr: ReadOnly<u32>),
        (0x24 => pub ier: WriteOnly<u32, SR::Register>),
        (0x28 => pub idr: WriteOnly<u32, SR::Register>),
        (0x2c => pub imr: ReadOnly<u32, SR::Register>),
        /// Per-channel conversion data.
        (0x30 => pub cdr: [ReadOnly<u32>; 8]),
        (0x50 => @END),
    }
}

register_bitfields![u32,
    pub CR [
        SWRST OFFSET(0) NUMBITS(1) [],
        START OFFSET(1) NUMBITS(1) []
    ],
    pub MR [
        TRGEN OFFSET(0) NUMBITS(1) [],
        TRGSEL OFFSET(1) NUMBITS(3) [],
        /// 8-bit instead of 10-bit resolution.
        LOWRES OFFSET(4) NUMBITS(1) [],
        SLEEP OFFSET(5) NUMBITS(1) [],
        PRESCAL OFFSET(8) NUMBITS(6) [],
        STARTUP OFFSET(16) NUMBITS(5) [],
        SHTIM OFFSET(24) NUMBITS(4) []
    ],
    pub SR [
        EOC0 OFFSET(0) NUMBITS(1) [],
        EOC1 OFFSET(1) NUMBITS(1) [],
        EOC2 OFFSET(2) NUMBITS(1) [],
        EOC3 OFFSET(3) NUMBITS(1) [],
        EOC7 OFFSET(7) NUMBITS(1) [],
        DRDY OFFSET(16) NUMBITS(1) []
    ],
];
