//! Power management controller register map.

use tock_registers::registers::{ReadOnly, ReadWrite, WriteOnly};
use tock_registers::{register_bitfields, register_structs};

register_structs! {
    pub PmcRegisters {
        (0x00 => pub scer: WriteOnly<u32, SC::Register>),
        (0x04 => pub scdr: WriteOnly<u32, SC::Register>),
        (0x08 => pub scsr: ReadOnly<u32, SC::Register>),
        (0x0c => _reserved0),
        /// Peripheral clock enable, bit per [`super::PeripheralId`].
        (0x10 => pub pcer: WriteOnly<u32>),
        (0x14 => pub pcdr: WriteOnly<u32>),
        (0x18 => pub pcsr: ReadOnly<u32>),
        (0x1c => _reserved1),
        (0x20 => pub mor: ReadWrite<u32>),
        (0x24 => pub mcfr: ReadOnly<u32>),
        (0x28 => _reserved2),
        (0x2c => pub pllr: ReadWrite<u32>),
        (0x30 => pub mckr: ReadWrite<u32>),
        (0x34 => _reserved3),
        (0x40 => pub pck: [ReadWrite<u32>; 3]),
        (0x4c => _reserved4),
        (0x60 => pub ier: WriteOnly<u32>),
        (0x64 => pub idr: WriteOnly<u32>),
        (0x68 => pub sr: ReadOnly<u32>),
        (0x6c => pub imr: ReadOnly<u32>),
        (0x70 => @END),
    }
}

register_bitfields![u32,
    pub SC [
        /// Processor clock (disable to idle the core until an interrupt).
        PCK OFFSET(0) NUMBITS(1) [],
        /// 48 MHz clock to the USB device port.
        UDP OFFSET(7) NUMBITS(1) [],
        PCK0 OFFSET(8) NUMBITS(1) [],
        PCK1 OFFSET(9) NUMBITS(1) [],
        PCK2 OFFSET(10) NUMBITS(1) []
    ],
];
