//! Watchdog timer register map.
//!
//! The baseplate does not feed a watchdog; it disables it once at boot
//! (WDT_MR is write-once) and treats a watchdog reset status as a fault.

use tock_registers::registers::{ReadOnly, ReadWrite, WriteOnly};
use tock_registers::{register_bitfields, register_structs};

register_structs! {
    pub WdtRegisters {
        (0x00 => pub cr: WriteOnly<u32, CR::Register>),
        (0x04 => pub mr: ReadWrite<u32, MR::Register>),
        (0x08 => pub sr: ReadOnly<u32, SR::Register>),
        (0x0c => @END),
    }
}

register_bitfields![u32,
    pub CR [
        WDRSTT OFFSET(0) NUMBITS(1) [],
        KEY OFFSET(24) NUMBITS(8) []
    ],
    pub MR [
        WDV OFFSET(0) NUMBITS(12) [],
        WDFIEN OFFSET(12) NUMBITS(1) [],
        WDRSTEN OFFSET(13) NUMBITS(1) [],
        WDRPROC OFFSET(14) NUMBITS(1) [],
        /// Write-once disable bit.
        WDDIS OFFSET(15) NUMBITS(1) [],
        WDD OFFSET(16) NUMBITS(12) [],
        WDDBGHLT OFFSET(28) NUMBITS(1) [],
        WDIDLEHLT OFFSET(29) NUMBITS(1) []
    ],
    pub SR [
        WDUNF OFFSET(0) NUMBITS(1) [],
        WDERR OFFSET(1) NUMBITS(1) []
    ],
];
