//! Reset controller register map.

use tock_registers::registers::{ReadOnly, ReadWrite, WriteOnly};
use tock_registers::{register_bitfields, register_structs};

/// Key that must accompany any RSTC_CR/RSTC_MR write.
pub const KEY: u32 = 0xA5;

register_structs! {
    pub RstcRegisters {
        (0x00 => pub cr: WriteOnly<u32, CR::Register>),
        (0x04 => pub sr: ReadOnly<u32, SR::Register>),
        (0x08 => pub mr: ReadWrite<u32, MR::Register>),
        (0x0c => @END),
    }
}

register_bitfields![u32,
    pub CR [
        PROCRST OFFSET(0) NUMBITS(1) [],
        PERRST OFFSET(2) NUMBITS(1) [],
        EXTRST OFFSET(3) NUMBITS(1) [],
        KEY OFFSET(24) NUMBITS(8) []
    ],
    pub SR [
        URSTS OFFSET(0) NUMBITS(1) [],
        BODSTS OFFSET(1) NUMBITS(1) [],
        /// Cause of the last reset.
        RSTTYP OFFSET(8) NUMBITS(3) [
            PowerUp = 0,
            WakeUp = 1,
            Watchdog = 2,
            Software = 3,
            User = 4,
            Brownout = 5
        ],
        NRSTL OFFSET(16) NUMBITS(1) [],
        SRCMP OFFSET(17) NUMBITS(1) []
    ],
    pub MR [
        URSTEN OFFSET(0) NUMBITS(1) [],
        URSTIEN OFFSET(4) NUMBITS(1) [],
        ERSTL OFFSET(8) NUMBITS(4) [],
        BODIEN OFFSET(16) NUMBITS(1) [],
        KEY OFFSET(24) NUMBITS(8) []
    ],
];
