//! Periodic interval timer register map.
//!
//! Clocked at MCK/16; interrupts on the shared system-controller line.

use tock_registers::registers::{ReadOnly, ReadWrite};
use tock_registers::{register_bitfields, register_structs};

register_structs! {
    pub PitRegisters {
        (0x00 => pub mr: ReadWrite<u32, MR::Register>),
        (0x04 => pub sr: ReadOnly<u32, SR::Register>),
        /// Reading acknowledges the interrupt and returns elapsed periods.
        (0x08 => pub pivr: ReadOnly<u32, VALUE::Register>),
        /// Like PIVR but without acknowledging.
        (0x0c => pub piir: ReadOnly<u32, VALUE::Register>),
        (0x10 => @END),
    }
}

register_bitfields![u32,
    pub MR [
        /// Period in MCK/16 ticks, minus one.
        PIV OFFSET(0) NUMBITS(20) [],
        PITEN OFFSET(24) NUMBITS(1) [],
        PITIEN OFFSET(25) NUMBITS(1) []
    ],
    pub SR [
        PITS OFFSET(0) NUMBITS(1) []
    ],
    pub VALUE [
        CPIV OFFSET(0) NUMBITS(20) [],
        /// Periods elapsed since the last PIVR read.
        PICNT OFFSET(20) NUMBITS(12) []
    ],
];
