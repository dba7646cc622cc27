//! Parallel I/O controller register map.
//!
//! All registers are 32-bit pin masks; the set/clear register pairs make
//! every pin operation a single atomic store, which is what lets the
//! soft-I²C engine and the sensor mux share the controller without
//! read-modify-write races.

use tock_registers::registers::{ReadOnly, WriteOnly};
use tock_registers::register_structs;

register_structs! {
    pub PioRegisters {
        /// PIO enable (give the pin to the PIO, not the peripheral mux).
        (0x00 => pub per: WriteOnly<u32>),
        /// PIO disable (hand the pin to a peripheral function).
        (0x04 => pub pdr: WriteOnly<u32>),
        (0x08 => pub psr: ReadOnly<u32>),
        (0x0c => _reserved0),
        /// Output enable.
        (0x10 => pub oer: WriteOnly<u32>),
        /// Output disable (pin becomes input).
        (0x14 => pub odr: WriteOnly<u32>),
        (0x18 => pub osr: ReadOnly<u32>),
        (0x1c => _reserved1),
        (0x20 => pub ifer: WriteOnly<u32>),
        (0x24 => pub ifdr: WriteOnly<u32>),
        (0x28 => pub ifsr: ReadOnly<u32>),
        (0x2c => _reserved2),
        /// Set output data (drive high / release when in multi-drive).
        (0x30 => pub sodr: WriteOnly<u32>),
        /// Clear output data (drive low).
        (0x34 => pub codr: WriteOnly<u32>),
        (0x38 => pub odsr: ReadOnly<u32>),
        /// Pin data status: actual line levels.
        (0x3c => pub pdsr: ReadOnly<u32>),
        (0x40 => pub ier: WriteOnly<u32>),
        (0x44 => pub idr: WriteOnly<u32>),
        (0x48 => pub imr: ReadOnly<u32>),
        (0x4c => pub isr: ReadOnly<u32>),
        /// Multi-drive enable (open-drain output).
        (0x50 => pub mder: WriteOnly<u32>),
        (0x54 => pub mddr: WriteOnly<u32>),
        (0x58 => pub mdsr: ReadOnly<u32>),
        (0x5c => _reserved3),
        /// Pull-up disable.
        (0x60 => pub ppudr: WriteOnly<u32>),
        /// Pull-up enable.
        (0x64 => pub ppuer: WriteOnly<u32>),
        (0x68 => pub ppusr: ReadOnly<u32>),
        (0x6c => _reserved4),
        (0x70 => pub asr: WriteOnly<u32>),
        (0x74 => pub bsr: WriteOnly<u32>),
        (0x78 => pub absr: ReadOnly<u32>),
        (0x7c => _reserved5),
        (0xa0 => pub ower: WriteOnly<u32>),
        (0xa4 => pub owdr: WriteOnly<u32>),
        (0xa8 => pub owsr: ReadOnly<u32>),
        (0xac => @END),
    }
}

// MMIO register block: all access is through a `&'static` reference
// guarded by a critical section, never concurrently from more than one
// execution context at a time, so `Sync` is sound even though the
// generated fields use `UnsafeCell`.
unsafe impl Sync for PioRegisters {}
