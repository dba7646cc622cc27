//! Compile-time configuration.
//!
//! Everything here is a plain constant: the baseplate has no runtime
//! configuration store, and keeping the knobs in one module makes the
//! timing relationships between subsystems visible at a glance.

/// Frequency of the periodic system tick. Every driver below assumes
/// 1 kHz; changing it requires revisiting the AVR link pacing and the
/// task-switch resolution.
pub const TICK_HZ: u32 = 1000;

/// Nominal rate of the soft-I²C sub-tick. The sub-scheduler owns no
/// timer: every 1 ms tick dispatches [`I2C_SUBTICKS_PER_TICK`] protocol
/// edges. One bus bit takes two sub-ticks, so this yields a bus clock
/// just under 11 kHz and roughly 9.6 kHz effective once start, stop and
/// ack overhead is counted.
pub const I2C_SUBTICK_HZ: u32 = 22_000;

/// Soft-I²C state transitions run per millisecond tick.
pub const I2C_SUBTICKS_PER_TICK: u32 = I2C_SUBTICK_HZ / TICK_HZ;

/// Sub-ticks a slave may hold SDA low before the transaction is failed
/// with a bus-stuck error (about 10 ms).
pub const I2C_STUCK_TIMEOUT: u32 = 220;

/// Longest transfer accepted by a single I²C transaction.
pub const I2C_MAX_DATA_LEN: usize = 16;

/// Extra hold applied between the repeated start and the read address
/// phase when a port is registered with legacy compatibility, expressed
/// in sub-ticks. The original LEGO ultrasonic sensor needs at least
/// 100 µs of wall time here; since a tick's worth of sub-ticks runs as
/// one batch, the hold must span a tick boundary to guarantee that, so
/// it is sized at a full tick plus slack.
pub const I2C_LEGACY_HOLD: u32 = I2C_SUBTICKS_PER_TICK + 2;

/// TWI address of the AVR coprocessor.
pub const AVR_ADDRESS: u8 = 0x01;

/// Consecutive valid inbound frames required to consider the AVR link up.
pub const AVR_LINK_UP_FRAMES: u32 = 2;

/// Consecutive lost/invalid frames after which a running link is dropped
/// back to its initialization state.
pub const AVR_LINK_DOWN_FRAMES: u32 = 32;

/// Ticks between task switch evaluations: a task runs for at most this
/// many milliseconds before the scheduler rotates the ring.
pub const TASK_SWITCH_RESOLUTION: u32 = 10;

/// Default task stack size in bytes.
pub const TASK_STACK_SIZE: usize = 1024;

/// Upper bound on registered tasks (including the idle task).
pub const MAX_TASKS: usize = 8;

/// Post-init settle delay before the application entry point runs.
pub const BOOT_SETTLE_MS: u32 = 100;

/// Time the USB pull-up is held off during [`crate::usb`] re-init so the
/// host reliably sees a detach.
pub const USB_DETACH_MS: u32 = 200;
