//! AVR coprocessor link.
//!
//! A second microcontroller owns motor PWM, button sensing, battery
//! measurement and analog sensor sampling. The main CPU talks to it over
//! the hardware TWI at 1 kHz: one outbound frame and one inbound frame
//! per two-tick round, paced by the millisecond tick.
//!
//! Reliability is all protocol: the outbound frame carries a parity
//! byte, the inbound frame a 16-bit checksum, and the link state machine
//! only trusts the AVR after two consecutive valid frames (and distrusts
//! it again after 32 consecutive lost ones). Motor commands and
//! power-down requests issued while the link is down are buffered and
//! delivered once it is up; a bad frame never reaches readers, which
//! always see the last good snapshot.

pub mod frame;
pub mod twi;

use portable_atomic::{AtomicBool, Ordering};
use smlang::statemachine;

use crate::config;
use crate::sync::SeqCell;
use crate::utils::Holder;
use crate::{Motor, Port};

pub use self::frame::{Command, Inbound, MotorCommand, Outbound};

/// Sensor supply switch pushed to the AVR per port.
#[derive(Copy, Clone, PartialEq, Eq, Debug, defmt::Format)]
pub enum InputPower {
    Off,
    Active,
}

bitflags::bitflags! {
    /// Face buttons as reported in the inbound frame's bitmap.
    #[derive(Copy, Clone, PartialEq, Eq, Debug)]
    pub struct Buttons: u16 {
        const ENTER = 1 << 0;
        const LEFT = 1 << 1;
        const RIGHT = 1 << 2;
        const CANCEL = 1 << 3;
    }
}

/// Link error counters.
#[derive(Clone, Default, PartialEq, Eq, Debug, defmt::Format)]
pub struct Stats {
    pub frames_ok: u32,
    pub checksum_errors: u32,
    pub transport_errors: u32,
    /// Operations that had not finished when their slot ended.
    pub overruns: u32,
}

/// Completion state of the transport's in-flight operation.
#[derive(Copy, Clone, PartialEq, Eq, Debug, defmt::Format)]
pub enum TransportStatus {
    Busy,
    Done,
    Failed,
}

/// Asynchronous byte transport to the coprocessor (the hardware TWI on
/// target, a scripted stand-in in tests). Starting a new operation while
/// one is stalled must abandon the stalled one.
pub trait Transport {
    fn start_write(&mut self, address: u8, data: &[u8]);
    fn start_read(&mut self, address: u8, len: usize);
    fn status(&mut self) -> TransportStatus;
    /// Copy out the result of a completed read; returns the byte count.
    fn read_data(&mut self, buf: &mut [u8]) -> usize;
}

statemachine! {
    transitions: {
        *Init + FrameOk [enough_good] / on_link_up = Running,
        Init + FrameBad / on_bad_while_down = Init,
        Running + FrameOk / on_good_while_up = Running,
        Running + FrameBad [enough_bad] / on_link_down = Init,
    }
}

/// Counts consecutive outcomes; the guards double as the counters so a
/// single event drive point keeps them consistent.
pub struct Context {
    good: u32,
    bad: u32,
}

impl StateMachineContext for Context {
    fn enough_good(&mut self) -> Result<(), ()> {
        self.good += 1;
        if self.good >= config::AVR_LINK_UP_FRAMES {
            Ok(())
        } else {
            Err(())
        }
    }

    fn enough_bad(&mut self) -> Result<(), ()> {
        self.bad += 1;
        if self.bad >= config::AVR_LINK_DOWN_FRAMES {
            Ok(())
        } else {
            Err(())
        }
    }

    fn on_link_up(&mut self) {
        defmt::info!("avr: link up");
        self.good = 0;
        self.bad = 0;
    }

    fn on_link_down(&mut self) {
        defmt::warn!("avr: link lost, re-initializing");
        self.good = 0;
        self.bad = 0;
    }

    fn on_bad_while_down(&mut self) {
        // Valid frames must be consecutive to bring the link up.
        self.good = 0;
    }

    fn on_good_while_up(&mut self) {
        // Lost frames must be consecutive to drop the link.
        self.bad = 0;
    }
}

#[derive(Copy, Clone, PartialEq, Eq)]
enum Phase {
    Write,
    Read,
}

/// The conversation driver. Owned by the lifecycle component via the
/// module holder; constructed bare in tests.
pub struct Link<T> {
    twi: T,
    fsm: StateMachine<Context>,
    phase: Phase,
    outbound: Outbound,
    power_off: bool,
    reset_requested: bool,
    expect_read: bool,
    stats: Stats,
}

impl<T: Transport> Link<T> {
    pub fn new(twi: T) -> Self {
        Self {
            twi,
            fsm: StateMachine::new(Context { good: 0, bad: 0 }),
            phase: Phase::Write,
            outbound: Outbound::default(),
            power_off: false,
            reset_requested: false,
            expect_read: false,
            stats: Stats::default(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.fsm.state() == &States::Running
    }

    pub fn stats(&self) -> Stats {
        self.stats.clone()
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.twi
    }

    pub fn set_motor(&mut self, motor: Motor, speed: i8, brake: bool) {
        self.outbound.motors[motor as usize] =
            MotorCommand { speed: speed.clamp(-100, 100), brake };
    }

    pub fn set_input_power(&mut self, port: Port, power: InputPower) {
        let bit = 1 << port.index();
        match power {
            InputPower::Active => self.outbound.input_power |= bit,
            InputPower::Off => self.outbound.input_power &= !bit,
        }
    }

    /// Request brick power-off. Best effort: the command goes out with
    /// every frame once the link is up, and the AVR cuts power roughly a
    /// second after accepting it.
    pub fn power_down(&mut self) {
        self.power_off = true;
    }

    /// Ask the AVR to reset itself once (the link will drop and re-form).
    pub fn request_reset(&mut self) {
        self.reset_requested = true;
    }

    /// One millisecond of conversation. Returns a newly decoded inbound
    /// frame when one arrived this tick.
    pub fn tick(&mut self) -> Option<Inbound> {
        match self.phase {
            Phase::Write => {
                let harvested = self.harvest_read();
                let out = self.compose().encode();
                self.twi.start_write(config::AVR_ADDRESS, &out);
                self.phase = Phase::Read;
                harvested
            }
            Phase::Read => {
                match self.twi.status() {
                    TransportStatus::Done => {}
                    TransportStatus::Failed => {
                        self.stats.transport_errors = self.stats.transport_errors.saturating_add(1);
                        self.frame_bad();
                    }
                    TransportStatus::Busy => {
                        self.stats.overruns = self.stats.overruns.saturating_add(1);
                        self.frame_bad();
                    }
                }
                self.twi.start_read(config::AVR_ADDRESS, frame::IN_LEN);
                self.expect_read = true;
                self.phase = Phase::Write;
                None
            }
        }
    }

    fn harvest_read(&mut self) -> Option<Inbound> {
        if !self.expect_read {
            return None;
        }
        self.expect_read = false;
        match self.twi.status() {
            TransportStatus::Done => {
                let mut raw = [0u8; frame::IN_LEN];
                if self.twi.read_data(&mut raw) != frame::IN_LEN {
                    self.stats.transport_errors = self.stats.transport_errors.saturating_add(1);
                    self.frame_bad();
                    return None;
                }
                match Inbound::decode(&raw) {
                    Ok(decoded) => {
                        self.stats.frames_ok = self.stats.frames_ok.saturating_add(1);
                        self.fsm.process_event(Events::FrameOk).ok();
                        Some(decoded)
                    }
                    Err(_) => {
                        self.stats.checksum_errors = self.stats.checksum_errors.saturating_add(1);
                        self.frame_bad();
                        None
                    }
                }
            }
            TransportStatus::Failed => {
                self.stats.transport_errors = self.stats.transport_errors.saturating_add(1);
                self.frame_bad();
                None
            }
            TransportStatus::Busy => {
                self.stats.overruns = self.stats.overruns.saturating_add(1);
                self.frame_bad();
                None
            }
        }
    }

    fn frame_bad(&mut self) {
        self.fsm.process_event(Events::FrameBad).ok();
    }

    /// Frame to put on the wire this round. Until the link is up the
    /// conversation carries a neutral frame; buffered commands are
    /// released the moment it is.
    fn compose(&mut self) -> Outbound {
        if !self.is_running() {
            return Outbound::default();
        }
        let mut out = self.outbound;
        out.command = if self.power_off {
            Command::PowerOff
        } else if self.reset_requested {
            self.reset_requested = false;
            Command::Reset
        } else {
            Command::Run
        };
        out
    }
}

/// Transport type the global link runs on.
pub type TargetLink = Link<twi::Twi>;

static LINK: Holder<TargetLink> = Holder::new();
static SNAPSHOT: SeqCell<Inbound> = SeqCell::new(Inbound::ZERO);
static LINK_UP: AtomicBool = AtomicBool::new(false);

/// Park the link for tick and cross-task access. Called once by the
/// lifecycle component before the tick interrupt is enabled.
pub fn init(link: TargetLink) {
    LINK.init(link);
}

/// Millisecond-tick body: advance the conversation and publish any new
/// frame for lock-free readers.
pub(crate) fn isr_tick() {
    LINK.try_with(|link| {
        if let Some(decoded) = link.tick() {
            SNAPSHOT.write(decoded);
        }
        LINK_UP.store(link.is_running(), Ordering::Relaxed);
    });
}

/// Hardware TWI interrupt body.
pub extern "C" fn twi_isr() {
    LINK.try_with(|link| link.transport_mut().isr());
}

pub fn set_motor(motor: Motor, speed: i8, brake: bool) {
    LINK.with(|link| link.set_motor(motor, speed, brake));
}

pub fn set_input_power(port: Port, power: InputPower) {
    LINK.with(|link| link.set_input_power(port, power));
}

pub fn power_down() {
    LINK.with(|link| link.power_down());
}

pub fn request_reset() {
    LINK.with(|link| link.request_reset());
}

/// The link has seen two consecutive valid frames and is delivering
/// commands.
pub fn running() -> bool {
    LINK_UP.load(Ordering::Relaxed)
}

pub fn get_button() -> Buttons {
    Buttons::from_bits_truncate(SNAPSHOT.read().buttons)
}

pub fn get_battery_mv() -> u16 {
    SNAPSHOT.read().battery_mv
}

pub fn get_sensor_raw(port: Port) -> u16 {
    SNAPSHOT.read().sensors[port.index()]
}

pub fn get_version() -> (u8, u8) {
    SNAPSHOT.read().version
}

pub fn stats() -> Stats {
    LINK.with(|link| link.stats())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::vec::Vec;

    struct MockAvr {
        sent: Vec<[u8; frame::OUT_LEN]>,
        inbound: VecDeque<[u8; frame::IN_LEN]>,
        op: Op,
    }

    enum Op {
        None,
        Write,
        Read(Option<[u8; frame::IN_LEN]>),
    }

    impl MockAvr {
        fn new() -> Self {
            Self { sent: Vec::new(), inbound: VecDeque::new(), op: Op::None }
        }

        fn feed(&mut self, frame: Inbound, count: usize) {
            for _ in 0..count {
                self.inbound.push_back(frame.encode());
            }
        }
    }

    impl Transport for MockAvr {
        fn start_write(&mut self, address: u8, data: &[u8]) {
            assert_eq!(address, config::AVR_ADDRESS);
            let mut frame = [0u8; frame::OUT_LEN];
            frame.copy_from_slice(data);
            self.sent.push(frame);
            self.op = Op::Write;
        }

        fn start_read(&mut self, address: u8, len: usize) {
            assert_eq!(address, config::AVR_ADDRESS);
            assert_eq!(len, frame::IN_LEN);
            self.op = Op::Read(self.inbound.pop_front());
        }

        fn status(&mut self) -> TransportStatus {
            match self.op {
                Op::None | Op::Write => TransportStatus::Done,
                Op::Read(Some(_)) => TransportStatus::Done,
                // No frame scripted: the AVR stayed silent.
                Op::Read(None) => TransportStatus::Failed,
            }
        }

        fn read_data(&mut self, buf: &mut [u8]) -> usize {
            match self.op {
                Op::Read(Some(data)) => {
                    buf[..data.len()].copy_from_slice(&data);
                    data.len()
                }
                _ => 0,
            }
        }
    }

    fn test_frame() -> Inbound {
        Inbound {
            buttons: 0x0001,
            battery_mv: 7400,
            sensors: [100, 200, 300, 400],
            timer: 42,
            version: (1, 3),
        }
    }

    /// Run full conversation rounds (two ticks each), collecting decoded
    /// frames.
    fn rounds(link: &mut Link<MockAvr>, n: usize) -> Vec<Inbound> {
        let mut out = Vec::new();
        for _ in 0..2 * n {
            out.extend(link.tick());
        }
        out
    }

    fn linked() -> Link<MockAvr> {
        let mut link = Link::new(MockAvr::new());
        link.transport_mut().feed(test_frame(), 2);
        // An extra round so the second frame's harvest happens.
        rounds(&mut link, 3);
        assert!(link.is_running());
        link
    }

    #[test]
    fn two_consecutive_valid_frames_bring_the_link_up() {
        let mut link = Link::new(MockAvr::new());
        link.transport_mut().feed(test_frame(), 2);

        // First round only starts the conversation; after harvesting one
        // valid frame the link must still be down.
        rounds(&mut link, 2);
        assert!(!link.is_running());
        rounds(&mut link, 1);
        assert!(link.is_running());
    }

    #[test]
    fn decoded_frames_surface_to_readers() {
        let mut link = Link::new(MockAvr::new());
        link.transport_mut().feed(test_frame(), 3);
        let seen = rounds(&mut link, 4);
        assert!(!seen.is_empty());
        assert_eq!(seen.last().unwrap(), &test_frame());
        assert_eq!(link.stats().frames_ok, 3);
    }

    #[test]
    fn corrupt_frame_is_dropped_and_counted() {
        let mut link = linked();
        let mut raw = test_frame().encode();
        raw[3] ^= 0x80;
        link.transport_mut().inbound.push_back(raw);

        let seen = rounds(&mut link, 2);
        assert!(seen.is_empty());
        assert_eq!(link.stats().checksum_errors, 1);
        // One bad frame is nowhere near enough to drop the link.
        assert!(link.is_running());
    }

    #[test]
    fn thirty_two_lost_frames_drop_the_link_and_two_good_restore_it() {
        let mut link = linked();

        // Silent AVR: every round fails its read.
        rounds(&mut link, 31);
        assert!(link.is_running());
        rounds(&mut link, 1);
        assert!(!link.is_running());

        // First valid frame after the drop must NOT bring the link up.
        link.transport_mut().feed(test_frame(), 2);
        rounds(&mut link, 2);
        assert!(!link.is_running());
        rounds(&mut link, 1);
        assert!(link.is_running());
    }

    #[test]
    fn neutral_frames_until_running_then_buffered_commands_flow() {
        let mut link = Link::new(MockAvr::new());
        link.set_motor(Motor::A, 80, false);
        link.power_down();
        link.transport_mut().feed(test_frame(), 8);

        rounds(&mut link, 2); // still Init for the first harvest
        for sent in &link.transport_mut().sent {
            assert_eq!(sent, &Outbound::default().encode());
        }

        rounds(&mut link, 2);
        assert!(link.is_running());
        link.transport_mut().sent.clear();
        rounds(&mut link, 1);
        let sent = *link.transport_mut().sent.last().unwrap();
        assert_eq!(sent[0], Command::PowerOff as u8);
        assert_eq!(sent[1], 80);
        assert_eq!(frame::parity(&sent), 0);
    }

    #[test]
    fn motor_sequence_produces_distinct_valid_frames() {
        let mut link = linked();
        link.transport_mut().feed(test_frame(), 8);

        let mut observed = Vec::new();
        for &(speed, brake) in &[(80i8, false), (-80, false), (0, true)] {
            link.set_motor(Motor::A, speed, brake);
            link.transport_mut().sent.clear();
            rounds(&mut link, 1);
            let sent = *link.transport_mut().sent.last().unwrap();
            assert_eq!(sent[1], speed as u8);
            assert_eq!(sent[4] & 1 != 0, brake);
            assert_eq!(frame::parity(&sent), 0);
            observed.push(sent);
        }
        observed.dedup();
        assert_eq!(observed.len(), 3);
    }

    #[test]
    fn input_power_mask_tracks_ports() {
        let mut link = linked();
        link.transport_mut().feed(test_frame(), 4);
        link.set_input_power(Port::S1, InputPower::Active);
        link.set_input_power(Port::S4, InputPower::Active);
        link.transport_mut().sent.clear();
        rounds(&mut link, 1);
        assert_eq!(link.transport_mut().sent.last().unwrap()[5], 0b1001);

        link.set_input_power(Port::S1, InputPower::Off);
        link.transport_mut().sent.clear();
        rounds(&mut link, 1);
        assert_eq!(link.transport_mut().sent.last().unwrap()[5], 0b1000);
    }
}
