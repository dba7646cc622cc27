//! USB 2.0 full-speed device stack.
//!
//! Everything protocol lives here, behind the [`UdpBus`] seam: the
//! enumeration state machine driven by EP0 control transfers, descriptor
//! staging in EP0-sized chunks with the short-transfer ZLP rule, a bulk
//! IN pipe fed packet by packet, and the double-buffered bulk OUT area
//! with its overload flag. The seam's target implementation over the UDP
//! peripheral is in [`bus`]; tests drive the same stack with a scripted
//! bus.
//!
//! The OUT path is single-producer/single-consumer without locks: the
//! interrupt side only ever fills the ISR slot (or the user slot when it
//! is empty), the application only reads the user slot, and
//! [`flush_buffer`] moves data between them from application context
//! with interrupts masked.
//!
//! [`flush_buffer`]: Stack::flush_buffer

pub mod bus;
pub mod proto;

use self::proto::{descriptor_type, request, Recipient, SetupPacket};
use self::proto::{BULK_MAX_PACKET, EP0_MAX_PACKET};

use crate::config;
use crate::utils::Holder;

/// Enumeration state of the device.
///
/// `Powered` is the pre-reset state; every bus reset lands in `Default`,
/// SET_ADDRESS moves to `Addressed`, SET_CONFIGURATION(1) to
/// `Configured` and SET_CONFIGURATION(0) back. Suspend is an orthogonal
/// flag, not a state.
#[derive(Copy, Clone, PartialEq, Eq, Debug, defmt::Format)]
pub enum DeviceState {
    Powered,
    Default,
    Addressed,
    Configured,
}

#[derive(Copy, Clone, PartialEq, Eq, Debug, defmt::Format)]
pub enum Error {
    /// Bulk packet longer than the endpoint's max packet size.
    PacketTooLong,
}

/// What the bus layer distilled one interrupt cause into.
#[derive(Copy, Clone, PartialEq, Eq, Debug, defmt::Format)]
pub enum Event {
    BusReset,
    Suspend,
    Resume,
    /// A SETUP packet arrived on EP0 (already acknowledged).
    Setup([u8; 8]),
    /// OUT data is waiting on `ep`; fetch it with `read_packet`.
    Out { ep: u8 },
    /// The host acknowledged an IN packet on `ep`.
    InComplete { ep: u8 },
}

/// Device-side view of the USB device port hardware.
///
/// One event per [`UdpBus::poll`] call; the implementation acknowledges
/// interrupt causes as it reports them. `read_packet` must release the
/// hardware bank it drained so the next packet can arrive.
pub trait UdpBus {
    fn poll(&mut self) -> Option<Event>;
    /// Re-arm endpoints and address 0 after a bus reset.
    fn enable_after_reset(&mut self);
    fn set_address(&mut self, address: u8);
    fn set_configured(&mut self, configured: bool);
    fn write_packet(&mut self, ep: u8, data: &[u8]);
    fn read_packet(&mut self, ep: u8, buf: &mut [u8]) -> usize;
    fn stall_ep0(&mut self);
    /// Disconnect the pull-up so the host sees a detach.
    fn detach(&mut self);
}

/// EP0 IN staging: descriptors are copied here and trickled out in
/// EP0-sized packets by the completion interrupt.
struct Ep0Transfer {
    buf: [u8; 64],
    len: usize,
    pos: usize,
    /// Send a zero-length packet after the last data packet (the
    /// transfer is shorter than the host asked for and ended full).
    zlp: bool,
}

struct RxSlot {
    data: [u8; BULK_MAX_PACKET],
    len: usize,
}

impl RxSlot {
    const fn empty() -> Self {
        Self { data: [0; BULK_MAX_PACKET], len: 0 }
    }
}

pub struct Stack<B: UdpBus> {
    bus: B,
    state: DeviceState,
    suspended: bool,
    config: u8,
    /// SET_ADDRESS value, programmed only after its status stage.
    pending_address: Option<u8>,
    ep0: Option<Ep0Transfer>,
    /// A bulk IN packet is sitting in the EP1 FIFO unacknowledged.
    tx_busy: bool,
    rx_user: RxSlot,
    rx_isr: RxSlot,
    overloaded: bool,
}

impl<B: UdpBus> Stack<B> {
    pub fn new(bus: B) -> Self {
        Self {
            bus,
            state: DeviceState::Powered,
            suspended: false,
            config: 0,
            pending_address: None,
            ep0: None,
            tx_busy: false,
            rx_user: RxSlot::empty(),
            rx_isr: RxSlot::empty(),
            overloaded: false,
        }
    }

    pub fn state(&self) -> DeviceState {
        self.state
    }

    pub fn suspended(&self) -> bool {
        self.suspended
    }

    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    /// Drain and handle every pending bus event. Interrupt body.
    pub fn poll(&mut self) {
        while let Some(event) = self.bus.poll() {
            self.handle(event);
        }
    }

    pub fn handle(&mut self, event: Event) {
        match event {
            Event::BusReset => {
                defmt::info!("usb: bus reset");
                self.state = DeviceState::Default;
                self.suspended = false;
                self.config = 0;
                self.pending_address = None;
                self.ep0 = None;
                // Any in-flight IN transfer is abandoned by the reset.
                self.tx_busy = false;
                self.bus.enable_after_reset();
            }
            Event::Suspend => self.suspended = true,
            Event::Resume => self.suspended = false,
            Event::Setup(raw) => self.handle_setup(SetupPacket::parse(&raw)),
            Event::Out { ep: 2 } => self.receive_bulk(),
            Event::Out { ep } => {
                // Control status stage (or noise): drain and drop.
                let mut scratch = [0u8; BULK_MAX_PACKET];
                self.bus.read_packet(ep, &mut scratch);
            }
            Event::InComplete { ep: 0 } => self.continue_ep0(),
            Event::InComplete { ep: 1 } => self.tx_busy = false,
            Event::InComplete { .. } => {}
        }
    }

    // ----- EP0 control pipe -----

    fn handle_setup(&mut self, setup: SetupPacket) {
        match setup.request {
            request::GET_STATUS => {
                let status: u16 = match setup.recipient() {
                    // Self-powered, no remote wakeup.
                    Recipient::Device => 0x0001,
                    _ => 0x0000,
                };
                self.start_ep0(&status.to_le_bytes(), setup.length);
            }
            request::CLEAR_FEATURE | request::SET_FEATURE | request::SET_INTERFACE => {
                // Accepted and ignored.
                self.ep0_ack();
            }
            request::SET_ADDRESS => {
                // The request is acknowledged at the old address; the
                // hardware address changes once the status stage is out.
                self.pending_address = Some((setup.value & 0x7f) as u8);
                self.ep0_ack();
            }
            request::GET_DESCRIPTOR => self.get_descriptor(setup),
            request::GET_CONFIGURATION => {
                let config = self.config;
                self.start_ep0(&[config], setup.length);
            }
            request::SET_CONFIGURATION => match (self.state, setup.value) {
                (DeviceState::Addressed | DeviceState::Configured, 0) => {
                    self.config = 0;
                    self.state = DeviceState::Addressed;
                    self.bus.set_configured(false);
                    self.ep0_ack();
                }
                (DeviceState::Addressed | DeviceState::Configured, 1) => {
                    defmt::info!("usb: configured");
                    self.config = 1;
                    self.state = DeviceState::Configured;
                    self.bus.set_configured(true);
                    self.ep0_ack();
                }
                _ => self.bus.stall_ep0(),
            },
            _ => self.bus.stall_ep0(),
        }
    }

    fn get_descriptor(&mut self, setup: SetupPacket) {
        let index = (setup.value & 0xff) as u8;
        let descriptor: Option<&[u8]> = match (setup.value >> 8) as u8 {
            descriptor_type::DEVICE => Some(&proto::DEVICE_DESCRIPTOR),
            descriptor_type::CONFIGURATION => Some(&proto::CONFIG_DESCRIPTOR),
            descriptor_type::STRING => match index {
                0 => Some(&proto::LANG_DESCRIPTOR),
                1 => Some(&proto::MANUFACTURER_STRING),
                2 => Some(&proto::PRODUCT_STRING),
                _ => None,
            },
            _ => None,
        };
        match descriptor {
            Some(bytes) => self.start_ep0(bytes, setup.length),
            None => self.bus.stall_ep0(),
        }
    }

    /// Zero-length status packet for requests without a data phase.
    fn ep0_ack(&mut self) {
        self.bus.write_packet(0, &[]);
    }

    /// Begin an EP0 IN transfer of `data` truncated to the host's
    /// `requested` length. A transfer that is shorter than requested and
    /// ends on a packet boundary gets a trailing zero-length packet so
    /// the host knows it is over.
    fn start_ep0(&mut self, data: &[u8], requested: u16) {
        let len = data.len().min(requested as usize);
        if len == 0 {
            // No data phase requested; just hand the host its status.
            self.ep0 = None;
            self.ep0_ack();
            return;
        }
        let mut transfer = Ep0Transfer {
            buf: [0; 64],
            len,
            pos: 0,
            zlp: len < requested as usize && len % EP0_MAX_PACKET == 0,
        };
        transfer.buf[..len].copy_from_slice(&data[..len]);
        self.ep0 = Some(transfer);
        self.feed_ep0();
    }

    /// Push the next EP0 packet into the FIFO, if anything remains.
    fn feed_ep0(&mut self) {
        let Some(transfer) = self.ep0.as_mut() else { return };
        let remaining = transfer.len - transfer.pos;
        if remaining > 0 {
            let n = remaining.min(EP0_MAX_PACKET);
            let chunk_start = transfer.pos;
            transfer.pos += n;
            let done = transfer.pos == transfer.len && !transfer.zlp;
            let packet: [u8; EP0_MAX_PACKET] = {
                let mut p = [0u8; EP0_MAX_PACKET];
                p[..n].copy_from_slice(&transfer.buf[chunk_start..chunk_start + n]);
                p
            };
            self.bus.write_packet(0, &packet[..n]);
            if done {
                self.ep0 = None;
            }
        } else if transfer.zlp {
            transfer.zlp = false;
            self.ep0 = None;
            self.bus.write_packet(0, &[]);
        } else {
            self.ep0 = None;
        }
    }

    /// EP0 IN completion: apply a deferred SET_ADDRESS, then keep the
    /// current transfer flowing.
    fn continue_ep0(&mut self) {
        if let Some(address) = self.pending_address.take() {
            self.bus.set_address(address);
            self.state = if address > 0 {
                DeviceState::Addressed
            } else {
                DeviceState::Default
            };
            defmt::info!("usb: address {=u8}", address);
            return;
        }
        self.feed_ep0();
    }

    // ----- bulk IN (EP1) -----

    /// EP1 is idle and the bus is awake: a packet fed now goes out with
    /// the next host IN token.
    pub fn can_send(&self) -> bool {
        !self.suspended && !self.tx_busy
    }

    /// Feed one bulk IN packet (at most 64 bytes). `WouldBlock` while
    /// the previous packet is unacknowledged; [`send`] loops this to
    /// chunk larger buffers.
    pub fn feed_packet(&mut self, chunk: &[u8]) -> nb::Result<(), Error> {
        if chunk.len() > BULK_MAX_PACKET {
            return Err(nb::Error::Other(Error::PacketTooLong));
        }
        if !self.can_send() {
            return Err(nb::Error::WouldBlock);
        }
        self.tx_busy = true;
        self.bus.write_packet(1, chunk);
        Ok(())
    }

    // ----- bulk OUT (EP2) -----

    /// ISR half of the double buffer: prefer the user slot when it is
    /// free, fall back to the ISR slot, and drop the packet (raising the
    /// overload flag) when both hold data. The flag is raised as soon as
    /// a packet arrives before the previous one was consumed, so the
    /// application can tell its ordering window was exceeded.
    fn receive_bulk(&mut self) {
        if self.rx_user.len == 0 {
            self.rx_user.len = self.bus.read_packet(2, &mut self.rx_user.data);
        } else if self.rx_isr.len == 0 {
            self.rx_isr.len = self.bus.read_packet(2, &mut self.rx_isr.data);
            self.overloaded = true;
        } else {
            let mut scratch = [0u8; BULK_MAX_PACKET];
            self.bus.read_packet(2, &mut scratch);
            self.overloaded = true;
            defmt::warn!("usb: bulk OUT packet dropped");
        }
    }

    /// Bytes waiting in the user slot.
    pub fn has_data(&self) -> usize {
        self.rx_user.len
    }

    /// The user slot's contents. Stable until [`Stack::flush_buffer`].
    pub fn get_buffer(&self) -> &[u8] {
        &self.rx_user.data[..self.rx_user.len]
    }

    /// A second packet arrived before the previous one was consumed (and
    /// any beyond the buffered pair were dropped).
    pub fn overloaded(&self) -> bool {
        self.overloaded
    }

    /// Consume the user slot: move the ISR slot's packet (if any) into
    /// it and clear the overload flag. Application context only; the
    /// global wrapper runs it with interrupts masked.
    pub fn flush_buffer(&mut self) {
        self.overloaded = false;
        self.rx_user.data = self.rx_isr.data;
        self.rx_user.len = self.rx_isr.len;
        self.rx_isr.len = 0;
    }
}

static STACK: Holder<Stack<bus::Udp>> = Holder::new();

/// Park the stack for interrupt and cross-task access. Called once by
/// the lifecycle component before the UDP interrupt is enabled.
pub fn init(stack: Stack<bus::Udp>) {
    STACK.init(stack);
}

/// UDP interrupt body.
pub extern "C" fn isr() {
    STACK.try_with(|stack| stack.poll());
}

pub fn can_send() -> bool {
    STACK.with(|stack| stack.can_send())
}

/// Send `data` over the bulk IN pipe, blocking until the previous send
/// has finished and every chunk of this one is fed. Packets go out in
/// submission order.
pub fn send(data: &[u8]) {
    for chunk in data.chunks(proto::BULK_MAX_PACKET) {
        loop {
            match STACK.with(|stack| stack.feed_packet(chunk)) {
                Ok(()) => break,
                Err(nb::Error::WouldBlock) => core::hint::spin_loop(),
                Err(nb::Error::Other(_)) => unreachable!("chunks are bounded"),
            }
        }
    }
}

pub fn has_data() -> usize {
    STACK.with(|stack| stack.has_data())
}

/// Copy the user slot into `buf`; returns the byte count. (The C-era
/// API handed out a raw pointer here; a copy keeps the slot's stability
/// guarantee without aliasing the ISR.)
pub fn read_buffer(buf: &mut [u8]) -> usize {
    STACK.with(|stack| {
        let data = stack.get_buffer();
        let n = data.len().min(buf.len());
        buf[..n].copy_from_slice(&data[..n]);
        n
    })
}

pub fn overloaded() -> bool {
    STACK.with(|stack| stack.overloaded())
}

pub fn flush_buffer() {
    STACK.with(|stack| stack.flush_buffer());
}

/// Disconnect from the bus (shutdown path).
pub fn disable() {
    STACK.with(|stack| stack.bus_mut().detach());
    crate::systick::wait_ms(config::USB_DETACH_MS);
}

#[cfg(test)]
pub(crate) mod mock;

#[cfg(test)]
mod tests;
