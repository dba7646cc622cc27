//! Scripted [`UdpBus`] for driving the stack from tests.

use std::collections::VecDeque;
use std::vec::Vec;

use super::{Event, UdpBus};

#[derive(Default)]
pub struct MockBus {
    pub events: VecDeque<Event>,
    /// Every packet the stack pushed, as (endpoint, bytes).
    pub writes: Vec<(u8, Vec<u8>)>,
    /// Packets served to `read_packet`, oldest first.
    pub out_packets: VecDeque<Vec<u8>>,
    pub address: Option<u8>,
    pub configured: Option<bool>,
    pub stalls: u32,
    pub resets_armed: u32,
    pub detached: bool,
}

impl MockBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Packets written to `ep` so far.
    pub fn packets(&self, ep: u8) -> Vec<Vec<u8>> {
        self.writes
            .iter()
            .filter(|(e, _)| *e == ep)
            .map(|(_, data)| data.clone())
            .collect()
    }
}

impl UdpBus for MockBus {
    fn poll(&mut self) -> Option<Event> {
        self.events.pop_front()
    }

    fn enable_after_reset(&mut self) {
        self.resets_armed += 1;
        self.address = Some(0);
    }

    fn set_address(&mut self, address: u8) {
        self.address = Some(address);
    }

    fn set_configured(&mut self, configured: bool) {
        self.configured = Some(configured);
    }

    fn write_packet(&mut self, ep: u8, data: &[u8]) {
        self.writes.push((ep, data.to_vec()));
    }

    fn read_packet(&mut self, _ep: u8, buf: &mut [u8]) -> usize {
        match self.out_packets.pop_front() {
            Some(packet) => {
                let n = packet.len().min(buf.len());
                buf[..n].copy_from_slice(&packet[..n]);
                n
            }
            None => 0,
        }
    }

    fn stall_ep0(&mut self) {
        self.stalls += 1;
    }

    fn detach(&mut self) {
        self.detached = true;
    }
}
