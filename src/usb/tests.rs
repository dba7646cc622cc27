use super::mock::MockBus;
use super::proto::{request, CONFIG_DESCRIPTOR, DEVICE_DESCRIPTOR, MANUFACTURER_STRING};
use super::*;

/// A stack that has seen its first bus reset (state `Default`).
fn stack() -> Stack<MockBus> {
    let mut stack = Stack::new(MockBus::new());
    assert_eq!(stack.state(), DeviceState::Powered);
    stack.handle(Event::BusReset);
    assert_eq!(stack.state(), DeviceState::Default);
    stack
}

fn setup_raw(request_type: u8, request: u8, value: u16, index: u16, length: u16) -> [u8; 8] {
    let v = value.to_le_bytes();
    let i = index.to_le_bytes();
    let l = length.to_le_bytes();
    [request_type, request, v[0], v[1], i[0], i[1], l[0], l[1]]
}

/// Run a control transfer to completion, pumping the EP0 completion
/// interrupt, and return the EP0 packets it produced.
fn drive_control(stack: &mut Stack<MockBus>, raw: [u8; 8]) -> Vec<Vec<u8>> {
    let start = stack.bus_mut().writes.len();
    stack.handle(Event::Setup(raw));
    loop {
        let written = stack.bus_mut().writes.len();
        if written == start {
            break; // stalled; nothing to pump
        }
        stack.handle(Event::InComplete { ep: 0 });
        if stack.bus_mut().writes.len() == written {
            break;
        }
    }
    stack.bus_mut().writes[start..]
        .iter()
        .filter(|(ep, _)| *ep == 0)
        .map(|(_, data)| data.clone())
        .collect()
}

fn addressed() -> Stack<MockBus> {
    let mut stack = stack();
    drive_control(&mut stack, setup_raw(0x00, request::SET_ADDRESS, 5, 0, 0));
    assert_eq!(stack.state(), DeviceState::Addressed);
    stack
}

fn configured() -> Stack<MockBus> {
    let mut stack = addressed();
    drive_control(&mut stack, setup_raw(0x00, request::SET_CONFIGURATION, 1, 0, 0));
    assert_eq!(stack.state(), DeviceState::Configured);
    stack
}

#[test]
fn enumeration_probe_returns_descriptor_head() {
    // Host behavior right after reset: read only the first 8 bytes.
    let mut stack = stack();
    let packets = drive_control(&mut stack, setup_raw(0x80, request::GET_DESCRIPTOR, 0x0100, 0, 8));
    assert_eq!(packets, vec![vec![0x12, 0x01, 0x00, 0x02, 0x02, 0x00, 0x00, 0x08]]);
}

#[test]
fn short_descriptor_has_no_trailing_zlp() {
    // 18 bytes is not a multiple of 8: data ends with a short packet,
    // which already tells the host the transfer is over.
    let mut stack = stack();
    let packets =
        drive_control(&mut stack, setup_raw(0x80, request::GET_DESCRIPTOR, 0x0100, 0, 256));
    let lens: Vec<usize> = packets.iter().map(Vec::len).collect();
    assert_eq!(lens, [8, 8, 2]);
    let all: Vec<u8> = packets.concat();
    assert_eq!(all, DEVICE_DESCRIPTOR);
}

#[test]
fn full_packet_aligned_descriptor_gets_a_zlp() {
    // 32 bytes divides evenly into EP0 packets, so a zero-length packet
    // must terminate the transfer.
    let mut stack = stack();
    let packets =
        drive_control(&mut stack, setup_raw(0x80, request::GET_DESCRIPTOR, 0x0200, 0, 256));
    let lens: Vec<usize> = packets.iter().map(Vec::len).collect();
    assert_eq!(lens, [8, 8, 8, 8, 0]);
    let all: Vec<u8> = packets.concat();
    assert_eq!(all, CONFIG_DESCRIPTOR);
}

#[test]
fn exact_length_request_gets_no_zlp() {
    // Transfer length equals wLength: the host expects no terminator.
    let mut stack = stack();
    let packets =
        drive_control(&mut stack, setup_raw(0x80, request::GET_DESCRIPTOR, 0x0200, 0, 32));
    let lens: Vec<usize> = packets.iter().map(Vec::len).collect();
    assert_eq!(lens, [8, 8, 8, 8]);
}

#[test]
fn string_descriptors_served_and_bounded() {
    let mut stack = stack();
    let packets =
        drive_control(&mut stack, setup_raw(0x80, request::GET_DESCRIPTOR, 0x0301, 0x0809, 255));
    assert_eq!(packets.concat(), MANUFACTURER_STRING);

    // Index past the table stalls rather than leaking junk.
    drive_control(&mut stack, setup_raw(0x80, request::GET_DESCRIPTOR, 0x0307, 0x0809, 255));
    assert_eq!(stack.bus_mut().stalls, 1);
}

#[test]
fn set_address_is_applied_only_after_the_status_stage() {
    let mut stack = stack();
    stack.handle(Event::Setup(setup_raw(0x00, request::SET_ADDRESS, 5, 0, 0)));
    // Acknowledged (ZLP written) but the hardware must still answer at
    // address 0 until that ZLP is acknowledged by the host.
    assert_eq!(stack.bus_mut().packets(0), vec![Vec::<u8>::new()]);
    assert_eq!(stack.bus_mut().address, Some(0));
    assert_eq!(stack.state(), DeviceState::Default);

    stack.handle(Event::InComplete { ep: 0 });
    assert_eq!(stack.bus_mut().address, Some(5));
    assert_eq!(stack.state(), DeviceState::Addressed);
}

#[test]
fn configuration_cycle_walks_the_state_machine() {
    let mut stack = configured();
    assert_eq!(stack.bus_mut().configured, Some(true));

    let packets =
        drive_control(&mut stack, setup_raw(0x80, request::GET_CONFIGURATION, 0, 0, 1));
    assert_eq!(packets, vec![vec![1]]);

    drive_control(&mut stack, setup_raw(0x00, request::SET_CONFIGURATION, 0, 0, 0));
    assert_eq!(stack.state(), DeviceState::Addressed);
    assert_eq!(stack.bus_mut().configured, Some(false));

    // Deconfigured: the host reads configuration 0.
    let packets =
        drive_control(&mut stack, setup_raw(0x80, request::GET_CONFIGURATION, 0, 0, 1));
    assert_eq!(packets, vec![vec![0]]);

    stack.handle(Event::BusReset);
    assert_eq!(stack.state(), DeviceState::Default);
}

#[test]
fn set_configuration_needs_an_address() {
    let mut stack = stack();
    drive_control(&mut stack, setup_raw(0x00, request::SET_CONFIGURATION, 1, 0, 0));
    assert_eq!(stack.bus_mut().stalls, 1);
    assert_eq!(stack.state(), DeviceState::Default);
}

#[test]
fn get_status_reports_self_powered() {
    let mut stack = stack();
    let packets = drive_control(&mut stack, setup_raw(0x80, request::GET_STATUS, 0, 0, 2));
    assert_eq!(packets, vec![vec![0x01, 0x00]]);
}

#[test]
fn feature_requests_are_acked_and_ignored() {
    let mut stack = stack();
    let packets = drive_control(&mut stack, setup_raw(0x00, request::CLEAR_FEATURE, 0, 0, 0));
    assert_eq!(packets, vec![Vec::<u8>::new()]);
    assert_eq!(stack.bus_mut().stalls, 0);
}

#[test]
fn unknown_requests_stall() {
    let mut stack = stack();
    drive_control(&mut stack, setup_raw(0x80, 0x20, 0, 0, 2));
    assert_eq!(stack.bus_mut().stalls, 1);
}

#[test]
fn bulk_out_double_buffer_and_overload() {
    let mut stack = configured();
    let first = vec![0x11; 10];
    let second = vec![0x22; 20];
    let third = vec![0x33; 30];

    stack.bus_mut().out_packets.push_back(first.clone());
    stack.handle(Event::Out { ep: 2 });
    assert_eq!(stack.has_data(), 10);
    assert_eq!(stack.get_buffer(), &first[..]);
    assert!(!stack.overloaded());

    // Second packet before the first is consumed: buffered aside, and
    // the overload flag tells the application it is behind.
    stack.bus_mut().out_packets.push_back(second.clone());
    stack.handle(Event::Out { ep: 2 });
    assert!(stack.overloaded());
    assert_eq!(stack.get_buffer(), &first[..]);

    // Third packet with both slots full: dropped on the floor.
    stack.bus_mut().out_packets.push_back(third);
    stack.handle(Event::Out { ep: 2 });
    assert_eq!(stack.get_buffer(), &first[..]);

    stack.flush_buffer();
    assert!(!stack.overloaded());
    assert_eq!(stack.get_buffer(), &second[..]);

    stack.flush_buffer();
    assert_eq!(stack.has_data(), 0);
}

#[test]
fn bulk_in_feeds_one_packet_at_a_time() {
    let mut stack = configured();
    let chunk = [0xAB; 64];

    assert!(stack.can_send());
    stack.feed_packet(&chunk).unwrap();
    assert!(!stack.can_send());
    assert!(matches!(stack.feed_packet(&chunk), Err(nb::Error::WouldBlock)));

    stack.handle(Event::InComplete { ep: 1 });
    assert!(stack.can_send());
    stack.feed_packet(&[1, 2, 3]).unwrap();

    assert_eq!(stack.bus_mut().packets(1).len(), 2);
    assert!(matches!(
        stack.feed_packet(&[0; 65]),
        Err(nb::Error::Other(Error::PacketTooLong))
    ));
}

#[test]
fn bus_reset_abandons_in_flight_send() {
    let mut stack = configured();
    stack.feed_packet(&[0xCD; 8]).unwrap();
    assert!(!stack.can_send());

    stack.handle(Event::BusReset);
    assert!(stack.can_send());
    assert_eq!(stack.state(), DeviceState::Default);
    assert!(stack.bus_mut().resets_armed >= 2);
}

#[test]
fn suspend_gates_sending() {
    let mut stack = configured();
    stack.handle(Event::Suspend);
    assert!(stack.suspended());
    assert!(!stack.can_send());
    stack.handle(Event::Resume);
    assert!(stack.can_send());
}
