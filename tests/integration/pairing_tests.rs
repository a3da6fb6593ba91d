//! Startup and pairing scenarios.

use beacon_otap::app::ports::{NodeRole, TxSettings};
use beacon_otap::app::service::{BootOutcome, Node};
use beacon_otap::config::LinkConfig;
use beacon_otap::fsm::node::NodeState;
use beacon_otap::link::frame::{Frame, Message, Platform, ScanRequest, ScanResponse};
use beacon_otap::link::states::LinkState;

use super::mock_hw::{MockPlatform, RadioCall, UNIQUE_ID, android_packet};

fn scan_request(id: u16) -> Vec<u8> {
    android_packet(&Frame::new(
        id,
        Message::ScanRequest(ScanRequest {
            app_version: 3,
            platform: Platform::Android,
        }),
    ))
}

fn started(mut hw: MockPlatform) -> (Node, MockPlatform) {
    let mut node = Node::new(LinkConfig::default(), &hw).unwrap();
    assert_eq!(node.boot(&mut hw), Ok(BootOutcome::Started));
    hw.run_for(&mut node, 1500);
    (node, hw)
}

#[test]
fn sink_boots_into_scanning() {
    let (node, hw) = started(MockPlatform::sink());

    assert_eq!(node.state(), NodeState::Idle);
    assert_eq!(node.link().state(), LinkState::Scanning);
    assert_eq!(
        hw.stack_config,
        Some((NodeRole::Sink, UNIQUE_ID, 0x00AB_CDEF, 2))
    );
    assert!(hw.stack_running);
    assert_eq!(
        hw.radio[..2],
        [
            RadioCall::RegisterReceiver([0x13, 0x78, 0x56, 0x34, 0x12, 0x14]),
            RadioCall::StartScanner,
        ]
    );
}

#[test]
fn router_never_starts_scanner() {
    let (node, hw) = started(MockPlatform::new());

    assert_eq!(node.link().state(), LinkState::Idle);
    assert_eq!(hw.count(&RadioCall::StartScanner), 0);
    assert_eq!(hw.stack_config.map(|c| c.0), Some(NodeRole::Router));
}

#[test]
fn nothing_happens_before_the_init_delay() {
    let mut hw = MockPlatform::sink();
    let mut node = Node::new(LinkConfig::default(), &hw).unwrap();
    node.boot(&mut hw).unwrap();
    hw.run_for(&mut node, 499);

    assert_eq!(node.state(), NodeState::Boot);
    assert!(hw.radio.is_empty());
}

#[test]
fn heartbeat_keeps_running() {
    let (mut node, mut hw) = started(MockPlatform::sink());
    hw.run_for(&mut node, 20_000);
    assert!(node.heartbeats() >= 3);
}

#[test]
fn scan_request_is_answered_with_token() {
    let (mut node, mut hw) = started(MockPlatform::sink());

    node.on_beacon_received(&scan_request(7), &mut hw);
    hw.run_for(&mut node, 10);

    assert_eq!(
        hw.sent_messages(),
        vec![Message::ScanResponse(ScanResponse {
            request_id: 7,
            token: 0x5678,
            firmware_major: 1,
            firmware_minor: 0,
            is_sink: true,
        })]
    );
    let configured = hw.radio.iter().find_map(|c| match c {
        RadioCall::Configure(s) => Some(*s),
        _ => None,
    });
    assert_eq!(
        configured,
        Some(TxSettings {
            interval_ms: 100,
            power_dbm: 8,
        })
    );
    assert_eq!(hw.count(&RadioCall::Enable(true)), 1);
}

#[test]
fn connecting_keeps_the_scanner_on() {
    let (mut node, mut hw) = started(MockPlatform::sink());
    node.on_beacon_received(&scan_request(7), &mut hw);
    hw.run_for(&mut node, 1000);

    assert_eq!(node.link().state(), LinkState::Connecting);
    assert_eq!(hw.count(&RadioCall::StopScanner), 0);
    assert_eq!(hw.count(&RadioCall::StartScanner), 1);
}

#[test]
fn repeated_advertisement_is_processed_once() {
    let (mut node, mut hw) = started(MockPlatform::sink());
    let packet = scan_request(9);

    node.on_beacon_received(&packet, &mut hw);
    node.on_beacon_received(&packet, &mut hw);
    assert_eq!(node.link().queued_frames(), 1);
}

#[test]
fn packets_before_link_init_are_ignored() {
    let mut hw = MockPlatform::sink();
    let mut node = Node::new(LinkConfig::default(), &hw).unwrap();
    node.boot(&mut hw).unwrap();

    node.on_beacon_received(&scan_request(3), &mut hw);
    assert_eq!(node.link().queued_frames(), 0);
}

#[test]
fn foreign_advertisements_are_ignored() {
    let (mut node, mut hw) = started(MockPlatform::sink());
    let mut packet = scan_request(5);
    packet[8] = 0x4C;

    node.on_beacon_received(&packet, &mut hw);
    node.on_beacon_received(&[0x01, 0x02, 0x03], &mut hw);
    assert_eq!(node.link().queued_frames(), 0);
}

#[test]
fn transmitter_stops_once_backlog_drains() {
    let (mut node, mut hw) = started(MockPlatform::sink());
    node.on_beacon_received(&scan_request(7), &mut hw);
    hw.run_for(&mut node, 3000);

    assert!(!node.link().is_transmitting());
    assert_eq!(hw.radio.last(), Some(&RadioCall::Enable(false)));
}
