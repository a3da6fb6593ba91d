//! Image upload scenarios: begin, fragments, loss recovery, completion
//! and applying the image after the reboot.

use beacon_otap::app::ports::SettingsPort;
use beacon_otap::app::service::{BootOutcome, Node};
use beacon_otap::config::LinkConfig;
use beacon_otap::link::frame::{
    BeginUploadRequest, BeginUploadResponse, Frame, Message, Platform, ScanRequest,
    UploadResponse, UploadStatus,
};
use beacon_otap::link::states::LinkState;
use beacon_otap::link::upload::UploadState;
use beacon_otap::scheduler::TaskId;
use heapless::Vec as HVec;

use super::mock_hw::{MockPlatform, RadioCall, android_packet};

const FRAGMENT: usize = 24;
/// 43 full fragments plus a 16-byte tail.
const IMAGE_LEN: usize = 1048;
const TOTAL: u16 = 44;
const START_ID: u16 = 0x8000;

fn image() -> Vec<u8> {
    (0..IMAGE_LEN).map(|i| (i * 7 + 3) as u8).collect()
}

fn begin_upload(id: u16, image_length: u32) -> Vec<u8> {
    begin_upload_in(id, image_length, FRAGMENT)
}

fn begin_upload_in(id: u16, image_length: u32, fragment_length: usize) -> Vec<u8> {
    android_packet(&Frame::new(
        id,
        Message::BeginUploadRequest(BeginUploadRequest {
            token: 0x5678,
            sequence: 4,
            image_length,
            fragment_length: fragment_length as u8,
        }),
    ))
}

fn fragment(image: &[u8], index: u16) -> Vec<u8> {
    fragment_of(image, FRAGMENT, index)
}

fn fragment_of(image: &[u8], size: usize, index: u16) -> Vec<u8> {
    let start = usize::from(index) * size;
    let end = (start + size).min(image.len());
    let data = HVec::from_slice(&image[start..end]).unwrap();
    android_packet(&Frame::new(START_ID + index, Message::UploadRequest { data }))
}

fn booted_sink() -> (Node, MockPlatform) {
    let mut hw = MockPlatform::sink();
    let mut node = Node::new(LinkConfig::default(), &hw).unwrap();
    node.boot(&mut hw).unwrap();
    hw.run_for(&mut node, 1500);
    (node, hw)
}

/// Booted sink with an accepted upload session.
fn uploading() -> (Node, MockPlatform, Vec<u8>) {
    let (mut node, mut hw) = booted_sink();
    node.on_beacon_received(&begin_upload(20, IMAGE_LEN as u32), &mut hw);
    (node, hw, image())
}

fn upload_responses(hw: &MockPlatform) -> Vec<UploadResponse> {
    hw.sent_messages()
        .into_iter()
        .filter_map(|m| match m {
            Message::UploadResponse(r) => Some(r),
            _ => None,
        })
        .collect()
}

fn resend_requests(hw: &MockPlatform) -> Vec<u16> {
    hw.sent_messages()
        .into_iter()
        .filter_map(|m| match m {
            Message::ResendRequest { message_id } => Some(message_id),
            _ => None,
        })
        .collect()
}

#[test]
fn begin_upload_opens_session() {
    let (mut node, mut hw, _) = uploading();
    hw.run_for(&mut node, 10);

    assert_eq!(node.link().session().state(), UploadState::Receiving);
    assert_eq!(node.link().session().total(), TOTAL);
    assert_eq!(
        hw.sent_messages(),
        vec![Message::BeginUploadResponse(BeginUploadResponse {
            request_id: 20,
            start_message_id: START_ID,
            status: UploadStatus::Ok as u8,
        })]
    );
    assert_eq!(hw.area.erase_count(), 1);
}

#[test]
fn oversize_image_is_refused_with_overload() {
    let (mut node, mut hw) = booted_sink();

    node.on_beacon_received(&begin_upload(21, 4097 * FRAGMENT as u32), &mut hw);
    hw.run_for(&mut node, 10);

    assert_eq!(node.link().session().state(), UploadState::Idle);
    assert!(matches!(
        hw.sent_messages()[..],
        [Message::BeginUploadResponse(BeginUploadResponse { status: 2, .. })]
    ));
}

#[test]
fn image_larger_than_area_is_refused() {
    let (mut node, mut hw) = booted_sink();
    let image: Vec<u8> = (0..9000usize).map(|i| i as u8).collect();

    node.on_beacon_received(&begin_upload(22, 9000), &mut hw);
    assert_eq!(node.link().session().state(), UploadState::Failed);
    assert_eq!(hw.area.erase_count(), 0);

    for i in 0..375 {
        node.on_beacon_received(&fragment(&image, i), &mut hw);
    }
    hw.run_for(&mut node, 200_000);

    assert_eq!(hw.area.write_count(), 0);
    assert!(resend_requests(&hw).is_empty());
    assert!(upload_responses(&hw).is_empty());
    assert!(!node.settings().update_pending);
    assert!(matches!(
        hw.sent_messages()[..],
        [Message::BeginUploadResponse(BeginUploadResponse { status: 0x14, .. })]
    ));
}

#[test]
fn begin_upload_from_paired_phone_connects_link() {
    let (mut node, mut hw, _) = uploading();
    hw.run_for(&mut node, 1000);
    assert_eq!(node.link().state(), LinkState::Scanning);

    let (mut node, mut hw) = booted_sink();
    let scan = android_packet(&Frame::new(
        5,
        Message::ScanRequest(ScanRequest {
            app_version: 1,
            platform: Platform::Android,
        }),
    ));
    node.on_beacon_received(&scan, &mut hw);
    node.on_beacon_received(&begin_upload(6, IMAGE_LEN as u32), &mut hw);
    hw.run_for(&mut node, 1000);

    assert_eq!(node.link().state(), LinkState::Connected);
    assert_eq!(hw.count(&RadioCall::StopScanner), 0);
}

#[test]
fn thousand_byte_image_in_23_byte_fragments() {
    let (mut node, mut hw) = booted_sink();
    let image: Vec<u8> = (0..1000usize).map(|i| (i * 13) as u8).collect();
    node.on_beacon_received(&begin_upload_in(30, 1000, 23), &mut hw);
    assert_eq!(node.link().session().total(), 44);

    // Everything but the last fragment, newest first.
    for i in (0..43).rev() {
        node.on_beacon_received(&fragment_of(&image, 23, i), &mut hw);
    }
    assert_eq!(node.link().session().state(), UploadState::Receiving);
    assert!(!node.settings().update_pending);

    node.on_beacon_received(&fragment_of(&image, 23, 43), &mut hw);
    assert_eq!(node.link().session().state(), UploadState::Complete);
    assert!(node.settings().update_pending);
    assert_eq!(&hw.area.contents()[12..1012], &image[..]);

    hw.run_for(&mut node, 30_000);
    assert!(resend_requests(&hw).is_empty());
    let last = upload_responses(&hw).pop().unwrap();
    assert_eq!(last.request_id, START_ID + 43);
    assert_eq!(last.status, UploadStatus::Ok as u8);
    assert_eq!(last.percentage, 100);
}

#[test]
fn failed_pending_flag_write_keeps_node_up() {
    let (mut node, mut hw, image) = uploading();
    hw.settings.fail_writes(true);
    for i in 0..TOTAL {
        node.on_beacon_received(&fragment(&image, i), &mut hw);
    }

    assert_eq!(node.link().session().state(), UploadState::Complete);
    assert!(!node.settings().update_pending);
    hw.run_for(&mut node, 30_000);
    assert_eq!(hw.resets, 0);
    assert!(!hw.sched.is_scheduled(TaskId::Reboot));
}

#[test]
fn complete_upload_flags_update_and_reboots() {
    let (mut node, mut hw, image) = uploading();
    for i in 0..TOTAL {
        node.on_beacon_received(&fragment(&image, i), &mut hw);
    }

    assert_eq!(node.link().session().state(), UploadState::Complete);
    assert!(node.settings().update_pending);
    assert!(hw.settings.load().unwrap().update_pending);
    assert_eq!(&hw.area.contents()[12..12 + IMAGE_LEN], &image[..]);

    // Let the backlog drain, then the reboot task fires.
    assert!(hw.run_until(&mut node, TaskId::Reboot, 30_000));
    assert_eq!(hw.resets, 1);

    let last = upload_responses(&hw).pop().unwrap();
    assert_eq!(last.request_id, START_ID + TOTAL - 1);
    assert_eq!(last.status, UploadStatus::Ok as u8);
    assert_eq!(last.percentage, 100);
}

#[test]
fn progress_reported_every_tenth_message_id() {
    let (mut node, mut hw, image) = uploading();
    for i in 0..20 {
        node.on_beacon_received(&fragment(&image, i), &mut hw);
    }
    hw.run_for(&mut node, 10_000);

    let progress = upload_responses(&hw);
    // 0x8002 and 0x800C are the multiples of ten below 0x8014.
    let ids: Vec<u16> = progress.iter().map(|r| r.request_id).collect();
    assert_eq!(ids, vec![START_ID + 2, START_ID + 12]);
    assert_eq!(progress[0].percentage, (2 * 90 / u32::from(TOTAL)) as u8);
    assert!(progress.iter().all(|r| r.status == UploadStatus::Upload as u8));
}

#[test]
fn lost_fragment_is_requested_once_last_arrives() {
    let (mut node, mut hw, image) = uploading();
    for i in (0..TOTAL).filter(|i| *i != 42) {
        node.on_beacon_received(&fragment(&image, i), &mut hw);
    }
    hw.run_for(&mut node, 20_000);

    assert_eq!(resend_requests(&hw), vec![START_ID + 42]);
    assert_eq!(node.link().session().state(), UploadState::Receiving);
    assert!(node.link().awaiting_reply().is_some());

    node.on_beacon_received(&fragment(&image, 42), &mut hw);
    assert_eq!(node.link().session().state(), UploadState::Complete);
    assert_eq!(node.link().awaiting_reply(), None);
    assert!(node.settings().update_pending);
}

#[test]
fn no_resend_before_last_fragment() {
    let (mut node, mut hw, image) = uploading();
    for i in 0..=42 {
        node.on_beacon_received(&fragment(&image, i), &mut hw);
    }
    hw.run_for(&mut node, 20_000);

    assert!(resend_requests(&hw).is_empty());
    assert_eq!(node.link().session().state(), UploadState::Receiving);
}

#[test]
fn duplicate_fragment_written_once() {
    let (mut node, mut hw, image) = uploading();
    let writes = hw.area.write_count();
    let packet = fragment(&image, 0);

    node.on_beacon_received(&packet, &mut hw);
    node.on_beacon_received(&packet, &mut hw);
    assert_eq!(hw.area.write_count(), writes + 1);
}

#[test]
fn fragment_outside_session_ignored() {
    let (mut node, mut hw) = booted_sink();

    node.on_beacon_received(&fragment(&image(), 0), &mut hw);
    assert_eq!(hw.area.write_count(), 0);
    assert_eq!(node.link().queued_frames(), 0);
}

#[test]
fn stuck_flash_leaves_fragment_missing() {
    let (mut node, mut hw, image) = uploading();
    hw.area.stick_busy(true);

    node.on_beacon_received(&fragment(&image, 0), &mut hw);
    assert!(!node.link().session().is_received(0));
    assert_eq!(node.link().session().state(), UploadState::Receiving);
}

#[test]
fn reboot_applies_stored_image() {
    let (mut node, mut hw, image) = uploading();
    for i in 0..TOTAL {
        node.on_beacon_received(&fragment(&image, i), &mut hw);
    }
    assert!(hw.run_until(&mut node, TaskId::Reboot, 30_000));
    hw.power_cycle();

    let mut node = Node::new(LinkConfig::default(), &hw).unwrap();
    assert_eq!(
        node.boot(&mut hw),
        Ok(BootOutcome::ImageApplied { ok: true })
    );
    assert_eq!(hw.resets, 2);
    assert_eq!(hw.pipeline.begun, Some((IMAGE_LEN as u32, 4)));
    assert_eq!(hw.pipeline.image, image);
    assert_eq!(hw.pipeline.blocks, IMAGE_LEN.div_ceil(256));
    assert!(hw.pipeline.targeted);
    assert!(hw.pipeline.to_be_processed);
    assert!(!hw.settings.load().unwrap().update_pending);

    // The following boot is a normal one.
    hw.power_cycle();
    let mut node = Node::new(LinkConfig::default(), &hw).unwrap();
    assert_eq!(node.boot(&mut hw), Ok(BootOutcome::Started));
}
