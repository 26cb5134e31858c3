//! Group formation, roles, and the address-acquisition window.

use std::net::Ipv4Addr;
use std::time::Duration;

use miracast_core::peer::DeviceState;
use miracastd::manager::ConnectError;

use crate::{TestBed, SINK_ADDR};

const GROUP_STARTED_CLIENT: &str = "<3>P2P-GROUP-STARTED p2p-test0 client \
    ssid=\"DIRECT-hB\" freq=2412 passphrase=\"HtP0qYon\" go_dev_addr=4e:74:03:64:95:a7";

const GROUP_STARTED_GO: &str = "<3>P2P-GROUP-STARTED p2p-test0 GO \
    ssid=\"DIRECT-hB\" freq=2412 passphrase=\"HtP0qYon\" go_dev_addr=4e:74:03:64:95:a7";

/// Joining a group as client: configuration, then connected once the lease
/// lands, with the acquisition timeout disarmed.
#[tokio::test(start_paused = true)]
async fn connect_as_client_acquires_address() {
    let mut bed = TestBed::start().await;
    bed.connect_sink().await;

    bed.supplicant.send_event(GROUP_STARTED_CLIENT).await;
    bed.expect_state(DeviceState::Configuration).await;

    bed.assign_address(Ipv4Addr::new(192, 168, 49, 3));
    bed.expect_state(DeviceState::Connected).await;
    assert_eq!(
        bed.handle.local_address().await.unwrap(),
        Some(Ipv4Addr::new(192, 168, 49, 3))
    );

    // Well past the acquisition window: the cancelled timeout stays quiet.
    tokio::time::sleep(Duration::from_secs(6)).await;
    assert!(bed.no_pending_delegate());
}

/// Winning the Group Owner role connects immediately; no lease is awaited.
#[tokio::test(start_paused = true)]
async fn connect_as_group_owner_serves_dhcp() {
    let mut bed = TestBed::start().await;
    bed.connect_sink().await;

    bed.supplicant.send_event(GROUP_STARTED_GO).await;
    bed.expect_state(DeviceState::Configuration).await;
    bed.expect_state(DeviceState::Connected).await;

    assert_eq!(
        bed.handle.local_address().await.unwrap(),
        Some(Ipv4Addr::new(192, 168, 7, 1))
    );

    // No acquisition timeout was armed for the owner role.
    tokio::time::sleep(Duration::from_secs(6)).await;
    assert!(bed.no_pending_delegate());
}

/// A client that never receives a lease fails, then cools down to idle.
#[tokio::test(start_paused = true)]
async fn dhcp_timeout_fails_then_cools_down() {
    let mut bed = TestBed::start().await;
    bed.connect_sink().await;

    bed.supplicant.send_event(GROUP_STARTED_CLIENT).await;
    bed.expect_state(DeviceState::Configuration).await;

    // No address arrives; the 5 s timeout fires, then the 5 s cooldown.
    bed.expect_state(DeviceState::Failure).await;
    bed.expect_state(DeviceState::Idle).await;

    // The peer survives the failure and is selectable again.
    let devices = bed.handle.devices().await.unwrap();
    assert_eq!(devices.len(), 1);
    assert_eq!(devices[0].state, DeviceState::Idle);
    assert_eq!(bed.handle.local_address().await.unwrap(), None);
    bed.handle.connect(SINK_ADDR).await.expect("peer should be connectable again");
}

/// Formation failure maps onto the failure state and releases the current
/// peer slot.
#[tokio::test(start_paused = true)]
async fn formation_failure_releases_current_peer() {
    let mut bed = TestBed::start().await;
    bed.connect_sink().await;

    bed.supplicant
        .send_event("<3>P2P-GROUP-REMOVED p2p-test0 GO reason=FORMATION_FAILED")
        .await;
    bed.expect_state(DeviceState::Failure).await;

    assert_eq!(bed.handle.local_address().await.unwrap(), None);
    // The slot is free again.
    bed.handle.connect(SINK_ADDR).await.expect("slot should be free after removal");
}

/// An ordinary group teardown reads as disconnected, not as a failure.
#[tokio::test(start_paused = true)]
async fn group_removal_without_failure_reason_disconnects() {
    let mut bed = TestBed::start().await;
    bed.connect_sink().await;

    bed.supplicant
        .send_event("<3>P2P-GROUP-REMOVED p2p-test0 client reason=GO_ENDING_SESSION")
        .await;
    bed.expect_state(DeviceState::Disconnected).await;
}

/// A group-removed event with nobody connecting is a no-op.
#[tokio::test(start_paused = true)]
async fn group_removed_without_current_peer_is_ignored() {
    let mut bed = TestBed::start().await;
    bed.discover_sink().await;

    bed.supplicant
        .send_event("<3>P2P-GROUP-REMOVED p2p-test0 GO reason=FORMATION_FAILED")
        .await;
    bed.barrier().await;
    assert!(bed.no_pending_delegate());
}

/// Connecting twice, or to an address nobody advertised, is rejected
/// synchronously.
#[tokio::test(start_paused = true)]
async fn connect_rejects_unknown_and_busy() {
    let mut bed = TestBed::start().await;

    assert_eq!(
        bed.handle.connect(SINK_ADDR).await,
        Err(ConnectError::UnknownDevice(SINK_ADDR.to_string()))
    );

    bed.connect_sink().await;
    assert_eq!(bed.handle.connect(SINK_ADDR).await, Err(ConnectError::Busy));
}

/// A late lease after the failure cooldown does not resurrect the session.
#[tokio::test(start_paused = true)]
async fn late_address_after_cooldown_is_ignored() {
    let mut bed = TestBed::start().await;
    bed.connect_sink().await;

    bed.supplicant.send_event(GROUP_STARTED_CLIENT).await;
    bed.expect_state(DeviceState::Configuration).await;
    bed.expect_state(DeviceState::Failure).await;
    bed.expect_state(DeviceState::Idle).await;

    bed.assign_address(Ipv4Addr::new(192, 168, 49, 3));
    bed.barrier().await;
    assert!(bed.no_pending_delegate());
    assert_eq!(bed.handle.local_address().await.unwrap(), None);
}
