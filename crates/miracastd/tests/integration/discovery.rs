//! Peer discovery lifecycle.

use miracast_core::peer::DeviceState;

use crate::{DelegateEvent, TestBed, DEVICE_LOST_EVENT, SINK_ADDR};

/// A found event populates the table, a lost event empties it, and both are
/// mirrored to the delegate.
#[tokio::test(start_paused = true)]
async fn discovery_round_trip() {
    let mut bed = TestBed::start().await;
    bed.discover_sink().await;

    let devices = bed.handle.devices().await.unwrap();
    assert_eq!(devices.len(), 1);
    assert_eq!(devices[0].address.as_str(), SINK_ADDR);
    assert_eq!(devices[0].name, "Aquaris M10");
    assert_eq!(devices[0].config_methods, 0x188);
    assert_eq!(devices[0].wfd_dev_info, vec![0x00, 0x11, 0x1c, 0x44, 0x00, 0x32]);
    assert_eq!(devices[0].state, DeviceState::Idle);

    bed.supplicant.send_event(DEVICE_LOST_EVENT).await;
    assert_eq!(
        bed.expect_delegate().await,
        DelegateEvent::Lost { address: SINK_ADDR.to_string() }
    );
    assert!(bed.handle.devices().await.unwrap().is_empty());
}

/// Re-discovering a known peer updates it in place without a second
/// found notification.
#[tokio::test(start_paused = true)]
async fn rediscovery_updates_in_place() {
    let mut bed = TestBed::start().await;
    bed.discover_sink().await;

    bed.supplicant
        .send_event(
            "<3>P2P-DEVICE-FOUND 4e:74:03:70:e2:c1 p2p_dev_addr=4e:74:03:70:e2:c1 \
             name='Aquaris M10 Pro' config_methods=0x80 new=0",
        )
        .await;
    bed.barrier().await;

    let devices = bed.handle.devices().await.unwrap();
    assert_eq!(devices.len(), 1);
    assert_eq!(devices[0].name, "Aquaris M10 Pro");
    assert_eq!(devices[0].config_methods, 0x80);
    assert!(bed.no_pending_delegate());
}

/// Addresses are keyed case-insensitively, so a shouting supplicant cannot
/// produce duplicate peers.
#[tokio::test(start_paused = true)]
async fn upper_case_discovery_does_not_duplicate() {
    let mut bed = TestBed::start().await;
    bed.discover_sink().await;

    bed.supplicant
        .send_event(
            "<3>P2P-DEVICE-FOUND 4E:74:03:70:E2:C1 p2p_dev_addr=4E:74:03:70:E2:C1 \
             name='Aquaris M10' config_methods=0x188 new=1",
        )
        .await;
    bed.barrier().await;

    let devices = bed.handle.devices().await.unwrap();
    assert_eq!(devices.len(), 1);
    assert_eq!(devices[0].address.as_str(), SINK_ADDR);
    assert!(bed.no_pending_delegate());
}

/// A lost event for an unknown peer is ignored.
#[tokio::test(start_paused = true)]
async fn unknown_lost_event_is_ignored() {
    let mut bed = TestBed::start().await;

    bed.supplicant
        .send_event("<3>P2P-DEVICE-LOST p2p_dev_addr=aa:bb:cc:dd:ee:ff")
        .await;
    bed.barrier().await;

    assert!(bed.handle.devices().await.unwrap().is_empty());
    assert!(bed.no_pending_delegate());
}

/// Malformed discovery events are discarded and the session keeps working.
#[tokio::test(start_paused = true)]
async fn malformed_discovery_is_discarded() {
    let mut bed = TestBed::start().await;

    bed.supplicant.send_event("<3>P2P-DEVICE-FOUND").await;
    bed.supplicant
        .send_event("<3>P2P-DEVICE-FOUND zz:zz p2p_dev_addr=not-a-mac name='x'")
        .await;
    bed.discover_sink().await;

    assert_eq!(bed.handle.devices().await.unwrap().len(), 1);
}
