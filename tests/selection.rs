//! Source Selection Integration Tests
//!
//! Tests for classification and the RUNNING > IDLE > first-found policy.

mod common;

use capture_worker::core::{pick_source, DeviceInventory};
use capture_worker::domain::{AudioSource, SourceState};
use common::{source, FakeAudioServer};

#[test]
fn test_priority_ordering_is_total() {
    let states = ["RUNNING", "IDLE", "SUSPENDED"];

    // Every ordering of one source per state
    for a in states {
        for b in states {
            for c in states {
                if a == b || b == c || a == c {
                    continue;
                }
                let sources = vec![source("s0", a), source("s1", b), source("s2", c)];
                let picked = pick_source(&sources);
                let expected = sources
                    .iter()
                    .find(|s| s.state == SourceState::Running)
                    .unwrap();
                assert_eq!(picked, expected.name, "order {:?}", [a, b, c]);
            }
        }
    }
}

#[test]
fn test_idle_wins_without_running() {
    let sources = vec![
        source("a", "SUSPENDED"),
        source("b", "IDLE"),
        source("c", "IDLE"),
    ];
    assert_eq!(pick_source(&sources), "b");
}

#[test]
fn test_first_found_without_running_or_idle() {
    let sources = vec![source("a", "SUSPENDED"), source("b", "SUSPENDED")];
    assert_eq!(pick_source(&sources), "a");
}

#[test]
fn test_empty_list_yields_empty_name() {
    let empty: Vec<AudioSource> = Vec::new();
    assert_eq!(pick_source(&empty), "");
}

#[tokio::test]
async fn test_inventory_picks_per_pool() {
    let server = FakeAudioServer::new(vec![
        source("alsa_output.pci.analog-stereo.monitor", "IDLE"),
        source("alsa_input.usb-mic", "SUSPENDED"),
        source("alsa_input.pci.analog-stereo", "RUNNING"),
        source("bluez_output.headset.monitor", "RUNNING"),
    ]);
    let inventory = DeviceInventory::new(&server);

    let listing = inventory.list_sources().await;
    assert_eq!(
        listing.mic_names(),
        vec!["alsa_input.usb-mic", "alsa_input.pci.analog-stereo"]
    );
    assert_eq!(listing.monitor_names().len(), 2);

    assert_eq!(inventory.pick_mic().await, "alsa_input.pci.analog-stereo");
    assert_eq!(inventory.pick_monitor().await, "bluez_output.headset.monitor");
}

#[tokio::test]
async fn test_inventory_empty_server() {
    let server = FakeAudioServer::empty();
    let inventory = DeviceInventory::new(&server);

    assert!(inventory.list_sources().await.is_empty());
    assert_eq!(inventory.pick_mic().await, "");
    assert_eq!(inventory.pick_monitor().await, "");
}
