//! Device state export/import against a live server.

use rand::{SeedableRng, rngs::StdRng};
use rendezvous_client::{Admin, Device, Registration, RendezvousError, Role};
use rendezvous_harness::SimServer;

type SimDevice = Device<SimServer, StdRng>;

async fn register(server: &SimServer, admin: &Admin<SimServer>, name: &str, seed: u64) -> SimDevice {
    let allowed = admin.allow(name).await.unwrap();
    let mut device = Device::register(
        server.clone(),
        StdRng::seed_from_u64(seed),
        Registration {
            server_url: "sim://rendezvous".to_string(),
            name: name.to_string(),
            pin: allowed.pin,
            app_id: "rdv".to_string(),
            prekey_count: 0,
            topic_key_count: 0,
        },
    )
    .await
    .unwrap();

    device.upload_prekeys(10).await.unwrap();
    device.upload_topic_keys(3).await.unwrap();
    device
}

#[tokio::test]
async fn export_import_preserves_observable_state() {
    let server = SimServer::new();
    let admin = Admin::new(server.clone());

    let mut alice = register(&server, &admin, "Alice", 80).await;
    let mut bob = register(&server, &admin, "Bob", 90).await;

    let topic_id = alice.create_topic(&[(bob.user_key(), Role::Participant)]).await.unwrap();
    alice.upload(topic_id, b"hello", &[]).await.unwrap();
    bob.get_messages().await.unwrap();

    let blob = bob.export().unwrap();
    let restored: SimDevice =
        Device::import(&blob, server.clone(), StdRng::seed_from_u64(99)).unwrap();

    assert_eq!(restored.user_key(), bob.user_key());
    assert_eq!(restored.device_key(), bob.device_key());
    assert_eq!(restored.prekey_count(), bob.prekey_count());
    assert_eq!(restored.topic_key_count(), bob.topic_key_count());

    let original = bob.topic(&topic_id).unwrap();
    let topic = restored.topic(&topic_id).unwrap();
    assert_eq!(topic, original);

    // Export is canonical: re-exporting the restored device is identical.
    assert_eq!(restored.export().unwrap(), blob);
}

#[tokio::test]
async fn restored_device_keeps_talking_to_the_server() {
    let server = SimServer::new();
    let admin = Admin::new(server.clone());

    let mut alice = register(&server, &admin, "Alice", 100).await;
    let mut bob = register(&server, &admin, "Bob", 110).await;

    let topic_id = alice.create_topic(&[(bob.user_key(), Role::Admin)]).await.unwrap();
    bob.get_messages().await.unwrap();

    // Bob moves to a restored instance; the auth token and topic survive.
    let blob = bob.export().unwrap();
    let mut bob: SimDevice = Device::import(&blob, server.clone(), StdRng::seed_from_u64(7)).unwrap();

    alice.upload(topic_id, b"after restore", &[]).await.unwrap();
    let events = bob.get_messages().await.unwrap();
    assert!(!events.is_empty());
    assert_eq!(bob.topic(&topic_id).unwrap().chain_index(), 1);
}

#[tokio::test]
async fn unchanged_user_info_refresh_reports_outdated() {
    let server = SimServer::new();
    let admin = Admin::new(server.clone());

    let mut alice = register(&server, &admin, "Alice", 120).await;

    // The server still holds the record we registered with; merging it again
    // must be refused as stale rather than silently applied.
    assert_eq!(alice.update_user_info().await, Err(RendezvousError::RequestOutdated));
}
