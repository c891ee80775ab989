//! Topic creation, message round-trip, file fetch, and receipts between two
//! freshly registered users.

use rand::{SeedableRng, rngs::StdRng};
use rendezvous_client::{
    Admin, Device, Event, OutgoingFile, Registration, RendezvousError, Role, TopicId,
};
use rendezvous_core::chain_output;
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

    device.upload_prekeys(50).await.unwrap();
    device.upload_topic_keys(10).await.unwrap();
    device
}

/// Alice and Bob, with Alice having created a topic `{bob: admin}`.
async fn pair_with_topic() -> (SimServer, SimDevice, SimDevice, TopicId) {
    let server = SimServer::new();
    let admin = Admin::new(server.clone());

    let mut alice = register(&server, &admin, "Alice", 10).await;
    let bob = register(&server, &admin, "Bob", 20).await;

    let topic_id = alice.create_topic(&[(bob.user_key(), Role::Admin)]).await.unwrap();
    (server, alice, bob, topic_id)
}

#[tokio::test]
async fn topic_creation_puts_creator_first() {
    let (_, alice, bob, topic_id) = pair_with_topic().await;

    let topic = alice.topic(&topic_id).unwrap();
    assert_eq!(topic.members().len(), 2);
    assert_eq!(topic.members()[0].user_key, alice.user_key());
    assert_eq!(topic.members()[0].role, Role::Admin);
    assert_eq!(topic.members()[1].user_key, bob.user_key());
    assert_eq!(topic.members()[1].role, Role::Admin);

    assert_eq!(topic.chain_index(), 0);
    assert_eq!(topic.verified_output(), topic_id.as_bytes());

    // One of Alice's ten topic keys was consumed.
    assert_eq!(alice.topic_key_count(), 9);
}

#[tokio::test]
async fn create_topic_without_topic_keys_fails() {
    let server = SimServer::new();
    let admin = Admin::new(server.clone());

    let allowed = admin.allow("Alice").await.unwrap();
    let mut alice = Device::register(
        server.clone(),
        StdRng::seed_from_u64(33),
        Registration {
            server_url: "sim://rendezvous".to_string(),
            name: "Alice".to_string(),
            pin: allowed.pin,
            app_id: "rdv".to_string(),
            prekey_count: 0,
            topic_key_count: 0,
        },
    )
    .await
    .unwrap();

    let result = alice.create_topic(&[]).await;
    assert!(matches!(result, Err(RendezvousError::InvalidRequest { .. })));
}

#[tokio::test]
async fn message_round_trip() {
    let (_, mut alice, mut bob, topic_id) = pair_with_topic().await;

    let file = OutgoingFile { id: [0x08; 12], data: vec![0x2A; 250] };
    let metadata = vec![0x2A; 42];

    let update = alice.upload(topic_id, &metadata, &[file]).await.unwrap();

    // The server's chain state must be the fold over our own signature.
    assert_eq!(update.chain_index, 1);
    assert_eq!(update.output, chain_output(topic_id.as_bytes(), &update.signature));

    // Send never mutates local topic state.
    assert_eq!(alice.topic(&topic_id).unwrap().chain_index(), 0);

    let events = bob.get_messages().await.unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0], Event::TopicAdded(topic_id));

    let Event::UpdateReceived { update: received, verified } = &events[1] else {
        panic!("expected UpdateReceived, got {:?}", events[1]);
    };
    assert!(*verified);
    assert_eq!(received.chain_index, 1);
    assert_eq!(received.metadata, vec![0x2A; 42]);
    assert_eq!(received.files[0].id, [0x08; 12]);
    assert_eq!(received.sender, alice.user_key());

    assert_eq!(bob.topic(&topic_id).unwrap().chain_index(), 1);
}

#[tokio::test]
async fn file_fetch_and_tamper_detection() {
    let (server, mut alice, mut bob, topic_id) = pair_with_topic().await;

    let file = OutgoingFile { id: [0x08; 12], data: vec![0x2A; 250] };
    alice.upload(topic_id, &[0x2A; 42], &[file]).await.unwrap();

    let events = bob.get_messages().await.unwrap();
    let Some(Event::UpdateReceived { update, .. }) =
        events.iter().find(|e| matches!(e, Event::UpdateReceived { .. }))
    else {
        panic!("no update received");
    };

    let plaintext = bob.get_file(topic_id, &update.files[0]).await.unwrap();
    assert_eq!(plaintext, vec![0x2A; 250]);

    server.corrupt_file(topic_id, [0x08; 12]);
    let result = bob.get_file(topic_id, &update.files[0]).await;
    assert!(matches!(result, Err(RendezvousError::InvalidFile { .. })));
}

#[tokio::test]
async fn receipt_flows_back_to_sender() {
    let (_, mut alice, mut bob, topic_id) = pair_with_topic().await;

    alice.upload(topic_id, &[0x2A; 42], &[]).await.unwrap();

    // Bob reads the message; the server records his chain observation.
    bob.get_messages().await.unwrap();

    let events = alice.get_messages().await.unwrap();
    assert!(events.contains(&Event::ChainStateReceived {
        topic_id,
        chain_index: 1,
        sender: bob.user_key(),
    }));
}

#[tokio::test]
async fn observer_cannot_post() {
    let server = SimServer::new();
    let admin = Admin::new(server.clone());

    let mut alice = register(&server, &admin, "Alice", 40).await;
    let mut bob = register(&server, &admin, "Bob", 50).await;

    let topic_id = alice.create_topic(&[(bob.user_key(), Role::Observer)]).await.unwrap();
    bob.get_messages().await.unwrap();

    let result = bob.upload(topic_id, b"hi", &[]).await;
    assert_eq!(result, Err(RendezvousError::NoPermissionToWrite));
}

#[tokio::test]
async fn oversized_metadata_is_rejected_locally() {
    let (_, mut alice, _, topic_id) = pair_with_topic().await;

    let result = alice.upload(topic_id, &[0u8; 101], &[]).await;
    assert!(matches!(result, Err(RendezvousError::InvalidRequest { .. })));
}
