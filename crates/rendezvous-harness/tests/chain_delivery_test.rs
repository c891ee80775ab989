//! Out-of-order and tampered delivery through the push entry points,
//! simulating a courier that reorders or rewrites messages.

use rand::{SeedableRng, rngs::StdRng};
use rendezvous_client::{Admin, Device, Event, Registration, Role, TopicId};
use rendezvous_harness::SimServer;
use rendezvous_proto::to_bytes;

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

    device.upload_prekeys(20).await.unwrap();
    device.upload_topic_keys(5).await.unwrap();
    device
}

/// Bob knows the topic; Alice has posted `n` updates that sit undelivered
/// on the server.
async fn undelivered_updates(
    n: usize,
) -> (SimDevice, TopicId, Vec<rendezvous_proto::MessageRecord>) {
    let server = SimServer::new();
    let admin = Admin::new(server.clone());

    let mut alice = register(&server, &admin, "Alice", 60).await;
    let mut bob = register(&server, &admin, "Bob", 70).await;

    let topic_id = alice.create_topic(&[(bob.user_key(), Role::Admin)]).await.unwrap();
    bob.get_messages().await.unwrap();
    assert!(bob.topic(&topic_id).is_some());

    for i in 0..n {
        alice.upload(topic_id, &[i as u8], &[]).await.unwrap();
    }

    let records = server.drain_messages(&bob.device_key());
    assert_eq!(records.len(), n);
    (bob, topic_id, records)
}

#[tokio::test]
async fn out_of_order_delivery_verifies_on_gap_fill() {
    let (mut bob, topic_id, records) = undelivered_updates(2).await;

    // Deliver index 2 first.
    let events = bob.receive_pushed_message(&to_bytes(&records[1]).unwrap()).unwrap();
    assert_eq!(events.len(), 1);
    assert!(matches!(
        &events[0],
        Event::UpdateReceived { update, verified: false } if update.chain_index == 2
    ));
    assert_eq!(bob.topic(&topic_id).unwrap().chain_index(), 0);

    // Index 1 fills the gap; both verify, one callback each.
    let events = bob.receive_pushed_message(&to_bytes(&records[0]).unwrap()).unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0], Event::UpdateVerifiedLate { topic_id, chain_index: 2 });
    assert!(matches!(
        &events[1],
        Event::UpdateReceived { update, verified: true } if update.chain_index == 1
    ));

    assert_eq!(bob.topic(&topic_id).unwrap().chain_index(), 2);
}

#[tokio::test]
async fn tampered_output_is_detected() {
    let (mut bob, topic_id, mut records) = undelivered_updates(1).await;

    records[0].output = [0xEE; 32];

    let events = bob.receive_pushed_message(&to_bytes(&records[0]).unwrap()).unwrap();
    assert_eq!(events[0], Event::InvalidChain { topic_id, chain_index: 1 });
    assert!(matches!(&events[1], Event::UpdateReceived { verified: false, .. }));

    let topic = bob.topic(&topic_id).unwrap();
    assert_eq!(topic.chain_index(), 0);
    assert_eq!(topic.verified_output(), topic_id.as_bytes());
}

#[tokio::test]
async fn reordered_signature_breaks_the_chain() {
    let (mut bob, topic_id, records) = undelivered_updates(2).await;

    // The courier swaps the payloads but keeps the chain positions: the
    // fold no longer matches either output.
    let mut swapped = records[1].clone();
    swapped.chain_index = records[0].chain_index;
    swapped.output = records[0].output;

    let events = bob.receive_pushed_message(&to_bytes(&swapped).unwrap()).unwrap();
    assert_eq!(events[0], Event::InvalidChain { topic_id, chain_index: 1 });
    assert_eq!(bob.topic(&topic_id).unwrap().chain_index(), 0);
}
