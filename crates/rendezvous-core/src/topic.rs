//! Topic state and the update chain state machine.
//!
//! Every topic update is signed and hash-chained:
//! `output_i = SHA-256(output_{i-1} || signature_i)` with `output_0` seeded by
//! the topic id. The server assigns chain positions; the client re-computes
//! the fold locally, so a dropped, reordered, or tampered update breaks the
//! chain at the first affected index.
//!
//! Updates may arrive out of order. Unverified updates wait in a queue
//! sorted descending by chain index, so the next expected index sits at the
//! tail; whenever the chain advances, the tail is drained as far as it goes.

use rendezvous_crypto::{
    AgreementPrivateKey, AgreementPublicKey, MessageKey, Signature, SigningPrivateKey,
    SigningPublicKey, sha256,
};
use rendezvous_proto::{FileRecord, MemberRecord, Role, TopicId, TopicRecord};
use serde::{Deserialize, Serialize};

use crate::{
    error::{RendezvousError, Result},
    event::Event,
};

/// A topic member as held locally (no encrypted key material).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    /// The member's stable user key.
    pub user_key: SigningPublicKey,
    /// The member's topic signing key; verifies their updates.
    pub signature_key: SigningPublicKey,
    /// The member's topic encryption key.
    pub encryption_key: AgreementPublicKey,
    /// The member's role.
    pub role: Role,
}

impl Member {
    /// Build the local view of a verified wire member entry.
    pub fn from_record(record: &MemberRecord) -> Self {
        Self {
            user_key: record.user_key,
            signature_key: record.signature_key,
            encryption_key: record.encryption_key,
            role: record.role,
        }
    }
}

/// A decrypted, authenticated content update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Update {
    /// Topic the update belongs to.
    pub topic_id: TopicId,
    /// Server-assigned chain position.
    pub chain_index: u32,
    /// Server-computed chain output at `chain_index`.
    pub output: [u8; 32],
    /// The sending user.
    pub sender: SigningPublicKey,
    /// Decrypted metadata.
    pub metadata: Vec<u8>,
    /// Attached file descriptors.
    pub files: Vec<FileRecord>,
    /// The sender's signature, input to the chain fold.
    pub signature: Signature,
}

/// Running chain output: `SHA-256(previous || signature)`.
pub fn chain_output(previous: &[u8], signature: &Signature) -> [u8; 32] {
    let mut input = Vec::with_capacity(previous.len() + 64);
    input.extend_from_slice(previous);
    input.extend_from_slice(&signature.to_bytes());
    sha256(&input)
}

/// Verify a wire topic record without reference to local state.
///
/// Checks the structural invariants every receiver relies on: creator at
/// index 0 with role `Admin`, the record signature under the creator's topic
/// signing key, and each member's key-binding signature under their own user
/// key.
///
/// # Errors
///
/// - `InvalidServerData` if the member list is empty or the creator entry is
///   malformed
/// - `InvalidSignature` if the record or any member binding fails to verify
pub fn verify_topic_record(record: &TopicRecord) -> Result<()> {
    let Some(creator) = record.members.first() else {
        return Err(RendezvousError::InvalidServerData {
            reason: "topic record has no members".to_string(),
        });
    };
    if creator.role != Role::Admin {
        return Err(RendezvousError::InvalidServerData {
            reason: "topic creator is not an admin".to_string(),
        });
    }

    creator.signature_key.verify(&record.signing_bytes(), &record.signature)?;

    for member in &record.members {
        member.user_key.verify(&member.binding_bytes(), &member.signature)?;
    }

    Ok(())
}

/// Local state of one topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Topic {
    id: TopicId,
    creation_time: u64,
    timestamp: u64,
    members: Vec<Member>,
    message_key: MessageKey,
    signing_key: SigningPrivateKey,
    encryption_key: AgreementPrivateKey,
    chain_index: u32,
    verified_output: Vec<u8>,
    pending: Vec<Update>,
}

impl Topic {
    /// Create the local state of a freshly created or freshly joined topic.
    ///
    /// Starts at `chain_index = 0` with the verified output seeded by the
    /// topic id.
    pub fn new(
        id: TopicId,
        creation_time: u64,
        timestamp: u64,
        members: Vec<Member>,
        message_key: MessageKey,
        signing_key: SigningPrivateKey,
        encryption_key: AgreementPrivateKey,
    ) -> Self {
        Self {
            id,
            creation_time,
            timestamp,
            members,
            message_key,
            signing_key,
            encryption_key,
            chain_index: 0,
            verified_output: id.as_bytes().to_vec(),
            pending: Vec::new(),
        }
    }

    /// Topic identifier.
    pub fn id(&self) -> TopicId {
        self.id
    }

    /// Creation time in Unix seconds.
    pub fn creation_time(&self) -> u64 {
        self.creation_time
    }

    /// Membership revision counter.
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    /// Current members, creator first.
    pub fn members(&self) -> &[Member] {
        &self.members
    }

    /// Index of the member with user key `user`, if any.
    pub fn member_index(&self, user: &SigningPublicKey) -> Option<usize> {
        self.members.iter().position(|m| &m.user_key == user)
    }

    /// The member at `index`, if in bounds.
    pub fn member(&self, index: usize) -> Option<&Member> {
        self.members.get(index)
    }

    /// The topic's symmetric message key.
    pub fn message_key(&self) -> &MessageKey {
        &self.message_key
    }

    /// Our topic signing key (signs our updates).
    pub fn signing_key(&self) -> &SigningPrivateKey {
        &self.signing_key
    }

    /// Our topic encryption key.
    pub fn encryption_key(&self) -> &AgreementPrivateKey {
        &self.encryption_key
    }

    /// Highest verified chain position.
    pub fn chain_index(&self) -> u32 {
        self.chain_index
    }

    /// Chain output at [`Self::chain_index`].
    pub fn verified_output(&self) -> &[u8] {
        &self.verified_output
    }

    /// Updates received but not yet verified (waiting for predecessors).
    pub fn pending(&self) -> &[Update] {
        &self.pending
    }

    /// Replace membership after a verified topic update record.
    pub fn apply_membership(&mut self, members: Vec<Member>, timestamp: u64) {
        self.members = members;
        self.timestamp = timestamp;
    }

    /// Feed one incoming update through the chain state machine.
    ///
    /// Returns the resulting events. Exactly one
    /// [`Event::UpdateReceived`] is emitted for `update`, regardless of
    /// whether it verified immediately, unblocked earlier arrivals, or
    /// remains pending; updates that verify while draining the queue emit
    /// [`Event::UpdateVerifiedLate`] instead (their own `UpdateReceived`
    /// fired when they arrived).
    pub fn reconcile(&mut self, update: Update) -> Vec<Event> {
        let mut events = Vec::new();
        let incoming_index = update.chain_index;

        // Stale or duplicate indices never verify; report them unverified
        // without queueing so the queue holds at most one update per index.
        let duplicate = incoming_index <= self.chain_index
            || self.pending.iter().any(|u| u.chain_index == incoming_index);

        let incoming = update.clone();
        if !duplicate {
            self.pending.push(update);
            // Descending by index: the next expected update sits at the tail.
            self.pending.sort_by(|a, b| b.chain_index.cmp(&a.chain_index));
        }

        let mut incoming_verified = false;
        loop {
            let next_expected = self.chain_index + 1;
            match self.pending.last() {
                Some(tail) if tail.chain_index == next_expected => {},
                _ => break,
            }
            let Some(tail) = self.pending.pop() else {
                break;
            };

            let output = chain_output(&self.verified_output, &tail.signature);
            if output != tail.output {
                events.push(Event::InvalidChain {
                    topic_id: self.id,
                    chain_index: tail.chain_index,
                });
                break;
            }

            self.chain_index = tail.chain_index;
            self.verified_output = output.to_vec();

            if tail.chain_index == incoming_index {
                incoming_verified = true;
            } else {
                events.push(Event::UpdateVerifiedLate {
                    topic_id: self.id,
                    chain_index: tail.chain_index,
                });
            }
        }

        events.push(Event::UpdateReceived { update: incoming, verified: incoming_verified });
        events
    }
}

#[cfg(test)]
mod tests {
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(11)
    }

    struct Fixture {
        topic: Topic,
        signer: SigningPrivateKey,
        user: SigningPublicKey,
    }

    fn fixture() -> Fixture {
        let mut rng = rng();
        let user = SigningPrivateKey::generate(&mut rng);
        let signing = SigningPrivateKey::generate(&mut rng);
        let encryption = AgreementPrivateKey::generate(&mut rng);

        let member = Member {
            user_key: user.public(),
            signature_key: signing.public(),
            encryption_key: encryption.public(),
            role: Role::Admin,
        };

        let topic = Topic::new(
            TopicId([0xCD; 12]),
            10,
            10,
            vec![member],
            MessageKey::generate(&mut rng),
            signing.clone(),
            encryption,
        );

        Fixture { topic, user: user.public(), signer: signing }
    }

    /// Build a valid chain of `n` updates on top of the topic seed.
    fn chain(fixture: &Fixture, n: u32) -> Vec<Update> {
        let mut updates = Vec::new();
        let mut output = fixture.topic.id().as_bytes().to_vec();

        for index in 1..=n {
            let signature = fixture.signer.sign(format!("update {index}").as_bytes());
            let next = chain_output(&output, &signature);
            updates.push(Update {
                topic_id: fixture.topic.id(),
                chain_index: index,
                output: next,
                sender: fixture.user,
                metadata: vec![index as u8],
                files: Vec::new(),
                signature,
            });
            output = next.to_vec();
        }
        updates
    }

    #[test]
    fn new_topic_starts_at_seed() {
        let f = fixture();
        assert_eq!(f.topic.chain_index(), 0);
        assert_eq!(f.topic.verified_output(), f.topic.id().as_bytes());
        assert!(f.topic.pending().is_empty());
    }

    #[test]
    fn in_order_updates_verify_immediately() {
        let mut f = fixture();
        let updates = chain(&f, 2);

        for (i, update) in updates.into_iter().enumerate() {
            let events = f.topic.reconcile(update);
            assert_eq!(events.len(), 1);
            assert!(matches!(
                &events[0],
                Event::UpdateReceived { update, verified: true }
                    if update.chain_index == (i + 1) as u32
            ));
        }

        assert_eq!(f.topic.chain_index(), 2);
        assert!(f.topic.pending().is_empty());
    }

    #[test]
    fn out_of_order_updates_drain_on_gap_fill() {
        let mut f = fixture();
        let updates = chain(&f, 2);

        // Index 2 first: queued, reported unverified.
        let events = f.topic.reconcile(updates[1].clone());
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], Event::UpdateReceived { verified: false, .. }));
        assert_eq!(f.topic.chain_index(), 0);
        assert_eq!(f.topic.pending().len(), 1);

        // Index 1 arrives: both verify; index 2 reported as late.
        let events = f.topic.reconcile(updates[0].clone());
        assert_eq!(events.len(), 2);
        assert!(matches!(
            &events[0],
            Event::UpdateVerifiedLate { chain_index: 2, .. }
        ));
        assert!(matches!(
            &events[1],
            Event::UpdateReceived { update, verified: true } if update.chain_index == 1
        ));

        assert_eq!(f.topic.chain_index(), 2);
        assert!(f.topic.pending().is_empty());
    }

    #[test]
    fn tampered_output_emits_invalid_chain_and_stops() {
        let mut f = fixture();
        let mut updates = chain(&f, 1);
        updates[0].output = [0xFF; 32];

        let events = f.topic.reconcile(updates[0].clone());

        assert!(matches!(&events[0], Event::InvalidChain { chain_index: 1, .. }));
        assert!(matches!(&events[1], Event::UpdateReceived { verified: false, .. }));
        assert_eq!(f.topic.chain_index(), 0);
        assert_eq!(f.topic.verified_output(), f.topic.id().as_bytes());
    }

    #[test]
    fn invalid_update_is_dropped_and_honest_redelivery_verifies() {
        let mut f = fixture();
        let updates = chain(&f, 1);

        let mut bad = updates[0].clone();
        bad.output = [0xFF; 32];
        f.topic.reconcile(bad);
        assert!(f.topic.pending().is_empty());

        let events = f.topic.reconcile(updates[0].clone());
        assert!(matches!(&events[0], Event::UpdateReceived { verified: true, .. }));
        assert_eq!(f.topic.chain_index(), 1);
    }

    #[test]
    fn stale_update_reported_unverified_without_queueing() {
        let mut f = fixture();
        let updates = chain(&f, 1);

        f.topic.reconcile(updates[0].clone());
        assert_eq!(f.topic.chain_index(), 1);

        let events = f.topic.reconcile(updates[0].clone());
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], Event::UpdateReceived { verified: false, .. }));
        assert!(f.topic.pending().is_empty());
        assert_eq!(f.topic.chain_index(), 1);
    }

    #[test]
    fn chain_never_advances_past_a_gap() {
        let mut f = fixture();
        let updates = chain(&f, 3);

        f.topic.reconcile(updates[2].clone());
        f.topic.reconcile(updates[1].clone());

        assert_eq!(f.topic.chain_index(), 0);
        assert_eq!(f.topic.pending().len(), 2);
    }

    #[test]
    fn verify_topic_record_rejects_broken_binding() {
        let mut rng = rng();
        let user = SigningPrivateKey::generate(&mut rng);
        let other = SigningPrivateKey::generate(&mut rng);
        let signing = SigningPrivateKey::generate(&mut rng);
        let encryption = AgreementPrivateKey::generate(&mut rng);

        let member = MemberRecord {
            user_key: user.public(),
            signature_key: signing.public(),
            encryption_key: encryption.public(),
            // Binding signed by the wrong user key.
            signature: other.sign(&rendezvous_proto::binding_bytes(
                &signing.public(),
                &encryption.public(),
            )),
            role: Role::Admin,
            encrypted_message_key: vec![0u8; 76],
        };

        let mut record = TopicRecord {
            id: TopicId([1; 12]),
            creation_time: 1,
            timestamp: 1,
            members: vec![member],
            signature: signing.sign(b"placeholder"),
        };
        record.signature = signing.sign(&record.signing_bytes());

        assert_eq!(verify_topic_record(&record), Err(RendezvousError::InvalidSignature));
    }

    #[test]
    fn verify_topic_record_requires_admin_creator() {
        let mut rng = rng();
        let user = SigningPrivateKey::generate(&mut rng);
        let signing = SigningPrivateKey::generate(&mut rng);
        let encryption = AgreementPrivateKey::generate(&mut rng);

        let member = MemberRecord {
            user_key: user.public(),
            signature_key: signing.public(),
            encryption_key: encryption.public(),
            signature: user.sign(&rendezvous_proto::binding_bytes(
                &signing.public(),
                &encryption.public(),
            )),
            role: Role::Participant,
            encrypted_message_key: Vec::new(),
        };

        let mut record = TopicRecord {
            id: TopicId([1; 12]),
            creation_time: 1,
            timestamp: 1,
            members: vec![member],
            signature: signing.sign(b"placeholder"),
        };
        record.signature = signing.sign(&record.signing_bytes());

        assert!(matches!(
            verify_topic_record(&record),
            Err(RendezvousError::InvalidServerData { .. })
        ));
    }
}
