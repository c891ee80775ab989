//! Device core: orchestrates key distribution, topics, and the receive
//! pipeline.
//!
//! A [`Device`] is a single logical actor. Every method takes `&mut self`,
//! so handler invocations are serialized by construction; the only
//! suspension points are the transport request boundaries. All cryptography
//! and the whole receive pipeline run synchronously.
//!
//! Methods return either a value or a single [`RendezvousError`]. The
//! receive pipeline fails its whole batch on the first fatal error; chain
//! and file verification failures are reported as [`Event`]s instead, and
//! malformed receipts are dropped silently.

use std::collections::HashMap;

use rand::{CryptoRng, RngCore};
use rendezvous_core::{
    ClientData, Event, Member, PrekeyPair, RendezvousError, Result, Topic, TopicKeys, Update,
    build_user_info, encrypt_member_key, merge_user_info, verify_topic_key_response,
    verify_topic_record,
};
use rendezvous_crypto::{
    AgreementPrivateKey, AgreementPublicKey, MessageKey, SigningPrivateKey, SigningPublicKey,
    decrypt_from, open, open_file, random_array, seal, seal_file, sha256,
};
use rendezvous_proto::{
    AuthToken, ChainState, DeviceDownload, DeviceInfo, DevicePrekeyBundle, DeviceTopicKeys,
    FILE_ID_LEN, FileRecord, FileUpload, MAX_APP_ID_LEN, MAX_METADATA_LEN, MAX_NAME_LEN,
    MESSAGE_KEY_LEN, MessageRecord, PrekeyUpload, ReceiptRecord, RegistrationBundle, Role,
    SignedPrekey, TopicId, TopicKeyBundle, TopicKeyMessage, TopicKeyRequest, TopicKeyResponse,
    TopicRecord, UpdateUpload, UserInfo, from_bytes, to_bytes, topic_signing_bytes,
    update_signing_bytes,
};

use crate::transport::{Request, ServerTransport, encode_header, encode_segment, headers};

/// Registration parameters for a new user's first device.
#[derive(Debug, Clone)]
pub struct Registration {
    /// Base URL of the home server (kept for persistence).
    pub server_url: String,
    /// User name, at most [`MAX_NAME_LEN`] characters.
    pub name: String,
    /// Pin issued by the administrator.
    pub pin: u32,
    /// Application identifier, at most [`MAX_APP_ID_LEN`] bytes.
    pub app_id: String,
    /// Prekeys to publish immediately.
    pub prekey_count: u32,
    /// Topic keys to publish immediately.
    pub topic_key_count: u32,
}

/// A plaintext file to attach to an update. The caller picks the id, which
/// doubles as the AES-GCM nonce and must be unique per topic.
#[derive(Debug, Clone)]
pub struct OutgoingFile {
    /// 12-byte file id.
    pub id: [u8; FILE_ID_LEN],
    /// File contents.
    pub data: Vec<u8>,
}

/// One device of one user: the client-side protocol endpoint.
pub struct Device<T, R> {
    transport: T,
    rng: R,
    server_url: String,
    app_id: String,
    user_key: SigningPrivateKey,
    device_key: SigningPrivateKey,
    user_info: UserInfo,
    auth_token: AuthToken,
    /// Unconsumed prekeys, keyed by their published public half.
    prekeys: HashMap<AgreementPublicKey, AgreementPrivateKey>,
    /// Unused topic keys, consumed back-to-front.
    topic_keys: Vec<TopicKeys>,
    topics: HashMap<TopicId, Topic>,
}

impl<T: ServerTransport, R: RngCore + CryptoRng> Device<T, R> {
    /// Register a new user with their first device.
    ///
    /// Generates the user and device identities, the initial prekeys and
    /// topic keys, posts the registration bundle, and returns a live device
    /// holding the issued auth token.
    ///
    /// # Errors
    ///
    /// - `InvalidRequest` if name or app id exceed their limits
    /// - `AuthenticationFailed` if the pin is wrong or exhausted
    /// - `InvalidServerData` if the token response is malformed
    pub async fn register(transport: T, mut rng: R, registration: Registration) -> Result<Self> {
        let Registration { server_url, name, pin, app_id, prekey_count, topic_key_count } =
            registration;

        if name.chars().count() > MAX_NAME_LEN {
            return Err(RendezvousError::InvalidRequest { reason: "name too long".to_string() });
        }
        if app_id.len() > MAX_APP_ID_LEN {
            return Err(RendezvousError::InvalidRequest { reason: "app id too long".to_string() });
        }

        let user_key = SigningPrivateKey::generate(&mut rng);
        let device_key = SigningPrivateKey::generate(&mut rng);

        let now = unix_now();
        let user_info = build_user_info(
            &user_key,
            name.clone(),
            now,
            now,
            vec![DeviceInfo {
                device_key: device_key.public(),
                creation_time: now,
                is_active: true,
                app_id: app_id.clone(),
            }],
        );

        let prekey_secrets: Vec<AgreementPrivateKey> =
            (0..prekey_count).map(|_| AgreementPrivateKey::generate(&mut rng)).collect();
        let prekeys = sign_prekeys(&device_key, &prekey_secrets);

        let topic_keys: Vec<TopicKeys> =
            (0..topic_key_count).map(|_| TopicKeys::generate(&user_key, &mut rng)).collect();

        let bundle = RegistrationBundle {
            user_info: user_info.clone(),
            pin,
            prekeys,
            topic_keys: topic_keys.iter().map(|k| *k.public()).collect(),
        };

        let request = Request::post("user/register", to_bytes(&bundle)?)
            .header(headers::USERNAME, name)
            .header(headers::PIN, pin.to_string());
        let body = transport.request(request).await?;
        if body.is_empty() {
            return Err(RendezvousError::NoDataInResponse);
        }

        let auth_token = AuthToken::from_slice(&body).ok_or_else(|| {
            RendezvousError::InvalidServerData { reason: "malformed auth token".to_string() }
        })?;

        tracing::debug!(user = %encode_header(user_info.user_key.as_bytes()), "registered");

        Ok(Self {
            transport,
            rng,
            server_url,
            app_id,
            user_key,
            device_key,
            user_info,
            auth_token,
            prekeys: prekey_secrets.into_iter().map(|s| (s.public(), s)).collect(),
            topic_keys,
            topics: HashMap::new(),
        })
    }

    /// Restore a device from a blob produced by [`Device::export`].
    ///
    /// # Errors
    ///
    /// `InvalidServerData` if the blob does not decode.
    pub fn import(bytes: &[u8], transport: T, rng: R) -> Result<Self> {
        let data = ClientData::from_bytes(bytes)?;

        Ok(Self {
            transport,
            rng,
            server_url: data.server_url,
            app_id: data.app_id,
            user_key: data.user_key,
            device_key: data.device_key,
            user_info: data.user_info,
            auth_token: data.auth_token,
            prekeys: data.prekeys.into_iter().map(|p| (p.public, p.secret)).collect(),
            topic_keys: data.topic_keys,
            topics: data.topics.into_iter().map(|t| (t.id(), t)).collect(),
        })
    }

    /// Serialize the complete observable state into one blob.
    ///
    /// # Errors
    ///
    /// `SerializationFailed` if encoding fails.
    pub fn export(&self) -> Result<Vec<u8>> {
        let mut prekeys: Vec<PrekeyPair> = self
            .prekeys
            .iter()
            .map(|(public, secret)| PrekeyPair { public: *public, secret: secret.clone() })
            .collect();
        // The live store is a map; fix an order so exports are comparable.
        prekeys.sort_by_key(|p| *p.public.as_bytes());

        let mut topics: Vec<Topic> = self.topics.values().cloned().collect();
        topics.sort_by_key(|t| *t.id().as_bytes());

        ClientData {
            server_url: self.server_url.clone(),
            app_id: self.app_id.clone(),
            user_key: self.user_key.clone(),
            device_key: self.device_key.clone(),
            user_info: self.user_info.clone(),
            auth_token: self.auth_token,
            prekeys,
            topic_keys: self.topic_keys.clone(),
            topics,
        }
        .to_bytes()
    }

    /// The user's public identity key.
    pub fn user_key(&self) -> SigningPublicKey {
        self.user_key.public()
    }

    /// This device's public identity key.
    pub fn device_key(&self) -> SigningPublicKey {
        self.device_key.public()
    }

    /// The current signed user record.
    pub fn user_info(&self) -> &UserInfo {
        &self.user_info
    }

    /// A known topic, if any.
    pub fn topic(&self, id: &TopicId) -> Option<&Topic> {
        self.topics.get(id)
    }

    /// Ids of all known topics.
    pub fn topic_ids(&self) -> Vec<TopicId> {
        self.topics.keys().copied().collect()
    }

    /// Number of unconsumed prekeys.
    pub fn prekey_count(&self) -> usize {
        self.prekeys.len()
    }

    /// Number of unused topic keys.
    pub fn topic_key_count(&self) -> usize {
        self.topic_keys.len()
    }

    /// Unauthenticated server health check.
    pub async fn ping(&self) -> Result<()> {
        self.transport.request(Request::get("ping")).await.map(|_| ())
    }

    /// Generate `count` prekeys, publish them, and add them to the store.
    ///
    /// The store is keyed by the public half, so republishing can never
    /// create duplicates; its key set is exactly the unconsumed prekeys.
    pub async fn upload_prekeys(&mut self, count: u32) -> Result<()> {
        let secrets: Vec<AgreementPrivateKey> =
            (0..count).map(|_| AgreementPrivateKey::generate(&mut self.rng)).collect();
        let upload = PrekeyUpload { prekeys: sign_prekeys(&self.device_key, &secrets) };

        let request =
            Request::post("device/prekeys", to_bytes(&upload)?).headers(self.auth_headers());
        self.transport.request(request).await?;

        for secret in secrets {
            self.prekeys.insert(secret.public(), secret);
        }
        tracing::debug!(count, total = self.prekeys.len(), "prekeys uploaded");
        Ok(())
    }

    /// Fetch the authoritative user record and merge it.
    ///
    /// Returns the device-diff events.
    ///
    /// # Errors
    ///
    /// - `NoDataInResponse` if the server returned nothing
    /// - Any [`merge_user_info`] rejection
    pub async fn update_user_info(&mut self) -> Result<Vec<Event>> {
        let request = Request::get("user/info").headers(self.auth_headers());
        let body = self.transport.request(request).await?;
        if body.is_empty() {
            return Err(RendezvousError::NoDataInResponse);
        }

        let info: UserInfo = from_bytes(&body)?;
        let (merged, events) = merge_user_info(&self.user_info, info)?;
        self.user_info = merged;
        Ok(events)
    }

    /// Generate fresh topic keys and distribute them to all other devices.
    ///
    /// Requests one prekey per peer device per new key, verifies the
    /// returned bundle against the current user record, wraps each new
    /// topic key for each peer device, and posts the distribution. The
    /// generated keys join the unused pool only after the server accepts.
    ///
    /// # Errors
    ///
    /// - `InvalidServerData` if the prekey bundle misses a device, includes
    ///   an unknown one, or has the wrong per-device count
    /// - `InvalidSignature` if any prekey fails its device signature
    pub async fn upload_topic_keys(&mut self, count: u32) -> Result<()> {
        let request = Request::get("user/prekeys")
            .headers(self.auth_headers())
            .header(headers::COUNT, count.to_string())
            .header(headers::APP, self.app_id.clone());
        let body = self.transport.request(request).await?;
        if body.is_empty() {
            return Err(RendezvousError::NoDataInResponse);
        }

        let bundle: DevicePrekeyBundle = from_bytes(&body)?;
        self.check_prekey_bundle(&bundle)?;

        let fresh: Vec<TopicKeys> =
            (0..bundle.key_count).map(|_| TopicKeys::generate(&self.user_key, &mut self.rng)).collect();

        let mut messages = Vec::with_capacity(bundle.devices.len());
        for entry in &bundle.devices {
            let mut wrapped = Vec::with_capacity(fresh.len());
            for (key, prekey) in fresh.iter().zip(&entry.prekeys) {
                wrapped.push(key.wrap_for(&prekey.key, &mut self.rng));
            }
            messages.push(DeviceTopicKeys { device_key: entry.device_key, messages: wrapped });
        }

        let upload = TopicKeyBundle {
            topic_keys: fresh.iter().map(|k| *k.public()).collect(),
            messages,
        };
        let request =
            Request::post("user/topickeys", to_bytes(&upload)?).headers(self.auth_headers());
        self.transport.request(request).await?;

        tracing::debug!(count = fresh.len(), "topic keys uploaded");
        self.topic_keys.extend(fresh);
        Ok(())
    }

    /// Create a topic with the given members and roles.
    ///
    /// Fetches one topic key per requested user (users without an available
    /// key are silently dropped by the server), consumes one of our own
    /// topic keys, and posts the signed topic. The creator is member 0 with
    /// role `Admin`.
    ///
    /// # Errors
    ///
    /// - `InvalidRequest` if our own topic-key pool is empty
    /// - `InvalidSignature` if a fetched topic key fails its binding
    /// - `InvalidServerData` if the server returned keys for users we never
    ///   asked about
    pub async fn create_topic(
        &mut self,
        members: &[(SigningPublicKey, Role)],
    ) -> Result<TopicId> {
        let users: Vec<SigningPublicKey> = members.iter().map(|(key, _)| *key).collect();
        let request = Request::post("users/topickey", to_bytes(&TopicKeyRequest { users })?)
            .headers(self.auth_headers());
        let body = self.transport.request(request).await?;
        if body.is_empty() {
            return Err(RendezvousError::NoDataInResponse);
        }

        let response: TopicKeyResponse = from_bytes(&body)?;
        verify_topic_key_response(&response)?;
        for bundle in &response.keys {
            if !members.iter().any(|(key, _)| key == &bundle.user_key) {
                return Err(RendezvousError::InvalidServerData {
                    reason: "topic key for a user we did not request".to_string(),
                });
            }
        }

        let own = self.topic_keys.pop().ok_or_else(|| RendezvousError::InvalidRequest {
            reason: "no unused topic key available".to_string(),
        })?;

        let message_key = MessageKey::generate(&mut self.rng);
        let topic_id = TopicId(random_array(&mut self.rng));
        let now = unix_now();

        let mut member_records =
            vec![encrypt_member_key(own.public(), Role::Admin, &message_key, &mut self.rng)];
        for bundle in &response.keys {
            // Checked above: every returned key maps to a requested member.
            let Some((_, role)) = members.iter().find(|(key, _)| key == &bundle.user_key) else {
                continue;
            };
            member_records.push(encrypt_member_key(bundle, *role, &message_key, &mut self.rng));
        }

        let signature =
            own.signing().sign(&topic_signing_bytes(&topic_id, now, now, &member_records));
        let record = TopicRecord {
            id: topic_id,
            creation_time: now,
            timestamp: now,
            members: member_records,
            signature,
        };

        let request =
            Request::post("topic/create", to_bytes(&record)?).headers(self.auth_headers());
        self.transport.request(request).await?;

        let members_local = record.members.iter().map(Member::from_record).collect();
        let (signing, encryption) = own.into_parts();
        let topic =
            Topic::new(topic_id, now, now, members_local, message_key, signing, encryption);
        self.topics.insert(topic_id, topic);

        tracing::debug!(topic = %topic_id, "topic created");
        Ok(topic_id)
    }

    /// Post a content update to a topic.
    ///
    /// Encrypts the files (file id as nonce) and the metadata under the
    /// topic message key, signs the update, and posts it. Returns the local
    /// update built from the server's chain state. Local topic state is not
    /// mutated here: the update is applied when it comes back through the
    /// receive path, the single reconciliation point.
    ///
    /// # Errors
    ///
    /// - `InvalidRequest` if we are not a member or metadata is oversized
    /// - `NoPermissionToWrite` if our role is `Observer`
    pub async fn upload(
        &mut self,
        topic_id: TopicId,
        metadata: &[u8],
        files: &[OutgoingFile],
    ) -> Result<Update> {
        let topic = self.topics.get(&topic_id).ok_or_else(unknown_topic)?;

        let sender_index =
            topic.member_index(&self.user_key.public()).ok_or_else(|| {
                RendezvousError::InvalidRequest { reason: "not a topic member".to_string() }
            })?;
        let role = topic.members()[sender_index].role;
        if !role.can_write() {
            return Err(RendezvousError::NoPermissionToWrite);
        }
        if metadata.len() > MAX_METADATA_LEN {
            return Err(RendezvousError::InvalidRequest {
                reason: "metadata too large".to_string(),
            });
        }

        let mut records = Vec::with_capacity(files.len());
        let mut uploads = Vec::with_capacity(files.len());
        for file in files {
            let sealed = seal_file(topic.message_key(), &file.id, &file.data);
            let record =
                FileRecord { id: file.id, tag: sealed.tag, hash: sha256(&sealed.ciphertext) };
            records.push(record);
            uploads.push(FileUpload { record, ciphertext: sealed.ciphertext });
        }

        let sealed_metadata = seal(topic.message_key(), metadata, &mut self.rng);
        let signature = topic.signing_key().sign(&update_signing_bytes(
            &topic_id,
            sender_index as u32,
            &sealed_metadata,
            &records,
        ));

        let upload = UpdateUpload {
            topic_id,
            sender_index: sender_index as u32,
            metadata: sealed_metadata,
            files: uploads,
            signature,
        };

        let request =
            Request::post("topic/message", to_bytes(&upload)?).headers(self.auth_headers());
        let body = self.transport.request(request).await?;
        if body.is_empty() {
            return Err(RendezvousError::NoDataInResponse);
        }
        let state: ChainState = from_bytes(&body)?;

        tracing::debug!(topic = %topic_id, chain_index = state.chain_index, "update posted");

        Ok(Update {
            topic_id,
            chain_index: state.chain_index,
            output: state.output,
            sender: self.user_key.public(),
            metadata: metadata.to_vec(),
            files: records,
            signature,
        })
    }

    /// Download and decrypt a file attached to a verified update.
    ///
    /// # Errors
    ///
    /// `InvalidFile` if the ciphertext hash or the GCM tag does not match
    /// the descriptor.
    pub async fn get_file(&self, topic_id: TopicId, file: &FileRecord) -> Result<Vec<u8>> {
        let topic = self.topics.get(&topic_id).ok_or_else(unknown_topic)?;

        let path = format!(
            "files/{}/{}",
            encode_segment(topic_id.as_bytes()),
            encode_segment(&file.id)
        );
        let ciphertext = self.transport.request(Request::get(path).headers(self.auth_headers())).await?;

        if sha256(&ciphertext) != file.hash {
            return Err(RendezvousError::InvalidFile {
                reason: "ciphertext hash mismatch".to_string(),
            });
        }

        open_file(topic.message_key(), &file.id, &ciphertext, &file.tag).map_err(|_| {
            RendezvousError::InvalidFile { reason: "authentication failed".to_string() }
        })
    }

    /// Download everything waiting for this device and run the receive
    /// pipeline.
    ///
    /// Processing order inside a batch is fixed: user-info update, topic-key
    /// messages, topic add/update events, content updates, receipts.
    pub async fn get_messages(&mut self) -> Result<Vec<Event>> {
        let request = Request::get("device/messages").headers(self.auth_headers());
        let body = self.transport.request(request).await?;

        let envelope: DeviceDownload =
            if body.is_empty() { DeviceDownload::default() } else { from_bytes(&body)? };
        self.process_download(envelope)
    }

    /// Decode and ingest a single pushed topic-key message.
    pub fn receive_pushed_topic_key(&mut self, payload: &[u8]) -> Result<Vec<Event>> {
        let message: TopicKeyMessage = from_bytes(payload)?;
        self.accept_topic_key_message(&message)?;
        Ok(Vec::new())
    }

    /// Decode and ingest a single pushed topic record.
    pub fn receive_pushed_topic(&mut self, payload: &[u8]) -> Result<Vec<Event>> {
        let record: TopicRecord = from_bytes(payload)?;
        self.ingest_topic_record(record)
    }

    /// Decode and ingest a single pushed content update.
    pub fn receive_pushed_message(&mut self, payload: &[u8]) -> Result<Vec<Event>> {
        let message: MessageRecord = from_bytes(payload)?;
        self.ingest_message(message)
    }

    fn process_download(&mut self, envelope: DeviceDownload) -> Result<Vec<Event>> {
        let mut events = Vec::new();

        if let Some(info) = envelope.user_info {
            let (merged, info_events) = merge_user_info(&self.user_info, info)?;
            self.user_info = merged;
            events.extend(info_events);
        }

        for message in &envelope.topic_key_messages {
            self.accept_topic_key_message(message)?;
        }

        for record in envelope.topics {
            events.extend(self.ingest_topic_record(record)?);
        }

        for message in envelope.messages {
            events.extend(self.ingest_message(message)?);
        }

        for receipt in envelope.receipts {
            if let Some(event) = ingest_receipt(receipt) {
                events.push(event);
            }
        }

        Ok(events)
    }

    /// Accept a topic key sent by one of our other devices, consuming the
    /// referenced prekey.
    fn accept_topic_key_message(&mut self, message: &TopicKeyMessage) -> Result<()> {
        let secret = self.prekeys.get(&message.device_prekey).ok_or_else(|| {
            RendezvousError::Unknown { reason: "no matching prekey".to_string() }
        })?;

        let keys = TopicKeys::accept(message, secret, &self.user_key.public())?;
        self.prekeys.remove(&message.device_prekey);
        self.topic_keys.push(keys);
        Ok(())
    }

    fn ingest_topic_record(&mut self, record: TopicRecord) -> Result<Vec<Event>> {
        if let Some(existing) = self.topics.get_mut(&record.id) {
            if record.timestamp <= existing.timestamp() {
                return Ok(Vec::new());
            }

            // Membership update: the record must still be signed by the
            // creator we admitted the topic under.
            let stored_creator = existing.members()[0].signature_key;
            let Some(first) = record.members.first() else {
                return Err(RendezvousError::InvalidServerData {
                    reason: "topic record has no members".to_string(),
                });
            };
            if first.signature_key != stored_creator {
                return Err(RendezvousError::InvalidSignature);
            }
            verify_topic_record(&record)?;

            existing.apply_membership(
                record.members.iter().map(Member::from_record).collect(),
                record.timestamp,
            );
            return Ok(vec![Event::TopicUpdated(record.id)]);
        }

        // New topic: find our member entry and the matching topic key.
        verify_topic_record(&record)?;

        let my_index = record.member_index(&self.user_key.public()).ok_or_else(|| {
            RendezvousError::Unknown { reason: "not a member of delivered topic".to_string() }
        })?;
        let my_member = &record.members[my_index];

        let pool_index = self
            .topic_keys
            .iter()
            .position(|k| k.public().signature_key == my_member.signature_key)
            .ok_or_else(|| RendezvousError::Unknown {
                reason: "no topic key matches the member entry".to_string(),
            })?;

        let keys = &self.topic_keys[pool_index];
        let message_key_bytes =
            decrypt_from(keys.encryption(), &my_member.encrypted_message_key)?;
        if message_key_bytes.len() != MESSAGE_KEY_LEN {
            return Err(RendezvousError::InvalidServerData {
                reason: "message key has wrong length".to_string(),
            });
        }
        let message_key = MessageKey::from_slice(&message_key_bytes)?;

        // All checks passed; consume the topic key.
        let keys = self.topic_keys.remove(pool_index);
        let (signing, encryption) = keys.into_parts();

        let topic = Topic::new(
            record.id,
            record.creation_time,
            record.timestamp,
            record.members.iter().map(Member::from_record).collect(),
            message_key,
            signing,
            encryption,
        );
        self.topics.insert(record.id, topic);

        tracing::debug!(topic = %record.id, "topic added");
        Ok(vec![Event::TopicAdded(record.id)])
    }

    fn ingest_message(&mut self, message: MessageRecord) -> Result<Vec<Event>> {
        let topic = self.topics.get_mut(&message.topic_id).ok_or_else(unknown_topic)?;

        let sender = topic
            .member(message.sender_index as usize)
            .ok_or_else(|| RendezvousError::InvalidServerData {
                reason: "sender index out of bounds".to_string(),
            })?;
        let sender_user = sender.user_key;

        sender.signature_key.verify(&message.signing_bytes(), &message.signature)?;

        let metadata = open(topic.message_key(), &message.metadata)?;

        let update = Update {
            topic_id: message.topic_id,
            chain_index: message.chain_index,
            output: message.output,
            sender: sender_user,
            metadata,
            files: message.files,
            signature: message.signature,
        };

        Ok(topic.reconcile(update))
    }

    fn check_prekey_bundle(&self, bundle: &DevicePrekeyBundle) -> Result<()> {
        let our_device = self.device_key.public();
        let peers: Vec<&DeviceInfo> = self
            .user_info
            .devices
            .iter()
            .filter(|d| d.device_key != our_device)
            .collect();

        for entry in &bundle.devices {
            if !peers.iter().any(|d| d.device_key == entry.device_key) {
                return Err(RendezvousError::InvalidServerData {
                    reason: "prekey bundle names an unknown device".to_string(),
                });
            }
            if entry.prekeys.len() != bundle.key_count as usize {
                return Err(RendezvousError::InvalidServerData {
                    reason: "wrong prekey count for device".to_string(),
                });
            }
            for prekey in &entry.prekeys {
                entry.device_key.verify(prekey.signing_bytes(), &prekey.signature)?;
            }
        }

        for peer in &peers {
            if !bundle.devices.iter().any(|e| e.device_key == peer.device_key) {
                return Err(RendezvousError::InvalidServerData {
                    reason: "prekey bundle misses a device".to_string(),
                });
            }
        }

        Ok(())
    }

    fn auth_headers(&self) -> Vec<(&'static str, String)> {
        vec![
            (headers::AUTH, encode_header(self.auth_token.as_bytes())),
            (headers::USER, encode_header(self.user_key.public().as_bytes())),
            (headers::DEVICE, encode_header(self.device_key.public().as_bytes())),
        ]
    }
}

/// Receipts are advisory: anything malformed is dropped, never fatal.
fn ingest_receipt(receipt: ReceiptRecord) -> Option<Event> {
    let sender = match SigningPublicKey::from_slice(&receipt.sender) {
        Ok(key) if key.is_valid() => key,
        _ => {
            tracing::debug!(topic = %receipt.topic_id, "dropping malformed receipt");
            return None;
        },
    };

    Some(Event::ChainStateReceived {
        topic_id: receipt.topic_id,
        chain_index: receipt.chain_index,
        sender,
    })
}

fn sign_prekeys(
    device_key: &SigningPrivateKey,
    secrets: &[AgreementPrivateKey],
) -> Vec<SignedPrekey> {
    secrets
        .iter()
        .map(|secret| {
            let key = secret.public();
            SignedPrekey { key, signature: device_key.sign(key.as_bytes()) }
        })
        .collect()
}

fn unknown_topic() -> RendezvousError {
    RendezvousError::Unknown { reason: "unknown topic".to_string() }
}

fn unix_now() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}
