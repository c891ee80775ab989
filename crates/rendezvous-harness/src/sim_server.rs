//! In-memory simulation server.
//!
//! Implements every endpoint of the Rendezvous server against process-local
//! state. The server behaves like the production one for the happy paths
//! (auth checks, prekey accounting, topic-key pools, chain folding, message
//! fan-out, receipt generation) while staying fully deterministic (seeded
//! RNG) and synchronous.
//!
//! Tests explicitly drive the server through the client transport; helper
//! methods expose enough internals to simulate a hostile courier
//! (reordering deliveries, corrupting stored files).

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::{SystemTime, UNIX_EPOCH},
};

use rand::{Rng, RngCore, SeedableRng, rngs::StdRng};
use rendezvous_client::{Method, Request, ServerTransport, decode_header, decode_segment, headers};
use rendezvous_core::{RendezvousError, Result, chain_output};
use rendezvous_crypto::SigningPublicKey;
use rendezvous_proto::{
    AUTH_TOKEN_LEN, AllowedUser, AuthToken, ChainState, DeviceDownload, DevicePrekeyBundle,
    DevicePrekeys, FILE_ID_LEN, MessageRecord, PIN_EXPIRY_SECS, PIN_MODULUS, PIN_RETRIES,
    PrekeyUpload, ReceiptRecord, RegistrationBundle, SignedPrekey, TopicId, TopicKeyBundle,
    TopicKeyPublic, TopicKeyRequest, TopicKeyResponse, TopicRecord, UpdateUpload, UserInfo,
    from_bytes, to_bytes,
};

/// Pin allowance handed out by `user/allow`.
struct Allowance {
    pin: u32,
    expiry: u64,
    attempts_left: u32,
}

/// Per-device server state.
#[derive(Default)]
struct DeviceState {
    prekeys: Vec<SignedPrekey>,
    inbox: DeviceDownload,
}

/// Per-user server state.
struct UserState {
    info: UserInfo,
    token: AuthToken,
    topic_keys: Vec<TopicKeyPublic>,
    devices: HashMap<[u8; 32], DeviceState>,
}

/// Per-topic server state: the record plus the authoritative chain fold.
struct ServerTopic {
    record: TopicRecord,
    chain_index: u32,
    output: Vec<u8>,
}

struct State {
    rng: StdRng,
    admin_token: AuthToken,
    allowed: HashMap<String, Allowance>,
    users: HashMap<[u8; 32], UserState>,
    topics: HashMap<TopicId, ServerTopic>,
    files: HashMap<(TopicId, [u8; FILE_ID_LEN]), Vec<u8>>,
}

impl State {
    fn fresh(rng: StdRng) -> Self {
        Self {
            rng,
            admin_token: AuthToken::ZERO,
            allowed: HashMap::new(),
            users: HashMap::new(),
            topics: HashMap::new(),
            files: HashMap::new(),
        }
    }
}

/// In-memory Rendezvous server. Cheap to clone; clones share state, so every
/// device in a test talks to the same server.
#[derive(Clone)]
pub struct SimServer {
    state: Arc<Mutex<State>>,
}

impl Default for SimServer {
    fn default() -> Self {
        Self::new()
    }
}

impl SimServer {
    /// Create a server with a fixed default seed.
    pub fn new() -> Self {
        Self::seeded(0x5EED)
    }

    /// Create a server with an explicit RNG seed.
    pub fn seeded(seed: u64) -> Self {
        Self { state: Arc::new(Mutex::new(State::fresh(StdRng::seed_from_u64(seed)))) }
    }

    /// Take all undelivered content updates for a device, bypassing the
    /// download endpoint. Lets tests re-deliver them in any order through
    /// the push entry points.
    pub fn drain_messages(&self, device: &SigningPublicKey) -> Vec<MessageRecord> {
        let mut state = self.lock();
        for user in state.users.values_mut() {
            if let Some(entry) = user.devices.get_mut(device.as_bytes()) {
                return std::mem::take(&mut entry.inbox.messages);
            }
        }
        Vec::new()
    }

    /// Flip one byte of a stored file ciphertext.
    pub fn corrupt_file(&self, topic_id: TopicId, file_id: [u8; FILE_ID_LEN]) {
        let mut state = self.lock();
        if let Some(ciphertext) = state.files.get_mut(&(topic_id, file_id)) {
            if let Some(byte) = ciphertext.first_mut() {
                *byte ^= 0xFF;
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        // Lock poisoning only happens if a test already panicked.
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn dispatch(&self, request: Request) -> Result<Vec<u8>> {
        let mut state = self.lock();
        let path: Vec<&str> = request.path.split('/').collect();

        tracing::debug!(path = %request.path, "sim server request");

        match (request.method, path.as_slice()) {
            (Method::Get, ["ping"]) => Ok(Vec::new()),

            (Method::Get, ["admin", "renew"]) => {
                check_admin(&state, &request)?;
                let mut token = [0u8; AUTH_TOKEN_LEN];
                state.rng.fill_bytes(&mut token);
                state.admin_token = AuthToken(token);
                Ok(token.to_vec())
            },

            (Method::Get, ["admin", "reset"]) => {
                check_admin(&state, &request)?;
                let rng = StdRng::seed_from_u64(state.rng.next_u64());
                *state = State::fresh(rng);
                Ok(Vec::new())
            },

            (Method::Post, ["user", "allow"]) => {
                check_admin(&state, &request)?;
                let name = header(&request, headers::USERNAME)
                    .ok_or_else(|| bad_request("missing username"))?
                    .to_string();

                let pin = state.rng.gen_range(0..PIN_MODULUS);
                let expiry = unix_now() + PIN_EXPIRY_SECS;
                state
                    .allowed
                    .insert(name, Allowance { pin, expiry, attempts_left: PIN_RETRIES });

                Ok(to_bytes(&AllowedUser { pin, expiry })?)
            },

            (Method::Post, ["user", "register"]) => register(&mut state, &request.body),

            (Method::Post, ["device", "prekeys"]) => {
                let (user, device) = check_device(&state, &request)?;
                let upload: PrekeyUpload = decode(&request.body)?;

                let device_key = SigningPublicKey::from_bytes(device);
                for prekey in &upload.prekeys {
                    device_key
                        .verify(prekey.signing_bytes(), &prekey.signature)
                        .map_err(|_| RendezvousError::InvalidSignature)?;
                }

                let entry = device_entry(&mut state, user, device)?;
                entry.prekeys.extend(upload.prekeys);
                Ok(Vec::new())
            },

            (Method::Get, ["user", "prekeys"]) => {
                let (user, device) = check_device(&state, &request)?;
                let count: u32 = header(&request, headers::COUNT)
                    .and_then(|v| v.parse().ok())
                    .ok_or_else(|| bad_request("missing count"))?;
                prekey_bundle(&mut state, user, device, count)
            },

            (Method::Post, ["user", "topickeys"]) => {
                let (user, device) = check_device(&state, &request)?;
                let bundle: TopicKeyBundle = decode(&request.body)?;
                accept_topic_keys(&mut state, user, device, bundle)
            },

            (Method::Post, ["users", "topickey"]) => {
                check_device(&state, &request)?;
                let wanted: TopicKeyRequest = decode(&request.body)?;

                let mut keys = Vec::new();
                for user_key in wanted.users {
                    if let Some(user) = state.users.get_mut(user_key.as_bytes()) {
                        if let Some(key) = user.topic_keys.pop() {
                            keys.push(key);
                        }
                    }
                }
                Ok(to_bytes(&TopicKeyResponse { keys })?)
            },

            (Method::Post, ["topic", "create"]) => {
                let (_, device) = check_device(&state, &request)?;
                let record: TopicRecord = decode(&request.body)?;
                create_topic(&mut state, device, record)
            },

            (Method::Post, ["topic", "message"]) => {
                let (_, device) = check_device(&state, &request)?;
                let upload: UpdateUpload = decode(&request.body)?;
                post_update(&mut state, device, upload)
            },

            (Method::Get, ["device", "messages"]) => {
                let (user, device) = check_device(&state, &request)?;
                download(&mut state, user, device)
            },

            (Method::Get, ["user", "info"]) => {
                let (user, _) = check_device(&state, &request)?;
                let user = state.users.get(&user).ok_or(RendezvousError::AuthenticationFailed)?;
                Ok(to_bytes(&user.info)?)
            },

            (Method::Get, ["files", topic, file]) => {
                check_device(&state, &request)?;
                let topic_id = decode_segment(topic)
                    .and_then(|b| b.try_into().ok().map(TopicId))
                    .ok_or_else(|| bad_request("bad topic id"))?;
                let file_id: [u8; FILE_ID_LEN] = decode_segment(file)
                    .and_then(|b| b.try_into().ok())
                    .ok_or_else(|| bad_request("bad file id"))?;

                state
                    .files
                    .get(&(topic_id, file_id))
                    .cloned()
                    .ok_or_else(|| bad_request("no such file"))
            },

            _ => Err(RendezvousError::Unknown { reason: format!("no route: {}", request.path) }),
        }
    }
}

impl ServerTransport for SimServer {
    async fn request(&self, request: Request) -> Result<Vec<u8>> {
        self.dispatch(request)
    }
}

fn header<'a>(request: &'a Request, name: &str) -> Option<&'a str> {
    request.headers.iter().find(|(n, _)| *n == name).map(|(_, v)| v.as_str())
}

fn bad_request(reason: &str) -> RendezvousError {
    RendezvousError::InvalidRequest { reason: reason.to_string() }
}

fn decode<T: serde::de::DeserializeOwned>(body: &[u8]) -> Result<T> {
    from_bytes(body).map_err(|_| bad_request("undecodable body"))
}

fn check_admin(state: &State, request: &Request) -> Result<()> {
    let token = header(request, headers::AUTH)
        .and_then(decode_header)
        .and_then(|b| AuthToken::from_slice(&b));
    if token != Some(state.admin_token) {
        return Err(RendezvousError::AuthenticationFailed);
    }
    Ok(())
}

/// Validate the device auth header triple. Returns (user key, device key)
/// raw bytes.
fn check_device(state: &State, request: &Request) -> Result<([u8; 32], [u8; 32])> {
    let user: [u8; 32] = header(request, headers::USER)
        .and_then(decode_header)
        .and_then(|b| b.try_into().ok())
        .ok_or(RendezvousError::AuthenticationFailed)?;
    let device: [u8; 32] = header(request, headers::DEVICE)
        .and_then(decode_header)
        .and_then(|b| b.try_into().ok())
        .ok_or(RendezvousError::AuthenticationFailed)?;
    let token = header(request, headers::AUTH)
        .and_then(decode_header)
        .and_then(|b| AuthToken::from_slice(&b))
        .ok_or(RendezvousError::AuthenticationFailed)?;

    let user_state = state.users.get(&user).ok_or(RendezvousError::AuthenticationFailed)?;
    if user_state.token != token || !user_state.devices.contains_key(&device) {
        return Err(RendezvousError::AuthenticationFailed);
    }
    Ok((user, device))
}

fn device_entry<'a>(
    state: &'a mut State,
    user: [u8; 32],
    device: [u8; 32],
) -> Result<&'a mut DeviceState> {
    state
        .users
        .get_mut(&user)
        .and_then(|u| u.devices.get_mut(&device))
        .ok_or(RendezvousError::AuthenticationFailed)
}

fn register(state: &mut State, body: &[u8]) -> Result<Vec<u8>> {
    let bundle: RegistrationBundle = decode(body)?;
    let info = bundle.user_info;

    let allowance = state
        .allowed
        .get_mut(&info.name)
        .ok_or(RendezvousError::AuthenticationFailed)?;
    if allowance.expiry < unix_now() {
        return Err(RendezvousError::AuthenticationFailed);
    }
    if allowance.pin != bundle.pin {
        allowance.attempts_left = allowance.attempts_left.saturating_sub(1);
        if allowance.attempts_left == 0 {
            state.allowed.remove(&info.name);
        }
        return Err(RendezvousError::AuthenticationFailed);
    }

    info.user_key
        .verify(&info.signing_bytes(), &info.signature)
        .map_err(|_| RendezvousError::InvalidSignature)?;

    if state.users.contains_key(info.user_key.as_bytes()) {
        return Err(RendezvousError::ResourceAlreadyExists);
    }
    let Some(first_device) = info.devices.first() else {
        return Err(bad_request("registration without a device"));
    };

    let mut token = [0u8; AUTH_TOKEN_LEN];
    state.rng.fill_bytes(&mut token);

    let mut devices = HashMap::new();
    devices.insert(
        *first_device.device_key.as_bytes(),
        DeviceState { prekeys: bundle.prekeys, inbox: DeviceDownload::default() },
    );

    state.allowed.remove(&info.name);
    state.users.insert(
        *info.user_key.as_bytes(),
        UserState { info, token: AuthToken(token), topic_keys: bundle.topic_keys, devices },
    );

    Ok(token.to_vec())
}

fn prekey_bundle(
    state: &mut State,
    user: [u8; 32],
    device: [u8; 32],
    count: u32,
) -> Result<Vec<u8>> {
    let user_state = state.users.get_mut(&user).ok_or(RendezvousError::AuthenticationFailed)?;

    let peer_keys: Vec<[u8; 32]> = user_state
        .info
        .devices
        .iter()
        .map(|d| *d.device_key.as_bytes())
        .filter(|k| k != &device)
        .collect();

    let mut devices = Vec::with_capacity(peer_keys.len());
    for peer in peer_keys {
        let entry = user_state
            .devices
            .get_mut(&peer)
            .ok_or_else(|| bad_request("device without server state"))?;
        if entry.prekeys.len() < count as usize {
            return Err(bad_request("not enough prekeys"));
        }
        let remaining = entry.prekeys.split_off(count as usize);
        let handed_out = std::mem::replace(&mut entry.prekeys, remaining);
        devices.push(DevicePrekeys {
            device_key: SigningPublicKey::from_bytes(peer),
            prekeys: handed_out,
        });
    }

    Ok(to_bytes(&DevicePrekeyBundle { key_count: count, devices })?)
}

fn accept_topic_keys(
    state: &mut State,
    user: [u8; 32],
    sender_device: [u8; 32],
    bundle: TopicKeyBundle,
) -> Result<Vec<u8>> {
    let user_state = state.users.get_mut(&user).ok_or(RendezvousError::AuthenticationFailed)?;
    let user_key = SigningPublicKey::from_bytes(user);

    for key in &bundle.topic_keys {
        if key.user_key != user_key {
            return Err(RendezvousError::InvalidTopicKeyUpload);
        }
        user_key
            .verify(&key.signing_bytes(), &key.signature)
            .map_err(|_| RendezvousError::InvalidTopicKeyUpload)?;
    }

    for per_device in &bundle.messages {
        let target = per_device.device_key;
        if target.as_bytes() == &sender_device {
            return Err(RendezvousError::InvalidTopicKeyUpload);
        }
        if !user_state.devices.contains_key(target.as_bytes()) {
            return Err(RendezvousError::InvalidTopicKeyUpload);
        }
    }

    user_state.topic_keys.extend(bundle.topic_keys);
    for per_device in bundle.messages {
        if let Some(entry) = user_state.devices.get_mut(per_device.device_key.as_bytes()) {
            entry.inbox.topic_key_messages.extend(per_device.messages);
        }
    }

    Ok(Vec::new())
}

fn create_topic(state: &mut State, sender_device: [u8; 32], record: TopicRecord) -> Result<Vec<u8>> {
    if state.topics.contains_key(&record.id) {
        return Err(RendezvousError::ResourceAlreadyExists);
    }

    fan_out_topic(state, &record, sender_device);

    let output = record.id.as_bytes().to_vec();
    state.topics.insert(record.id, ServerTopic { record, chain_index: 0, output });

    Ok(Vec::new())
}

/// Deliver a topic record to every member device except the sender's.
fn fan_out_topic(state: &mut State, record: &TopicRecord, sender_device: [u8; 32]) {
    for member in &record.members {
        let Some(user) = state.users.get_mut(member.user_key.as_bytes()) else {
            continue;
        };
        for (device_key, entry) in &mut user.devices {
            if device_key != &sender_device {
                entry.inbox.topics.push(record.clone());
            }
        }
    }
}

fn post_update(
    state: &mut State,
    sender_device: [u8; 32],
    upload: UpdateUpload,
) -> Result<Vec<u8>> {
    let topic = state
        .topics
        .get_mut(&upload.topic_id)
        .ok_or_else(|| bad_request("unknown topic"))?;

    topic.chain_index += 1;
    let output = chain_output(&topic.output, &upload.signature);
    topic.output = output.to_vec();

    let members = topic.record.members.clone();
    let chain_index = topic.chain_index;

    let mut file_records = Vec::with_capacity(upload.files.len());
    for file in upload.files {
        file_records.push(file.record);
        state.files.insert((upload.topic_id, file.record.id), file.ciphertext);
    }

    let message = MessageRecord {
        topic_id: upload.topic_id,
        chain_index,
        output,
        sender_index: upload.sender_index,
        metadata: upload.metadata,
        files: file_records,
        signature: upload.signature,
    };

    for member in &members {
        let Some(user) = state.users.get_mut(member.user_key.as_bytes()) else {
            continue;
        };
        for (device_key, entry) in &mut user.devices {
            if device_key != &sender_device {
                entry.inbox.messages.push(message.clone());
            }
        }
    }

    Ok(to_bytes(&ChainState { chain_index, output })?)
}

/// Drain a device's inbox and generate receipts for what it observed.
fn download(state: &mut State, user: [u8; 32], device: [u8; 32]) -> Result<Vec<u8>> {
    let entry = device_entry(state, user, device)?;
    let envelope = std::mem::take(&mut entry.inbox);

    // Per topic, the highest chain index delivered in this batch.
    let mut observed: HashMap<TopicId, u32> = HashMap::new();
    for message in &envelope.messages {
        let index = observed.entry(message.topic_id).or_insert(0);
        *index = (*index).max(message.chain_index);
    }

    for (topic_id, chain_index) in observed {
        let receipt =
            ReceiptRecord { topic_id, chain_index, sender: user.to_vec() };
        let Some(topic) = state.topics.get(&topic_id) else {
            continue;
        };
        let members = topic.record.members.clone();
        for member in &members {
            let Some(member_user) = state.users.get_mut(member.user_key.as_bytes()) else {
                continue;
            };
            for (device_key, member_entry) in &mut member_user.devices {
                if device_key != &device {
                    member_entry.inbox.receipts.push(receipt.clone());
                }
            }
        }
    }

    Ok(to_bytes(&envelope)?)
}

fn unix_now() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}
