//! Signed user record construction and merging.

use rendezvous_crypto::SigningPrivateKey;
use rendezvous_proto::{DeviceInfo, UserInfo};

use crate::{
    error::{RendezvousError, Result},
    event::Event,
};

/// Build and sign a user record.
///
/// Sorts the devices ascending by creation time before signing, so the
/// produced record always satisfies the ordering invariant receivers check.
pub fn build_user_info(
    user: &SigningPrivateKey,
    name: impl Into<String>,
    creation_time: u64,
    timestamp: u64,
    mut devices: Vec<DeviceInfo>,
) -> UserInfo {
    devices.sort_by_key(|d| d.creation_time);

    let mut info = UserInfo {
        user_key: user.public(),
        name: name.into(),
        creation_time,
        timestamp,
        devices,
        // Placeholder replaced below; signing_bytes ignores the signature.
        signature: user.sign(&[]),
    };
    info.signature = user.sign(&info.signing_bytes());
    info
}

/// Merge an incoming user record into the current one.
///
/// On success returns the record to store and the device-diff events to
/// surface. The caller replaces its stored record atomically.
///
/// # Errors
///
/// - `RequestOutdated` if `incoming.timestamp` does not advance
/// - `InvalidSignature` if the record is not signed by the current user key
/// - `InvalidServerData` if an immutable field changed or the device list
///   ordering is broken
pub fn merge_user_info(current: &UserInfo, incoming: UserInfo) -> Result<(UserInfo, Vec<Event>)> {
    if incoming.timestamp <= current.timestamp {
        return Err(RendezvousError::RequestOutdated);
    }

    // The signature must verify under the key we already trust, not the one
    // the incoming record claims.
    current.user_key.verify(&incoming.signing_bytes(), &incoming.signature)?;

    if incoming.user_key != current.user_key {
        return Err(RendezvousError::InvalidServerData {
            reason: "user key changed".to_string(),
        });
    }
    if incoming.name != current.name {
        return Err(RendezvousError::InvalidServerData { reason: "user name changed".to_string() });
    }
    if incoming.creation_time != current.creation_time {
        return Err(RendezvousError::InvalidServerData {
            reason: "creation time changed".to_string(),
        });
    }
    if !incoming.devices.windows(2).all(|w| w[0].creation_time <= w[1].creation_time) {
        return Err(RendezvousError::InvalidServerData {
            reason: "devices not sorted by creation time".to_string(),
        });
    }

    let mut events = Vec::new();

    for device in &incoming.devices {
        match current.devices.iter().find(|d| d.device_key == device.device_key) {
            None => events.push(Event::UserDeviceAdded(device.clone())),
            Some(existing) if existing != device => {
                events.push(Event::UserDeviceChanged(device.clone()));
            },
            Some(_) => {},
        }
    }
    for device in &current.devices {
        if !incoming.devices.iter().any(|d| d.device_key == device.device_key) {
            events.push(Event::UserDeviceRemoved(device.clone()));
        }
    }

    Ok((incoming, events))
}
