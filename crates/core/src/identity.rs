use chrono::{NaiveDate, NaiveTime};
use rand::{distributions::Alphanumeric, Rng};
use sha2::{Digest, Sha256};

use crate::models::{Device, Role};

pub const INVITE_TOKEN_LENGTH: usize = 32;

pub fn random_token(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

pub fn invite_token() -> String {
    random_token(INVITE_TOKEN_LENGTH)
}

/// Stable external room name, e.g. `class_20261018_1400_k3x9qa`.
pub fn video_room_name(date: NaiveDate, start: NaiveTime) -> String {
    format!(
        "class_{}_{}_{}",
        date.format("%Y%m%d"),
        start.format("%H%M"),
        random_token(6).to_lowercase()
    )
}

/// Provider identity of a participant. Deterministic from role, email and
/// device so two people never collide and one person's devices stay apart.
/// Observer roles get an opaque identity that is stable within the room
/// and reveals nothing on participant rosters.
pub fn participant_identity(key: &str, room_id: &str, role: Role, email: &str, device: Device) -> String {
    if role.is_observer_capable() {
        return observer_identity(key, room_id, email);
    }
    let base = format!("{}_{}", role.as_str(), email.to_lowercase());
    match device {
        Device::Primary => base,
        Device::Screen => format!("{}_screen", base),
    }
}

/// Keyed digest of room and email. Without `key` the identity cannot be
/// recomputed from a roster of staff emails.
pub fn observer_identity(key: &str, room_id: &str, email: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    hasher.update(b"\0");
    hasher.update(room_id.as_bytes());
    hasher.update(b"\0");
    hasher.update(email.to_lowercase().as_bytes());
    let digest = hex::encode(hasher.finalize());
    format!("observer_{}", &digest[..12])
}
