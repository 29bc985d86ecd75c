//! The per-connection / per-frame key schedule.
//!
//! Key derivation is deliberately a set of pure functions: both ends of the
//! connection must be able to compute the same keys from the handshake
//! challenge, the account security key and the frame id alone.

use rc4::consts::U16;
use rc4::{KeyInit, Rc4, StreamCipher};
use sha2::{Digest, Sha256};

/// RC4 key length in bytes.
pub const KEY_LENGTH: usize = 16;

/// Derives the per-connection body key from the handshake challenge and the
/// account security key.
pub fn body_key(challenge: &str, security_key: &str) -> [u8; KEY_LENGTH] {
    let mut hasher = Sha256::new();
    hasher.update(challenge.as_bytes());
    hasher.update(security_key.as_bytes());
    truncate(hasher.finalize().as_slice())
}

/// Derives the per-frame payload key from the account security key and the
/// frame id.
pub fn payload_key(security_key: &str, frame_id: u32) -> [u8; KEY_LENGTH] {
    let mut hasher = Sha256::new();
    hasher.update(security_key.as_bytes());
    hasher.update(b"_");
    hasher.update(frame_id.to_be_bytes());
    truncate(hasher.finalize().as_slice())
}

fn truncate(digest: &[u8]) -> [u8; KEY_LENGTH] {
    let mut key = [0u8; KEY_LENGTH];
    key.copy_from_slice(&digest[..KEY_LENGTH]);
    key
}

/// Applies the RC4 keystream for `key` to `data` in place. RC4 is
/// symmetric, so the same call encrypts and decrypts.
pub fn apply_keystream(key: &[u8; KEY_LENGTH], data: &mut [u8]) {
    let mut cipher = Rc4::<U16>::new(key.into());
    cipher.apply_keystream(data);
}
