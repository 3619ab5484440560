// Telemetry decryption module.
// Invariants: decrypted payloads are never logged or persisted in this layer.

use salsa20::cipher::{KeyIvInit, StreamCipher};
use salsa20::Salsa20;

use crate::constants::{IV_OFFSET, IV_XOR, MAGIC, MIN_ENCRYPTED_SIZE};

const KEY_BYTES: &[u8] = b"Simulator Interface Packet GT7 ver 0.0";

pub fn decrypt_packet(dat: &[u8]) -> Option<Vec<u8>> {
    if dat.len() < MIN_ENCRYPTED_SIZE {
        return None;
    }

    let iv1 = u32::from_le_bytes(dat.get(IV_OFFSET..IV_OFFSET + 4)?.try_into().ok()?);
    let mut out = dat.to_vec();
    apply_keystream(iv1, &mut out);

    let magic = u32::from_le_bytes(out.get(0..4)?.try_into().ok()?);
    if magic != MAGIC {
        return None;
    }

    Some(out)
}

/// Inverse of [`decrypt_packet`] for replay fixtures: the IV lands in clear at 0x40.
pub fn encrypt_packet(plain: &[u8], iv1: u32) -> Vec<u8> {
    let mut out = plain.to_vec();
    if out.len() < MIN_ENCRYPTED_SIZE {
        out.resize(MIN_ENCRYPTED_SIZE, 0);
    }
    apply_keystream(iv1, &mut out);
    out[IV_OFFSET..IV_OFFSET + 4].copy_from_slice(&iv1.to_le_bytes());
    out
}

fn apply_keystream(iv1: u32, buf: &mut [u8]) {
    let iv2 = iv1 ^ IV_XOR;

    let mut nonce = [0u8; 8];
    nonce[0..4].copy_from_slice(&iv2.to_le_bytes());
    nonce[4..8].copy_from_slice(&iv1.to_le_bytes());

    let mut key = [0u8; 32];
    key.copy_from_slice(&KEY_BYTES[0..32]);

    let mut cipher = Salsa20::new(&key.into(), &nonce.into());
    cipher.apply_keystream(buf);
}
