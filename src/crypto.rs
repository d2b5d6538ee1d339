// SPDX-License-Identifier: MIT

//! Crypto primitives shared by the token, cookie and session layers.
//!
//! - `cipher`/`decipher`: AES-256-GCM with a per-message HKDF-derived key
//! - `hmac_hex`: keyed digests for storing access-token references
//! - `safe_compare`: constant-time equality for OTP/signature checks

use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM, NONCE_LEN};
use ring::rand::{SecureRandom, SystemRandom};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

const SALT_LEN: usize = 16;
const HKDF_INFO: &[u8] = b"parceld.cipher.v1";

/// Errors from the crypto primitives. Deliberately opaque: callers map
/// these to a generic authentication failure.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("encryption failed")]
    Encrypt,
    #[error("decryption failed")]
    Decrypt,
    #[error("malformed ciphertext")]
    Malformed,
    #[error("random generator failure")]
    Rng,
}

/// Encrypted payload as stored at rest and embedded in activation JWTs.
/// All fields are hex-encoded; the GCM tag is appended to `data`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EncryptedPayload {
    pub salt: String,
    pub iv: String,
    pub data: String,
}

/// Encrypt `plaintext` under a key derived from `secret` and a random salt.
pub fn cipher(plaintext: &[u8], secret: &str) -> Result<EncryptedPayload, CryptoError> {
    let rng = SystemRandom::new();

    let mut salt = [0u8; SALT_LEN];
    rng.fill(&mut salt).map_err(|_| CryptoError::Rng)?;

    let mut iv = [0u8; NONCE_LEN];
    rng.fill(&mut iv).map_err(|_| CryptoError::Rng)?;

    let key = derive_key(secret, &salt)?;
    let nonce = Nonce::assume_unique_for_key(iv);

    let mut buf = plaintext.to_vec();
    key.seal_in_place_append_tag(nonce, Aad::empty(), &mut buf)
        .map_err(|_| CryptoError::Encrypt)?;

    Ok(EncryptedPayload {
        salt: hex::encode(salt),
        iv: hex::encode(iv),
        data: hex::encode(buf),
    })
}

/// Decrypt a payload produced by [`cipher`]. Fails closed on tamper or
/// wrong secret.
pub fn decipher(payload: &EncryptedPayload, secret: &str) -> Result<Vec<u8>, CryptoError> {
    let salt = hex::decode(&payload.salt).map_err(|_| CryptoError::Malformed)?;
    let iv = hex::decode(&payload.iv).map_err(|_| CryptoError::Malformed)?;
    let mut data = hex::decode(&payload.data).map_err(|_| CryptoError::Malformed)?;

    let iv: [u8; NONCE_LEN] = iv.try_into().map_err(|_| CryptoError::Malformed)?;

    let key = derive_key(secret, &salt)?;
    let nonce = Nonce::assume_unique_for_key(iv);

    let plaintext = key
        .open_in_place(nonce, Aad::empty(), &mut data)
        .map_err(|_| CryptoError::Decrypt)?;

    Ok(plaintext.to_vec())
}

fn derive_key(secret: &str, salt: &[u8]) -> Result<LessSafeKey, CryptoError> {
    let hk = Hkdf::<Sha256>::new(Some(salt), secret.as_bytes());
    let mut key_bytes = [0u8; 32];
    hk.expand(HKDF_INFO, &mut key_bytes)
        .map_err(|_| CryptoError::Encrypt)?;

    let unbound = UnboundKey::new(&AES_256_GCM, &key_bytes).map_err(|_| CryptoError::Encrypt)?;
    Ok(LessSafeKey::new(unbound))
}

/// Keyed HMAC-SHA256 hex digest. The only form in which an access token
/// is ever persisted.
pub fn hmac_hex(secret: &str, data: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts keys of any length");
    mac.update(data.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// One-way SHA-256 hex digest, used for password-reset tokens.
pub fn hash_hex(data: &str) -> String {
    hex::encode(Sha256::digest(data.as_bytes()))
}

/// Constant-time equality. A length mismatch returns false without
/// comparing content; equal-length inputs are compared without
/// content-dependent branches.
pub fn safe_compare(a: &str, b: &str) -> bool {
    let a = a.as_bytes();
    let b = b.as_bytes();
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}

/// Cryptographically random 32-byte hex string.
pub fn random_hex_string() -> String {
    let rng = SystemRandom::new();
    let mut bytes = [0u8; 32];
    // SystemRandom failures are not recoverable at this layer.
    rng.fill(&mut bytes).expect("system RNG unavailable");
    hex::encode(bytes)
}

/// Uniform random 6-digit OTP in `[100000, 999999]`.
pub fn generate_otp() -> u32 {
    use rand::Rng;
    rand::thread_rng().gen_range(100_000..=999_999)
}
