use aes_gcm::{Aes128Gcm, KeyInit, Nonce, aead::Aead};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hkdf::Hkdf;
use p256::ecdh::diffie_hellman;
use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::{PublicKey, SecretKey};
use sha2::Sha256;

use crate::error::PushError;

/// Record size advertised in the content-coding header.
pub const RECORD_SIZE: u32 = 4096;

const SALT_LEN: usize = 16;
const AUTH_SECRET_LEN: usize = 16;
const PUBLIC_KEY_LEN: usize = 65;
const TAG_LEN: usize = 16;

/// salt || record size || key id length || key id
pub const HEADER_LEN: usize = SALT_LEN + 4 + 1 + PUBLIC_KEY_LEN;

/// Largest payload that fits the single 4096-byte record push services accept.
pub const MAX_PAYLOAD_LEN: usize = RECORD_SIZE as usize - HEADER_LEN - TAG_LEN - 1;

/// Encrypt `plaintext` for a subscription using the `aes128gcm` content
/// coding (RFC 8188) with Web Push key derivation (RFC 8291).
///
/// `ua_public` is the subscription's `p256dh` key (uncompressed SEC1 point)
/// and `auth_secret` its 16-byte `auth` value. A fresh sender key pair and
/// salt are generated per message.
pub fn encrypt(ua_public: &[u8], auth_secret: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, PushError> {
    let as_secret = SecretKey::random(&mut rand_core::OsRng);
    let salt: [u8; SALT_LEN] = rand::random();
    encrypt_with(&as_secret, &salt, ua_public, auth_secret, plaintext)
}

fn encrypt_with(
    as_secret: &SecretKey,
    salt: &[u8; SALT_LEN],
    ua_public: &[u8],
    auth_secret: &[u8],
    plaintext: &[u8],
) -> Result<Vec<u8>, PushError> {
    if plaintext.len() > MAX_PAYLOAD_LEN {
        return Err(PushError::Encryption(format!(
            "payload is {} bytes, limit is {}",
            plaintext.len(),
            MAX_PAYLOAD_LEN
        )));
    }
    if auth_secret.len() != AUTH_SECRET_LEN {
        return Err(PushError::InvalidSubscription(format!(
            "auth secret must be {} bytes, got {}",
            AUTH_SECRET_LEN,
            auth_secret.len()
        )));
    }

    let ua_key = PublicKey::from_sec1_bytes(ua_public)
        .map_err(|_| PushError::InvalidSubscription("p256dh is not a P-256 public key".into()))?;
    let ua_point = ua_key.to_encoded_point(false);
    let as_point = as_secret.public_key().to_encoded_point(false);

    let shared = diffie_hellman(as_secret.to_nonzero_scalar(), ua_key.as_affine());

    let mut key_info = Vec::with_capacity(14 + 2 * PUBLIC_KEY_LEN);
    key_info.extend_from_slice(b"WebPush: info\0");
    key_info.extend_from_slice(ua_point.as_bytes());
    key_info.extend_from_slice(as_point.as_bytes());

    let mut ikm = [0u8; 32];
    Hkdf::<Sha256>::new(Some(auth_secret), shared.raw_secret_bytes().as_slice())
        .expand(&key_info, &mut ikm)
        .map_err(|e| PushError::Encryption(e.to_string()))?;

    let prk = Hkdf::<Sha256>::new(Some(salt.as_slice()), &ikm);
    let mut cek = [0u8; 16];
    prk.expand(b"Content-Encoding: aes128gcm\0", &mut cek)
        .map_err(|e| PushError::Encryption(e.to_string()))?;
    let mut nonce = [0u8; 12];
    prk.expand(b"Content-Encoding: nonce\0", &mut nonce)
        .map_err(|e| PushError::Encryption(e.to_string()))?;

    // Single final record: payload followed by the 0x02 delimiter, no padding.
    let mut record = Vec::with_capacity(plaintext.len() + 1);
    record.extend_from_slice(plaintext);
    record.push(0x02);

    let cipher = Aes128Gcm::new_from_slice(&cek).map_err(|e| PushError::Encryption(e.to_string()))?;
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), record.as_slice())
        .map_err(|e| PushError::Encryption(e.to_string()))?;

    let mut body = Vec::with_capacity(HEADER_LEN + ciphertext.len());
    body.extend_from_slice(salt);
    body.extend_from_slice(&RECORD_SIZE.to_be_bytes());
    body.push(PUBLIC_KEY_LEN as u8);
    body.extend_from_slice(as_point.as_bytes());
    body.extend_from_slice(&ciphertext);
    Ok(body)
}

/// Decode a key as browsers serialize them: base64url, usually unpadded.
/// Standard-alphabet and padded input is accepted too.
pub fn decode_key(encoded: &str) -> Result<Vec<u8>, base64::DecodeError> {
    let normalized: String = encoded
        .trim()
        .trim_end_matches('=')
        .chars()
        .map(|c| match c {
            '+' => '-',
            '/' => '_',
            other => other,
        })
        .collect();
    URL_SAFE_NO_PAD.decode(normalized)
}
