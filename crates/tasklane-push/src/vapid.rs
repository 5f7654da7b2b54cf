use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use p256::SecretKey;
use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::pkcs8::EncodePrivateKey;
use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::encrypt::decode_key;
use crate::error::PushError;

/// Push services reject tokens valid for more than 24 hours.
const TOKEN_LIFETIME_HOURS: i64 = 12;

#[derive(Debug, Serialize, Deserialize)]
struct VapidClaims {
    aud: String,
    exp: i64,
    sub: String,
}

/// Signs the `Authorization: vapid ...` header identifying this server to
/// push services.
pub struct VapidSigner {
    key: EncodingKey,
    public_key: String,
    subject: String,
}

impl VapidSigner {
    /// Build a signer from a base64url raw P-256 private scalar, as printed by
    /// `web-push generate-vapid-keys` and similar tools. `subject` is a
    /// `mailto:` or `https:` contact.
    pub fn new(private_key: &str, subject: impl Into<String>) -> Result<Self, PushError> {
        let raw = decode_key(private_key).map_err(|e| PushError::VapidKey(e.to_string()))?;
        let secret = SecretKey::from_slice(&raw)
            .map_err(|_| PushError::VapidKey("private key is not a P-256 scalar".into()))?;

        let der = secret
            .to_pkcs8_der()
            .map_err(|e| PushError::VapidKey(e.to_string()))?;
        let key = EncodingKey::from_ec_der(der.as_bytes());

        let public_key = URL_SAFE_NO_PAD.encode(secret.public_key().to_encoded_point(false).as_bytes());

        Ok(Self {
            key,
            public_key,
            subject: subject.into(),
        })
    }

    /// Like [`VapidSigner::new`], but also checks the configured public key
    /// belongs to the private key. A mismatch means browsers subscribed with
    /// a key this server cannot sign for.
    pub fn with_public_key(
        private_key: &str,
        public_key: &str,
        subject: impl Into<String>,
    ) -> Result<Self, PushError> {
        let signer = Self::new(private_key, subject)?;
        let expected = decode_key(public_key).map_err(|e| PushError::VapidKey(e.to_string()))?;
        let derived = decode_key(&signer.public_key).map_err(|e| PushError::VapidKey(e.to_string()))?;
        if expected != derived {
            return Err(PushError::VapidKey(
                "public key does not match private key".into(),
            ));
        }
        Ok(signer)
    }

    /// Application server public key, base64url without padding. This is the
    /// `applicationServerKey` browsers subscribe with.
    pub fn public_key(&self) -> &str {
        &self.public_key
    }

    /// Header value for a delivery to `endpoint`.
    pub fn authorization(&self, endpoint: &str, now: DateTime<Utc>) -> Result<String, PushError> {
        let claims = VapidClaims {
            aud: audience(endpoint)?,
            exp: (now + Duration::hours(TOKEN_LIFETIME_HOURS)).timestamp(),
            sub: self.subject.clone(),
        };
        let token = encode(&Header::new(Algorithm::ES256), &claims, &self.key)?;
        Ok(format!("vapid t={}, k={}", token, self.public_key))
    }
}

/// The origin of the push service: scheme, host and non-default port.
fn audience(endpoint: &str) -> Result<String, PushError> {
    let url = Url::parse(endpoint)
        .map_err(|e| PushError::InvalidSubscription(format!("bad endpoint '{}': {}", endpoint, e)))?;
    match url.scheme() {
        "https" | "http" => Ok(url.origin().ascii_serialization()),
        other => Err(PushError::InvalidSubscription(format!(
            "unsupported endpoint scheme '{}'",
            other
        ))),
    }
}
