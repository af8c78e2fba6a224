//! Device-HMAC request signing.
//!
//! Produces the three headers required by every billboard API call:
//! `x-device-id`, `x-timestamp`, `x-signature`. The signature is computed
//! fresh for each request over `<timestamp> "." <hex(sha256(body))>`, keyed
//! by the device secret.

use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

use crate::device::DeviceIdentity;

type HmacSha256 = Hmac<Sha256>;

pub const HEADER_DEVICE_ID: &str = "x-device-id";
pub const HEADER_TIMESTAMP: &str = "x-timestamp";
pub const HEADER_SIGNATURE: &str = "x-signature";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedHeaders {
    pub device_id: String,
    pub timestamp: String,
    pub signature: String,
}

impl SignedHeaders {
    pub fn as_pairs(&self) -> [(&'static str, &str); 3] {
        [
            (HEADER_DEVICE_ID, &self.device_id),
            (HEADER_TIMESTAMP, &self.timestamp),
            (HEADER_SIGNATURE, &self.signature),
        ]
    }
}

/// Signs request bodies with the device's HMAC key.
#[derive(Clone)]
pub struct AuthSigner {
    device_id: String,
    device_secret: Vec<u8>,
}

impl AuthSigner {
    pub fn new(identity: &DeviceIdentity) -> Self {
        Self {
            device_id: identity.device_id.clone(),
            device_secret: identity.device_secret.clone(),
        }
    }

    /// Sign `body` with the current Unix timestamp.
    pub fn sign(&self, body: &[u8]) -> SignedHeaders {
        let timestamp = current_unix_timestamp();
        self.sign_at(body, timestamp)
    }

    /// Sign `body` with an explicit timestamp (used by tests to get
    /// deterministic signatures; production callers use `sign`).
    pub fn sign_at(&self, body: &[u8], timestamp: u64) -> SignedHeaders {
        let body_hash = Sha256::digest(body);
        let message = format!("{timestamp}.{}", hex::encode(body_hash));

        // Construction is fallible only when the key length is rejected by
        // the Mac impl, which never happens for Hmac<Sha256> (any length key
        // is accepted: short keys are zero-padded, long ones pre-hashed).
        let mut mac = HmacSha256::new_from_slice(&self.device_secret)
            .expect("hmac accepts keys of any length");
        mac.update(message.as_bytes());
        let signature = hex::encode(mac.finalize().into_bytes());

        SignedHeaders {
            device_id: self.device_id.clone(),
            timestamp: timestamp.to_string(),
            signature,
        }
    }
}

fn current_unix_timestamp() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
