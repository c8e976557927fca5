//! Canonical payload encoding and operator signatures.
//!
//! The verifying contract recomputes the digest from the response fields,
//! so the byte layout here is fixed: text fields are length-prefixed with
//! a u32 big-endian count, integers are u32 big-endian, booleans one byte.
//! One scheme only: the four-field tuple `(textResponse, gameId,
//! targetScore, contents)`; see DESIGN.md for the variant decision.

use crate::error::ConfigError;
use crate::policy::ResponsePayload;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use zeroize::ZeroizeOnDrop;

type HmacSha256 = Hmac<Sha256>;

const ADDRESS_DOMAIN_TAG: &[u8] = b"attestor-operator-v1";

fn pack_text(out: &mut Vec<u8>, text: &str) {
    let bytes = text.as_bytes();
    out.extend_from_slice(&u32::try_from(bytes.len()).unwrap_or(u32::MAX).to_be_bytes());
    out.extend_from_slice(bytes);
}

/// Packed canonical encoding of a response payload over the task contents.
pub fn encode_payload(payload: &ResponsePayload, contents: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.text_response.len() + contents.len() + 16);
    pack_text(&mut out, &payload.text_response);
    out.extend_from_slice(&payload.game_id.to_be_bytes());
    out.extend_from_slice(&payload.target_score.to_be_bytes());
    pack_text(&mut out, contents);
    out
}

/// The digest the verifier recovers: one SHA-256 pass over the packed
/// encoding. The signature is computed over this raw digest, never over a
/// re-hashed or human-readable wrapper.
pub fn payload_digest(payload: &ResponsePayload, contents: &str) -> [u8; 32] {
    Sha256::digest(encode_payload(payload, contents)).into()
}

/// Operator signing identity. Key material is zeroized on drop.
#[derive(ZeroizeOnDrop)]
pub struct OperatorSigner {
    key: Vec<u8>,
    address: String,
}

impl OperatorSigner {
    /// Parse a hex-encoded signer key (with or without `0x` prefix).
    pub fn from_hex(key_hex: &str) -> Result<Self, ConfigError> {
        let trimmed = key_hex.trim();
        let stripped = trimmed.strip_prefix("0x").unwrap_or(trimmed);
        let key =
            hex::decode(stripped).map_err(|e| ConfigError::InvalidSignerKey(e.to_string()))?;
        if key.len() < 16 {
            return Err(ConfigError::InvalidSignerKey(format!(
                "key too short: {} bytes, need at least 16",
                key.len()
            )));
        }

        let address = derive_address(&key);
        Ok(Self { key, address })
    }

    /// Public operator identity carried on submitted responses.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// HMAC-SHA256 over the payload digest.
    pub fn sign(&self, payload: &ResponsePayload, contents: &str) -> Vec<u8> {
        let digest = payload_digest(payload, contents);
        let mut mac =
            HmacSha256::new_from_slice(&self.key).expect("HMAC accepts keys of any length");
        mac.update(&digest);
        mac.finalize().into_bytes().to_vec()
    }

    /// Hex signature with `0x` prefix, as carried in submission calls.
    pub fn signature_hex(&self, payload: &ResponsePayload, contents: &str) -> String {
        format!("0x{}", hex::encode(self.sign(payload, contents)))
    }

    /// Recompute-and-compare verification, constant-time on the signature
    /// bytes.
    pub fn verify(&self, payload: &ResponsePayload, contents: &str, signature: &[u8]) -> bool {
        let expected = self.sign(payload, contents);
        expected.ct_eq(signature).into()
    }
}

fn derive_address(key: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(ADDRESS_DOMAIN_TAG);
    hasher.update(key);
    let digest = hasher.finalize();
    format!("0x{}", hex::encode(&digest[..20]))
}
