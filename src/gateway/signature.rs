//! Webhook signature verification.
//!
//! The gateway signs every webhook with HMAC-SHA512 over the raw request body,
//! keyed by the account's secret key, and sends the hex digest in the
//! `X-Paystack-Signature` header. Verification must run against the exact
//! bytes received: a re-serialized body differs in whitespace and key order.

use hmac::{Hmac, Mac};
use sha2::Sha512;

use crate::config::GatewayConfig;
use crate::utils::Secret;

type HmacSha512 = Hmac<Sha512>;

pub const SIGNATURE_HEADER: &str = "x-paystack-signature";

#[derive(Clone)]
pub struct SignatureVerifier {
    secret: Secret<String>,
}

impl SignatureVerifier {
    pub fn new(config: &GatewayConfig) -> Self {
        Self {
            secret: config.secret_key.clone(),
        }
    }

    pub fn verify(&self, raw_body: &[u8], provided_signature: Option<&str>) -> bool {
        verify_signature(raw_body, provided_signature, self.secret.reveal().as_bytes())
    }
}

/// True only if `provided_signature` is the hex HMAC-SHA512 of `raw_body`.
///
/// The comparison runs on the decoded digest through `Mac::verify_slice`,
/// which is constant-time.
pub fn verify_signature(raw_body: &[u8], provided_signature: Option<&str>, secret: &[u8]) -> bool {
    let provided = match provided_signature.map(str::trim) {
        Some(sig) if !sig.is_empty() => sig,
        _ => return false,
    };

    let Ok(expected) = hex::decode(provided) else {
        return false;
    };

    let Ok(mut mac) = HmacSha512::new_from_slice(secret) else {
        return false;
    };
    mac.update(raw_body);
    mac.verify_slice(&expected).is_ok()
}

/// Hex HMAC-SHA512 of `raw_body`, as the gateway would send it.
pub fn sign(raw_body: &[u8], secret: &[u8]) -> String {
    let mut mac = HmacSha512::new_from_slice(secret).expect("HMAC can take key of any size");
    mac.update(raw_body);
    hex::encode(mac.finalize().into_bytes())
}
