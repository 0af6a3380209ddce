//! HMAC helpers for authenticating gateway webhooks.
//!
//! Every check runs over the exact raw request bytes and compares in constant
//! time. A missing or undecodable signature is treated like a wrong one.

use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::{Sha256, Sha512};

use crate::app_error::{AppError, AppResult};

type HmacSha256 = Hmac<Sha256>;
type HmacSha512 = Hmac<Sha512>;

fn sha256_mac(secret: &[u8], body: &[u8]) -> HmacSha256 {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC accepts any key length");
    mac.update(body);
    mac
}

fn sha512_mac(secret: &[u8], body: &[u8]) -> HmacSha512 {
    let mut mac = HmacSha512::new_from_slice(secret).expect("HMAC accepts any key length");
    mac.update(body);
    mac
}

pub fn hmac_sha256_hex(secret: &[u8], body: &[u8]) -> String {
    hex::encode(sha256_mac(secret, body).finalize().into_bytes())
}

pub fn hmac_sha512_hex(secret: &[u8], body: &[u8]) -> String {
    hex::encode(sha512_mac(secret, body).finalize().into_bytes())
}

pub fn hmac_sha256_base64(secret: &[u8], body: &[u8]) -> String {
    let digest = sha256_mac(secret, body).finalize().into_bytes();
    base64::engine::general_purpose::STANDARD.encode(digest)
}

fn decode_hex(signature: Option<&str>) -> AppResult<Vec<u8>> {
    let signature = signature
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or(AppError::InvalidSignature)?;
    hex::decode(signature).map_err(|_| AppError::InvalidSignature)
}

/// Hex HMAC-SHA256 over the raw body
pub fn verify_sha256_hex(secret: &[u8], body: &[u8], signature: Option<&str>) -> AppResult<()> {
    let expected = decode_hex(signature)?;
    sha256_mac(secret, body)
        .verify_slice(&expected)
        .map_err(|_| AppError::InvalidSignature)
}

/// Hex HMAC-SHA512 over the raw body
pub fn verify_sha512_hex(secret: &[u8], body: &[u8], signature: Option<&str>) -> AppResult<()> {
    let expected = decode_hex(signature)?;
    sha512_mac(secret, body)
        .verify_slice(&expected)
        .map_err(|_| AppError::InvalidSignature)
}

/// Base64 HMAC-SHA256 over the raw body
pub fn verify_sha256_base64(secret: &[u8], body: &[u8], signature: Option<&str>) -> AppResult<()> {
    let signature = signature
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or(AppError::InvalidSignature)?;
    let expected = base64::engine::general_purpose::STANDARD
        .decode(signature)
        .map_err(|_| AppError::InvalidSignature)?;
    sha256_mac(secret, body)
        .verify_slice(&expected)
        .map_err(|_| AppError::InvalidSignature)
}
