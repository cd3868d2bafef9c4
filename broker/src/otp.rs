//! Time-based one-time passwords (RFC 6238) for app-based 2FA logins.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use data_encoding::BASE32_NOPAD;
use hmac::{Hmac, Mac};
use sha1::Sha1;

use crate::error::BrokerError;

type HmacSha1 = Hmac<Sha1>;

/// Seconds per code.
pub const STEP_SECS: u64 = 30;
/// Digits per code.
pub const DIGITS: u32 = 6;

/// Code for the current 30-second window.
pub fn totp_now(seed: &str) -> Result<String, BrokerError> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_secs();
    totp_at(seed, now)
}

/// Code for the window containing `unix_secs`.
pub fn totp_at(seed: &str, unix_secs: u64) -> Result<String, BrokerError> {
    let key = decode_seed(seed)?;
    hotp(&key, unix_secs / STEP_SECS)
}

/// Decode a base32 seed as authenticator apps display it: any case, spaces
/// allowed, padding optional.
fn decode_seed(seed: &str) -> Result<Vec<u8>, BrokerError> {
    let cleaned: String = seed
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '=')
        .map(|c| c.to_ascii_uppercase())
        .collect();
    if cleaned.is_empty() {
        return Err(BrokerError::Auth("empty TOTP seed".into()));
    }
    BASE32_NOPAD
        .decode(cleaned.as_bytes())
        .map_err(|e| BrokerError::Auth(format!("TOTP seed is not valid base32: {e}")))
}

fn hotp(key: &[u8], counter: u64) -> Result<String, BrokerError> {
    let mut mac = HmacSha1::new_from_slice(key)
        .map_err(|e| BrokerError::Auth(format!("TOTP key rejected: {e}")))?;
    mac.update(&counter.to_be_bytes());
    let digest = mac.finalize().into_bytes();

    let offset = (digest[digest.len() - 1] & 0x0f) as usize;
    let binary = u32::from_be_bytes([
        digest[offset] & 0x7f,
        digest[offset + 1],
        digest[offset + 2],
        digest[offset + 3],
    ]);
    let code = binary % 10u32.pow(DIGITS);
    Ok(format!("{code:0width$}", width = DIGITS as usize))
}
