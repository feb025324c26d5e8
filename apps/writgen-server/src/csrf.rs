//! Stateless CSRF tokens
//!
//! A token is `<nonce>.<issued_unix>.<signature>` where the signature is
//! HMAC-SHA256 over `<nonce>.<issued_unix>` with the server secret, encoded as
//! unpadded URL-safe base64. No server-side session is needed to check one.

use std::sync::Arc;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the token on state-changing requests
pub const CSRF_HEADER: &str = "x-csrf-token";

const NONCE_BYTES: usize = 16;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CsrfError {
    #[error("CSRF token missing")]
    Missing,

    #[error("CSRF token malformed")]
    Malformed,

    #[error("CSRF token signature invalid")]
    BadSignature,

    #[error("CSRF token expired")]
    Expired,

    #[error("CSRF key unusable")]
    InvalidKey,

    #[error("could not generate CSRF nonce")]
    Random,
}

/// Issues and checks CSRF tokens
#[derive(Clone)]
pub struct CsrfGuard {
    secret: Arc<[u8]>,
    time_limit: Option<Duration>,
}

impl std::fmt::Debug for CsrfGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CsrfGuard")
            .field("time_limit", &self.time_limit)
            .finish_non_exhaustive()
    }
}

impl CsrfGuard {
    pub fn new(secret: &[u8], time_limit: Option<Duration>) -> Self {
        Self {
            secret: Arc::from(secret),
            time_limit,
        }
    }

    fn mac(&self, payload: &str) -> Result<HmacSha256, CsrfError> {
        let mut mac =
            HmacSha256::new_from_slice(&self.secret).map_err(|_| CsrfError::InvalidKey)?;
        mac.update(payload.as_bytes());
        Ok(mac)
    }

    /// A new token issued at `now`
    pub fn issue(&self, now: DateTime<Utc>) -> Result<String, CsrfError> {
        let mut nonce = [0u8; NONCE_BYTES];
        getrandom::getrandom(&mut nonce).map_err(|_| CsrfError::Random)?;
        let payload = format!("{}.{}", hex::encode(nonce), now.timestamp());
        let signature = self.mac(&payload)?.finalize().into_bytes();
        Ok(format!("{}.{}", payload, URL_SAFE_NO_PAD.encode(signature)))
    }

    /// Check a token presented at `now`
    pub fn verify(&self, token: &str, now: DateTime<Utc>) -> Result<(), CsrfError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(CsrfError::Missing);
        }
        let mut parts = token.split('.');
        let (Some(nonce), Some(issued), Some(signature), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(CsrfError::Malformed);
        };
        if nonce.len() != NONCE_BYTES * 2 || !nonce.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(CsrfError::Malformed);
        }
        let issued_secs: i64 = issued.parse().map_err(|_| CsrfError::Malformed)?;
        let signature = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| CsrfError::Malformed)?;

        self.mac(&format!("{}.{}", nonce, issued))?
            .verify_slice(&signature)
            .map_err(|_| CsrfError::BadSignature)?;

        if let Some(limit) = self.time_limit {
            let issued_at = DateTime::<Utc>::from_timestamp(issued_secs, 0).ok_or(CsrfError::Malformed)?;
            if now - issued_at > limit {
                return Err(CsrfError::Expired);
            }
        }
        Ok(())
    }
}
