//! `hex(postcard(claims)) "." hex(hmac_sha256(secret, payload))` session tokens.

use chrono::{DateTime, Duration, Utc};
use hmac::digest::InvalidLength;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;

use crate::models::Profile;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub user: Profile,
    pub issued_at: i64,
    pub expires_at: i64,
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenError {
    #[error("malformed token")]
    Malformed,

    #[error("signature mismatch")]
    BadSignature,

    #[error("token expired")]
    Expired,
}

#[derive(Clone)]
pub struct TokenSigner {
    key: HmacSha256,
    ttl: Duration,
}

impl TokenSigner {
    pub fn new(secret: &[u8], ttl: Duration) -> Result<Self, InvalidLength> {
        Ok(Self {
            key: HmacSha256::new_from_slice(secret)?,
            ttl,
        })
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn issue_at(&self, user: Profile, now: DateTime<Utc>) -> Result<String, postcard::Error> {
        let claims = Claims {
            user,
            issued_at: now.timestamp(),
            expires_at: (now + self.ttl).timestamp(),
        };
        let payload = postcard::to_allocvec(&claims)?;
        let mut mac = self.key.clone();
        mac.update(&payload);
        let signature = mac.finalize().into_bytes();
        Ok(format!("{}.{}", hex::encode(payload), hex::encode(signature)))
    }

    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        self.verify_at(token, Utc::now())
    }

    pub fn verify_at(&self, token: &str, now: DateTime<Utc>) -> Result<Claims, TokenError> {
        let (payload, signature) = token.split_once('.').ok_or(TokenError::Malformed)?;
        let payload = hex::decode(payload).map_err(|_| TokenError::Malformed)?;
        let signature = hex::decode(signature).map_err(|_| TokenError::Malformed)?;

        let mut mac = self.key.clone();
        mac.update(&payload);
        mac.verify_slice(&signature)
            .map_err(|_| TokenError::BadSignature)?;

        let claims: Claims = postcard::from_bytes(&payload).map_err(|_| TokenError::Malformed)?;
        if now.timestamp() >= claims.expires_at {
            return Err(TokenError::Expired);
        }
        Ok(claims)
    }
}
