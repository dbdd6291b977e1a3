//! Signed session token codec.
//!
//! Tokens are self-contained HS256 JWTs carrying the caller identity plus
//! issued-at/expiry timestamps; the server keeps no session record. Expiry is
//! checked here explicitly (not by the JWT library) so the boundary is exact:
//! a token is dead the instant `now` reaches `exp`, with no leeway. Signature
//! validation runs first, so a forged token never reports `Expired`.
//!
//! Verification is pure computation over the immutable signing secret and is
//! safe for unsynchronized concurrent use.

use anyhow::anyhow;
use chrono::Utc;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::Principal;

/// Internal verification failure causes. These are logged but collapse into a
/// single externally visible failure at the authentication boundary.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("token expired")]
    Expired,
    #[error("token malformed")]
    Malformed,
    #[error("token signature invalid")]
    BadSignature,
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    /// Owning user id.
    sub: i64,
    username: String,
    /// Random token id. Timestamps have second granularity, so without this
    /// two tokens issued for the same principal within one second would
    /// serialize identically and a renewal could hand back the presented
    /// token unchanged.
    jti: String,
    /// Issued-at, epoch seconds.
    iat: i64,
    /// Expiry, epoch seconds. Always iat + ttl.
    exp: i64,
}

/// Encodes and verifies session tokens with a server-held secret.
#[derive(Clone)]
pub struct TokenCodec {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl_secs: i64,
}

impl TokenCodec {
    pub fn new(secret: &str, ttl_secs: i64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl_secs,
        }
    }

    pub fn ttl_secs(&self) -> i64 {
        self.ttl_secs
    }

    /// Issue a token for the given principal at the current time.
    pub fn issue(&self, principal: &Principal) -> anyhow::Result<String> {
        self.issue_at(principal, Utc::now().timestamp())
    }

    /// Issue a token with an explicit issued-at timestamp (epoch seconds).
    pub fn issue_at(&self, principal: &Principal, now: i64) -> anyhow::Result<String> {
        let mut jti_bytes = [0u8; 8];
        getrandom::getrandom(&mut jti_bytes).map_err(|e| anyhow!(e.to_string()))?;
        let claims = Claims {
            sub: principal.user_id,
            username: principal.username.clone(),
            jti: jti_bytes.iter().map(|b| format!("{:02x}", b)).collect(),
            iat: now,
            exp: now + self.ttl_secs,
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)?;
        Ok(token)
    }

    /// Verify a token against the current time.
    pub fn verify(&self, token: &str) -> Result<Principal, TokenError> {
        self.verify_at(token, Utc::now().timestamp())
    }

    /// Verify a token against an explicit clock (epoch seconds).
    pub fn verify_at(&self, token: &str, now: i64) -> Result<Principal, TokenError> {
        // Signature and structure first; expiry is checked by hand below so the
        // equality boundary is exact and the clock is injectable.
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.leeway = 0;
        let data = decode::<Claims>(token, &self.decoding, &validation).map_err(|e| match e.kind() {
            ErrorKind::InvalidSignature => TokenError::BadSignature,
            _ => TokenError::Malformed,
        })?;
        if now >= data.claims.exp {
            return Err(TokenError::Expired);
        }
        Ok(Principal { user_id: data.claims.sub, username: data.claims.username })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec() -> TokenCodec {
        TokenCodec::new("unit-test-secret", 300)
    }

    fn alice() -> Principal {
        Principal { user_id: 7, username: "alice".into() }
    }

    #[test]
    fn round_trip_before_expiry() {
        let c = codec();
        let t = c.issue_at(&alice(), 1_000).unwrap();
        assert_eq!(c.verify_at(&t, 1_000).unwrap(), alice());
        assert_eq!(c.verify_at(&t, 1_299).unwrap(), alice());
    }

    #[test]
    fn expiry_boundary_is_exclusive() {
        let c = codec();
        let t = c.issue_at(&alice(), 1_000).unwrap();
        // exp = 1300: equality counts as expired
        assert_eq!(c.verify_at(&t, 1_300), Err(TokenError::Expired));
        assert_eq!(c.verify_at(&t, 2_000), Err(TokenError::Expired));
    }

    #[test]
    fn same_second_issuance_yields_distinct_tokens() {
        let c = codec();
        let t1 = c.issue_at(&alice(), 1_000).unwrap();
        let t2 = c.issue_at(&alice(), 1_000).unwrap();
        assert_ne!(t1, t2);
        // both still verify to the same principal
        assert_eq!(c.verify_at(&t1, 1_000).unwrap(), c.verify_at(&t2, 1_000).unwrap());
    }

    #[test]
    fn cross_secret_verification_fails() {
        let a = TokenCodec::new("secret-a", 300);
        let b = TokenCodec::new("secret-b", 300);
        let t = a.issue_at(&alice(), 1_000).unwrap();
        assert_eq!(b.verify_at(&t, 1_000), Err(TokenError::BadSignature));
    }

    #[test]
    fn appended_character_breaks_verification() {
        let c = codec();
        let mut t = c.issue_at(&alice(), 1_000).unwrap();
        t.push('x');
        let err = c.verify_at(&t, 1_000).unwrap_err();
        assert!(matches!(err, TokenError::BadSignature | TokenError::Malformed), "got {:?}", err);
    }

    #[test]
    fn garbage_is_malformed_not_expired() {
        let c = codec();
        assert_eq!(c.verify_at("not.a.token", 1_000), Err(TokenError::Malformed));
        assert_eq!(c.verify_at("", 1_000), Err(TokenError::Malformed));
    }

    #[test]
    fn forged_token_never_reports_expired() {
        // Expired under the wrong secret must still read as a signature failure.
        let a = TokenCodec::new("secret-a", 300);
        let b = TokenCodec::new("secret-b", 300);
        let t = a.issue_at(&alice(), 1_000).unwrap();
        assert_eq!(b.verify_at(&t, 10_000), Err(TokenError::BadSignature));
    }
}
