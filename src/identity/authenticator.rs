//! Request authentication: who is the caller, and may they proceed at all.

use axum::http::HeaderMap;
use tracing::debug;

use crate::error::{AppError, AppResult};
use crate::storage::UserStore;

use super::token::TokenCodec;
use super::transport::TokenTransport;
use super::Principal;

/// Orchestrates the transport and the token codec for every protected call,
/// and the credential store for first-contact logins.
#[derive(Clone)]
pub struct Authenticator {
    codec: TokenCodec,
    transport: TokenTransport,
}

impl Authenticator {
    pub fn new(codec: TokenCodec, transport: TokenTransport) -> Self {
        Self { codec, transport }
    }

    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    pub fn transport(&self) -> &TokenTransport {
        &self.transport
    }

    /// Resolve the caller from the request headers.
    ///
    /// An absent token and every verification failure collapse into the same
    /// `Auth` error: the caller never learns whether the token was missing,
    /// expired, malformed or forged. The cause is kept in the debug log.
    pub fn authenticate(&self, headers: &HeaderMap) -> AppResult<Principal> {
        let Some(raw) = self.transport.extract(headers) else {
            debug!(target: "eventline::auth", "no token in request");
            return Err(AppError::unauthenticated());
        };
        match self.codec.verify(&raw) {
            Ok(principal) => Ok(principal),
            Err(cause) => {
                debug!(target: "eventline::auth", "token rejected: {}", cause);
                Err(AppError::unauthenticated())
            }
        }
    }

    /// Credential login: verify username/password against the store and issue
    /// a fresh token. Unknown user and wrong password are indistinguishable.
    pub fn login(&self, users: &UserStore, username: &str, password: &str) -> AppResult<(Principal, String)> {
        let Some(user) = users.verify_credentials(username, password)? else {
            debug!(target: "eventline::auth", "login failed user='{}'", username);
            return Err(AppError::invalid_credentials());
        };
        let principal = Principal { user_id: user.id, username: user.username.clone() };
        let token = self.codec.issue(&principal)?;
        debug!(target: "eventline::auth", "login ok user='{}' id={}", principal.username, principal.user_id);
        Ok((principal, token))
    }
}
