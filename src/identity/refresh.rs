//! Sliding-window session renewal.
//!
//! `with_session` is the "around" combinator every protected handler runs in:
//! authenticate, execute the handler body with the resolved principal, and on
//! success attach a freshly issued token to the response. On any failure the
//! response carries no new token and the caller's existing one expires on its
//! original schedule. Active sessions therefore never expire; idle ones die
//! exactly TTL seconds after the last successful call.

use std::future::Future;

use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde_json::Value;
use tracing::error;

use crate::error::{AppError, AppResult};

use super::authenticator::Authenticator;
use super::Principal;

fn respond_err(err: AppError) -> (StatusCode, HeaderMap, Json<Value>) {
    let status = StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, HeaderMap::new(), Json(err.to_envelope()))
}

/// Run a protected handler body under an authenticated session.
///
/// The closure receives the resolved `Principal` and returns the response
/// status plus the envelope body. A successful outcome always gets a renewed
/// token attached via the transport carrier.
pub async fn with_session<F, Fut>(
    auth: &Authenticator,
    headers: &HeaderMap,
    f: F,
) -> (StatusCode, HeaderMap, Json<Value>)
where
    F: FnOnce(Principal) -> Fut,
    Fut: Future<Output = AppResult<(StatusCode, Value)>>,
{
    let principal = match auth.authenticate(headers) {
        Ok(p) => p,
        Err(e) => return respond_err(e),
    };
    match f(principal.clone()).await {
        Ok((status, body)) => {
            let mut out = HeaderMap::new();
            match auth.codec().issue(&principal) {
                Ok(token) => auth.transport().attach(&mut out, &token),
                // The call already succeeded; log and reply without a renewal.
                Err(e) => error!(target: "eventline::auth", "token refresh failed: {}", e),
            }
            (status, out, Json(body))
        }
        Err(e) => respond_err(e),
    }
}
