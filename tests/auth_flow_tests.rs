//! Auth/session flow tests: registration, login, sliding refresh and expiry.
//! These exercise the library-level flow the HTTP handlers run: transport
//! extract -> codec verify -> handler -> refreshed token attached.

use axum::http::{HeaderMap, HeaderValue, StatusCode};
use chrono::Utc;
use serde_json::json;
use tempfile::tempdir;

use eventline::error::AppError;
use eventline::identity::{with_session, Authenticator, Principal, TokenCodec, TokenTransport};
use eventline::storage::{NewUser, UserStore};

const SECRET: &str = "flow-test-secret";
const TTL: i64 = 300;

fn authenticator() -> Authenticator {
    Authenticator::new(TokenCodec::new(SECRET, TTL), TokenTransport::new("JWT"))
}

fn sample_user(name: &str) -> NewUser {
    NewUser {
        username: name.to_string(),
        email: format!("{}@example.com", name),
        first_name: "Alex".into(),
        last_name: "Sh".into(),
        password: "s3cr3t!".into(),
    }
}

fn headers_with_cookie(token: &str) -> HeaderMap {
    let mut h = HeaderMap::new();
    h.insert("cookie", HeaderValue::from_str(&format!("JWT={}", token)).unwrap());
    h
}

/// Pull the token value back out of a Set-Cookie response header.
fn set_cookie_token(headers: &HeaderMap) -> Option<String> {
    let v = headers.get("Set-Cookie")?.to_str().ok()?;
    v.split(';').next()?.strip_prefix("JWT=").map(|s| s.to_string())
}

#[test]
fn register_then_login_issues_verifiable_token() {
    let tmp = tempdir().unwrap();
    let users = UserStore::new(tmp.path()).unwrap();
    let auth = authenticator();

    let created = users.create(sample_user("alice")).unwrap();
    let (principal, token) = auth.login(&users, "alice", "s3cr3t!").unwrap();
    assert_eq!(principal.user_id, created.id);

    let verified = auth.codec().verify(&token).unwrap();
    assert_eq!(verified, principal);
}

#[test]
fn login_with_wrong_password_is_400() {
    let tmp = tempdir().unwrap();
    let users = UserStore::new(tmp.path()).unwrap();
    let auth = authenticator();
    users.create(sample_user("alice")).unwrap();

    let err = auth.login(&users, "alice", "wrong").unwrap_err();
    assert_eq!(err.http_status(), 400);
    // unknown user fails identically
    let err2 = auth.login(&users, "nobody", "s3cr3t!").unwrap_err();
    assert_eq!(err2.http_status(), 400);
    assert_eq!(err.to_envelope(), err2.to_envelope());
}

#[test]
fn duplicate_registration_is_conflict() {
    let tmp = tempdir().unwrap();
    let users = UserStore::new(tmp.path()).unwrap();
    users.create(sample_user("alice")).unwrap();
    let err = users.create(sample_user("alice")).unwrap_err();
    assert_eq!(err.http_status(), 409);
}

#[tokio::test]
async fn successful_protected_call_attaches_newer_token() {
    let auth = authenticator();
    let principal = Principal { user_id: 1, username: "alice".into() };

    // Issued right now: even a renewal landing in the same second must
    // hand back a distinct token.
    let old = auth.codec().issue_at(&principal, Utc::now().timestamp()).unwrap();
    let headers = headers_with_cookie(&old);

    let (status, out, _body) = with_session(&auth, &headers, |p| async move {
        assert_eq!(p.username, "alice");
        Ok((StatusCode::OK, json!({"ok": true})))
    })
    .await;

    assert_eq!(status, StatusCode::OK);
    let renewed = set_cookie_token(&out).expect("renewed token attached");
    assert_ne!(renewed, old);
    // and the renewed token is itself valid
    assert_eq!(auth.codec().verify(&renewed).unwrap(), principal);
}

#[tokio::test]
async fn failed_handler_attaches_no_token() {
    let auth = authenticator();
    let principal = Principal { user_id: 1, username: "alice".into() };
    let token = auth.codec().issue(&principal).unwrap();
    let headers = headers_with_cookie(&token);

    let (status, out, _body) = with_session(&auth, &headers, |_p| async move {
        Err::<(StatusCode, serde_json::Value), _>(AppError::object_not_found())
    })
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(out.get("Set-Cookie").is_none());
}

#[tokio::test]
async fn expired_token_is_403_with_no_renewal() {
    let auth = authenticator();
    let principal = Principal { user_id: 1, username: "alice".into() };
    let stale = auth.codec().issue_at(&principal, Utc::now().timestamp() - TTL - 1).unwrap();
    let headers = headers_with_cookie(&stale);

    let (status, out, body) = with_session(&auth, &headers, |_p| async move {
        Ok((StatusCode::OK, json!({"ok": true})))
    })
    .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(out.get("Set-Cookie").is_none());
    assert_eq!(body.0["status"], "Error");
}

#[tokio::test]
async fn missing_forged_and_malformed_tokens_collapse_to_403() {
    let auth = authenticator();
    let principal = Principal { user_id: 1, username: "alice".into() };

    let forged = TokenCodec::new("other-secret", TTL).issue(&principal).unwrap();
    let mut tampered = auth.codec().issue(&principal).unwrap();
    tampered.push('x');

    let cases = vec![
        HeaderMap::new(),
        headers_with_cookie(&forged),
        headers_with_cookie(&tampered),
        headers_with_cookie("not.a.token"),
    ];
    let mut bodies = Vec::new();
    for headers in cases {
        let (status, _out, body) = with_session(&auth, &headers, |_p| async move {
            Ok((StatusCode::OK, json!({"ok": true})))
        })
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        bodies.push(body.0);
    }
    // the caller never learns which failure mode occurred
    assert!(bodies.windows(2).all(|w| w[0] == w[1]));
}

#[tokio::test]
async fn active_session_slides_past_original_expiry() {
    let auth = authenticator();
    let principal = Principal { user_id: 1, username: "alice".into() };
    let now = Utc::now().timestamp();

    // A token issued (TTL - 10) seconds ago is still valid; a successful call
    // renews it, and the renewed token outlives the original expiry.
    let nearly_dead = auth.codec().issue_at(&principal, now - TTL + 10).unwrap();
    let headers = headers_with_cookie(&nearly_dead);
    let (status, out, _body) = with_session(&auth, &headers, |_p| async move {
        Ok((StatusCode::OK, json!({"ok": true})))
    })
    .await;
    assert_eq!(status, StatusCode::OK);

    let renewed = set_cookie_token(&out).unwrap();
    let past_original_expiry = now + 20;
    assert!(auth.codec().verify_at(&nearly_dead, past_original_expiry).is_err());
    assert!(auth.codec().verify_at(&renewed, past_original_expiry).is_ok());
}
