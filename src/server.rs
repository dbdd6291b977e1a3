//!
//! eventline HTTP server
//! ---------------------
//! Axum-based HTTP API for users, events and event media.
//!
//! Responsibilities:
//! - Login endpoint issuing a signed session token into the carrier cookie.
//! - Open registration endpoint backed by the user store.
//! - Protected user/event/media endpoints running under `with_session`, which
//!   renews the token on every successful call.
//! - Per-object ownership checks on event and media reads/updates.
//! - Response envelopes of the form `{status, code, message, data}`.

use std::net::SocketAddr;

use anyhow::Context;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::identity::{ensure_owner, ensure_valid_id, with_session, Authenticator, TokenCodec, TokenTransport};
use crate::storage::{EventPatch, EventRecord, EventStore, NewEvent, NewUser, UserStore};

/// Shared server state injected into all handlers.
#[derive(Clone)]
pub struct AppState {
    pub users: UserStore,
    pub events: EventStore,
    pub auth: Authenticator,
}

/// Start the eventline HTTP server with the given configuration.
pub async fn run(config: Config) -> anyhow::Result<()> {
    let users = UserStore::new(&config.db_root)
        .with_context(|| format!("While creating user store under db_root: {}", config.db_root))?;
    let events = EventStore::new(&config.db_root)
        .with_context(|| format!("While creating event store under db_root: {}", config.db_root))?;
    let codec = TokenCodec::new(&config.auth.secret, config.auth.ttl_secs);
    let transport = TokenTransport::new(config.auth.cookie_name.clone());
    let auth = Authenticator::new(codec, transport);
    let state = AppState { users, events, auth };

    let app = router(state);
    let addr: SocketAddr = format!("0.0.0.0:{}", config.http_port).parse()?;
    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Mount all HTTP routes onto the shared state.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(|| async { "eventline ok" }))
        .route("/auth", post(login))
        .route("/logout", post(logout))
        .route("/users/register", post(register))
        .route("/users/{id}", get(user_detail))
        .route("/events", post(event_create))
        .route("/events/{id}", get(event_detail).patch(event_update))
        .route("/events/{id}/media/{media_id}", get(event_media_detail))
        .with_state(state)
}

fn envelope(status: &str, code: u16, message: &str, data: Value) -> Value {
    json!({
        "status": status,
        "code": code,
        "message": message,
        "data": data,
    })
}

fn err_parts(err: AppError) -> (StatusCode, HeaderMap, Json<Value>) {
    let status = StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, HeaderMap::new(), Json(err.to_envelope()))
}

fn fmt_ms(ms: i64) -> Value {
    match DateTime::<Utc>::from_timestamp_millis(ms) {
        Some(dt) => json!(dt.to_rfc3339()),
        None => Value::Null,
    }
}

fn fmt_opt_ms(ms: Option<i64>) -> Value {
    ms.map(fmt_ms).unwrap_or(Value::Null)
}

fn event_json(ev: &EventRecord, username: &str) -> Value {
    json!({
        "id": ev.id,
        "user": username,
        "description": ev.description,
        "start": fmt_ms(ev.start),
        "end": fmt_opt_ms(ev.end),
        "periodic": ev.periodic,
        "period_secs": ev.period.map(|ms| ms / 1000),
        "next_notification": fmt_opt_ms(ev.next_notification),
        "status": ev.status,
        "labels": ev.labels,
    })
}

// ---- auth endpoints ----

#[derive(Debug, Deserialize)]
struct LoginPayload {
    username: String,
    password: String,
}

async fn login(State(state): State<AppState>, Json(payload): Json<LoginPayload>) -> impl IntoResponse {
    match state.auth.login(&state.users, &payload.username, &payload.password) {
        Ok((principal, token)) => {
            let mut headers = HeaderMap::new();
            state.auth.transport().attach(&mut headers, &token);
            let body = envelope(
                "OK",
                200,
                "login successful",
                json!({"token": token, "user": principal.username}),
            );
            (StatusCode::OK, headers, Json(body))
        }
        Err(e) => err_parts(e),
    }
}

async fn logout(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    // The server holds no session record; logging out just tells the client
    // to discard its token.
    match state.auth.authenticate(&headers) {
        Ok(_) => {
            let mut out = HeaderMap::new();
            state.auth.transport().clear(&mut out);
            (StatusCode::OK, out, Json(envelope("OK", 200, "log out was successful", Value::Null)))
        }
        Err(e) => err_parts(e),
    }
}

// ---- user endpoints ----

#[derive(Debug, Deserialize)]
struct RegisterPayload {
    email: String,
    username: String,
    #[serde(default)]
    first_name: String,
    #[serde(default)]
    last_name: String,
    password: String,
    password2: String,
}

async fn register(State(state): State<AppState>, Json(payload): Json<RegisterPayload>) -> impl IntoResponse {
    if payload.password != payload.password2 {
        return err_parts(AppError::user("password_mismatch", "Passwords must match"));
    }
    if payload.username.trim().is_empty() || payload.password.is_empty() {
        return err_parts(AppError::user("invalid_payload", "username and password are required"));
    }
    let new = NewUser {
        username: payload.username,
        email: payload.email,
        first_name: payload.first_name,
        last_name: payload.last_name,
        password: payload.password,
    };
    match state.users.create(new) {
        Ok(user) => {
            let body = envelope(
                "OK",
                201,
                "User created successfully",
                serde_json::to_value(&user).unwrap_or(Value::Null),
            );
            (StatusCode::CREATED, HeaderMap::new(), Json(body))
        }
        Err(e) => err_parts(e),
    }
}

async fn user_detail(State(state): State<AppState>, Path(id): Path<i64>, headers: HeaderMap) -> impl IntoResponse {
    with_session(&state.auth, &headers, |_principal| {
        let users = state.users.clone();
        async move {
            ensure_valid_id(id)?;
            let Some(user) = users.get(id)? else {
                return Err(AppError::object_not_found());
            };
            let data = serde_json::to_value(&user).unwrap_or(Value::Null);
            Ok((StatusCode::OK, envelope("OK", 200, "Get object", data)))
        }
    })
    .await
}

// ---- event endpoints ----

#[derive(Debug, Deserialize)]
struct EventCreatePayload {
    description: Option<String>,
    start: DateTime<Utc>,
    end: Option<DateTime<Utc>>,
    #[serde(default)]
    periodic: bool,
    /// Repeat interval in seconds; requires `periodic`.
    period_secs: Option<i64>,
    next_notification: Option<DateTime<Utc>>,
    status: String,
    #[serde(default)]
    labels: Vec<String>,
    /// Media file name to register alongside the event.
    media: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct EventUpdatePayload {
    description: Option<String>,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
    periodic: Option<bool>,
    period_secs: Option<i64>,
    next_notification: Option<DateTime<Utc>>,
    status: Option<String>,
    labels: Option<Vec<String>>,
}

/// Periodic events must carry a period and vice versa.
fn validate_period(periodic: bool, period: Option<i64>) -> AppResult<()> {
    if periodic == period.is_some() {
        Ok(())
    } else {
        Err(AppError::user("period_mismatch", "Period and periodic flag must match! (Periodic -> period is not null)"))
    }
}

async fn event_create(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<EventCreatePayload>,
) -> impl IntoResponse {
    with_session(&state.auth, &headers, |principal| {
        let events = state.events.clone();
        async move {
            if !matches!(payload.status.as_str(), "W" | "P") {
                return Err(AppError::user("invalid_status", "Invalid \"status\""));
            }
            validate_period(payload.periodic, payload.period_secs)?;

            let start_ms = payload.start.timestamp_millis();
            let end_ms = payload.end.map(|d| d.timestamp_millis());

            // A bounded event may not overlap any of the caller's existing
            // bounded events.
            if let Some(end_ms) = end_ms {
                if end_ms < start_ms {
                    return Err(AppError::user("invalid_range", "end precedes start"));
                }
                for existing in events.list_for_user(principal.user_id)? {
                    if let Some(e_end) = existing.end {
                        if existing.start.max(start_ms) <= e_end.min(end_ms) {
                            return Err(AppError::user("overlap", "Event is overlapping with others!"));
                        }
                    }
                }
            }

            // Default the reminder to five minutes before the event.
            let next_notification = payload
                .next_notification
                .map(|d| d.timestamp_millis())
                .unwrap_or_else(|| (payload.start - Duration::minutes(5)).timestamp_millis());

            let record = events.create(NewEvent {
                user_id: principal.user_id,
                description: payload.description,
                start: start_ms,
                end: end_ms,
                periodic: payload.periodic,
                period: payload.period_secs.map(|s| s * 1000),
                next_notification: Some(next_notification),
                status: payload.status,
                labels: payload.labels,
            })?;

            let mut data = event_json(&record, &principal.username);
            if let Some(name) = payload.media {
                let media = events.add_media(record.id, &name)?;
                data["media"] = json!([{ "id": media.id, "media": media.media }]);
            }
            Ok((StatusCode::CREATED, envelope("OK", 201, "Event created", data)))
        }
    })
    .await
}

async fn event_detail(State(state): State<AppState>, Path(id): Path<i64>, headers: HeaderMap) -> impl IntoResponse {
    with_session(&state.auth, &headers, |principal| {
        let events = state.events.clone();
        async move {
            ensure_valid_id(id)?;
            let Some(event) = events.get(id)? else {
                return Err(AppError::object_not_found());
            };
            ensure_owner(&principal, event.user_id)?;
            Ok((StatusCode::OK, envelope("OK", 200, "Get object", event_json(&event, &principal.username))))
        }
    })
    .await
}

async fn event_update(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    headers: HeaderMap,
    Json(payload): Json<EventUpdatePayload>,
) -> impl IntoResponse {
    with_session(&state.auth, &headers, |principal| {
        let events = state.events.clone();
        async move {
            ensure_valid_id(id)?;
            let Some(current) = events.get(id)? else {
                return Err(AppError::object_not_found());
            };
            ensure_owner(&principal, current.user_id)?;

            if let Some(status) = payload.status.as_deref() {
                if !matches!(status, "W" | "C" | "P") {
                    return Err(AppError::user("invalid_status", "Invalid \"status\""));
                }
            }
            // Validate the period rule against the merged state.
            let merged_periodic = payload.periodic.unwrap_or(current.periodic);
            let merged_period = payload.period_secs.map(|s| s * 1000).or(current.period);
            validate_period(merged_periodic, merged_period)?;

            let patch = EventPatch {
                description: payload.description,
                start: payload.start.map(|d| d.timestamp_millis()),
                end: payload.end.map(|d| d.timestamp_millis()),
                periodic: payload.periodic,
                period: payload.period_secs.map(|s| s * 1000),
                next_notification: payload.next_notification.map(|d| d.timestamp_millis()),
                status: payload.status,
                labels: payload.labels,
            };
            let Some(updated) = events.update(id, patch)? else {
                return Err(AppError::object_not_found());
            };
            Ok((StatusCode::OK, envelope("OK", 200, "Event updated", event_json(&updated, &principal.username))))
        }
    })
    .await
}

async fn event_media_detail(
    State(state): State<AppState>,
    Path((event_id, media_id)): Path<(i64, i64)>,
    headers: HeaderMap,
) -> impl IntoResponse {
    with_session(&state.auth, &headers, |principal| {
        let events = state.events.clone();
        async move {
            ensure_valid_id(event_id)?;
            ensure_valid_id(media_id)?;
            let Some(media) = events.get_media(media_id)? else {
                return Err(AppError::object_not_found());
            };
            if media.event_id != event_id {
                return Err(AppError::object_not_found());
            }
            // Ownership resolves through the chain: media -> event -> owner.
            let Some(parent) = events.get(media.event_id)? else {
                return Err(AppError::object_not_found());
            };
            ensure_owner(&principal, parent.user_id)?;
            let data = json!({"id": media.id, "event": media.event_id, "media": media.media});
            Ok((StatusCode::OK, envelope("OK", 200, "Get object", data)))
        }
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_shape() {
        let v = envelope("OK", 200, "Get object", json!({"id": 1}));
        assert_eq!(v["status"], "OK");
        assert_eq!(v["code"], 200);
        assert_eq!(v["data"]["id"], 1);
    }

    #[test]
    fn period_rule_requires_both_or_neither() {
        assert!(validate_period(false, None).is_ok());
        assert!(validate_period(true, Some(60_000)).is_ok());
        assert!(validate_period(true, None).is_err());
        assert!(validate_period(false, Some(60_000)).is_err());
    }
}
