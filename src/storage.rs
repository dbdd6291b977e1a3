//!
//! eventline storage module
//! ------------------------
//! Parquet-backed stores for users and events under a configured root folder.
//! Each store is a single Parquet file rewritten whole on mutation, wrapped in
//! an `Arc<Mutex<..>>` handle so interleaved create/read calls from concurrent
//! requests serialize at the store boundary. Username uniqueness is enforced
//! here, under the lock, and surfaces as a Conflict failure.
//!
//! The event row carries its owner (`user_id`) set at creation time; nothing
//! in this module ever reassigns it. Media rows link to their parent event the
//! same way.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use argon2::{Argon2, PasswordHasher, PasswordVerifier};
use parking_lot::Mutex;
use password_hash::{PasswordHash, SaltString};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{AppError, AppResult};

// ---- password hashing (argon2 PHC strings) ----

fn hash_password(password: &str) -> Result<String> {
    let mut salt_bytes = [0u8; 16];
    getrandom::getrandom(&mut salt_bytes).map_err(|e| anyhow!(e.to_string()))?;
    let salt = SaltString::encode_b64(&salt_bytes).map_err(|e| anyhow!(e.to_string()))?;
    let argon2 = Argon2::default();
    let phc = argon2.hash_password(password.as_bytes(), &salt).map_err(|e| anyhow!(e.to_string()))?.to_string();
    Ok(phc)
}

fn verify_password(hash: &str, password: &str) -> bool {
    if let Ok(parsed) = PasswordHash::new(hash) {
        let argon2 = Argon2::default();
        argon2.verify_password(password.as_bytes(), &parsed).is_ok()
    } else {
        false
    }
}

// ---- cell extraction helpers ----

fn str_at(df: &DataFrame, col: &str, i: usize) -> Result<Option<String>> {
    match df.column(col)?.get(i)? {
        AnyValue::String(s) => Ok(Some(s.to_string())),
        AnyValue::StringOwned(s) => Ok(Some(s.to_string())),
        _ => Ok(None),
    }
}

fn i64_at(df: &DataFrame, col: &str, i: usize) -> Result<Option<i64>> {
    match df.column(col)?.get(i)? {
        AnyValue::Int64(v) => Ok(Some(v)),
        AnyValue::Int32(v) => Ok(Some(v as i64)),
        _ => Ok(None),
    }
}

fn bool_at(df: &DataFrame, col: &str, i: usize) -> Result<bool> {
    Ok(df.column(col)?.bool()?.get(i).unwrap_or(false))
}

fn read_df(path: &Path, empty: fn() -> Result<DataFrame>) -> Result<DataFrame> {
    if !path.exists() {
        return empty();
    }
    let file = std::fs::File::open(path)?;
    let df = ParquetReader::new(file).finish()?;
    Ok(df)
}

fn write_df(path: &Path, mut df: DataFrame) -> Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).ok();
    }
    let mut f = std::fs::File::create(path)?;
    ParquetWriter::new(&mut f).finish(&mut df)?;
    Ok(())
}

fn next_id(df: &DataFrame) -> Result<i64> {
    if df.height() == 0 {
        return Ok(1);
    }
    Ok(df.column("id")?.i64()?.max().unwrap_or(0) + 1)
}

fn drop_row_by_id(df: &DataFrame, id: i64) -> Result<DataFrame> {
    let mask: ChunkedArray<BooleanType> = df.column("id")?.i64()?.into_iter().map(|v| v != Some(id)).collect();
    Ok(df.filter(&mask)?)
}

// ---- users ----

/// Public view of a user row. The password hash never leaves this module.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserRecord {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub password: String,
}

fn mk_users_df() -> Result<DataFrame> {
    Ok(DataFrame::new(vec![
        Series::new("id".into(), Vec::<i64>::new()).into(),
        Series::new("username".into(), Vec::<String>::new()).into(),
        Series::new("password_hash".into(), Vec::<String>::new()).into(),
        Series::new("email".into(), Vec::<String>::new()).into(),
        Series::new("first_name".into(), Vec::<String>::new()).into(),
        Series::new("last_name".into(), Vec::<String>::new()).into(),
    ])?)
}

struct UserStoreInner {
    path: PathBuf,
}

/// Credential store over `users.parquet`.
#[derive(Clone)]
pub struct UserStore(Arc<Mutex<UserStoreInner>>);

impl UserStore {
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)?;
        Ok(Self(Arc::new(Mutex::new(UserStoreInner { path: root.join("users.parquet") }))))
    }

    fn user_at(df: &DataFrame, i: usize) -> Result<UserRecord> {
        Ok(UserRecord {
            id: i64_at(df, "id", i)?.ok_or_else(|| anyhow!("user row missing id"))?,
            username: str_at(df, "username", i)?.unwrap_or_default(),
            email: str_at(df, "email", i)?.unwrap_or_default(),
            first_name: str_at(df, "first_name", i)?.unwrap_or_default(),
            last_name: str_at(df, "last_name", i)?.unwrap_or_default(),
        })
    }

    fn find_row(df: &DataFrame, username: &str) -> Result<Option<usize>> {
        for i in 0..df.height() {
            if str_at(df, "username", i)?.as_deref() == Some(username) {
                return Ok(Some(i));
            }
        }
        Ok(None)
    }

    /// Create a user. A duplicate username is rejected with Conflict; the
    /// check and the append happen under one lock so two overlapping
    /// registrations of the same name cannot both succeed.
    pub fn create(&self, new: NewUser) -> AppResult<UserRecord> {
        let inner = self.0.lock();
        let df = read_df(&inner.path, mk_users_df).map_err(AppError::from)?;
        if Self::find_row(&df, &new.username).map_err(AppError::from)?.is_some() {
            return Err(AppError::conflict("user_exists", "user already exists"));
        }
        let id = next_id(&df).map_err(AppError::from)?;
        let hash = hash_password(&new.password).map_err(AppError::from)?;
        let row = DataFrame::new(vec![
            Series::new("id".into(), vec![id]).into(),
            Series::new("username".into(), vec![new.username.clone()]).into(),
            Series::new("password_hash".into(), vec![hash]).into(),
            Series::new("email".into(), vec![new.email.clone()]).into(),
            Series::new("first_name".into(), vec![new.first_name.clone()]).into(),
            Series::new("last_name".into(), vec![new.last_name.clone()]).into(),
        ])
        .map_err(|e| AppError::internal("store_error".to_string(), e.to_string()))?;
        let stacked = if df.height() == 0 { row } else { df.vstack(&row).map_err(|e| AppError::internal("store_error".to_string(), e.to_string()))? };
        write_df(&inner.path, stacked).map_err(AppError::from)?;
        debug!(target: "eventline::storage", "user created id={} username='{}'", id, new.username);
        Ok(UserRecord {
            id,
            username: new.username,
            email: new.email,
            first_name: new.first_name,
            last_name: new.last_name,
        })
    }

    /// Verify a username/password pair. Unknown user and bad password both
    /// return None so the caller cannot tell them apart.
    pub fn verify_credentials(&self, username: &str, password: &str) -> AppResult<Option<UserRecord>> {
        let inner = self.0.lock();
        let df = read_df(&inner.path, mk_users_df).map_err(AppError::from)?;
        let Some(i) = Self::find_row(&df, username).map_err(AppError::from)? else {
            return Ok(None);
        };
        let hash = str_at(&df, "password_hash", i).map_err(AppError::from)?.unwrap_or_default();
        if !verify_password(&hash, password) {
            return Ok(None);
        }
        Ok(Some(Self::user_at(&df, i).map_err(AppError::from)?))
    }

    pub fn get(&self, id: i64) -> AppResult<Option<UserRecord>> {
        let inner = self.0.lock();
        let df = read_df(&inner.path, mk_users_df).map_err(AppError::from)?;
        for i in 0..df.height() {
            if i64_at(&df, "id", i).map_err(AppError::from)? == Some(id) {
                return Ok(Some(Self::user_at(&df, i).map_err(AppError::from)?));
            }
        }
        Ok(None)
    }
}

// ---- events ----

/// One event row. `user_id` is the owner link, set at creation and never
/// reassigned. Timestamps are epoch milliseconds; `period` is a duration in
/// milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EventRecord {
    pub id: i64,
    pub user_id: i64,
    pub description: Option<String>,
    pub start: i64,
    pub end: Option<i64>,
    pub periodic: bool,
    pub period: Option<i64>,
    pub next_notification: Option<i64>,
    pub status: String,
    pub labels: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct NewEvent {
    pub user_id: i64,
    pub description: Option<String>,
    pub start: i64,
    pub end: Option<i64>,
    pub periodic: bool,
    pub period: Option<i64>,
    pub next_notification: Option<i64>,
    pub status: String,
    pub labels: Vec<String>,
}

/// Partial update; None leaves the stored value untouched.
#[derive(Debug, Clone, Default)]
pub struct EventPatch {
    pub description: Option<String>,
    pub start: Option<i64>,
    pub end: Option<i64>,
    pub periodic: Option<bool>,
    pub period: Option<i64>,
    pub next_notification: Option<i64>,
    pub status: Option<String>,
    pub labels: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MediaRecord {
    pub id: i64,
    pub event_id: i64,
    pub media: String,
}

fn mk_events_df() -> Result<DataFrame> {
    Ok(DataFrame::new(vec![
        Series::new("id".into(), Vec::<i64>::new()).into(),
        Series::new("user_id".into(), Vec::<i64>::new()).into(),
        Series::new("description".into(), Vec::<Option<String>>::new()).into(),
        Series::new("start".into(), Vec::<i64>::new()).into(),
        Series::new("end".into(), Vec::<Option<i64>>::new()).into(),
        Series::new("periodic".into(), Vec::<bool>::new()).into(),
        Series::new("period".into(), Vec::<Option<i64>>::new()).into(),
        Series::new("next_notification".into(), Vec::<Option<i64>>::new()).into(),
        Series::new("status".into(), Vec::<String>::new()).into(),
        Series::new("labels".into(), Vec::<String>::new()).into(),
    ])?)
}

fn mk_media_df() -> Result<DataFrame> {
    Ok(DataFrame::new(vec![
        Series::new("id".into(), Vec::<i64>::new()).into(),
        Series::new("event_id".into(), Vec::<i64>::new()).into(),
        Series::new("media".into(), Vec::<String>::new()).into(),
    ])?)
}

fn event_row_df(ev: &EventRecord) -> Result<DataFrame> {
    // Labels go down as a JSON array so label text may contain any character.
    let labels = serde_json::to_string(&ev.labels)?;
    Ok(DataFrame::new(vec![
        Series::new("id".into(), vec![ev.id]).into(),
        Series::new("user_id".into(), vec![ev.user_id]).into(),
        Series::new("description".into(), vec![ev.description.clone()]).into(),
        Series::new("start".into(), vec![ev.start]).into(),
        Series::new("end".into(), vec![ev.end]).into(),
        Series::new("periodic".into(), vec![ev.periodic]).into(),
        Series::new("period".into(), vec![ev.period]).into(),
        Series::new("next_notification".into(), vec![ev.next_notification]).into(),
        Series::new("status".into(), vec![ev.status.clone()]).into(),
        Series::new("labels".into(), vec![labels]).into(),
    ])?)
}

struct EventStoreInner {
    events_path: PathBuf,
    media_path: PathBuf,
}

/// Event and event-media store over `events.parquet` / `event_media.parquet`.
#[derive(Clone)]
pub struct EventStore(Arc<Mutex<EventStoreInner>>);

impl EventStore {
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)?;
        Ok(Self(Arc::new(Mutex::new(EventStoreInner {
            events_path: root.join("events.parquet"),
            media_path: root.join("event_media.parquet"),
        }))))
    }

    fn event_at(df: &DataFrame, i: usize) -> Result<EventRecord> {
        let labels_raw = str_at(df, "labels", i)?.unwrap_or_default();
        let labels: Vec<String> = if labels_raw.is_empty() { Vec::new() } else { serde_json::from_str(&labels_raw)? };
        Ok(EventRecord {
            id: i64_at(df, "id", i)?.ok_or_else(|| anyhow!("event row missing id"))?,
            user_id: i64_at(df, "user_id", i)?.ok_or_else(|| anyhow!("event row missing user_id"))?,
            description: str_at(df, "description", i)?,
            start: i64_at(df, "start", i)?.unwrap_or(0),
            end: i64_at(df, "end", i)?,
            periodic: bool_at(df, "periodic", i)?,
            period: i64_at(df, "period", i)?,
            next_notification: i64_at(df, "next_notification", i)?,
            status: str_at(df, "status", i)?.unwrap_or_default(),
            labels,
        })
    }

    pub fn create(&self, new: NewEvent) -> AppResult<EventRecord> {
        let inner = self.0.lock();
        let df = read_df(&inner.events_path, mk_events_df).map_err(AppError::from)?;
        let id = next_id(&df).map_err(AppError::from)?;
        let record = EventRecord {
            id,
            user_id: new.user_id,
            description: new.description,
            start: new.start,
            end: new.end,
            periodic: new.periodic,
            period: new.period,
            next_notification: new.next_notification,
            status: new.status,
            labels: new.labels,
        };
        let row = event_row_df(&record).map_err(AppError::from)?;
        let stacked = if df.height() == 0 { row } else { df.vstack(&row).map_err(|e| AppError::internal("store_error".to_string(), e.to_string()))? };
        write_df(&inner.events_path, stacked).map_err(AppError::from)?;
        debug!(target: "eventline::storage", "event created id={} owner={}", record.id, record.user_id);
        Ok(record)
    }

    pub fn get(&self, id: i64) -> AppResult<Option<EventRecord>> {
        let inner = self.0.lock();
        let df = read_df(&inner.events_path, mk_events_df).map_err(AppError::from)?;
        for i in 0..df.height() {
            if i64_at(&df, "id", i).map_err(AppError::from)? == Some(id) {
                return Ok(Some(Self::event_at(&df, i).map_err(AppError::from)?));
            }
        }
        Ok(None)
    }

    /// All events owned by a user; used for the overlap check on create.
    pub fn list_for_user(&self, user_id: i64) -> AppResult<Vec<EventRecord>> {
        let inner = self.0.lock();
        let df = read_df(&inner.events_path, mk_events_df).map_err(AppError::from)?;
        let mut out = Vec::new();
        for i in 0..df.height() {
            if i64_at(&df, "user_id", i).map_err(AppError::from)? == Some(user_id) {
                out.push(Self::event_at(&df, i).map_err(AppError::from)?);
            }
        }
        Ok(out)
    }

    /// Apply a partial update to an event. Returns None when the event does
    /// not exist. Ownership checks happen in the caller; the owner link is
    /// never part of the patch.
    pub fn update(&self, id: i64, patch: EventPatch) -> AppResult<Option<EventRecord>> {
        let inner = self.0.lock();
        let df = read_df(&inner.events_path, mk_events_df).map_err(AppError::from)?;
        let mut current: Option<EventRecord> = None;
        for i in 0..df.height() {
            if i64_at(&df, "id", i).map_err(AppError::from)? == Some(id) {
                current = Some(Self::event_at(&df, i).map_err(AppError::from)?);
                break;
            }
        }
        let Some(mut record) = current else {
            return Ok(None);
        };
        if let Some(d) = patch.description {
            record.description = Some(d);
        }
        if let Some(s) = patch.start {
            record.start = s;
        }
        if let Some(e) = patch.end {
            record.end = Some(e);
        }
        if let Some(p) = patch.periodic {
            record.periodic = p;
        }
        if let Some(p) = patch.period {
            record.period = Some(p);
        }
        if let Some(n) = patch.next_notification {
            record.next_notification = Some(n);
        }
        if let Some(s) = patch.status {
            record.status = s;
        }
        if let Some(l) = patch.labels {
            record.labels = l;
        }
        let remaining = drop_row_by_id(&df, id).map_err(AppError::from)?;
        let row = event_row_df(&record).map_err(AppError::from)?;
        let stacked = if remaining.height() == 0 { row } else { remaining.vstack(&row).map_err(|e| AppError::internal("store_error".to_string(), e.to_string()))? };
        write_df(&inner.events_path, stacked).map_err(AppError::from)?;
        debug!(target: "eventline::storage", "event updated id={}", id);
        Ok(Some(record))
    }

    pub fn add_media(&self, event_id: i64, media: &str) -> AppResult<MediaRecord> {
        let inner = self.0.lock();
        let df = read_df(&inner.media_path, mk_media_df).map_err(AppError::from)?;
        let id = next_id(&df).map_err(AppError::from)?;
        let row = DataFrame::new(vec![
            Series::new("id".into(), vec![id]).into(),
            Series::new("event_id".into(), vec![event_id]).into(),
            Series::new("media".into(), vec![media.to_string()]).into(),
        ])
        .map_err(|e| AppError::internal("store_error".to_string(), e.to_string()))?;
        let stacked = if df.height() == 0 { row } else { df.vstack(&row).map_err(|e| AppError::internal("store_error".to_string(), e.to_string()))? };
        write_df(&inner.media_path, stacked).map_err(AppError::from)?;
        Ok(MediaRecord { id, event_id, media: media.to_string() })
    }

    pub fn get_media(&self, media_id: i64) -> AppResult<Option<MediaRecord>> {
        let inner = self.0.lock();
        let df = read_df(&inner.media_path, mk_media_df).map_err(AppError::from)?;
        for i in 0..df.height() {
            if i64_at(&df, "id", i).map_err(AppError::from)? == Some(media_id) {
                return Ok(Some(MediaRecord {
                    id: media_id,
                    event_id: i64_at(&df, "event_id", i)
                        .map_err(AppError::from)?
                        .ok_or_else(|| AppError::internal("store_error", "media row missing event_id"))?,
                    media: str_at(&df, "media", i).map_err(AppError::from)?.unwrap_or_default(),
                }));
            }
        }
        Ok(None)
    }
}
