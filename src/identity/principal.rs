use serde::{Deserialize, Serialize};

/// Caller identity as embedded in a session token. Immutable once issued.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Principal {
    pub user_id: i64,
    pub username: String,
}
