//! Per-object authorization: resources are visible to their owner only.
//!
//! A denied read and an absent resource produce the same `NotFound` failure,
//! so a caller probing foreign ids cannot learn which ones exist. Ownership is
//! checked on reads and updates, never on creation, where the owner is the
//! caller by construction. For media the chain runs media -> parent event ->
//! that event's owner; callers resolve the parent and pass its owner id here.

use crate::error::{AppError, AppResult};

use super::Principal;

/// Allow iff the resource owner is the caller. Deny surfaces as NotFound.
pub fn ensure_owner(principal: &Principal, owner_id: i64) -> AppResult<()> {
    if principal.user_id == owner_id {
        Ok(())
    } else {
        Err(AppError::object_not_found())
    }
}

/// Store ids are never negative; short-circuit before any store lookup.
pub fn ensure_valid_id(id: i64) -> AppResult<()> {
    if id < 0 {
        Err(AppError::object_not_found())
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caller(id: i64) -> Principal {
        Principal { user_id: id, username: format!("user{}", id) }
    }

    #[test]
    fn owner_is_allowed() {
        assert!(ensure_owner(&caller(1), 1).is_ok());
    }

    #[test]
    fn non_owner_reads_as_not_found() {
        let err = ensure_owner(&caller(1), 2).unwrap_err();
        assert_eq!(err.http_status(), 404);
    }

    #[test]
    fn negative_ids_short_circuit() {
        assert!(ensure_valid_id(0).is_ok());
        assert!(ensure_valid_id(42).is_ok());
        assert_eq!(ensure_valid_id(-1).unwrap_err().http_status(), 404);
    }
}
