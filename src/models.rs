// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Identity Data Models
//!
//! Types shared between the authentication gateway, the user store, and the
//! REST API.
//!
//! ## Local User Id Type
//!
//! The [`LocalUserId`] newtype wraps the locally generated UUID that
//! identifies a user inside this service. It is distinct from the identity
//! provider's subject identifier and is never supplied by clients.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

// =============================================================================
// Local User Id Type
// =============================================================================

/// Locally generated user identifier (UUID v4).
///
/// Generated once when a subject is first seen and never reused.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(transparent)]
pub struct LocalUserId(pub Uuid);

impl LocalUserId {
    /// Generate a fresh random identifier.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for LocalUserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for LocalUserId {
    fn from(value: Uuid) -> Self {
        LocalUserId(value)
    }
}

// =============================================================================
// Local User
// =============================================================================

/// Persisted identity record, keyed by the provider subject identifier.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct LocalUser {
    /// Local identifier (primary key)
    pub id: LocalUserId,
    /// Identity provider subject identifier (unique)
    pub subject: String,
    /// Email from the most recent token that carried one
    pub email: Option<String>,
    /// When the record was first created
    pub created_at: DateTime<Utc>,
    /// When the record was last modified
    pub updated_at: DateTime<Utc>,
}

impl LocalUser {
    /// Build a record for a subject seen for the first time.
    pub fn new_for_subject(subject: impl Into<String>, email: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: LocalUserId::generate(),
            subject: subject.into(),
            email,
            created_at: now,
            updated_at: now,
        }
    }

    /// Refresh the email from a newer claim set.
    ///
    /// Returns `true` if the record changed. A missing email never clears the
    /// stored one.
    pub fn refresh_email(&mut self, email: Option<&str>) -> bool {
        match email {
            Some(email) if self.email.as_deref() != Some(email) => {
                self.email = Some(email.to_string());
                self.updated_at = Utc::now();
                true
            }
            _ => false,
        }
    }
}

/// What an upsert did to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// First sighting: a new record was inserted
    Created,
    /// Existing record whose email was refreshed
    Updated,
    /// Existing record, nothing written
    Unchanged,
}

/// Result of `upsert_by_subject`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upserted {
    pub user: LocalUser,
    pub outcome: UpsertOutcome,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_user_has_fresh_id_and_matching_timestamps() {
        let a = LocalUser::new_for_subject("user_1", None);
        let b = LocalUser::new_for_subject("user_1", None);
        assert_ne!(a.id, b.id);
        assert_eq!(a.created_at, a.updated_at);
    }

    #[test]
    fn refresh_email_only_on_change() {
        let mut user = LocalUser::new_for_subject("user_1", Some("a@example.com".to_string()));
        assert!(!user.refresh_email(Some("a@example.com")));
        assert!(user.refresh_email(Some("b@example.com")));
        assert_eq!(user.email.as_deref(), Some("b@example.com"));
    }

    #[test]
    fn refresh_email_keeps_existing_when_claim_has_none() {
        let mut user = LocalUser::new_for_subject("user_1", Some("a@example.com".to_string()));
        assert!(!user.refresh_email(None));
        assert_eq!(user.email.as_deref(), Some("a@example.com"));
    }

    #[test]
    fn local_user_id_serializes_as_plain_uuid() {
        let id = LocalUserId(Uuid::nil());
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, r#""00000000-0000-0000-0000-000000000000""#);
    }
}
