// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! In-memory user store.
//!
//! Nothing survives a restart. Used by tests and by `USER_STORE=memory`.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use super::{StoreError, StoreResult, UserStore};
use crate::models::{LocalUser, LocalUserId, UpsertOutcome, Upserted};

#[derive(Default)]
struct Tables {
    users: HashMap<LocalUserId, LocalUser>,
    subject_index: HashMap<String, LocalUserId>,
}

#[derive(Default)]
pub struct InMemoryUserStore {
    tables: Mutex<Tables>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|_| StoreError::Unavailable("in-memory store lock poisoned".to_string()))
    }
}

impl UserStore for InMemoryUserStore {
    fn upsert_by_subject(&self, subject: &str, email: Option<&str>) -> StoreResult<Upserted> {
        let mut tables = self.lock()?;

        if let Some(id) = tables.subject_index.get(subject).copied() {
            let user = tables
                .users
                .get_mut(&id)
                .ok_or(StoreError::DanglingIndex(id))?;
            let outcome = if user.refresh_email(email) {
                UpsertOutcome::Updated
            } else {
                UpsertOutcome::Unchanged
            };
            return Ok(Upserted {
                user: user.clone(),
                outcome,
            });
        }

        let user = LocalUser::new_for_subject(subject, email.map(str::to_string));
        tables.subject_index.insert(subject.to_string(), user.id);
        tables.users.insert(user.id, user.clone());
        Ok(Upserted {
            user,
            outcome: UpsertOutcome::Created,
        })
    }

    fn get(&self, id: &LocalUserId) -> StoreResult<Option<LocalUser>> {
        Ok(self.lock()?.users.get(id).cloned())
    }

    fn find_by_subject(&self, subject: &str) -> StoreResult<Option<LocalUser>> {
        let tables = self.lock()?;
        Ok(tables
            .subject_index
            .get(subject)
            .and_then(|id| tables.users.get(id))
            .cloned())
    }

    fn count(&self) -> StoreResult<u64> {
        Ok(self.lock()?.users.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsert_creates_then_updates() {
        let store = InMemoryUserStore::new();
        let created = store.upsert_by_subject("user_1", None).unwrap();
        assert_eq!(created.outcome, UpsertOutcome::Created);

        let updated = store
            .upsert_by_subject("user_1", Some("one@example.com"))
            .unwrap();
        assert_eq!(updated.outcome, UpsertOutcome::Updated);
        assert_eq!(updated.user.id, created.user.id);

        let unchanged = store
            .upsert_by_subject("user_1", Some("one@example.com"))
            .unwrap();
        assert_eq!(unchanged.outcome, UpsertOutcome::Unchanged);
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn distinct_subjects_get_distinct_ids() {
        let store = InMemoryUserStore::new();
        let a = store.upsert_by_subject("user_a", None).unwrap().user;
        let b = store.upsert_by_subject("user_b", None).unwrap().user;
        assert_ne!(a.id, b.id);
        assert_eq!(store.find_by_subject("user_b").unwrap(), Some(b.clone()));
        assert_eq!(store.get(&a.id).unwrap(), Some(a));
        assert_eq!(store.count().unwrap(), 2);
    }
}
