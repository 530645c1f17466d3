// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Embedded user database backed by redb (pure Rust, ACID).
//!
//! ## Table Layout
//!
//! - `users`: local user id → serialized LocalUser
//! - `subject_index`: provider subject → local user id

use std::path::Path;

use redb::{Database, ReadableDatabase, ReadableTable, ReadableTableMetadata, TableDefinition};
use uuid::Uuid;

use super::{StoreError, StoreResult, UserStore};
use crate::models::{LocalUser, LocalUserId, UpsertOutcome, Upserted};

// =============================================================================
// Table Definitions
// =============================================================================

/// Primary table: local user id (UUID bytes) → serialized LocalUser (JSON bytes).
const USERS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("users");

/// Unique index: provider subject → local user id (UUID bytes).
const SUBJECT_INDEX: TableDefinition<&str, &[u8]> = TableDefinition::new("subject_index");

fn id_from_bytes(bytes: &[u8]) -> StoreResult<LocalUserId> {
    Uuid::from_slice(bytes)
        .map(LocalUserId)
        .map_err(|e| StoreError::Unavailable(format!("corrupt user id in subject index: {e}")))
}

// =============================================================================
// UserDatabase
// =============================================================================

/// Embedded ACID user database.
pub struct UserDatabase {
    db: Database,
}

impl UserDatabase {
    /// Open (or create) the database at the given path.
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::Unavailable(format!("cannot create {}: {e}", parent.display()))
            })?;
        }
        let db = Database::create(path)?;

        // Pre-create all tables so later read transactions don't fail
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(USERS)?;
            let _ = write_txn.open_table(SUBJECT_INDEX)?;
        }
        write_txn.commit()?;

        Ok(Self { db })
    }
}

impl UserStore for UserDatabase {
    /// Insert or refresh the user for `subject` inside one write transaction.
    ///
    /// redb admits a single writer at a time, so the lookup and the insert
    /// cannot interleave with another upsert. Unchanged sightings abort the
    /// transaction instead of committing.
    fn upsert_by_subject(&self, subject: &str, email: Option<&str>) -> StoreResult<Upserted> {
        let write_txn = self.db.begin_write()?;
        let upserted = {
            let mut index = write_txn.open_table(SUBJECT_INDEX)?;
            let mut users = write_txn.open_table(USERS)?;

            let existing_id = match index.get(subject)? {
                Some(value) => Some(id_from_bytes(value.value())?),
                None => None,
            };

            match existing_id {
                Some(id) => {
                    let bytes = users
                        .get(id.0.as_bytes().as_slice())?
                        .map(|value| value.value().to_vec())
                        .ok_or(StoreError::DanglingIndex(id))?;
                    let mut user: LocalUser = serde_json::from_slice(&bytes)?;

                    if user.refresh_email(email) {
                        let json = serde_json::to_vec(&user)?;
                        users.insert(id.0.as_bytes().as_slice(), json.as_slice())?;
                        Upserted {
                            user,
                            outcome: UpsertOutcome::Updated,
                        }
                    } else {
                        Upserted {
                            user,
                            outcome: UpsertOutcome::Unchanged,
                        }
                    }
                }
                None => {
                    let user = LocalUser::new_for_subject(subject, email.map(str::to_string));
                    let json = serde_json::to_vec(&user)?;
                    users.insert(user.id.0.as_bytes().as_slice(), json.as_slice())?;
                    index.insert(subject, user.id.0.as_bytes().as_slice())?;
                    Upserted {
                        user,
                        outcome: UpsertOutcome::Created,
                    }
                }
            }
        };

        match upserted.outcome {
            UpsertOutcome::Unchanged => write_txn.abort()?,
            UpsertOutcome::Created | UpsertOutcome::Updated => write_txn.commit()?,
        }
        Ok(upserted)
    }

    fn get(&self, id: &LocalUserId) -> StoreResult<Option<LocalUser>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(USERS)?;
        match table.get(id.0.as_bytes().as_slice())? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    fn find_by_subject(&self, subject: &str) -> StoreResult<Option<LocalUser>> {
        let read_txn = self.db.begin_read()?;
        let index = read_txn.open_table(SUBJECT_INDEX)?;
        let id = match index.get(subject)? {
            Some(value) => id_from_bytes(value.value())?,
            None => return Ok(None),
        };

        let users = read_txn.open_table(USERS)?;
        match users.get(id.0.as_bytes().as_slice())? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Err(StoreError::DanglingIndex(id)),
        }
    }

    fn count(&self) -> StoreResult<u64> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(USERS)?;
        Ok(table.len()?)
    }
}

// =============================================================================
// Tests
// =============================================================================
