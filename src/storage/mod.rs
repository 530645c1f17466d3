// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # User Storage Module
//!
//! Persistence for [`LocalUser`] records, keyed by the identity provider's
//! subject identifier.
//!
//! ## Backends
//!
//! - [`UserDatabase`] - embedded redb file (`DATA_DIR/users.redb`), ACID
//! - [`InMemoryUserStore`] - process-local maps for tests and ephemeral runs
//!
//! ## Atomicity
//!
//! `upsert_by_subject` is a single atomic create-or-update. Two concurrent
//! first sightings of the same subject always end with exactly one record:
//! redb serializes write transactions, and the in-memory store holds one lock
//! across lookup and insert.
//!
//! Store calls are blocking. The reconciler runs them on the blocking pool.

pub mod memory;
pub mod user_database;

use crate::models::{LocalUser, LocalUserId, Upserted};

pub use memory::InMemoryUserStore;
pub use user_database::UserDatabase;

/// Error type for user store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("redb database error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("redb transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("redb table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("redb storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("redb commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("subject index points at missing user {0}")]
    DanglingIndex(LocalUserId),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Persistence capability consumed by the identity reconciler.
pub trait UserStore: Send + Sync + 'static {
    /// Create the user for `subject` if absent, otherwise refresh its email.
    ///
    /// Must be atomic with respect to concurrent calls for the same subject.
    fn upsert_by_subject(&self, subject: &str, email: Option<&str>) -> StoreResult<Upserted>;

    /// Look up a user by local identifier.
    fn get(&self, id: &LocalUserId) -> StoreResult<Option<LocalUser>>;

    /// Look up a user by provider subject identifier.
    fn find_by_subject(&self, subject: &str) -> StoreResult<Option<LocalUser>>;

    /// Number of stored users.
    fn count(&self) -> StoreResult<u64>;
}
