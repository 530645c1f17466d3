// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Identity Reconciler.
//!
//! Maps a verified [`ClaimSet`] onto a [`LocalUser`] through the store's
//! atomic `upsert_by_subject`. Store calls run on the blocking pool and are
//! bounded by a request-scoped timeout. If the request goes away mid-call,
//! the store operation still runs to completion (or aborts as a whole) on its
//! own thread; it is never torn down halfway through a write.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use super::claims::ClaimSet;
use super::error::ReconcileError;
use crate::models::{LocalUser, UpsertOutcome};
use crate::storage::UserStore;

/// Default request-scoped persistence timeout.
pub const DEFAULT_PERSISTENCE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct IdentityReconciler {
    store: Arc<dyn UserStore>,
    timeout: Duration,
}

impl IdentityReconciler {
    pub fn new(store: Arc<dyn UserStore>) -> Self {
        Self {
            store,
            timeout: DEFAULT_PERSISTENCE_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn store(&self) -> &Arc<dyn UserStore> {
        &self.store
    }

    /// Create or refresh the local user for `claims.subject`.
    ///
    /// Failures are reported once and never retried here; the upsert is
    /// idempotent, so callers may retry the whole request.
    pub async fn reconcile(&self, claims: &ClaimSet) -> Result<LocalUser, ReconcileError> {
        let store = Arc::clone(&self.store);
        let subject = claims.subject.clone();
        let email = claims.email.clone();

        let task =
            tokio::task::spawn_blocking(move || store.upsert_by_subject(&subject, email.as_deref()));

        let upserted = match tokio::time::timeout(self.timeout, task).await {
            Ok(Ok(Ok(upserted))) => upserted,
            Ok(Ok(Err(e))) => return Err(ReconcileError::PersistenceUnavailable(e.to_string())),
            Ok(Err(join_error)) => {
                return Err(ReconcileError::PersistenceUnavailable(format!(
                    "user store task failed: {join_error}"
                )))
            }
            Err(_) => {
                return Err(ReconcileError::PersistenceUnavailable(format!(
                    "user store did not respond within {} ms",
                    self.timeout.as_millis()
                )))
            }
        };

        let user = upserted.user;
        match upserted.outcome {
            UpsertOutcome::Created => {
                info!(user_id = %user.id, subject = %user.subject, "Created local user on first sighting")
            }
            UpsertOutcome::Updated => {
                info!(user_id = %user.id, "Refreshed local user email")
            }
            UpsertOutcome::Unchanged => debug!(user_id = %user.id, "Local user up to date"),
        }

        Ok(user)
    }
}
