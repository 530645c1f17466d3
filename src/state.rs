// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use crate::auth::{Gateway, JwksManager};
use crate::storage::UserStore;

#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<Gateway>,
    pub users: Arc<dyn UserStore>,
}

impl AppState {
    /// The user store is the one the gateway reconciles into.
    pub fn new(gateway: Arc<Gateway>) -> Self {
        let users = Arc::clone(gateway.reconciler().store());
        Self { gateway, users }
    }

    /// The JWKS manager, when signing keys are fetched remotely.
    pub fn jwks(&self) -> Option<&Arc<JwksManager>> {
        self.gateway.verifier().trust().keys().jwks()
    }
}
