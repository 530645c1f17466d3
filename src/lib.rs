// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Relational Auth Gateway - Request Authentication Service
//!
//! Verifies identity-provider bearer tokens, reconciles each verified subject
//! with a local user record, and binds the local user id to the request
//! before protected handlers run.
//!
//! ## Modules
//!
//! - `api` - HTTP API handlers (Axum)
//! - `auth` - Gateway state machine, token verification, identity reconciliation
//! - `config` - Environment configuration
//! - `storage` - User store (redb or in-memory)
//! - `telemetry` - Tracing subscriber setup

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod models;
pub mod state;
pub mod storage;
pub mod telemetry;
