// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::{error::Error, net::SocketAddr, sync::Arc, time::Duration};

use axum::Router;
use axum_server::tls_rustls::RustlsConfig;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use relational_auth_gateway::{
    api::router,
    auth::{Gateway, IdentityReconciler, TokenVerifier},
    config::{Config, StoreBackend, TlsPaths},
    state::AppState,
    storage::{InMemoryUserStore, UserDatabase, UserStore},
    telemetry,
};

/// In-flight requests get this long to finish after a shutdown signal.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // Install the ring crypto provider for rustls (must be done before any TLS operations)
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| "failed to install rustls crypto provider")?;

    let config = Config::from_env()?;
    telemetry::init_tracing(config.log_format);

    let store: Arc<dyn UserStore> = match config.store_backend {
        StoreBackend::Redb => {
            let path = config.user_db_path();
            info!(path = %path.display(), "Opening user database");
            Arc::new(UserDatabase::open(&path)?)
        }
        StoreBackend::Memory => {
            info!("Using in-memory user store; users are lost on restart");
            Arc::new(InMemoryUserStore::new())
        }
    };

    let trust = config.build_trust()?;
    info!(
        issuer = trust.issuer(),
        audience = trust.audience().unwrap_or("-"),
        jwks = trust.keys().jwks().map(|j| j.jwks_url()).unwrap_or("-"),
        "Loaded trust configuration"
    );

    let gateway = Gateway::new(
        TokenVerifier::new(trust),
        IdentityReconciler::new(store).with_timeout(config.persistence_timeout),
    )
    .with_error_details(config.error_details);

    let app = router(AppState::new(Arc::new(gateway)));

    let shutdown = CancellationToken::new();
    tokio::spawn(watch_signals(shutdown.clone()));

    match &config.tls {
        Some(tls) => serve_tls(app, config.bind_addr, tls, shutdown).await?,
        None => serve_plain(app, config.bind_addr, shutdown).await?,
    }

    info!("Server stopped");
    Ok(())
}

async fn serve_plain(
    app: Router,
    addr: SocketAddr,
    shutdown: CancellationToken,
) -> Result<(), Box<dyn Error>> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Auth gateway listening on http://{addr} (docs at /docs)");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    Ok(())
}

async fn serve_tls(
    app: Router,
    addr: SocketAddr,
    tls: &TlsPaths,
    shutdown: CancellationToken,
) -> Result<(), Box<dyn Error>> {
    let tls_config = RustlsConfig::from_pem_file(&tls.cert, &tls.key).await?;
    info!("Auth gateway listening on https://{addr} (docs at /docs)");

    let handle = axum_server::Handle::new();
    let server = axum_server::bind_rustls(addr, tls_config).handle(handle.clone());
    tokio::spawn(async move {
        shutdown.cancelled().await;
        handle.graceful_shutdown(Some(SHUTDOWN_GRACE));
    });

    server.serve(app.into_make_service()).await?;
    Ok(())
}

/// Cancel `token` on Ctrl-C or SIGTERM.
async fn watch_signals(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
    token.cancel();
}
