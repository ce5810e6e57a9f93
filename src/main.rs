use anyhow::{Context, Result};
use std::{io::ErrorKind, sync::Arc};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;
use walnut_gallery::{AppState, config::AppConfig, create_app, db};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let (cfg, migrate_only) = AppConfig::from_env_and_args()?;
    tracing::info!(?cfg, "starting walnut-gallery");

    tokio::fs::create_dir_all(&cfg.storage_dir)
        .await
        .with_context(|| format!("creating storage directory {}", cfg.storage_dir))?;

    let pool = db::connect(&cfg.database_url)
        .await
        .with_context(|| format!("connecting to {}", cfg.database_url))?;

    // the schema is idempotent, so it is applied on every start
    db::run_migrations(&pool).await.context("applying schema")?;
    if migrate_only {
        tracing::info!("schema is up to date");
        return Ok(());
    }

    if cfg.upload.secret_key.is_none() {
        tracing::warn!("WALNUT_GALLERY_SECRET_KEY is not set; uploads are disabled");
    }
    if cfg.admin.password.is_none() {
        tracing::warn!("WALNUT_GALLERY_ADMIN_PASSWORD is not set; admin endpoints are closed");
    }

    let state = AppState::new(&cfg, Arc::new(pool)).context("invalid storage configuration")?;
    let listener = bind(&cfg).await?;
    tracing::info!(
        domain = %cfg.delivery_domain(),
        "listening on http://{}",
        listener.local_addr()?
    );

    axum::serve(listener, create_app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

/// Bind the configured address, dropping to loopback when a wildcard bind
/// is not permitted.
async fn bind(cfg: &AppConfig) -> Result<TcpListener> {
    let addr = cfg.addr();
    match TcpListener::bind(&addr).await {
        Ok(listener) => Ok(listener),
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(%addr, %fallback, error = %err, "bind not permitted, using loopback");
            Ok(TcpListener::bind(&fallback).await?)
        }
        Err(err) => Err(err).with_context(|| format!("binding {}", addr)),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to listen for SIGTERM");
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
    tracing::info!("shutting down");
}
