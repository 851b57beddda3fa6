use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use dotenvy::dotenv;
use secrecy::ExposeSecret;
use tokio::net::TcpListener;
use tracing::{info, warn};

use storefront_api::api::{RouterConfig, create_router_with_config};
use storefront_api::app::{AppState, AuthSettings, Integrations, Repositories, spawn_worker};
use storefront_api::config::AppConfig;
use storefront_api::domain::{ExternalAuthProvider, PaymentGateway};
use storefront_api::infra::observability::{init_metrics_handle, init_tracing};
use storefront_api::infra::{
    GoogleAuthProvider, JwtService, LocalFileStorage, LogEmailSender, PasswordHasher,
    PostgresClient, StripeGateway, UnconfiguredPaymentGateway,
};

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is fine; the environment may already be set
    dotenv().ok();

    let config = AppConfig::from_env().context("invalid configuration")?;
    init_tracing(config.log_format);
    let metrics = init_metrics_handle();
    if metrics.is_none() {
        warn!("Metrics recorder could not be installed, /metrics is disabled");
    }

    let db = Arc::new(
        PostgresClient::new(config.database_url.expose_secret(), config.database.clone())
            .await
            .context("failed to connect to Postgres")?,
    );
    db.run_migrations().await.context("failed to run migrations")?;

    let payments: Arc<dyn PaymentGateway> = match config.stripe.clone() {
        Some(stripe) => Arc::new(StripeGateway::new(stripe).context("invalid Stripe settings")?),
        None => {
            warn!("STRIPE_SECRET_KEY not set, payments are disabled");
            Arc::new(UnconfiguredPaymentGateway)
        }
    };
    if config.google.client_id.is_none() {
        warn!("GOOGLE_CLIENT_ID not set, external login is disabled");
    }
    let identity: Arc<dyn ExternalAuthProvider> = Arc::new(
        GoogleAuthProvider::new(config.google.clone()).context("invalid Google settings")?,
    );

    let repos = Repositories::from_shared(Arc::clone(&db));
    let integrations = Integrations {
        payments,
        identity,
        storage: Arc::new(LocalFileStorage::new(
            config.upload_dir.clone(),
            &config.public_upload_path,
        )),
        email: Arc::new(LogEmailSender::new(&config.email_from)),
    };
    let auth = AuthSettings {
        jwt: Arc::new(JwtService::new(&config.jwt).context("invalid JWT settings")?),
        hasher: PasswordHasher::new(config.bcrypt_cost),
        refresh_ttl: config.refresh_token_ttl,
        cookie_secure: config.cookie_secure,
    };

    let state = Arc::new(AppState::new(repos.clone(), integrations, auth).with_metrics(metrics));

    let worker = config.worker.enabled.then(|| {
        spawn_worker(
            Arc::clone(&repos.users),
            Arc::clone(&repos.orders),
            config.worker.clone(),
        )
    });

    let router = create_router_with_config(
        state,
        &RouterConfig {
            rate_limit: Some(config.rate_limit.clone()),
            upload_dir: config.upload_dir.clone(),
            public_upload_path: config.public_upload_path.clone(),
            cors_origins: config.cors_origins.clone(),
            ..RouterConfig::default()
        },
    );

    let listener = TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    info!(addr = %config.bind_addr, "Server starting");

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("server error")?;

    if let Some((handle, shutdown_tx)) = worker {
        let _ = shutdown_tx.send(true);
        if let Err(e) = handle.await {
            warn!(error = %e, "Maintenance worker did not stop cleanly");
        }
    }

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
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
}
