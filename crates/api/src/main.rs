use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;

use agencyportal_api::app::{AppServices, build_app};
use agencyportal_api::config::AppConfig;
use agencyportal_infra::{InMemoryCredentialDirectory, InMemoryPolicyDirectory, SeedData};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    agencyportal_observability::init();

    let config = match AppConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, "invalid configuration; refusing to start");
            std::process::exit(1);
        }
    };

    let users = Arc::new(InMemoryCredentialDirectory::new());
    let policies = Arc::new(InMemoryPolicyDirectory::new());
    if let Some(path) = &config.seed_file {
        SeedData::load(path)
            .and_then(|seed| seed.apply(&users, &*policies, config.password_cost))
            .with_context(|| format!("loading seed file {}", path.display()))?;
    }

    let services = Arc::new(
        AppServices::new(&config, users, policies).context("failed to build services")?,
    );
    let sweeper = services.sweeper(config.sweep_interval).spawn();

    let app = build_app(services);

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("server error")?;

    sweeper.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
