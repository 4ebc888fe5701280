use aerobook_store::{Config, DbClient};
use aerobook_worker::{build_manager, build_sweeper};
use anyhow::Context;
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "aerobook_worker=debug,aerobook_order=debug,aerobook_store=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    tracing::info!("Starting AeroBook worker");

    let db = DbClient::new(&config.database)
        .await
        .context("Failed to connect to Postgres")?;
    db.migrate().await.context("Failed to run migrations")?;

    let manager = build_manager(&config, &db).await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = build_sweeper(&config, manager).spawn(shutdown_rx);

    tokio::signal::ctrl_c().await.context("Failed to listen for ctrl-c")?;
    tracing::info!("Shutdown requested");

    shutdown_tx.send(true).ok();
    sweeper.await.context("Expiry sweeper panicked")?;

    tracing::info!("AeroBook worker stopped");
    Ok(())
}
