use anyhow::Context;
use helpdesk_relay::{config::Config, db, router, AppState};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,helpdesk_relay=debug")),
        )
        .init();

    let config = Config::from_env()?;

    let db_pool = db::connect(&config.database_url, config.db_max_connections)
        .await
        .context("connecting to the message store")?;

    let bind_addr = config.bind_addr;
    let app = router(AppState::new(db_pool, config));

    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("binding {bind_addr}"))?;
    info!(%bind_addr, "relay listening");

    axum::serve(listener, app).await?;
    Ok(())
}
