use anyhow::Context;

use warden_infra::config::{AppConfig, LogFormat};
use warden_observability::LogSettings;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env().context("loading configuration")?;

    warden_observability::init(&LogSettings {
        level: config.log_level.clone(),
        json: config.log_format == LogFormat::Json,
    });
    tracing::info!(config = ?config, "starting warden-api");

    let app = warden_api::app::build_app(&config)
        .await
        .context("wiring services")?;

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
