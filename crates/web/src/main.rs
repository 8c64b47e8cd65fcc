use anyhow::Context;

use basis_infra::{AppConfig, LogStyle};
use basis_observability::LogFormat;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env().context("invalid configuration")?;
    basis_observability::init_with(match config.log_style {
        LogStyle::Json => LogFormat::Json,
        LogStyle::Pretty => LogFormat::Pretty,
    });
    if config.uses_default_password() {
        tracing::warn!("BASIS_ADMIN_PASSWORD not set; using insecure dev default");
    }

    let app = basis_web::app::build_app(&config).await?;

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!(environment = ?config.environment, "listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}
