use clap::Parser;
use evalgate_server::{router, AppState, Config};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    dotenvy::dotenv().ok();
    color_eyre::install()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug")),
        )
        .init();

    let config = Config::parse();
    let state = AppState::from_config(&config)?;

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!(
        app = %config.app_name,
        addr = %listener.local_addr()?,
        jwks_url = %config.jwks_url(),
        "listening"
    );

    axum::serve(listener, router(state)).await?;

    Ok(())
}
