use imagediff::{create_router, init, AppState, Config, Result};

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is fine
    let _ = dotenv::dotenv();

    init()?;

    let config = Config::from_env()?;
    log::debug!("Configuration: {:?}", config);

    if !config.upload_dir.exists() {
        std::fs::create_dir_all(&config.upload_dir)?;
    }

    // Model loading happens here, once, before any request is accepted
    let state = AppState::initialize(config)?;
    let addr = state.config.bind_addr;

    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    log::info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    log::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    log::info!("Shutdown signal received");
}
