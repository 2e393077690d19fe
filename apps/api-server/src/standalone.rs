use crate::{ai::AIHandler, config::ServerConfig, router, AppState};
use caption_library::CaptionLibrary;
use dotenvy::dotenv;
use std::sync::Arc;
use storage::Storage;

const DEFAULT_LOG_FILTER: &str = "info,api_server=debug,ai=debug";

pub async fn start_server() -> anyhow::Result<()> {
    match dotenv() {
        Ok(path) => println!(".env read successfully from {}", path.display()),
        Err(e) => println!("Could not load .env file: {e}"),
    };

    let config = ServerConfig::from_env()?;

    // after dotenv() so RUST_LOG in .env is honored
    match &config.log_dir {
        Some(log_dir) => analytics_tracing::init_tracing_to_file(log_dir.clone(), DEFAULT_LOG_FILTER),
        None => analytics_tracing::init_tracing_to_stdout(DEFAULT_LOG_FILTER),
    }
    tracing::debug!("config: {:?}", config);

    std::fs::create_dir_all(&config.local_data_dir)?;
    let library = CaptionLibrary::open(&config.database_path)?;
    let storage = Storage::new_fs(&config.upload_folder)?;

    tracing::info!("loading caption model, this may take a while the first time");
    let ai = AIHandler::new(&config).await?;

    let state = AppState {
        ai,
        library: Arc::new(library),
        storage,
        caption_timeout: config.caption_timeout,
        history_default_limit: config.history_default_limit,
    };
    let app = router::get_router(state, config.max_upload_bytes);

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!("Listening on http://{}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };
    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Ctrl-C received, shut down...");
        },
        _ = terminate => {
            tracing::info!("Terminate signal received, shut down...");
        },
    }
}
