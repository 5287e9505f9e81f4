//! Expiry label scanner HTTP service.
//!
//! Accepts a label photo on `POST /upload` and answers with the printed
//! expiry date, if one can be read.

use anyhow::Result;
use expiry_ocr::{ExpiryPipeline, OcrBackend, TesseractCli};
use tokio::net::TcpListener;
use tokio::signal;
use tracing_bunyan_formatter::{BunyanFormattingLayer, JsonStorageLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod config;
mod routes;

use config::ServerConfig;
use routes::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = ServerConfig::from_env()?;
    let ocr_config = config.load_ocr_config()?;

    tracing::info!("Starting expiry-server v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Tesseract command: {}", ocr_config.tesseract_cmd.display());
    match &ocr_config.debug_image_path {
        Some(path) => tracing::info!("Debug image path: {}", path.display()),
        None => tracing::info!("Debug image disabled"),
    }

    let recognizer: Box<dyn OcrBackend> = Box::new(TesseractCli::from_config(&ocr_config));
    let state = AppState::new(ExpiryPipeline::new(recognizer, ocr_config));
    let app = routes::router(state, config.max_upload_bytes);

    let listener = TcpListener::bind(config.bind).await?;
    tracing::info!("Listening on {}", config.bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,expiry_ocr=debug,tower_http=debug"));
    let formatting_layer = BunyanFormattingLayer::new("expiry-server".into(), std::io::stdout);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(JsonStorageLayer)
        .with(formatting_layer)
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {e}");
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

    tracing::info!("Shutdown signal received");
}
