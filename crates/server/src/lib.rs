pub mod config;
pub mod routes;
pub mod telemetry;

use anyhow::Context;
use labelscan_ocr::{OcrBackend, PreprocessConfig, ScanPipeline};
use tokio::net::TcpListener;
use tracing::info;

use crate::config::ServerConfig;
pub use crate::routes::{router, AppState};

#[cfg(feature = "tesseract")]
fn build_recognizer(config: &ServerConfig) -> Box<dyn OcrBackend> {
    Box::new(labelscan_ocr::TesseractRecognizer::new(config.tessdata.clone(), &config.ocr_lang))
}

#[cfg(not(feature = "tesseract"))]
fn build_recognizer(_config: &ServerConfig) -> Box<dyn OcrBackend> {
    tracing::warn!("built without the `tesseract` feature; every scan will fail with an OCR error");
    Box::new(labelscan_ocr::UnavailableRecognizer)
}

pub fn build_state(config: &ServerConfig) -> AppState {
    let preprocess = PreprocessConfig { mode: config.preprocess_mode, ..Default::default() };
    AppState::new(ScanPipeline::new(build_recognizer(config)).with_preprocess(preprocess))
}

/// Bind, serve until Ctrl+C or SIGTERM, then drain in-flight requests.
pub async fn run(config: ServerConfig) -> anyhow::Result<()> {
    let app = router(build_state(&config), config.max_upload_bytes);

    let addr = config.socket_addr();
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!(%addr, preprocess = ?config.preprocess_mode, "OCR scanner listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received Ctrl+C, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
