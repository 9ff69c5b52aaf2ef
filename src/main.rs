use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{info, warn};

use mediscan::api::{start_server, ApiContext};
use mediscan::config::Config;
use mediscan::db::open_database;
use mediscan::vision::{OllamaClient, OllamaTextGenerator, OllamaVisionAnnotator};

/// Wait for shutdown signal (SIGTERM or Ctrl+C)
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {e}");
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
                warn!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down gracefully...");
        },
        _ = terminate => {
            info!("Received SIGTERM, shutting down gracefully...");
        },
    }
}

/// Log a warning for each configured model Ollama does not have installed.
async fn probe_models(client: &OllamaClient, config: &Config) {
    match client.list_models().await {
        Ok(models) => {
            for wanted in [&config.vision_model, &config.report_model] {
                if !models.iter().any(|m| m.starts_with(wanted.as_str())) {
                    warn!(
                        model = wanted.as_str(),
                        "Model not installed in Ollama; pull it before analyzing images"
                    );
                }
            }
        }
        Err(e) => {
            warn!(
                url = config.ollama_url.as_str(),
                error = %e,
                "Cannot reach Ollama; analysis will fall back to degraded responses"
            );
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let config = Config::parse();
    mediscan::init_tracing();

    info!(version = mediscan::config::APP_VERSION, "mediscan starting");

    let db_path = match config.database_path() {
        Ok(path) => path,
        Err(e) => {
            tracing::error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let conn = match open_database(&db_path) {
        Ok(conn) => {
            info!(path = %db_path.display(), "Database ready");
            conn
        }
        Err(e) => {
            tracing::error!("Failed to open database: {e}");
            return ExitCode::FAILURE;
        }
    };

    let client = OllamaClient::new(&config.ollama_url, config.model_timeout_secs);
    probe_models(&client, &config).await;

    let ctx = ApiContext::new(
        conn,
        Arc::new(OllamaVisionAnnotator::new(
            client.clone(),
            config.vision_model.clone(),
        )),
        Arc::new(OllamaTextGenerator::new(
            client,
            config.report_model.clone(),
        )),
    );

    let mut server = match start_server(config.bind, ctx).await {
        Ok(server) => server,
        Err(e) => {
            tracing::error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    info!(addr = %server.addr, "mediscan listening");

    shutdown_signal().await;
    server.shutdown();

    ExitCode::SUCCESS
}
