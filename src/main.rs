//! FitRec Engine
//!
//! Fitness program recommendation service.
//!
//! # Architecture
//!
//! - **Catalog Loader**: Parses and vectorises the program catalog in the background
//! - **Recommendation Engine**: Content, goal and feedback scoring with a result cache
//! - **API Server**: REST endpoints for clients
//!
//! # Graceful Shutdown
//!
//! The engine handles SIGTERM and SIGINT signals, ensuring in-flight requests
//! complete before the process exits. Feedback is persisted on every write, so
//! nothing is left to flush.

use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use fitrec::api::{self, AppState};
use fitrec::recommendation::{FeedbackLog, JsonFileStore, Recommender};
use fitrec::{Config, Result};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with structured logging
    init_tracing();

    info!("═══════════════════════════════════════════════════════════════");
    info!("  🏋️ FitRec Engine v{}", env!("CARGO_PKG_VERSION"));
    info!("═══════════════════════════════════════════════════════════════");
    info!("  Components:");
    info!("    • Program Catalog Loader");
    info!("    • Recommendation Engine");
    info!("    • REST API Server");
    info!("═══════════════════════════════════════════════════════════════");

    // Load configuration
    let config = Arc::new(Config::from_env()?);
    info!("✅ Configuration loaded and validated");

    #[cfg(feature = "prometheus")]
    {
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .install()
            .map_err(anyhow::Error::from)?;
        info!("✅ Prometheus exporter installed");
    }

    // Feedback log, falling back to the backup snapshot if the primary is unreadable
    let store = JsonFileStore::new(
        config.feedback.store_path.clone(),
        config.feedback.backup_path.clone(),
    );
    let feedback = Arc::new(FeedbackLog::open(Arc::new(store)));
    info!(
        users = feedback.user_count(),
        "✅ Feedback log opened"
    );

    let recommender = Arc::new(Recommender::new(
        config.recommendation.clone(),
        feedback,
    ));

    // Requests get 503 until the catalog is installed
    info!("📦 Loading program catalog in the background...");
    spawn_catalog_loader(recommender.clone(), config.catalog.path.clone());

    info!("═══════════════════════════════════════════════════════════════");
    info!("  📡 API: http://{}:{}", config.api.host, config.api.port);
    info!(
        "  🔗 Health: http://{}:{}/health",
        config.api.host, config.api.port
    );
    info!("═══════════════════════════════════════════════════════════════");

    let state = Arc::new(AppState { recommender });
    if let Err(e) = api::start_server(state, &config.api, shutdown_signal()).await {
        error!("API server error: {:?}", e);
        return Err(e.into());
    }

    info!("👋 FitRec Engine stopped gracefully");
    Ok(())
}

/// Initialize structured logging with tracing
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        // Default log levels
        EnvFilter::new("fitrec_engine=debug,fitrec=debug,tower_http=debug,info")
    });

    let registry = tracing_subscriber::registry().with(filter);

    if std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json")) {
        registry
            .with(fmt::layer().json().with_target(true).with_current_span(true))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false)
                    .with_ansi(std::env::var("NO_COLOR").is_err()),
            )
            .init();
    }
}

/// Parse and install the catalog on the blocking pool
fn spawn_catalog_loader(
    recommender: Arc<Recommender>,
    path: PathBuf,
) -> tokio::task::JoinHandle<()> {
    tokio::task::spawn_blocking(move || match recommender.load_catalog(&path) {
        Ok(()) => info!("✅ Program catalog ready, serving recommendations"),
        Err(e) => error!(
            path = %path.display(),
            "❌ Failed to load program catalog, recommendations stay unavailable: {}", e
        ),
    })
}

/// Wait for shutdown signal (SIGTERM or SIGINT)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
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

    info!("📴 Shutdown signal received, draining in-flight requests");
}
