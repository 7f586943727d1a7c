//! Conference Controller
//!
//! Entry point for the conference orchestration service.
//! Creates conferences on the media platform, admits browser and telephone
//! participants, and fans out stream subscriptions.

use conference_controller::actors::{ActorMetrics, ConferenceRegistryHandle, RegistrySettings};
use conference_controller::config::Config;
use conference_controller::observability::metrics::init_metrics_recorder;
use conference_controller::observability::HealthState;
use conference_controller::platform::http::HttpMediaPlatform;
use conference_controller::platform::SharedPlatform;
use conference_controller::routes::{self, AppState};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Time allowed for conference actors to stop after the listener closes.
const REGISTRY_SHUTDOWN_DEADLINE: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "conference_controller=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Conference Controller");

    // Load configuration
    let config = Config::from_env().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!(
        instance_id = %config.instance_id,
        bind_address = %config.bind_address,
        platform_api_url = %config.platform_api_url,
        join_code_length = config.join_code_length,
        participant_cleanup_seconds = config.participant_cleanup_seconds,
        "Configuration loaded successfully"
    );

    // Metrics recorder must be installed before anything records
    let metrics_handle = init_metrics_recorder().map_err(|e| {
        error!("Failed to initialize metrics: {}", e);
        e
    })?;

    let platform: SharedPlatform = Arc::new(HttpMediaPlatform::from_config(&config)?);

    let registry = ConferenceRegistryHandle::new(
        config.instance_id.clone(),
        platform,
        RegistrySettings::from_config(&config),
        ActorMetrics::new(),
    )?;

    let health_state = Arc::new(HealthState::new());
    let bind_address = config.bind_address.clone();
    let drain_seconds = config.drain_seconds;

    let state = Arc::new(AppState {
        registry: registry.clone(),
        config,
    });

    let app = routes::build_routes(state, Arc::clone(&health_state), metrics_handle);

    let addr: SocketAddr = bind_address.parse().map_err(|e| {
        error!("Invalid bind address: {}", e);
        e
    })?;

    let listener = tokio::net::TcpListener::bind(addr).await?;
    health_state.set_ready();

    info!("Conference Controller listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(Arc::clone(&health_state), drain_seconds))
        .await?;

    info!("HTTP server stopped, shutting down conferences");

    if let Err(e) = registry.shutdown(REGISTRY_SHUTDOWN_DEADLINE).await {
        warn!("Registry shutdown incomplete: {}", e);
        registry.cancel();
    }
    registry.wait_stopped().await;

    info!("Conference Controller shutdown complete");

    Ok(())
}

/// Listens for shutdown signals (SIGTERM, SIGINT).
///
/// Clears readiness first so load balancers stop routing, then waits out the
/// drain period before the listener closes.
async fn shutdown_signal(health_state: Arc<HealthState>, drain_seconds: u64) {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received SIGINT, starting graceful shutdown..."),
            Err(e) => error!("Failed to listen for SIGINT: {}", e),
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received SIGTERM, starting graceful shutdown...");
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    health_state.set_not_ready();

    if drain_seconds > 0 {
        warn!("Draining connections for {} seconds...", drain_seconds);
        tokio::time::sleep(Duration::from_secs(drain_seconds)).await;
        info!("Drain period complete");
    } else {
        info!("Skipping drain period (CC_DRAIN_SECONDS=0)");
    }
}
