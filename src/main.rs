use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bolsa::api::{self, AppState};
use bolsa::config::AppConfig;
use bolsa::infrastructure::finnhub_client::FinnhubClient;
use bolsa::infrastructure::tracing_notifier::TracingNotifier;
use bolsa::persistence::init_database;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bolsa=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("BOLSA brokerage simulation starting...");

    let config = AppConfig::from_env();
    if config.finnhub_api_key.is_empty() {
        warn!("FINNHUB_API_KEY is not set; quote lookups will be rejected by the provider");
    }

    let pool = init_database(&config.database.url).await?;

    let quotes = Arc::new(FinnhubClient::new(
        &config.finnhub_base_url,
        &config.finnhub_api_key,
        Duration::from_secs(config.quote_timeout_secs),
    )?);
    let notifier = Arc::new(TracingNotifier);

    let state = Arc::new(AppState::new(pool, &config, quotes, notifier));
    let app = api::router(state);

    info!(
        "Fee rate {}, referral bonuses {}/{}, sell gated by market hours: {}",
        config.fee_rate,
        config.referrer_bonus,
        config.referee_bonus,
        config.sell_requires_open_market
    );

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    info!("Listening on {}", config.bind_addr);

    let server = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    );

    let shutdown_signal = async move {
        let ctrl_c = async {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("Received Ctrl+C signal"),
                Err(e) => error!("Failed to install Ctrl+C handler: {}", e),
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut sig) => {
                    sig.recv().await;
                    info!("Received SIGTERM signal");
                }
                Err(e) => error!("Failed to install SIGTERM handler: {}", e),
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {},
            _ = terminate => {},
        }
    };

    info!("Server started successfully. Press Ctrl+C to stop.");
    server.with_graceful_shutdown(shutdown_signal).await?;

    info!("Server shut down gracefully");
    Ok(())
}
