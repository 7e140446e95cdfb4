//! Helm - supervises a remote agent gateway and serves a local dashboard API.

use std::env;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use helm_supervisor::api;
use helm_supervisor::config::Config;
use helm_supervisor::gateway::{EndpointConfig, GatewayClient};
use helm_supervisor::refresh::{Dashboard, Refresher};
use helm_supervisor::state::AppState;
use helm_supervisor::store::ConfigStore;

const VERSION: &str = env!("CARGO_PKG_VERSION");
const GIT_HASH: Option<&str> = option_env!("GIT_HASH");

fn print_version() {
    println!("helm {} ({})", VERSION, GIT_HASH.unwrap_or("unknown"));
}

fn apply_endpoint(client: &GatewayClient, endpoint: Option<EndpointConfig>) {
    match endpoint {
        Some(endpoint) => {
            // Rejections are logged and reflected in the status.
            let _ = client.configure(endpoint);
        }
        None => {
            tracing::info!("No gateway credential configured");
            client.clear_config();
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Handle --version / -V
    let args: Vec<String> = env::args().collect();
    if args.iter().any(|a| a == "--version" || a == "-V") {
        print_version();
        return Ok(());
    }

    // Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::load().map_err(|e| {
        format!(
            "Failed to load configuration: {}. \
             Check helm.toml and HELM__* environment variables.",
            e
        )
    })?;
    tracing::info!("Starting helm {}", VERSION);

    let store = Arc::new(ConfigStore::open(&config.store.path).await);
    let client = GatewayClient::websocket(config.gateway.clone(), config.handshake.clone());
    let dashboard = Arc::new(Dashboard::new());

    // Stored credential wins over the static one
    let mut endpoint_rx = store.subscribe();
    let initial = endpoint_rx
        .borrow_and_update()
        .clone()
        .or_else(|| config.gateway.endpoint());
    apply_endpoint(&client, initial);

    // Follow config store changes
    let store_client = client.clone();
    tokio::spawn(async move {
        while endpoint_rx.changed().await.is_ok() {
            let endpoint = endpoint_rx.borrow_and_update().clone();
            tracing::info!("Gateway configuration changed");
            apply_endpoint(&store_client, endpoint);
        }
    });

    // Log status transitions
    let mut status_rx = client.subscribe_status();
    tokio::spawn(async move {
        while status_rx.changed().await.is_ok() {
            let status = *status_rx.borrow_and_update();
            tracing::info!("Gateway status: {}", status);
        }
    });

    // Server push events
    let mut events_rx = client.subscribe_events();
    tokio::spawn(async move {
        loop {
            match events_rx.recv().await {
                Ok(event) => tracing::debug!("Gateway event {} (seq {:?})", event.event, event.seq),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!("Dropped {} gateway events", skipped)
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    tokio::spawn(
        Refresher::new(client.clone(), dashboard.clone(), config.refresh.interval()).run(),
    );

    let state = Arc::new(AppState::new(client, store, dashboard));
    let app = api::app(state);

    // Start server
    let addr = format!("{}:{}", config.api.host, config.api.port);
    tracing::info!("Listening on {}", addr);

    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
