use std::sync::Arc;

use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use school_sync::api::router;
use school_sync::config::AppConfig;
use school_sync::connectivity::{self, Connectivity};
use school_sync::db;
use school_sync::remote::{HttpRemoteClient, OfflineRemoteClient, RemoteClient};
use school_sync::state::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "school_sync=debug".to_string()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env()?;
    let pool = db::connect(&config.database_url).await?;

    let remote: Arc<dyn RemoteClient> = match &config.remote {
        Some(remote_config) => Arc::new(HttpRemoteClient::new(remote_config.clone())?),
        None => {
            warn!("REMOTE_URL is not set, running offline-only");
            Arc::new(OfflineRemoteClient)
        }
    };

    let connectivity = Connectivity::new(false);
    if let Some(interval) = config.probe_interval {
        connectivity::spawn_probe(connectivity.clone(), remote.clone(), interval);
    }

    let state = AppState::new(
        pool,
        remote,
        connectivity,
        config.poll_interval,
        config.push_timeout,
    );

    tokio::spawn(state.scheduler.clone().start());

    let app = router(state);

    info!("listening on http://{}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
