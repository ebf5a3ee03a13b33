//! IDS Stream - operator console
//!
//! Connects to the IDS backend stream and prints a one-line summary on
//! every render tick until Ctrl-C.

use std::time::Duration;

use anyhow::Context;
use ids_stream::{constants, EventKind, StreamClient, StreamConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const RENDER_TICK: Duration = Duration::from_secs(2);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "ids_stream=debug".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = StreamConfig::from_env();

    tracing::info!("{} v{} starting...", constants::APP_NAME, constants::APP_VERSION);
    tracing::info!("  Stream: {}", config.ws_url);
    tracing::info!("  Reconnect delay: {}ms", config.reconnect_delay_ms);

    let client = StreamClient::new(config).context("invalid stream configuration")?;

    client.subscribe(EventKind::Connection, |event| {
        if let Some(state) = event.as_connection() {
            tracing::info!("Connection: {}", state);
        }
        Ok(())
    });
    client.subscribe(EventKind::MonitoringStatus, |event| {
        tracing::debug!("Monitoring status: {:?}", event);
        Ok(())
    });

    client.connect();

    let mut render = tokio::time::interval(RENDER_TICK);
    loop {
        tokio::select! {
            _ = render.tick() => render_summary(&client),
            result = tokio::signal::ctrl_c() => {
                result.context("failed to listen for Ctrl-C")?;
                break;
            }
        }
    }

    tracing::info!("Shutting down...");
    client.disconnect();
    Ok(())
}

fn render_summary(client: &StreamClient) {
    let snapshot = client.snapshot();

    let counts = snapshot
        .aggregates
        .counts
        .iter()
        .map(|(category, count)| format!("{}={}", category, count))
        .collect::<Vec<_>>()
        .join(", ");

    tracing::info!(
        "[{}] recent={} total={} attacks={} timeline={} alerts={} | {}",
        snapshot.connection.state,
        snapshot.aggregates.recent_events,
        snapshot.aggregates.total_events,
        snapshot.aggregates.attack_events,
        snapshot.aggregates.timeline.len(),
        snapshot.notifications.len(),
        if counts.is_empty() { "-".to_string() } else { counts }
    );
}
