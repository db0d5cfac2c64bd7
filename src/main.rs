//! doguin-client entry point.
//!
//! Probes the REST backend, opens a STOMP session, subscribes to the
//! configured destinations and logs every message until Ctrl-C.

use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use doguin_client::api::ApiClient;
use doguin_client::config::ClientConfig;
use doguin_client::session::Session;
use doguin_client::token::{EnvTokenStore, TokenStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = ClientConfig::from_env().context("loading configuration")?;
    tracing::info!(broker = %config.broker_url(), "starting doguin-client");

    let api = ApiClient::new(&config).context("building http client")?;
    match api.fetch_data().await {
        Ok(response) => tracing::info!(code = response.code, message = %response.message, "backend reachable"),
        Err(e) => tracing::warn!(error = %e, "backend probe failed"),
    }

    let tokens: Arc<dyn TokenStore> = Arc::new(EnvTokenStore::new());
    let session = Session::from_config(&config, tokens);
    session.connect().await.context("connecting to broker")?;

    for destination in &config.subscribe_destinations {
        let dest = destination.clone();
        session
            .subscribe(destination, move |message: serde_json::Value| {
                tracing::info!(destination = %dest, %message, "message received");
            })
            .await
            .with_context(|| format!("subscribing to {destination}"))?;
    }

    tokio::signal::ctrl_c()
        .await
        .context("waiting for ctrl-c")?;
    tracing::info!("shutting down");
    session.disconnect().await.context("disconnecting")?;

    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json"));
    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
