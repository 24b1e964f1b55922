// Telex server entrypoint

use anyhow::Context;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use telex::enrichment::HttpEnrichmentClient;
use telex::ids::gen_uuid;
use telex::meta::HttpMetadataFetcher;
use telex::store::{AttributionRecordStore, Partition};
use telex::{KeyValueStore, MemoryStore, Pipeline, TelexConfig};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("telex=info")),
        )
        .init();

    let config = TelexConfig::from_env();
    let kv: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
    let records = AttributionRecordStore::new(kv.clone());
    seed_store(&records, &kv).await?;

    let enrichment = Arc::new(HttpEnrichmentClient::new(&config, records.clone()));
    let metadata = Arc::new(HttpMetadataFetcher::new(config.outbound_timeout_secs));
    let pipeline = Arc::new(Pipeline::new(kv, enrichment, metadata, config.clone()));

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("binding {}", config.bind_addr))?;
    tracing::info!(addr = %config.bind_addr, "telex listening");

    axum::serve(
        listener,
        telex::server::router(pipeline).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("server terminated")?;

    Ok(())
}

/// Provision a fresh in-memory store: a PUBLIC operator credential and the
/// built-in script templates. The credential is logged once at startup so
/// the operator can call /create.
async fn seed_store(
    records: &AttributionRecordStore,
    kv: &Arc<dyn KeyValueStore>,
) -> anyhow::Result<()> {
    let operator_token = gen_uuid();
    let mut auth_map = serde_json::Map::new();
    auth_map.insert(operator_token.clone(), json!({ "role": "PUBLIC" }));
    kv.put(
        Partition::AuthTokens,
        "tx-api-auth",
        serde_json::Value::Object(auth_map).to_string(),
    )
    .await?;
    tracing::info!(token = %operator_token, "operator credential provisioned");

    records
        .put_template("tx_header", "var p_ = {};".to_string())
        .await?;
    records
        .put_template(
            "fingerprint",
            concat!(
                "p_[\"ua\"] = navigator.userAgent;",
                "p_[\"lang\"] = navigator.language;",
                "p_[\"platform\"] = navigator.platform;",
                "p_[\"screen\"] = screen.width + \"x\" + screen.height;",
                "p_[\"tz\"] = Intl.DateTimeFormat().resolvedOptions().timeZone;",
            )
            .to_string(),
        )
        .await?;
    records
        .put_template(
            "redirect",
            "window.location.replace(\"{{REPLACE}}\");".to_string(),
        )
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending().await,
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received");
}
