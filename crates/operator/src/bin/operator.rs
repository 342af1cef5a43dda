//! Operator entry point
//!
//! Starts the discovery and channel controllers in the background and serves
//! health/readiness endpoints for the deployment's probes.

use anyhow::anyhow;
use axum::{routing::get, Json, Router};
use capability_operator::controllers::config::DEFAULT_CONFIG_PATH;
use capability_operator::{run_operator, OperatorConfig};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,capability_operator=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting capability operator v{}",
        env!("CARGO_PKG_VERSION")
    );

    let config_path =
        std::env::var("CONFIG_PATH").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let config = OperatorConfig::from_mounted_file(&config_path);
    if let Err(validation_error) = config.validate() {
        error!("Configuration invalid: {}", validation_error);
        return Err(anyhow!(validation_error));
    }

    let client = kube::Client::try_default().await?;
    info!("Connected to Kubernetes cluster");

    let operator_handle = tokio::spawn(async move {
        if let Err(e) = run_operator(client, config).await {
            error!("Operator error: {}", e);
        }
    });

    let app = Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(TimeoutLayer::new(Duration::from_secs(10))),
        );

    let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
    info!("Health server listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    operator_handle.abort();
    info!("Capability operator stopped");
    Ok(())
}

async fn health_check() -> Json<Value> {
    Json(json!({ "status": "healthy" }))
}

async fn readiness_check() -> Json<Value> {
    Json(json!({ "status": "ready" }))
}

async fn shutdown_signal() {
    if let Err(e) = signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }
    info!("Shutdown signal received");
}
