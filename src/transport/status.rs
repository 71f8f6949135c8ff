//! HTTP status endpoint
//!
//! `GET /ws/status` reports connection and subscription counts without
//! opening a socket.

use std::collections::BTreeMap;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::broker::Broker;
use crate::broker::topic::Topic;
use crate::utils::error::ServerError;

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub success: bool,
    pub message: String,
    pub data: WebSocketStatus,
}

#[derive(Debug, Serialize)]
pub struct WebSocketStatus {
    pub total_connections: usize,
    pub subscriptions: BTreeMap<Topic, usize>,
    /// `operational` while any connection is live, `idle` otherwise.
    pub status: &'static str,
    pub timestamp: DateTime<Utc>,
}

impl StatusResponse {
    pub fn from_broker(broker: &Broker) -> Self {
        let stats = broker.stats();
        Self {
            success: true,
            message: "WebSocket status retrieved successfully".to_string(),
            data: WebSocketStatus {
                status: if stats.total_connections > 0 {
                    "operational"
                } else {
                    "idle"
                },
                total_connections: stats.total_connections,
                subscriptions: stats.subscriptions,
                timestamp: Utc::now(),
            },
        }
    }
}

pub fn router(broker: Broker) -> Router {
    Router::new()
        .route("/ws/status", get(websocket_status))
        .with_state(broker)
}

async fn websocket_status(State(broker): State<Broker>) -> Json<StatusResponse> {
    Json(StatusResponse::from_broker(&broker))
}

pub async fn start_status_server(
    addr: String,
    broker: Broker,
    shutdown: CancellationToken,
) -> Result<(), ServerError> {
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|source| ServerError::Bind {
            addr: addr.clone(),
            source,
        })?;

    info!("Status endpoint listening on http://{addr}/ws/status");
    serve_status(listener, broker, shutdown).await
}

pub async fn serve_status(
    listener: TcpListener,
    broker: Broker,
    shutdown: CancellationToken,
) -> Result<(), ServerError> {
    axum::serve(listener, router(broker))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    Ok(())
}
