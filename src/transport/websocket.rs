//! WebSocket transport
//!
//! This file implements the WebSocket server that connects sockets to the
//! broker. Responsibilities:
//! - Accept TCP/WebSocket connections and route them by request path
//! - Admit each connection to the `Broker`, honouring a `client_id` query
//!   parameter, and reject it when the registry refuses
//! - Run a writer task draining the connection's channel into the socket
//! - Read client frames, hand text frames to the inbound handler, and send
//!   `ping_request` to quiet peers
//! - Remove the connection from the broker when either side goes away

use futures_util::{SinkExt, Stream, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::accept_hdr_async;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tungstenite::http::{StatusCode, Uri};
use tungstenite::protocol::Message as WsMessage;
use tungstenite::protocol::frame::CloseFrame;
use tungstenite::protocol::frame::coding::CloseCode;

use std::net::SocketAddr;

use crate::broker::{Broker, Registration};
use crate::broker::message::ServerMessage;
use crate::config::RealtimeSettings;
use crate::producer::timelapse::monitor_timelapse;
use crate::transport::handler::handle_text;
use crate::utils::error::ServerError;

/// The endpoint a client asked for during the handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// `/ws`, optionally with `?client_id=<id>`.
    Stream { client_id: Option<String> },
    /// `/ws/timelapse/{request_id}`.
    Timelapse { request_id: String },
}

impl Route {
    pub fn from_uri(uri: &Uri) -> Option<Self> {
        let path = uri.path().trim_end_matches('/');
        if path == "/ws" || path.is_empty() {
            let client_id = uri.query().and_then(|query| {
                form_urlencoded::parse(query.as_bytes())
                    .find(|(key, _)| key == "client_id")
                    .map(|(_, value)| value.into_owned())
                    .filter(|value| !value.is_empty())
            });
            return Some(Route::Stream { client_id });
        }

        let request_id = path.strip_prefix("/ws/timelapse/")?;
        if request_id.is_empty() || request_id.contains('/') {
            return None;
        }
        Some(Route::Timelapse {
            request_id: request_id.to_string(),
        })
    }

    fn requested_id(&self) -> Option<String> {
        match self {
            Route::Stream { client_id } => client_id.clone(),
            Route::Timelapse { request_id } => Some(format!("timelapse_{request_id}")),
        }
    }
}

pub async fn start_websocket_server(
    addr: String,
    broker: Broker,
    settings: RealtimeSettings,
    shutdown: CancellationToken,
) -> Result<(), ServerError> {
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|source| ServerError::Bind {
            addr: addr.clone(),
            source,
        })?;

    info!("WebSocket server listening on ws://{addr}");
    serve(listener, broker, settings, shutdown).await;
    Ok(())
}

/// Accepts connections on an already bound listener until `shutdown` fires.
pub async fn serve(
    listener: TcpListener,
    broker: Broker,
    settings: RealtimeSettings,
    shutdown: CancellationToken,
) {
    loop {
        let accepted = tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => accepted,
        };

        match accepted {
            Ok((stream, peer)) => {
                let broker = broker.clone();
                let settings = settings.clone();
                tokio::spawn(handle_connection(stream, peer, broker, settings));
            }
            Err(e) => warn!("Failed to accept connection: {e}"),
        }
    }

    info!("WebSocket server stopped accepting connections");
}

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    broker: Broker,
    settings: RealtimeSettings,
) {
    let mut route = None;
    let callback = |req: &Request, response: Response| -> Result<Response, ErrorResponse> {
        match Route::from_uri(req.uri()) {
            Some(r) => {
                route = Some(r);
                Ok(response)
            }
            None => {
                let mut not_found = ErrorResponse::new(Some("unknown endpoint".to_string()));
                *not_found.status_mut() = StatusCode::NOT_FOUND;
                Err(not_found)
            }
        }
    };

    let ws_stream = match accept_hdr_async(stream, callback).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!("WebSocket handshake error from {peer}: {e}");
            return;
        }
    };
    let Some(route) = route else {
        return;
    };

    let (mut ws_sender, mut ws_receiver) = ws_stream.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<WsMessage>();

    let registration = match broker.admit(tx, route.requested_id()) {
        Ok(registration) => registration,
        Err(e) => {
            warn!("Rejected connection from {peer}: {e}");
            if let Ok(json) = serde_json::to_string(&ServerMessage::error(e.to_string())) {
                let _ = ws_sender.send(WsMessage::text(json)).await;
            }
            let _ = ws_sender
                .send(WsMessage::Close(Some(CloseFrame {
                    code: CloseCode::Policy,
                    reason: e.to_string().into(),
                })))
                .await;
            return;
        }
    };

    let client_id = registration.id.clone();

    // Forward broker → client. The channel closes once the broker drops the
    // connection, at which point the socket is closed from our side.
    let writer = {
        let broker = broker.clone();
        let registration = registration.clone();
        tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                if let Err(e) = ws_sender.send(msg).await {
                    warn!("Failed to send message to {}: {e}", registration.id);
                    broker.remove_if(&registration);
                    return;
                }
            }
            let _ = ws_sender.send(WsMessage::Close(None)).await;
            debug!("Send loop closed for {}", registration.id);
        })
    };

    let monitor = match &route {
        Route::Timelapse { request_id } => Some(tokio::spawn(monitor_timelapse(
            broker.clone(),
            registration.clone(),
            request_id.clone(),
            settings.timelapse_stage_delay(),
        ))),
        Route::Stream { .. } => None,
    };

    read_loop(&mut ws_receiver, &broker, &registration, &settings).await;

    if let Some(monitor) = monitor {
        monitor.abort();
    }
    broker.remove_if(&registration);
    let _ = writer.await;
    info!("{client_id} disconnected");
}

async fn read_loop<S>(
    ws_receiver: &mut S,
    broker: &Broker,
    registration: &Registration,
    settings: &RealtimeSettings,
) where
    S: Stream<Item = Result<WsMessage, tungstenite::Error>> + Unpin,
{
    let client_id = registration.id.as_str();
    let receive_timeout = settings.receive_timeout();

    loop {
        let frame = timeout(receive_timeout, ws_receiver.next()).await;

        // Removed by the sweep, a failed write or shutdown. The id may
        // already belong to a newer connection.
        if !broker.is_current(registration) {
            break;
        }

        match frame {
            Err(_) => {
                // Quiet peer: ask it to ping rather than dropping it.
                broker.send_to(client_id, &ServerMessage::ping_request());
            }
            Ok(None) => break,
            Ok(Some(Err(e))) => {
                debug!("WebSocket error for {client_id}: {e}");
                break;
            }
            Ok(Some(Ok(msg))) => match msg {
                WsMessage::Text(text) => handle_text(broker, client_id, text.as_str()),
                WsMessage::Ping(_) | WsMessage::Pong(_) => {
                    broker.touch(client_id);
                }
                WsMessage::Binary(_) => {
                    broker.send_to(
                        client_id,
                        &ServerMessage::error("Binary frames are not supported"),
                    );
                }
                WsMessage::Close(_) => break,
                WsMessage::Frame(_) => {}
            },
        }
    }
}
