//! CLI for EnvSub
//!
//! Subcommands:
//! - `server`: run the WebSocket server, status endpoint and background producers
//! - `client`: connect, subscribe to one topic and print what arrives

use clap::Parser;
use envsub::broker::Broker;
use envsub::config::load_config;
use envsub::producer::simulated_producers;
use envsub::supervisor::Supervisor;
use envsub::transport::{start_status_server, start_websocket_server};
use envsub::utils::error::ServerError;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "envsub")]
enum Command {
    /// Start the WebSocket server
    Server,
    /// Run a simple client that subscribes to one topic and prints updates
    Client {
        /// WebSocket server URL to connect to
        #[arg(long, default_value = "ws://127.0.0.1:8080/ws")]
        url: String,
        /// Topic to subscribe to
        #[arg(long, default_value = "environmental")]
        topic: String,
    },
}

#[tokio::main]
async fn main() {
    envsub::utils::logging::init("info");

    let cmd = Command::parse();

    match cmd {
        Command::Server => {
            if let Err(e) = run_server().await {
                error!("Server failed: {}", e);
                std::process::exit(1);
            }
        }
        Command::Client { url, topic } => {
            if let Err(e) = run_client(&url, &topic).await {
                error!("Client failed: {}", e);
            }
        }
    }
}

async fn run_server() -> Result<(), ServerError> {
    let config = load_config()?;
    let ws_addr = format!("{}:{}", config.server.host, config.server.port);
    let status_addr = format!("{}:{}", config.server.host, config.server.status_port);

    let broker = Broker::new(config.realtime.max_connections);
    let supervisor = Supervisor::new(broker.clone(), config.realtime.clone());
    for spec in simulated_producers(&config.producers) {
        supervisor.add_producer(spec);
    }
    supervisor.start();

    let shutdown = CancellationToken::new();
    let ws_server = tokio::spawn(start_websocket_server(
        ws_addr,
        broker.clone(),
        config.realtime.clone(),
        shutdown.clone(),
    ));
    let status_server = tokio::spawn(start_status_server(
        status_addr,
        broker.clone(),
        shutdown.clone(),
    ));

    let outcome = tokio::select! {
        res = ws_server => match res {
            Ok(result) => {
                error!("WebSocket server exited unexpectedly.");
                result
            }
            Err(e) => {
                error!("WebSocket server task failed: {e}");
                Ok(())
            }
        },
        res = status_server => match res {
            Ok(result) => {
                error!("Status server exited unexpectedly.");
                result
            }
            Err(e) => {
                error!("Status server task failed: {e}");
                Ok(())
            }
        },
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received. Exiting gracefully.");
            Ok(())
        }
    };

    shutdown.cancel();
    supervisor.stop().await;
    let closed = broker.close();
    info!("Closed {closed} connections");
    outcome
}

async fn run_client(url: &str, topic: &str) -> Result<(), Box<dyn std::error::Error>> {
    use futures_util::{SinkExt, StreamExt};
    use serde_json::json;
    use tokio_tungstenite::connect_async;
    use tokio_tungstenite::tungstenite::Message as WsMessage;

    let (mut ws_stream, _response) = connect_async(url).await?;

    let subscribe = json!({ "type": "subscribe", "subscription_type": topic });
    ws_stream
        .send(WsMessage::Text(subscribe.to_string().into()))
        .await?;

    while let Some(msg) = ws_stream.next().await {
        match msg? {
            WsMessage::Text(text) => println!("{text}"),
            WsMessage::Close(_) => break,
            _ => {}
        }
    }

    Ok(())
}
