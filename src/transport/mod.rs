//! The `transport` module is responsible for handling network communication
//! with clients.
//!
//! It defines the inbound control protocol, the handler applying it to the
//! broker, the WebSocket server managing connections, and the HTTP status
//! endpoint.

pub mod handler;
pub mod message;
pub mod status;
pub mod websocket;

pub use status::start_status_server;
pub use websocket::start_websocket_server;
