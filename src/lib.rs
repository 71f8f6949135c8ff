//! # EnvSub
//!
//! `envsub` is the real-time delivery layer of an environmental monitoring
//! backend. Clients hold a WebSocket open, subscribe to topics such as
//! `hazards` or `alerts`, and receive JSON updates pushed by background
//! producers as new readings, risk changes, alerts and satellite scenes
//! become available.
//!
//! ## Core Modules
//!
//! - `broker`: the connection registry and message dispatcher, the topic set and the outbound message format.
//! - `client`: a registered connection and its outbound channel.
//! - `config`: loading server, registry and producer settings.
//! - `producer`: background loops polling update sources, plus simulated sources and timelapse progress.
//! - `supervisor`: owns the stale sweep, the heartbeat and the producers, and stops them all.
//! - `transport`: the WebSocket server, inbound control messages and the HTTP status endpoint.
//! - `utils`: error types and logging setup.

pub mod broker;
pub mod client;
pub mod config;
pub mod producer;
pub mod supervisor;
pub mod transport;
pub mod utils;
