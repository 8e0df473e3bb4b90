//! # Arena Client Library
//!
//! Client-side half of the arena netcode: everything a player needs to feel
//! no latency on their own avatar while staying faithful to the server.
//!
//! ## Architecture Overview
//!
//! ### Client-Side Prediction
//! Local movement is applied to a shadow copy of the own entity immediately,
//! using the very same movement rule the server runs, and queued with its
//! sequence number.
//!
//! ### Server Reconciliation
//! Each snapshot acknowledges inputs up to a sequence number. Acknowledged
//! inputs leave the queue; if the shadow drifted too far from the server
//! position it snaps back and the inputs still pending are replayed on top.
//!
//! ### Interpolation
//! Other entities are never predicted. They glide a fixed fraction towards
//! their latest server position every frame instead of jumping.
//!
//! ## Module Organization
//!
//! - `predictor`: shadow entity, pending-input queue, reconciliation and
//!   remote interpolation
//! - `input`: sequenced inputs with change detection and keep-alive, plus a
//!   scripted wander pattern
//! - `stats`: rolling ping history and traffic counters
//! - `network`: the headless WebSocket bot driving all of the above
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::network::{Client, ClientOptions};
//! use shared::protocol::WireFormat;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//!     let mut client = Client::new(ClientOptions {
//!         url: "ws://127.0.0.1:8080/battle-royale".to_string(),
//!         name: Some("Percival".to_string()),
//!         fake_ping_ms: 0,
//!         format: WireFormat::Json,
//!         seed: None,
//!         request_start: false,
//!     });
//!     client.run().await
//! }
//! ```

pub mod input;
pub mod network;
pub mod predictor;
pub mod stats;
