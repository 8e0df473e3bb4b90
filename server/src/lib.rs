//! # Arena Server Library
//!
//! This library provides the authoritative server for the real-time arena
//! game. It owns one simulation per game mode, applies client requests to it,
//! and streams the resulting state back over WebSockets.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative Simulation
//! Every rule decision is made here. Clients predict their own movement with
//! the same shared rules and conform to the snapshots the server sends.
//!
//! ### Rooms
//! The request path of the WebSocket handshake chooses a room
//! (`/battle-royale`, `/boxing`, `/tile-world`, `/physics`). Each room has its
//! own entities, session lifecycle and tick clock, and rooms never interact.
//!
//! ### Session Lifecycle
//! Rooms that play rounds move through waiting, playing and ended phases:
//! auto-start and countdown timers, the shrinking hazard zone, elimination
//! ranking, the game-over summary and the automatic reset.
//!
//! ## Architecture Design
//!
//! ### Single Owner Event Loop
//! Connection tasks only move frames. All worlds, the connection roster and
//! the room clocks are owned by one loop in [`network::Server::run`], which
//! processes connection events, frames and tick signals one at a time, so
//! inputs and ticks never interleave inside a world.
//!
//! ### Dual Codec
//! Text frames carry JSON and binary frames carry bincode. Each connection is
//! answered in the codec of its most recent frame, and a broadcast is encoded
//! at most once per codec.
//!
//! ## Module Organization
//!
//! - `client_manager`: connection roster, capacity and idle timeouts
//! - `clock`: per-room fixed-rate tick task
//! - `error`: startup and settings errors
//! - `game`: one room's world and its tick pipeline
//! - `gateway`: client message to world operation translation
//! - `network`: WebSocket accept loop and message dispatch
//! - `outbound`: messages paired with their recipients
//! - `registry`: lazily created room per game mode
//! - `session`: phase machine, timers and rankings
//! - `settings`: TOML settings and per-mode overrides
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::network::Server;
//! use server::settings::ServerSettings;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut server = Server::bind(ServerSettings::default()).await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod client_manager;
pub mod clock;
pub mod error;
pub mod game;
pub mod gateway;
pub mod network;
pub mod outbound;
pub mod registry;
pub mod session;
pub mod settings;
