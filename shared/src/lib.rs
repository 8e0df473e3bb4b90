//! Types and pure rules shared by the arena server and its clients.
//!
//! The server owns the authoritative [`EntityStore`] and drives the rules in
//! [`rules`] on a fixed tick. Clients run the very same movement function
//! locally to predict their own avatar and reconcile against the snapshots
//! described in [`protocol`].
//!
//! ## Modules
//!
//! - [`math`]: `Vec2`, map bounds and outward rounding
//! - [`entity`]: the per-connection avatar
//! - [`action`]: the closed table of discrete actions
//! - [`config`]: game modes and their injectable presets
//! - [`store`]: id-ordered entity collection with detached snapshots
//! - [`tiles`]: walkability grid and greedy paths
//! - [`session`]: phase, hazard zone and elimination records
//! - [`rules`]: movement, combat, actions, physics, hazard and end checks
//! - [`protocol`]: client/server messages plus the JSON and bincode codecs

pub mod action;
pub mod config;
pub mod entity;
pub mod math;
pub mod protocol;
pub mod rules;
pub mod session;
pub mod store;
pub mod tiles;

pub use action::{ActionKind, ActionSpec};
pub use config::{GameConfig, GameMode, ModeOverrides};
pub use entity::{ConnectionId, Direction, Entity};
pub use math::{MapBounds, Vec2};
pub use protocol::{ClientMessage, MovementInput, RejectReason, ServerMessage, WireFormat};
pub use session::{EliminationReason, HazardZone, Phase};
pub use store::EntityStore;

/// Milliseconds since the Unix epoch, used for join times and timestamps.
pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}
