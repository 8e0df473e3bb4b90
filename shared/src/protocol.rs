//! Wire protocol shared by server and client.
//!
//! Messages are externally tagged with camelCase names so one derive serves
//! both codecs: JSON for text frames and bincode for binary frames.

use crate::action::ActionKind;
use crate::config::GameMode;
use crate::entity::{ActionTag, ConnectionId, Direction, Entity, EntityState};
use crate::math::{round2, MapBounds, Vec2};
use crate::session::{EliminationReason, EliminationRecord, HazardZone, Phase};
use crate::tiles::TileMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("json codec: {0}")]
    Json(#[from] serde_json::Error),
    #[error("binary codec: {0}")]
    Binary(#[from] bincode::Error),
}

/// One movement sample from a client, tagged with its sequence number.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MovementInput {
    /// Desired direction; components are expected in `[-1, 1]`.
    pub movement: Vec2,
    pub direction: Option<Direction>,
    pub sequence: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    Join { name: Option<String> },
    Input(MovementInput),
    Attack { target_x: f32, target_y: f32 },
    Action { kind: ActionKind },
    MoveTo { x: u32, y: u32 },
    ApplyForce { force: Vec2 },
    Respawn,
    RequestStart,
    Ping { timestamp: u64 },
}

impl ClientMessage {
    pub fn kind(&self) -> RequestKind {
        match self {
            ClientMessage::Join { .. } => RequestKind::Join,
            ClientMessage::Input(_) => RequestKind::Input,
            ClientMessage::Attack { .. } => RequestKind::Attack,
            ClientMessage::Action { .. } => RequestKind::Action,
            ClientMessage::MoveTo { .. } => RequestKind::MoveTo,
            ClientMessage::ApplyForce { .. } => RequestKind::ApplyForce,
            ClientMessage::Respawn => RequestKind::Respawn,
            ClientMessage::RequestStart => RequestKind::RequestStart,
            ClientMessage::Ping { .. } => RequestKind::Ping,
        }
    }
}

/// Names the request a rejection refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RequestKind {
    Connect,
    Join,
    Input,
    Attack,
    Action,
    MoveTo,
    ApplyForce,
    Respawn,
    RequestStart,
    Ping,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RejectReason {
    NotJoined,
    AlreadyJoined,
    Eliminated,
    NotPlaying,
    OnCooldown,
    InsufficientEnergy,
    Unwalkable,
    NoPath,
    Unsupported,
    GameInProgress,
    AlreadyStarted,
    ServerFull,
    UnknownMode,
    Malformed,
    InvalidInput,
}

/// Rounded outward view of one entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySnapshot {
    pub id: ConnectionId,
    pub name: String,
    pub position: Vec2,
    pub direction: Direction,
    pub moving: bool,
    pub state: EntityState,
    pub action: ActionTag,
    pub health: u32,
    pub max_health: u32,
    pub cooldown: u32,
    pub energy: Option<f32>,
    pub velocity: Option<Vec2>,
    pub last_processed_input: u32,
}

impl From<&Entity> for EntitySnapshot {
    fn from(entity: &Entity) -> Self {
        Self {
            id: entity.id,
            name: entity.name.clone(),
            position: entity.position.rounded(),
            direction: entity.direction,
            moving: entity.moving,
            state: entity.state(),
            action: entity.action,
            health: entity.health,
            max_health: entity.max_health,
            cooldown: entity.cooldown,
            energy: entity.energy.map(round2),
            velocity: entity.body.map(|body| body.velocity.rounded()),
            last_processed_input: entity.last_processed_input,
        }
    }
}

/// Full periodic broadcast of one room's authoritative state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldSnapshot {
    pub mode: GameMode,
    pub game_id: u64,
    pub phase: Phase,
    pub tick: u64,
    pub timestamp: u64,
    pub started_at: Option<u64>,
    pub entities: Vec<EntitySnapshot>,
    pub hazard: Option<HazardZone>,
    pub alive_count: usize,
}

impl WorldSnapshot {
    pub fn entity(&self, id: ConnectionId) -> Option<&EntitySnapshot> {
        self.entities.iter().find(|e| e.id == id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameOverSummary {
    pub winner: Option<ConnectionId>,
    /// Best rank first.
    pub rankings: Vec<EliminationRecord>,
    pub total_players: usize,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    Welcome {
        connection_id: ConnectionId,
        mode: GameMode,
        tick_rate: f32,
        map: MapBounds,
        tiles: Option<TileMap>,
    },
    Snapshot(WorldSnapshot),
    Tick {
        tick: u64,
        timestamp: u64,
    },
    UserCount {
        count: usize,
    },
    PlayerJoined {
        id: ConnectionId,
        name: String,
        position: Vec2,
    },
    PlayerLeft {
        id: ConnectionId,
        remaining: usize,
    },
    AttackPerformed {
        attacker: ConnectionId,
        target_x: f32,
        target_y: f32,
        hits: Vec<ConnectionId>,
        timestamp: u64,
    },
    ActionPerformed {
        id: ConnectionId,
        kind: ActionKind,
        timestamp: u64,
    },
    ForceApplied {
        id: ConnectionId,
        force: Vec2,
    },
    Respawned {
        id: ConnectionId,
        position: Vec2,
    },
    Eliminated {
        id: ConnectionId,
        reason: EliminationReason,
        rank: u32,
    },
    GameStarting {
        countdown: u32,
        message: String,
    },
    StartAlreadyRequested {
        message: String,
    },
    GameStarted {
        game_id: u64,
        player_count: usize,
    },
    GameOver(GameOverSummary),
    GameReset {
        game_id: u64,
    },
    Rejected {
        request: RequestKind,
        reason: RejectReason,
    },
    Pong {
        timestamp: u64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WireFormat {
    #[default]
    Json,
    Binary,
}

/// Encoded message ready for a text or binary WebSocket frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
}

impl Frame {
    pub fn format(&self) -> WireFormat {
        match self {
            Frame::Text(_) => WireFormat::Json,
            Frame::Binary(_) => WireFormat::Binary,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Frame::Text(text) => text.len(),
            Frame::Binary(bytes) => bytes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub fn encode<T: Serialize>(message: &T, format: WireFormat) -> Result<Frame, ProtocolError> {
    Ok(match format {
        WireFormat::Json => Frame::Text(serde_json::to_string(message)?),
        WireFormat::Binary => Frame::Binary(bincode::serialize(message)?),
    })
}

pub fn decode_text<T: DeserializeOwned>(text: &str) -> Result<T, ProtocolError> {
    Ok(serde_json::from_str(text)?)
}

pub fn decode_binary<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, ProtocolError> {
    Ok(bincode::deserialize(bytes)?)
}

pub fn decode<T: DeserializeOwned>(frame: &Frame) -> Result<T, ProtocolError> {
    match frame {
        Frame::Text(text) => decode_text(text),
        Frame::Binary(bytes) => decode_binary(bytes),
    }
}
