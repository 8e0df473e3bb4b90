use crate::entity::ConnectionId;
use crate::math::Vec2;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum Phase {
    #[default]
    Waiting,
    Playing,
    Ended,
}

/// Shrinking safe region; entities outside it take damage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HazardZone {
    pub center: Vec2,
    pub radius: f32,
}

impl HazardZone {
    pub fn contains(&self, point: Vec2) -> bool {
        self.center.distance(&point) <= self.radius
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EliminationReason {
    Combat,
    Storm,
    Winner,
}

/// One entry of the append-only elimination log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EliminationRecord {
    pub entity_id: ConnectionId,
    pub name: String,
    pub reason: EliminationReason,
    pub rank: u32,
    pub timestamp: u64,
}
