//! The authoritative per-connection avatar and its small value types.

use crate::action::ActionKind;
use crate::math::Vec2;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;

/// Opaque identifier of a live connection, unique for its lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(pub u32);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum Direction {
    Up,
    #[default]
    Down,
    Left,
    Right,
}

impl Direction {
    /// Facing for a step from `from` to `to`; the dominant axis wins and
    /// vertical wins ties.
    pub fn towards(from: Vec2, to: Vec2) -> Direction {
        let dx = to.x - from.x;
        let dy = to.y - from.y;
        if dx.abs() > dy.abs() {
            if dx > 0.0 {
                Direction::Right
            } else {
                Direction::Left
            }
        } else if dy > 0.0 {
            Direction::Down
        } else {
            Direction::Up
        }
    }
}

/// What the entity is currently doing besides moving.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum ActionTag {
    #[default]
    Idle,
    Attacking,
    Performing(ActionKind),
}

/// Observable state derived from health, action tag and motion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EntityState {
    Idle,
    Moving,
    Attacking,
    Dead,
}

/// A movable circular body integrated by the physics rules.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Body {
    pub velocity: Vec2,
    pub radius: f32,
    pub mass: f32,
}

impl Body {
    pub fn new(radius: f32, mass: f32) -> Self {
        Self {
            velocity: Vec2::ZERO,
            radius,
            mass,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    pub id: ConnectionId,
    pub name: String,
    pub position: Vec2,
    pub direction: Direction,
    pub moving: bool,
    pub health: u32,
    pub max_health: u32,
    /// Ticks until another cooldown-gated action is allowed.
    pub cooldown: u32,
    pub action: ActionTag,
    /// Present only in energy-based modes.
    pub energy: Option<f32>,
    /// Present only in modes with physical bodies.
    pub body: Option<Body>,
    /// Remaining tile steps queued by a path request.
    pub path: VecDeque<Vec2>,
    pub last_processed_input: u32,
    /// Milliseconds since the Unix epoch; never changes after creation.
    pub join_time: u64,
}

impl Entity {
    pub fn new(
        id: ConnectionId,
        name: impl Into<String>,
        position: Vec2,
        max_health: u32,
        join_time: u64,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            position,
            direction: Direction::Down,
            moving: false,
            health: max_health,
            max_health,
            cooldown: 0,
            action: ActionTag::Idle,
            energy: None,
            body: None,
            path: VecDeque::new(),
            last_processed_input: 0,
            join_time,
        }
    }

    pub fn with_body(mut self, body: Body) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_energy(mut self, energy: f32) -> Self {
        self.energy = Some(energy);
        self
    }

    pub fn is_alive(&self) -> bool {
        self.health > 0
    }

    pub fn state(&self) -> EntityState {
        if !self.is_alive() {
            EntityState::Dead
        } else if self.action != ActionTag::Idle {
            EntityState::Attacking
        } else if self.moving {
            EntityState::Moving
        } else {
            EntityState::Idle
        }
    }

    /// Radius used for boundary clamping: the body radius, or zero for points.
    pub fn extent(&self) -> f32 {
        self.body.map(|body| body.radius).unwrap_or(0.0)
    }

    /// Brings the entity back to full health at `position`.
    ///
    /// The processed-input sequence and join time survive a respawn.
    pub fn respawn(&mut self, position: Vec2, max_energy: Option<f32>) {
        self.position = position;
        self.direction = Direction::Down;
        self.moving = false;
        self.health = self.max_health;
        self.cooldown = 0;
        self.action = ActionTag::Idle;
        self.energy = max_energy;
        self.path.clear();
        if let Some(body) = self.body.as_mut() {
            body.velocity = Vec2::ZERO;
        }
    }

    /// True when every float in the entity is finite.
    pub fn is_finite(&self) -> bool {
        self.position.is_finite()
            && self.energy.map_or(true, f32::is_finite)
            && self.body.map_or(true, |body| body.velocity.is_finite())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity() -> Entity {
        Entity::new(ConnectionId(1), "Knight_1", Vec2::new(100.0, 200.0), 100, 42)
    }

    #[test]
    fn test_entity_creation() {
        let entity = entity();
        assert_eq!(entity.id, ConnectionId(1));
        assert_eq!(entity.health, 100);
        assert_eq!(entity.state(), EntityState::Idle);
        assert_eq!(entity.extent(), 0.0);
        assert_eq!(entity.join_time, 42);
    }

    #[test]
    fn test_state_priority() {
        let mut entity = entity();
        entity.moving = true;
        assert_eq!(entity.state(), EntityState::Moving);

        entity.action = ActionTag::Attacking;
        assert_eq!(entity.state(), EntityState::Attacking);

        entity.health = 0;
        assert_eq!(entity.state(), EntityState::Dead);
    }

    #[test]
    fn test_respawn_keeps_sequence_and_join_time() {
        let mut entity = entity().with_body(Body::new(20.0, 1.0)).with_energy(3.0);
        entity.health = 0;
        entity.last_processed_input = 17;
        entity.body.as_mut().unwrap().velocity = Vec2::new(5.0, 5.0);
        entity.path.push_back(Vec2::new(1.0, 1.0));

        entity.respawn(Vec2::new(12.0, 9.0), Some(100.0));

        assert_eq!(entity.health, 100);
        assert_eq!(entity.position, Vec2::new(12.0, 9.0));
        assert_eq!(entity.last_processed_input, 17);
        assert_eq!(entity.join_time, 42);
        assert_eq!(entity.energy, Some(100.0));
        assert_eq!(entity.body.unwrap().velocity, Vec2::ZERO);
        assert!(entity.path.is_empty());
    }

    #[test]
    fn test_direction_towards() {
        let origin = Vec2::new(5.0, 5.0);
        assert_eq!(Direction::towards(origin, Vec2::new(6.0, 5.0)), Direction::Right);
        assert_eq!(Direction::towards(origin, Vec2::new(4.0, 5.0)), Direction::Left);
        assert_eq!(Direction::towards(origin, Vec2::new(6.0, 6.0)), Direction::Down);
        assert_eq!(Direction::towards(origin, Vec2::new(5.0, 4.0)), Direction::Up);
    }

    #[test]
    fn test_non_finite_detection() {
        let mut entity = entity();
        assert!(entity.is_finite());
        entity.position.x = f32::NAN;
        assert!(!entity.is_finite());
    }
}
